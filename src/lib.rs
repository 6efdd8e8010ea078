//! Versioned tabular data engine: load a table, clean and encode it through
//! committed versions, then describe, test, model and forecast it.
//!
//! ```text
//!   data::loader ──► store::DatasetStore ◄── session::Session ──► ops::Operation
//!                         │                                         │
//!                         ▼                                         ▼
//!        stats / modeling / timeseries (read-only)      cleaning / encoding
//! ```

pub mod cleaning;
pub mod config;
pub mod data;
pub mod encoding;
pub mod error;
pub mod modeling;
pub mod numeric;
pub mod ops;
pub mod session;
pub mod stats;
pub mod store;
pub mod timeseries;

pub use config::EngineConfig;
pub use data::model::{CellValue, Column, ColumnType, Table};
pub use error::{EngineError, Result};
pub use ops::{Applied, Operation};
pub use session::Session;
pub use store::{DatasetStore, Version, VersionId};
