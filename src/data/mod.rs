//! Data layer: core types, loading, and export.
//!
//! Architecture:
//! ```text
//!  .csv / .json / .parquet
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  parse file → Table (type inference per column)
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  model    │  Table = Vec<Column>, Column = typed Vec<CellValue>
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  export   │  Table → CSV text / JSON records / Parquet bytes
//!   └──────────┘
//! ```

pub mod export;
pub mod loader;
pub mod model;
