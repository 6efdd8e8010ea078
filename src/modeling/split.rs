use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// How the usable rows of a table are divided into training and test sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "split", rename_all = "snake_case")]
pub enum Split {
    /// Shuffle with `seed`, then hold out `ceil(n · test_fraction)` rows.
    Random { test_fraction: f64, seed: u64 },
    /// Caller-chosen table row positions.
    Explicit { train: Vec<usize>, test: Vec<usize> },
}

impl Split {
    pub fn random(test_fraction: f64, seed: u64) -> Self {
        Split::Random {
            test_fraction,
            seed,
        }
    }

    /// Partition `usable` (table row positions with complete data) into
    /// `(train, test)`. Explicit rows that are not usable are dropped.
    pub fn resolve(&self, usable: &[usize]) -> Result<(Vec<usize>, Vec<usize>)> {
        match self {
            Split::Random {
                test_fraction,
                seed,
            } => {
                if !(*test_fraction > 0.0 && *test_fraction < 1.0) {
                    return Err(EngineError::InvalidParameter(format!(
                        "test fraction must be in (0, 1), got {test_fraction}"
                    )));
                }
                let mut rows = usable.to_vec();
                let mut rng = ChaCha8Rng::seed_from_u64(*seed);
                rows.shuffle(&mut rng);
                let n_test = ((rows.len() as f64) * test_fraction).ceil() as usize;
                let train = rows.split_off(n_test.min(rows.len()));
                Ok((train, rows))
            }
            Split::Explicit { train, test } => {
                let overlap: HashSet<&usize> = train.iter().collect();
                if let Some(row) = test.iter().find(|r| overlap.contains(r)) {
                    return Err(EngineError::InvalidParameter(format!(
                        "row {row} is in both the training and test sets"
                    )));
                }
                let usable: HashSet<&usize> = usable.iter().collect();
                let keep = |rows: &[usize]| -> Vec<usize> {
                    rows.iter().copied().filter(|r| usable.contains(r)).collect()
                };
                Ok((keep(train), keep(test)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_split_is_reproducible_and_disjoint() {
        let rows: Vec<usize> = (0..50).collect();
        let (train, test) = Split::random(0.2, 7).resolve(&rows).unwrap();
        assert_eq!(test.len(), 10);
        assert_eq!(train.len(), 40);
        assert!(test.iter().all(|r| !train.contains(r)));
        assert_eq!(Split::random(0.2, 7).resolve(&rows).unwrap(), (train, test));
    }

    #[test]
    fn explicit_split_drops_unusable_rows() {
        let split = Split::Explicit {
            train: vec![0, 1, 2, 9],
            test: vec![3],
        };
        let (train, test) = split.resolve(&[0, 1, 2, 3]).unwrap();
        assert_eq!(train, vec![0, 1, 2]);
        assert_eq!(test, vec![3]);
    }

    #[test]
    fn bad_fraction_is_rejected() {
        assert!(Split::random(1.0, 1).resolve(&[0, 1]).is_err());
    }
}
