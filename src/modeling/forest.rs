//! Random forest classifier: Gini-split decision trees grown on bootstrap
//! samples, each tree seeded `seed + tree_index` and trained in parallel.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Hyperparameters for [`Forest::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` means ceil(sqrt(p)).
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }
}

impl ForestParams {
    fn validate(&self) -> Result<()> {
        if self.n_trees == 0 || self.max_depth == 0 || self.min_samples_leaf == 0 {
            return Err(EngineError::InvalidParameter(
                "n_trees, max_depth and min_samples_leaf must be positive".into(),
            ));
        }
        if self.max_features == Some(0) {
            return Err(EngineError::InvalidParameter("max_features must be positive".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decision tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        /// Class probabilities of the training rows that reached this leaf.
        probs: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn probs(&self, row: &[f64]) -> &[f64] {
        match self {
            Node::Leaf { probs } => probs,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.probs(row)
                } else {
                    right.probs(row)
                }
            }
        }
    }
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    n_classes: usize,
    params: &'a ForestParams,
    max_features: usize,
    importances: Vec<f64>,
    rng: ChaCha8Rng,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

impl TreeBuilder<'_> {
    fn counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &r in rows {
            counts[self.y[r]] += 1;
        }
        counts
    }

    fn leaf(&self, counts: &[usize], n: usize) -> Node {
        Node::Leaf {
            probs: counts.iter().map(|&c| c as f64 / n as f64).collect(),
        }
    }

    fn build(&mut self, rows: &[usize], depth: usize) -> Node {
        let counts = self.counts(rows);
        let impurity = gini(&counts, rows.len());
        if depth >= self.params.max_depth
            || rows.len() < self.params.min_samples_split
            || impurity < 1e-12
        {
            return self.leaf(&counts, rows.len());
        }

        match self.best_split(rows, impurity) {
            Some(split) => {
                self.importances[split.feature] += split.gain * rows.len() as f64;
                let left = self.build(&split.left, depth + 1);
                let right = self.build(&split.right, depth + 1);
                Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            None => self.leaf(&counts, rows.len()),
        }
    }

    fn best_split(&mut self, rows: &[usize], parent: f64) -> Option<BestSplit> {
        let n_features = self.x.first().map_or(0, Vec::len);
        let mut candidates: Vec<usize> = (0..n_features).collect();
        candidates.shuffle(&mut self.rng);
        candidates.truncate(self.max_features);

        let mut best: Option<BestSplit> = None;
        for feature in candidates {
            let mut values: Vec<f64> = rows.iter().map(|&r| self.x[r][feature]).collect();
            values.sort_by(f64::total_cmp);
            values.dedup();

            for pair in values.windows(2) {
                let threshold = (pair[0] + pair[1]) / 2.0;
                let (left, right): (Vec<usize>, Vec<usize>) =
                    rows.iter().partition(|&&r| self.x[r][feature] <= threshold);
                if left.len() < self.params.min_samples_leaf
                    || right.len() < self.params.min_samples_leaf
                {
                    continue;
                }
                let n = rows.len() as f64;
                let weighted = (left.len() as f64 * gini(&self.counts(&left), left.len())
                    + right.len() as f64 * gini(&self.counts(&right), right.len()))
                    / n;
                let gain = parent - weighted;
                if gain > best.as_ref().map_or(0.0, |b| b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        gain,
                        left,
                        right,
                    });
                }
            }
        }
        best
    }
}

// ---------------------------------------------------------------------------
// Forest
// ---------------------------------------------------------------------------

/// Trained ensemble over class indices `0..n_classes`.
#[derive(Debug, Clone)]
pub(crate) struct Forest {
    trees: Vec<Node>,
    n_classes: usize,
    /// Normalized to sum to 1.
    importances: Vec<f64>,
}

impl Forest {
    /// `x` is row-major with one entry per feature; `y` holds class indices.
    pub(crate) fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        params: &ForestParams,
    ) -> Result<Self> {
        params.validate()?;
        let n = x.len();
        let n_features = x.first().map_or(0, Vec::len);
        if n == 0 || n_features == 0 {
            return Err(EngineError::insufficient("random forest training rows", 1, n));
        }
        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().ceil() as usize)
            .clamp(1, n_features);

        let grown: Vec<(Node, Vec<f64>)> = (0..params.n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(i as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut builder = TreeBuilder {
                    x,
                    y,
                    n_classes,
                    params,
                    max_features,
                    importances: vec![0.0; n_features],
                    rng,
                };
                let root = builder.build(&sample, 0);
                (root, builder.importances)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(grown.len());
        for (root, imp) in grown {
            for (total, v) in importances.iter_mut().zip(imp) {
                *total += v;
            }
            trees.push(root);
        }
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            importances.iter_mut().for_each(|v| *v /= sum);
        } else {
            importances = vec![1.0 / n_features as f64; n_features];
        }

        log::debug!(
            "Grew {} trees over {n} rows, {n_features} features, {max_features} per split",
            trees.len()
        );
        Ok(Forest {
            trees,
            n_classes,
            importances,
        })
    }

    /// Mean of the per-tree leaf probabilities.
    pub(crate) fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        let mut probs = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (acc, p) in probs.iter_mut().zip(tree.probs(row)) {
                *acc += p;
            }
        }
        let k = self.trees.len() as f64;
        probs.iter_mut().for_each(|p| *p /= k);
        probs
    }

    /// Winning class and its averaged probability; ties go to the lower index.
    pub(crate) fn predict(&self, row: &[f64]) -> (usize, f64) {
        self.predict_proba(row)
            .into_iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best })
    }

    pub(crate) fn importances(&self) -> &[f64] {
        &self.importances
    }
}
