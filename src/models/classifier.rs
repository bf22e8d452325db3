//! Classifier backends producing a positive-class probability

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::patient::FEATURE_COUNT;

/// A fitted binary classifier.
///
/// Implementations must be deterministic and must not clamp: whatever the
/// model produces is returned so the scorer can reject out-of-range values.
pub trait Classifier: Send + Sync {
    /// Probability of the positive ("elevated risk") class for one scaled
    /// feature vector
    fn positive_probability(&self, scaled: &[f64; FEATURE_COUNT]) -> Result<f64>;

    /// Backend identifier for logs
    fn backend_name(&self) -> &str;
}

/// Sentinel used in `children_left` / `children_right` for leaves
pub const TREE_LEAF: i64 = -1;

/// One fitted decision tree in flattened array form.
///
/// Node `i` is internal when `children_left[i] != -1`; samples with
/// `x[feature[i]] <= threshold[i]` go left. `value[i]` holds per-class
/// training counts (or weighted fractions) at the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<Vec<f64>>,
}

impl DecisionTree {
    fn node_count(&self) -> usize {
        self.children_left.len()
    }

    /// Structural checks guaranteeing that traversal terminates and every
    /// reachable leaf yields a probability.
    pub fn check(&self) -> Result<()> {
        let n = self.node_count();
        ensure!(n > 0, "tree has no nodes");
        ensure!(
            self.children_right.len() == n
                && self.feature.len() == n
                && self.threshold.len() == n
                && self.value.len() == n,
            "tree arrays disagree on node count (left={}, right={}, feature={}, threshold={}, value={})",
            n,
            self.children_right.len(),
            self.feature.len(),
            self.threshold.len(),
            self.value.len()
        );

        for node in 0..n {
            let left = self.children_left[node];
            let right = self.children_right[node];

            if left == TREE_LEAF {
                ensure!(right == TREE_LEAF, "node {} has only a right child", node);
                let counts = &self.value[node];
                ensure!(
                    counts.len() == 2,
                    "leaf {} has {} class values, expected 2",
                    node,
                    counts.len()
                );
                if counts.iter().any(|c| !c.is_finite() || *c < 0.0) {
                    bail!("leaf {} has negative or non-finite values", node);
                }
                ensure!(counts[0] + counts[1] > 0.0, "leaf {} is empty", node);
                continue;
            }

            for child in [left, right] {
                if child <= node as i64 || child >= n as i64 {
                    bail!("node {} has invalid child {}", node, child);
                }
            }
            let feature = self.feature[node];
            if feature < 0 || feature >= FEATURE_COUNT as i64 {
                bail!("node {} splits on unknown feature {}", node, feature);
            }
            ensure!(
                self.threshold[node].is_finite(),
                "node {} has a non-finite threshold",
                node
            );
        }
        Ok(())
    }

    /// Index of the leaf reached by `x`. Requires a checked tree.
    pub fn leaf_for(&self, x: &[f64; FEATURE_COUNT]) -> usize {
        let mut node = 0usize;
        while self.children_left[node] != TREE_LEAF {
            let feature = self.feature[node] as usize;
            node = if x[feature] <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        node
    }

    /// Class-1 share of the leaf reached by `x`
    pub fn positive_probability(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        let counts = &self.value[self.leaf_for(x)];
        counts[1] / (counts[0] + counts[1])
    }
}

/// Decision tree or random forest: the mean positive-class probability of
/// its trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub trees: Vec<DecisionTree>,
}

impl TreeEnsemble {
    /// Parse and check an ensemble from its JSON export.
    pub fn from_json(json: &str) -> Result<Self> {
        let ensemble: TreeEnsemble = serde_json::from_str(json).context("invalid tree model")?;
        ensemble.check()?;
        Ok(ensemble)
    }

    pub fn check(&self) -> Result<()> {
        ensure!(!self.trees.is_empty(), "model contains no trees");
        for (i, tree) in self.trees.iter().enumerate() {
            tree.check().with_context(|| format!("tree {}", i))?;
        }
        Ok(())
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for TreeEnsemble {
    fn positive_probability(&self, scaled: &[f64; FEATURE_COUNT]) -> Result<f64> {
        let sum: f64 = self
            .trees
            .iter()
            .map(|tree| tree.positive_probability(scaled))
            .sum();
        Ok(sum / self.trees.len() as f64)
    }

    fn backend_name(&self) -> &str {
        "tree_ensemble"
    }
}
