//! Regression tree used as the weak learner of the boosted forecaster

use crate::error::{ForecastError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node; rows with `x[feature] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

/// Growth limits of a [`DecisionTree`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

/// Least-squares regression tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    config: TreeConfig,
    root: Option<TreeNode>,
    n_features: usize,
}

impl DecisionTree {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            root: None,
            n_features: 0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(ForecastError::Training(format!(
                "tree fit: {} rows of features but {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() == 0 {
            return Err(ForecastError::insufficient(1, 0, "tree fit"));
        }
        self.n_features = x.ncols();
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(self.build(x, y, &indices, 0));
        Ok(self)
    }

    fn build(&self, x: &Array2<f64>, y: &Array1<f64>, indices: &[usize], depth: usize) -> TreeNode {
        let n = indices.len();
        let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / n as f64;

        if depth >= self.config.max_depth
            || n < self.config.min_samples_split
            || n < 2 * self.config.min_samples_leaf
        {
            return TreeNode::Leaf { value: mean, n_samples: n };
        }

        match self.best_split(x, y, indices) {
            Some((feature_idx, threshold)) => {
                let (left, right): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| x[[i, feature_idx]] <= threshold);
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left: Box::new(self.build(x, y, &left, depth + 1)),
                    right: Box::new(self.build(x, y, &right, depth + 1)),
                    n_samples: n,
                }
            }
            None => TreeNode::Leaf { value: mean, n_samples: n },
        }
    }

    /// Best (feature, threshold) by squared-error reduction; each feature sorts the
    /// node's rows once and scans prefix sums.
    fn best_split(&self, x: &Array2<f64>, y: &Array1<f64>, indices: &[usize]) -> Option<(usize, f64)> {
        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf.max(1);
        let total: f64 = indices.iter().map(|&i| y[i]).sum();

        let candidates: Vec<(usize, f64, f64)> = (0..x.ncols())
            .into_par_iter()
            .filter_map(|feature| {
                let mut order: Vec<(f64, f64)> =
                    indices.iter().map(|&i| (x[[i, feature]], y[i])).collect();
                order.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

                let mut best: Option<(f64, f64)> = None;
                let mut left_sum = 0.0;
                for k in 0..n - 1 {
                    left_sum += order[k].1;
                    let left_n = k + 1;
                    let right_n = n - left_n;
                    if left_n < min_leaf || right_n < min_leaf || order[k].0 == order[k + 1].0 {
                        continue;
                    }
                    let right_sum = total - left_sum;
                    // maximizing this is equivalent to minimizing the children's SSE
                    let score = left_sum * left_sum / left_n as f64
                        + right_sum * right_sum / right_n as f64;
                    if best.map_or(true, |(s, _)| score > s) {
                        best = Some((score, (order[k].0 + order[k + 1].0) / 2.0));
                    }
                }
                best.map(|(score, threshold)| (feature, score, threshold))
            })
            .collect();

        let parent_score = total * total / n as f64;
        candidates
            .into_iter()
            .filter(|c| c.1 > parent_score + 1e-12)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(b.0.cmp(&a.0)))
            .map(|(feature, _, threshold)| (feature, threshold))
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> Result<f64> {
        let mut node = self.root.as_ref().ok_or(ForecastError::ModelNotFitted)?;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return Ok(*value),
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(ForecastError::Training(format!(
                "tree expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        self.root.as_ref().map(walk).unwrap_or(0)
    }
}
