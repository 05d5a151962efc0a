//! Least-squares regression tree used as the boosting base learner
//!
//! Splits are exhaustive over every feature and every boundary between
//! distinct sorted values. Rows go left when `value <= threshold`.

use serde::{Deserialize, Serialize};

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// Binary regression tree stored as a flat node arena (root at index 0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Fit on the rows of `x` selected by `rows`
    ///
    /// `importance` accumulates the squared-error reduction of each split per
    /// feature and must have one slot per column.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        rows: Vec<usize>,
        params: &TreeParams,
        importance: &mut [f64],
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, y, rows, 0, params, importance);
        tree
    }

    fn grow(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        rows: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        importance: &mut [f64],
    ) -> usize {
        let id = self.nodes.len();
        let value = mean(y, &rows);
        self.nodes.push(Node::Leaf { value });

        let can_split = depth < params.max_depth
            && rows.len() >= params.min_samples_split.max(2)
            && rows.len() >= 2 * params.min_samples_leaf.max(1);
        if !can_split {
            return id;
        }

        let Some(split) = best_split(x, y, &rows, params.min_samples_leaf.max(1)) else {
            return id;
        };

        if let Some(slot) = importance.get_mut(split.feature) {
            *slot += split.gain;
        }

        let left = self.grow(x, y, split.left, depth + 1, params, importance);
        let right = self.grow(x, y, split.right, depth + 1, params, importance);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };

        id
    }

    /// Predict a single row
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(f64::NAN);
                    id = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

fn mean(y: &[f64], rows: &[usize]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().map(|&i| y[i]).sum::<f64>() / rows.len() as f64
}

/// Best variance-reducing split, or `None` when no split improves the fit
fn best_split(x: &[Vec<f64>], y: &[f64], rows: &[usize], min_leaf: usize) -> Option<SplitCandidate> {
    let n = rows.len();
    let n_features = x.get(rows[0]).map_or(0, |r| r.len());
    let total: f64 = rows.iter().map(|&i| y[i]).sum();
    let parent_score = total * total / n as f64;

    // (feature, threshold, gain, rows left of the cut)
    let mut best: Option<(usize, f64, f64, usize)> = None;
    let mut sorted = rows.to_vec();

    for feature in 0..n_features {
        sorted.copy_from_slice(rows);
        sort_by_feature(x, &mut sorted, feature);

        let mut left_sum = 0.0;
        for k in 1..n {
            left_sum += y[sorted[k - 1]];

            if k < min_leaf || n - k < min_leaf {
                continue;
            }
            let lo = x[sorted[k - 1]][feature];
            let hi = x[sorted[k]][feature];
            if lo >= hi {
                continue;
            }

            let right_sum = total - left_sum;
            let score = left_sum * left_sum / k as f64 + right_sum * right_sum / (n - k) as f64;
            let gain = score - parent_score;

            if gain > best.as_ref().map_or(1e-12, |b| b.2) {
                best = Some((feature, (lo + hi) / 2.0, gain, k));
            }
        }
    }

    best.map(|(feature, threshold, gain, k)| {
        sorted.copy_from_slice(rows);
        sort_by_feature(x, &mut sorted, feature);
        let right = sorted.split_off(k);
        SplitCandidate {
            feature,
            threshold,
            gain,
            left: sorted,
            right,
        }
    })
}

fn sort_by_feature(x: &[Vec<f64>], rows: &mut [usize], feature: usize) {
    rows.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));
}

#[cfg(test)]
mod tests {
    use super::*;

    impl RegressionTree {
        fn n_leaves(&self) -> usize {
            self.nodes
                .iter()
                .filter(|n| matches!(n, Node::Leaf { .. }))
                .count()
        }

        fn depth(&self) -> usize {
            fn walk(nodes: &[Node], id: usize) -> usize {
                match &nodes[id] {
                    Node::Leaf { .. } => 0,
                    Node::Split { left, right, .. } => {
                        1 + walk(nodes, *left).max(walk(nodes, *right))
                    }
                }
            }
            walk(&self.nodes, 0)
        }
    }

    #[test]
    fn test_stump_finds_step() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 0.0]).collect();
        let y: Vec<f64> = (0..10).map(|i| if i < 6 { 1.0 } else { 5.0 }).collect();
        let params = TreeParams {
            max_depth: 1,
            ..TreeParams::default()
        };
        let mut importance = vec![0.0; 2];

        let tree = RegressionTree::fit(&x, &y, (0..10).collect(), &params, &mut importance);

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.predict_row(&[2.0, 0.0]), 1.0);
        assert_eq!(tree.predict_row(&[5.4, 0.0]), 1.0);
        assert_eq!(tree.predict_row(&[5.6, 0.0]), 5.0);
        assert!(importance[0] > 0.0);
        assert_eq!(importance[1], 0.0);
    }

    #[test]
    fn test_min_samples_leaf_is_respected() {
        let x: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64]).collect();
        let y = vec![0.0, 0.0, 0.0, 0.0, 0.0, 10.0];
        let params = TreeParams {
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 2,
        };
        let mut importance = vec![0.0];

        let tree = RegressionTree::fit(&x, &y, (0..6).collect(), &params, &mut importance);

        // the outlier cannot be isolated in a leaf of one
        assert_eq!(tree.predict_row(&[5.0]), 5.0);
    }

    #[test]
    fn test_constant_target_is_single_leaf() {
        let x: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64]).collect();
        let y = vec![3.0; 8];
        let mut importance = vec![0.0];

        let tree =
            RegressionTree::fit(&x, &y, (0..8).collect(), &TreeParams::default(), &mut importance);

        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict_row(&[100.0]), 3.0);
    }

    #[test]
    fn test_split_partitions_rows_on_winning_feature() {
        // feature 0 is noise, feature 1 separates the targets
        let x = vec![
            vec![3.0, 0.9],
            vec![1.0, 0.1],
            vec![4.0, 0.8],
            vec![2.0, 0.2],
            vec![0.0, 0.7],
            vec![5.0, 0.3],
        ];
        let y = vec![9.0, 1.0, 9.0, 1.0, 9.0, 1.0];

        let split = best_split(&x, &y, &[0, 1, 2, 3, 4, 5], 1).unwrap();

        assert_eq!(split.feature, 1);
        assert!((split.threshold - 0.5).abs() < 1e-12);
        assert_eq!(split.left, vec![1, 3, 5]);
        assert_eq!(split.right, vec![4, 2, 0]);
        assert!((split.gain - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_on_row_subset() {
        let x: Vec<Vec<f64>> = (0..8).map(|i| vec![(8 - i) as f64]).collect();
        let y: Vec<f64> = (0..8).map(|i| if i % 2 == 0 { 0.0 } else { 4.0 }).collect();

        // only the odd rows plus row 0: one low target at the largest value
        let split = best_split(&x, &y, &[1, 3, 5, 7, 0], 1).unwrap();

        assert_eq!(split.left, vec![7, 5, 3, 1]);
        assert_eq!(split.right, vec![0]);
    }
}
