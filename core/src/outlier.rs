//! Unsupervised outlier scoring.
//!
//! The anomaly detector depends only on the OutlierModel trait. The
//! shipped model is an isolation forest:
//!
//!   score(x)    = −2^(−E[h(x)] / c(ψ))        (lower = more anomalous)
//!   offset      = contamination-quantile of the batch scores
//!   decision(x) = score(x) − offset           (< 0 ⇒ outlier)
//!
//! where h(x) is the isolation depth in one tree (plus c(leaf size) for
//! unfinished leaves), ψ the subsample size, and c(n) the mean path
//! length of an unsuccessful BST search over n points.
//!
//! RULE: fitting is batch-local. No model state survives between calls.

use crate::{
    error::{LeakageError, LeakageResult},
    rng::{RngBank, StreamRng, StreamSlot},
};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Per-row model output, aligned with the input matrix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutlierScores {
    pub is_outlier: Vec<bool>,
    /// Continuous decision score; negative values are outliers.
    pub scores:     Vec<f64>,
}

/// Anything that can fit a batch and score every row of it.
pub trait OutlierModel: Send + Sync {
    fn name(&self) -> &'static str;

    fn fit_and_score(&self, matrix: &[Vec<f64>]) -> LeakageResult<OutlierScores>;
}

// ── Scaling ──────────────────────────────────────────────────────────────────

/// Column-wise standardisation to zero mean and unit (population) variance.
/// Constant columns are centred but not scaled.
pub fn standardize(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(width) = matrix.first().map(Vec::len) else {
        return Vec::new();
    };
    let n = matrix.len() as f64;
    let mut means = vec![0.0; width];
    let mut scales = vec![0.0; width];
    for col in 0..width {
        let mean = matrix.iter().map(|row| row[col]).sum::<f64>() / n;
        let var = matrix.iter().map(|row| (row[col] - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();
        means[col] = mean;
        scales[col] = if std > 0.0 { std } else { 1.0 };
    }
    matrix
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(col, v)| (v - means[col]) / scales[col])
                .collect()
        })
        .collect()
}

/// Linear-interpolated percentile, `q` in [0, 100]. `values` must be non-empty.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

fn check_matrix(matrix: &[Vec<f64>]) -> LeakageResult<usize> {
    let width = matrix.first().map_or(0, Vec::len);
    for (i, row) in matrix.iter().enumerate() {
        if row.len() != width {
            return Err(LeakageError::Model(format!(
                "row {i} has {} columns, expected {width}",
                row.len()
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(LeakageError::Model(format!("row {i} has a non-finite value")));
        }
    }
    Ok(width)
}

// ── Isolation forest ─────────────────────────────────────────────────────────

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature:   usize,
        threshold: f64,
        left:      Box<Node>,
        right:     Box<Node>,
    },
}

impl Node {
    fn grow(
        data: &[Vec<f64>],
        rows: Vec<usize>,
        depth: usize,
        limit: usize,
        rng: &mut StreamRng,
    ) -> Node {
        if depth >= limit || rows.len() <= 1 {
            return Node::Leaf { size: rows.len() };
        }

        // Only features that still vary inside this node can split it.
        let width = data[rows[0]].len();
        let splittable: Vec<(usize, f64, f64)> = (0..width)
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
                    (lo.min(data[*r][f]), hi.max(data[*r][f]))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if splittable.is_empty() {
            return Node::Leaf { size: rows.len() };
        }

        let (feature, lo, hi) = *rng.pick(&splittable);
        let threshold = rng.uniform(lo, hi);
        let (left, right): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|r| data[*r][feature] < threshold);

        Node::Split {
            feature,
            threshold,
            left:  Box::new(Node::grow(data, left, depth + 1, limit, rng)),
            right: Box::new(Node::grow(data, right, depth + 1, limit, rng)),
        }
    }

    fn path_length(&self, x: &[f64]) -> f64 {
        let mut node = self;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split { feature, threshold, left, right } => {
                    node = if x[*feature] < *threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IsolationForest {
    pub n_trees:       usize,
    pub max_samples:   usize,
    pub contamination: f64,
    pub seed:          u64,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self { n_trees: 100, max_samples: 256, contamination: 0.1, seed: 42 }
    }
}

impl IsolationForest {
    /// Raw anomaly scores in [-1, 0); lower is more anomalous.
    pub fn score_samples(&self, matrix: &[Vec<f64>]) -> LeakageResult<Vec<f64>> {
        check_matrix(matrix)?;
        if matrix.is_empty() {
            return Ok(Vec::new());
        }

        let psi = self.max_samples.min(matrix.len()).max(1);
        let limit = (psi as f64).log2().ceil() as usize;
        let mut rng = RngBank::new(self.seed).for_stream(StreamSlot::OutlierModel);

        let trees: Vec<Node> = (0..self.n_trees.max(1))
            .map(|_| {
                let rows = rng.sample_indices(matrix.len(), psi);
                Node::grow(matrix, rows, 0, limit, &mut rng)
            })
            .collect();

        let norm = average_path_length(psi);
        Ok(matrix
            .iter()
            .map(|x| {
                let mean_depth =
                    trees.iter().map(|t| t.path_length(x)).sum::<f64>() / trees.len() as f64;
                if norm > 0.0 {
                    -(2f64.powf(-mean_depth / norm))
                } else {
                    -1.0
                }
            })
            .collect())
    }
}

impl OutlierModel for IsolationForest {
    fn name(&self) -> &'static str {
        "isolation_forest"
    }

    fn fit_and_score(&self, matrix: &[Vec<f64>]) -> LeakageResult<OutlierScores> {
        let raw = self.score_samples(matrix)?;
        if raw.is_empty() {
            return Ok(OutlierScores::default());
        }
        let offset = percentile(&raw, 100.0 * self.contamination);
        let scores: Vec<f64> = raw.iter().map(|s| s - offset).collect();
        let is_outlier = scores.iter().map(|s| *s < 0.0).collect();
        log::debug!(
            "{}: {} rows scored, offset {:.4}",
            self.name(),
            scores.len(),
            offset
        );
        Ok(OutlierScores { is_outlier, scores })
    }
}
