//! Principal component analysis on a complete samples x proteins matrix.
//!
//! Columns are centered and scaled to unit variance first; columns with no
//! variance cannot be scaled and are excluded (and reported). Component
//! signs are normalized so the largest-magnitude loading is positive, which
//! makes output stable across runs but carries no meaning.

use nalgebra::{DMatrix, DVector};

use crate::error::{PipelineError, Result};
use crate::ingest::AbundanceMatrix;
use crate::stats::describe::{mean, stddev};

const POWER_MAX_ITER: usize = 500;
const POWER_TOL: f64 = 1e-10;
/// Residual singular value, relative to the scaled matrix norm, below which
/// no further sparse component is extracted.
const EXHAUSTED_TOL: f64 = 1e-8;

/// A centered, unit-variance matrix ready for decomposition.
#[derive(Debug, Clone)]
pub struct Scaled {
    pub samples: Vec<String>,
    /// Proteins kept, in column order
    pub proteins: Vec<String>,
    /// Proteins excluded for zero variance
    pub dropped: Vec<String>,
    pub matrix: DMatrix<f64>,
}

/// Subtract each column mean and divide by each column standard deviation.
pub fn center_scale(matrix: &AbundanceMatrix) -> Result<Scaled> {
    let n = matrix.n_samples();
    if n < 2 {
        return Err(PipelineError::InvalidInput(format!(
            "ordination needs at least two samples, got {}",
            n
        )));
    }

    let mut proteins = Vec::new();
    let mut dropped = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();

    for p in 0..matrix.n_proteins() {
        let column: Option<Vec<f64>> = matrix.column(p).into_iter().collect();
        let Some(column) = column else {
            return Err(PipelineError::MissingDataPolicyViolation(format!(
                "protein {} has missing values; ordination takes a complete-case matrix",
                matrix.proteins[p]
            )));
        };

        let m = mean(&column);
        let sd = stddev(&column);
        if !(sd > f64::EPSILON * m.abs().max(1.0)) {
            dropped.push(matrix.proteins[p].clone());
            continue;
        }
        proteins.push(matrix.proteins[p].clone());
        columns.push(column.iter().map(|x| (x - m) / sd).collect());
    }

    if !dropped.is_empty() {
        log::warn!(
            "Excluded {} zero-variance proteins from ordination",
            dropped.len()
        );
    }
    if columns.is_empty() {
        return Err(PipelineError::EmptyResultSet(
            "no protein with non-zero variance left for ordination".to_string(),
        ));
    }

    let flat: Vec<f64> = columns.into_iter().flatten().collect();
    Ok(Scaled {
        samples: matrix.samples.clone(),
        proteins,
        dropped,
        matrix: DMatrix::from_column_slice(n, flat.len() / n, &flat),
    })
}

/// Full PCA: every component of the scaled matrix.
#[derive(Debug, Clone)]
pub struct Pca {
    /// Standard deviation of each component
    pub sdev: Vec<f64>,
    pub variance_ratio: Vec<f64>,
    pub cumulative_ratio: Vec<f64>,
    /// proteins x components
    pub loadings: DMatrix<f64>,
    /// samples x components
    pub scores: DMatrix<f64>,
}

impl Pca {
    pub fn n_components(&self) -> usize {
        self.sdev.len()
    }

    /// Keep the leading `k` components. Variance ratios stay relative to the
    /// full decomposition.
    pub fn truncate(mut self, k: usize) -> Self {
        let k = k.min(self.n_components());
        self.sdev.truncate(k);
        self.variance_ratio.truncate(k);
        self.cumulative_ratio.truncate(k);
        self.loadings = self.loadings.columns(0, k).into_owned();
        self.scores = self.scores.columns(0, k).into_owned();
        self
    }
}

pub fn pca(scaled: &Scaled) -> Result<Pca> {
    let x = &scaled.matrix;
    let n = x.nrows();
    let svd = x.clone().svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(PipelineError::InvalidInput(
            "singular value decomposition did not converge".to_string(),
        ));
    };
    let singular = svd.singular_values;

    let mut order: Vec<usize> = (0..singular.len()).collect();
    order.sort_by(|&a, &b| singular[b].total_cmp(&singular[a]));

    let k = order.len();
    let mut loadings: DMatrix<f64> = DMatrix::zeros(x.ncols(), k);
    let mut scores: DMatrix<f64> = DMatrix::zeros(n, k);
    let mut sdev = Vec::with_capacity(k);

    for (c, &i) in order.iter().enumerate() {
        let mut v: DVector<f64> = v_t.row(i).transpose();
        let mut s: DVector<f64> = u.column(i) * singular[i];
        if sign_flip(&v) {
            v = -v;
            s = -s;
        }
        loadings.set_column(c, &v);
        scores.set_column(c, &s);
        sdev.push(singular[i] / ((n - 1) as f64).sqrt());
    }

    let total: f64 = sdev.iter().map(|s| s * s).sum();
    let variance_ratio: Vec<f64> = sdev.iter().map(|s| s * s / total).collect();
    let cumulative_ratio = variance_ratio
        .iter()
        .scan(0.0, |acc, r| {
            *acc += r;
            Some(*acc)
        })
        .collect();

    Ok(Pca {
        sdev,
        variance_ratio,
        cumulative_ratio,
        loadings,
        scores,
    })
}

/// Sparse PCA with a fixed number of non-zero loadings per component.
#[derive(Debug, Clone)]
pub struct SparsePca {
    pub cardinality: usize,
    /// proteins x components; each column has at most `cardinality` non-zeros
    pub loadings: DMatrix<f64>,
    /// samples x components, projections of the scaled matrix
    pub scores: DMatrix<f64>,
    /// Variance of each component's scores over the total variance
    pub variance_ratio: Vec<f64>,
}

/// Truncated power iteration with projection deflation.
///
/// Each component starts from the leading right singular vector of the
/// deflated matrix, then alternates `v <- X'Xv`, keep the `cardinality`
/// largest magnitudes, renormalize, until the vector stops moving.
pub fn sparse_pca(scaled: &Scaled, components: usize, cardinality: usize) -> Result<SparsePca> {
    let x0 = &scaled.matrix;
    let (n, p) = (x0.nrows(), x0.ncols());
    if cardinality == 0 {
        return Err(PipelineError::InvalidInput(
            "sparse cardinality must be at least 1".to_string(),
        ));
    }
    let card = cardinality.min(p);
    let comps = components.min(n.min(p));
    if comps == 0 {
        return Err(PipelineError::EmptyResultSet(
            "no sparse component requested".to_string(),
        ));
    }

    let total = x0.iter().map(|v| v * v).sum::<f64>();
    let mut x = x0.clone();
    let mut loadings: DMatrix<f64> = DMatrix::zeros(p, comps);
    let mut scores: DMatrix<f64> = DMatrix::zeros(n, comps);
    let mut variance_ratio = Vec::with_capacity(comps);

    for c in 0..comps {
        let svd = x.clone().svd(false, true);
        let Some(v_t) = svd.v_t else { break };
        let lead = (0..svd.singular_values.len())
            .max_by(|&a, &b| svd.singular_values[a].total_cmp(&svd.singular_values[b]));
        let Some(lead) = lead else { break };
        if svd.singular_values[lead] <= EXHAUSTED_TOL * total.sqrt() {
            log::debug!("Sparse PCA stopped at component {}: matrix exhausted", c + 1);
            break;
        }

        let mut v = truncate(&v_t.row(lead).transpose(), card);
        for _ in 0..POWER_MAX_ITER {
            let w = truncate(&(x.transpose() * (&x * &v)), card);
            let moved = (&w - &v).norm();
            v = w;
            if moved < POWER_TOL {
                break;
            }
        }
        if sign_flip(&v) {
            v = -v;
        }

        let t = x0 * &v;
        variance_ratio.push(t.norm_squared() / total);
        scores.set_column(c, &t);
        loadings.set_column(c, &v);

        // Projection deflation: remove the captured direction.
        let xv = &x * &v;
        x -= xv * v.transpose();
    }

    let k = variance_ratio.len();
    if k == 0 {
        return Err(PipelineError::EmptyResultSet(
            "scaled matrix has no variance left for a sparse component".to_string(),
        ));
    }
    if k < comps {
        log::info!("Sparse PCA: {} of {} components extracted", k, comps);
    }

    Ok(SparsePca {
        cardinality: card,
        loadings: loadings.columns(0, k).into_owned(),
        scores: scores.columns(0, k).into_owned(),
        variance_ratio,
    })
}

/// Keep the `k` largest-magnitude entries and renormalize to unit length.
fn truncate(v: &DVector<f64>, k: usize) -> DVector<f64> {
    let mut idx: Vec<usize> = (0..v.len()).collect();
    idx.sort_by(|&a, &b| v[b].abs().total_cmp(&v[a].abs()).then(a.cmp(&b)));
    let mut out = DVector::zeros(v.len());
    for &i in idx.iter().take(k) {
        out[i] = v[i];
    }
    let norm = out.norm();
    if norm > 0.0 {
        out /= norm;
    }
    out
}

/// True when the largest-magnitude entry is negative.
fn sign_flip(v: &DVector<f64>) -> bool {
    v.iter()
        .copied()
        .max_by(|a, b| a.abs().total_cmp(&b.abs()))
        .is_some_and(|x| x < 0.0)
}
