//! The two missing-data policies.
//!
//! They answer different questions and are never substituted for one
//! another:
//!
//! - [`complete_case_columns`] feeds multivariate work (ordination): a
//!   protein is kept only if it was measured in every sample.
//! - [`collapse_replicates`] builds the per-subject mean table: a value
//!   missing in exactly one replicate is resolved by the remaining
//!   replicates. [`check_mean_block`] holds an exported mean block to the
//!   same rule.

use std::collections::HashMap;

use crate::error::{PipelineError, Result};
use crate::groups::SampleId;
use crate::ingest::AbundanceMatrix;

/// Drop every protein column with at least one missing value.
pub fn complete_case_columns(matrix: &AbundanceMatrix) -> Result<AbundanceMatrix> {
    let keep: Vec<usize> = (0..matrix.n_proteins())
        .filter(|&p| (0..matrix.n_samples()).all(|s| matrix.get(s, p).is_some()))
        .collect();

    log::info!(
        "Complete-case filter: kept {} of {} proteins",
        keep.len(),
        matrix.n_proteins()
    );

    if keep.is_empty() {
        return Err(PipelineError::EmptyResultSet(format!(
            "every one of {} proteins has a missing value",
            matrix.n_proteins()
        )));
    }
    Ok(matrix.select_proteins(&keep))
}

/// Outcome of one subject x protein cell under the replicate policy.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Collapsed {
    Complete(f64),
    /// Exactly one replicate was missing; value from the others
    Resolved(f64),
    AllMissing,
}

fn collapse_cell(values: &[Option<f64>]) -> Option<Collapsed> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    let missing = values.len() - present.len();
    let mean = || present.iter().sum::<f64>() / present.len() as f64;
    match (present.len(), missing) {
        (0, _) => Some(Collapsed::AllMissing),
        (_, 0) => Some(Collapsed::Complete(mean())),
        (_, 1) => Some(Collapsed::Resolved(mean())),
        _ => None,
    }
}

/// Rows of `matrix` grouped by subject, in order of first appearance.
fn rows_by_subject(matrix: &AbundanceMatrix, delimiter: &str) -> Vec<(String, Vec<usize>)> {
    let mut order: Vec<(String, Vec<usize>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (row, sample) in matrix.samples.iter().enumerate() {
        let subject = SampleId::parse(sample, delimiter).subject;
        match index.get(&subject) {
            Some(&i) => order[i].1.push(row),
            None => {
                index.insert(subject.clone(), order.len());
                order.push((subject, vec![row]));
            }
        }
    }
    order
}

/// Average replicate rows into one row per subject.
///
/// A value missing in exactly one replicate takes the mean of the remaining
/// replicates; all replicates missing stays missing. Two or more missing
/// with at least one present is not covered by the policy and fails with
/// `MissingDataPolicyViolation`. Rows are named `<subject><delim><mean_marker>`.
pub fn collapse_replicates(
    replicates: &AbundanceMatrix,
    delimiter: &str,
    mean_marker: &str,
) -> Result<AbundanceMatrix> {
    let subjects = rows_by_subject(replicates, delimiter);
    let mut samples = Vec::with_capacity(subjects.len());
    let mut values = Vec::with_capacity(subjects.len());
    let mut resolved = 0usize;

    for (subject, rows) in &subjects {
        let mut out = Vec::with_capacity(replicates.n_proteins());
        for p in 0..replicates.n_proteins() {
            let cell: Vec<Option<f64>> = rows.iter().map(|&r| replicates.get(r, p)).collect();
            let value = match collapse_cell(&cell) {
                Some(Collapsed::Complete(v)) => Some(v),
                Some(Collapsed::Resolved(v)) => {
                    resolved += 1;
                    Some(v)
                }
                Some(Collapsed::AllMissing) => None,
                None => {
                    return Err(PipelineError::MissingDataPolicyViolation(format!(
                        "{} of {} replicates missing for subject {} protein {}",
                        cell.iter().filter(|v| v.is_none()).count(),
                        cell.len(),
                        subject,
                        replicates.proteins[p]
                    )))
                }
            };
            out.push(value);
        }
        samples.push(format!("{subject}{delimiter}{mean_marker}"));
        values.push(out);
    }

    log::info!(
        "Collapsed {} replicate rows into {} subjects ({} single-replicate cells resolved)",
        replicates.n_samples(),
        samples.len(),
        resolved
    );
    AbundanceMatrix::new(samples, replicates.proteins.clone(), values)
}

/// Validate an exported mean block against the replicate policy.
///
/// Each cell is classified exactly as [`collapse_replicates`] would. Returns
/// the number of cells resolved from the remaining replicates. Two or more
/// missing replicates, a mean present while every replicate is missing, or a
/// mean absent while some replicate is present is a
/// `MissingDataPolicyViolation`.
pub fn check_mean_block(
    replicates: &AbundanceMatrix,
    means: &AbundanceMatrix,
    delimiter: &str,
) -> Result<usize> {
    if replicates.proteins != means.proteins {
        return Err(PipelineError::InvalidInput(
            "replicate and mean blocks list different proteins".to_string(),
        ));
    }

    let by_subject: HashMap<String, Vec<usize>> =
        rows_by_subject(replicates, delimiter).into_iter().collect();
    let mut resolved = 0usize;

    for (m, sample) in means.samples.iter().enumerate() {
        let subject = SampleId::parse(sample, delimiter).subject;
        let Some(rows) = by_subject.get(&subject) else {
            log::warn!("Mean column {} has no replicate columns; not checked", sample);
            continue;
        };

        for p in 0..means.n_proteins() {
            let cell: Vec<Option<f64>> = rows.iter().map(|&r| replicates.get(r, p)).collect();
            let violation = |what: String| {
                PipelineError::MissingDataPolicyViolation(format!(
                    "{} for subject {} protein {}",
                    what, subject, means.proteins[p]
                ))
            };
            match (collapse_cell(&cell), means.get(m, p)) {
                (None, _) => {
                    return Err(violation(format!(
                        "{} of {} replicates missing",
                        cell.iter().filter(|v| v.is_none()).count(),
                        cell.len()
                    )))
                }
                (Some(Collapsed::AllMissing), Some(_)) => {
                    return Err(violation(
                        "mean present but every replicate missing".to_string(),
                    ))
                }
                (Some(Collapsed::Complete(_) | Collapsed::Resolved(_)), None) => {
                    return Err(violation("mean missing although replicates present".to_string()))
                }
                (Some(Collapsed::Resolved(_)), Some(_)) => resolved += 1,
                (Some(Collapsed::Complete(_)), Some(_)) | (Some(Collapsed::AllMissing), None) => {}
            }
        }
    }

    Ok(resolved)
}
