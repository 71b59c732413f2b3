//! Per-protein group comparison: omnibus one-way ANOVA with a global
//! Benjamini–Hochberg correction, Tukey HSD per pairwise contrast, and
//! log2 fold changes of group means.
//!
//! The FDR-adjusted omnibus p-value is reported next to the per-contrast
//! Tukey p-values but never gates them: per-contrast selection uses the
//! unadjusted Tukey p-value.

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::groups::Factor;
use crate::ingest::AbundanceMatrix;
use crate::reshape::SampleCovariates;
use crate::stats::describe::mean;
use crate::stats::{benjamini_hochberg, one_way, tukey_hsd};

/// A pairwise contrast `later - earlier` between two factor levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contrast {
    /// Level index of the reference (subtracted) level
    pub reference: usize,
    /// Level index of the compared level
    pub level: usize,
    pub name: String,
}

/// All pairs of levels in factor order, named like `HI+HTH+SC-CONTROL`.
pub fn contrasts(levels: &[&str]) -> Vec<Contrast> {
    let mut out = Vec::new();
    for reference in 0..levels.len() {
        for level in reference + 1..levels.len() {
            out.push(Contrast {
                reference,
                level,
                name: format!("{}-{}", levels[level], levels[reference]),
            });
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub protein: String,
    pub f_statistic: f64,
    pub omnibus_p: f64,
    /// BH-adjusted omnibus p-value across every tested protein
    pub omnibus_fdr: f64,
    /// Unadjusted-for-FDR Tukey p-value per contrast; `None` when a level
    /// has no observation for this protein
    pub tukey_p: Vec<Option<f64>>,
    /// log2(mean(level) / mean(reference)) per contrast
    pub log2_fc: Vec<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct ComparisonTable {
    pub factor: Factor,
    pub contrasts: Vec<Contrast>,
    pub rows: Vec<ComparisonRow>,
    /// Proteins that could not be tested (fewer than two levels observed or
    /// no residual degrees of freedom)
    pub skipped: Vec<String>,
}

impl ComparisonTable {
    pub fn contrast_index(&self, name: &str) -> Option<usize> {
        self.contrasts.iter().position(|c| c.name == name)
    }

    /// Proteins whose Tukey p-value for `contrast` is at most `alpha`.
    pub fn significant(&self, contrast: usize, alpha: f64) -> Vec<&ComparisonRow> {
        self.rows
            .iter()
            .filter(|r| r.tukey_p[contrast].is_some_and(|p| p <= alpha))
            .collect()
    }

    /// Volcano coordinates for one contrast.
    pub fn volcano(&self, contrast: usize, alpha: f64, log2_cutoff: f64) -> Vec<VolcanoPoint> {
        self.rows
            .iter()
            .filter_map(|r| {
                let p = r.tukey_p[contrast]?;
                let fc = r.log2_fc[contrast]?;
                let class = if p <= alpha && fc > log2_cutoff {
                    Regulation::Up
                } else if p <= alpha && fc < -log2_cutoff {
                    Regulation::Down
                } else {
                    Regulation::NotSignificant
                };
                Some(VolcanoPoint {
                    protein: r.protein.clone(),
                    log2_fc: fc,
                    neg_log10_p: -p.max(f64::MIN_POSITIVE).log10(),
                    p_value: p,
                    regulation: class,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Regulation {
    Up,
    Down,
    NotSignificant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolcanoPoint {
    pub protein: String,
    pub log2_fc: f64,
    pub p_value: f64,
    pub neg_log10_p: f64,
    pub regulation: Regulation,
}

/// Run the per-protein comparison of `matrix` rows grouped by `factor`.
///
/// `covariates` must align with the sample rows of `matrix`.
pub fn compare_groups(
    matrix: &AbundanceMatrix,
    covariates: &[SampleCovariates],
    factor: Factor,
    progress: &ProgressBar,
) -> Result<ComparisonTable> {
    if covariates.len() != matrix.n_samples() {
        return Err(PipelineError::InvalidInput(format!(
            "{} covariate rows for {} samples",
            covariates.len(),
            matrix.n_samples()
        )));
    }

    let levels = factor.levels();
    let level_of: Vec<usize> = covariates
        .iter()
        .map(|c| {
            let label = factor.level(c.treatment);
            levels.iter().position(|l| *l == label).unwrap_or(0)
        })
        .collect();
    let contrasts = contrasts(&levels);

    progress.set_length(matrix.n_proteins() as u64);
    let tested: Vec<std::result::Result<ComparisonRow, String>> = (0..matrix.n_proteins())
        .into_par_iter()
        .map(|p| {
            let row = compare_protein(matrix, p, &level_of, levels.len(), &contrasts);
            progress.inc(1);
            row.ok_or_else(|| matrix.proteins[p].clone())
        })
        .collect();

    let mut rows = Vec::with_capacity(tested.len());
    let mut skipped = Vec::new();
    for outcome in tested {
        match outcome {
            Ok(row) => rows.push(row),
            Err(protein) => skipped.push(protein),
        }
    }

    if rows.is_empty() {
        return Err(PipelineError::EmptyResultSet(format!(
            "none of {} proteins could be tested across {:?} levels",
            matrix.n_proteins(),
            levels
        )));
    }

    let raw: Vec<f64> = rows.iter().map(|r| r.omnibus_p).collect();
    for (row, fdr) in rows.iter_mut().zip(benjamini_hochberg(&raw)) {
        row.omnibus_fdr = fdr;
    }

    log::info!(
        "Compared {} proteins across {} levels ({} skipped)",
        rows.len(),
        levels.len(),
        skipped.len()
    );

    Ok(ComparisonTable {
        factor,
        contrasts,
        rows,
        skipped,
    })
}

fn compare_protein(
    matrix: &AbundanceMatrix,
    protein: usize,
    level_of: &[usize],
    n_levels: usize,
    contrasts: &[Contrast],
) -> Option<ComparisonRow> {
    let mut groups: Vec<Vec<f64>> = vec![Vec::new(); n_levels];
    for (sample, &level) in level_of.iter().enumerate() {
        if let Some(v) = matrix.get(sample, protein) {
            groups[level].push(v);
        }
    }

    let fit = one_way(&groups)?;
    let pairwise = tukey_hsd(&groups, fit.mse, fit.df_within);

    let mut tukey_p = vec![None; contrasts.len()];
    let mut log2_fc = vec![None; contrasts.len()];
    for (slot, contrast) in contrasts.iter().enumerate() {
        tukey_p[slot] = pairwise
            .iter()
            .find(|t| t.a == contrast.reference && t.b == contrast.level)
            .map(|t| t.p_adj);

        let (ref_values, values) = (&groups[contrast.reference], &groups[contrast.level]);
        if !ref_values.is_empty() && !values.is_empty() {
            let (m_ref, m) = (mean(ref_values), mean(values));
            if m_ref > 0.0 && m > 0.0 {
                log2_fc[slot] = Some((m / m_ref).log2());
            }
        }
    }

    Some(ComparisonRow {
        protein: matrix.proteins[protein].clone(),
        f_statistic: fit.f_statistic,
        omnibus_p: fit.p_value,
        omnibus_fdr: f64::NAN,
        tukey_p,
        log2_fc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::Treatment;
    use crate::ingest::Sex;

    fn covariate(sample: &str, treatment: Treatment) -> SampleCovariates {
        SampleCovariates {
            sample: sample.to_string(),
            subject: sample.to_string(),
            replicate: None,
            sex: Sex::Unknown,
            treatment,
            acquisition_date: None,
        }
    }

    /// Five samples per arm; SHIFT is raised by about 5 SD in the SC arm.
    fn fixture() -> (AbundanceMatrix, Vec<SampleCovariates>) {
        let control = [10.0, 11.0, 9.0, 10.5, 9.5];
        let pbs = [10.0, 9.0, 11.0, 10.2, 9.8];
        let sc = [14.0, 15.0, 13.0, 14.5, 13.5];
        let flat = [5.0, 5.5, 4.5, 5.2, 4.8];

        let mut samples = Vec::new();
        let mut covariates = Vec::new();
        let mut values = Vec::new();
        for (arm, treatment, shift) in [
            ("c", Treatment::Control, control),
            ("p", Treatment::HiHthPbs, pbs),
            ("s", Treatment::HiHthSc, sc),
        ] {
            for i in 0..5 {
                let name = format!("{arm}{i}");
                covariates.push(covariate(&name, treatment));
                samples.push(name);
                values.push(vec![Some(shift[i]), Some(flat[i]), None]);
            }
        }
        let matrix = AbundanceMatrix::new(
            samples,
            vec!["SHIFT".into(), "FLAT".into(), "EMPTY".into()],
            values,
        )
        .unwrap();
        (matrix, covariates)
    }

    #[test]
    fn names_contrasts_in_level_order() {
        let names: Vec<String> = contrasts(&Factor::Group.levels())
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(
            names,
            vec!["HI+HTH+PBS-CONTROL", "HI+HTH+SC-CONTROL", "HI+HTH+SC-HI+HTH+PBS"]
        );
    }

    #[test]
    fn detects_the_shifted_arm() {
        let (matrix, covariates) = fixture();
        let table =
            compare_groups(&matrix, &covariates, Factor::Group, &ProgressBar::hidden()).unwrap();

        assert_eq!(table.skipped, vec!["EMPTY"]);
        let shift = &table.rows[0];
        assert_eq!(shift.protein, "SHIFT");
        assert!(shift.omnibus_p < 0.001);
        assert!(shift.omnibus_fdr >= shift.omnibus_p);

        let pbs_ctrl = table.contrast_index("HI+HTH+PBS-CONTROL").unwrap();
        let sc_ctrl = table.contrast_index("HI+HTH+SC-CONTROL").unwrap();
        let sc_pbs = table.contrast_index("HI+HTH+SC-HI+HTH+PBS").unwrap();
        assert!(shift.tukey_p[pbs_ctrl].unwrap() > 0.05);
        assert!(shift.tukey_p[sc_ctrl].unwrap() < 0.05);
        assert!(shift.tukey_p[sc_pbs].unwrap() < 0.05);
        assert!(shift.log2_fc[sc_ctrl].unwrap() > 0.0);

        let hits: Vec<_> = table
            .significant(sc_ctrl, 0.05)
            .into_iter()
            .map(|r| r.protein.as_str())
            .collect();
        assert_eq!(hits, vec!["SHIFT"]);
        assert!(table.significant(pbs_ctrl, 0.05).is_empty());
    }

    #[test]
    fn injury_factor_has_one_contrast() {
        let (matrix, covariates) = fixture();
        let table =
            compare_groups(&matrix, &covariates, Factor::Injury, &ProgressBar::hidden()).unwrap();
        assert_eq!(table.contrasts.len(), 1);
        assert_eq!(table.contrasts[0].name, "HI-CONTROL");
        assert!(table.rows.iter().all(|r| r.tukey_p[0].is_some()));
    }

    #[test]
    fn volcano_classifies_direction() {
        let (matrix, covariates) = fixture();
        let table =
            compare_groups(&matrix, &covariates, Factor::Group, &ProgressBar::hidden()).unwrap();
        let sc_ctrl = table.contrast_index("HI+HTH+SC-CONTROL").unwrap();
        let points = table.volcano(sc_ctrl, 0.05, 0.1);
        let shift = points.iter().find(|p| p.protein == "SHIFT").unwrap();
        assert_eq!(shift.regulation, Regulation::Up);
        assert!(shift.neg_log10_p > 1.3);
        let flat = points.iter().find(|p| p.protein == "FLAT").unwrap();
        assert_eq!(flat.regulation, Regulation::NotSignificant);
    }

    #[test]
    fn nothing_testable_is_empty_result() {
        let (matrix, covariates) = fixture();
        let empty_only = matrix.select_proteins(&[2]);
        let err = compare_groups(&empty_only, &covariates, Factor::Group, &ProgressBar::hidden())
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResultSet(_)));
    }
}
