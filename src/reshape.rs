//! Sample alignment and the tidy long-form table.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::{PipelineError, Result};
use crate::groups::{GroupAssignment, SampleId, Treatment};
use crate::ingest::{AbundanceMatrix, SampleRecord, Sex};

/// One (protein, sample) observation with its covariates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TidyRow {
    pub protein: String,
    pub sample: String,
    pub subject: String,
    pub replicate: Option<u32>,
    pub sex: Sex,
    pub treatment: Treatment,
    pub response: Option<f64>,
}

/// Covariates of one abundance sample row.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleCovariates {
    pub sample: String,
    pub subject: String,
    pub replicate: Option<u32>,
    pub sex: Sex,
    pub treatment: Treatment,
    pub acquisition_date: Option<NaiveDate>,
}

/// Derive covariates for every sample row of `matrix`.
pub fn sample_covariates(
    matrix: &AbundanceMatrix,
    groups: &GroupAssignment,
    records: &[SampleRecord],
) -> Vec<SampleCovariates> {
    let by_subject: HashMap<&str, &SampleRecord> =
        records.iter().map(|r| (r.subject.as_str(), r)).collect();

    matrix
        .samples
        .iter()
        .map(|sample| {
            let id = SampleId::parse(sample, groups.delimiter());
            let record = by_subject.get(id.subject.as_str());
            SampleCovariates {
                sample: sample.clone(),
                treatment: groups.assign_subject(&id.subject),
                sex: record.map(|r| r.sex).unwrap_or(Sex::Unknown),
                acquisition_date: record.and_then(|r| r.acquisition_date),
                replicate: id.replicate,
                subject: id.subject,
            }
        })
        .collect()
}

/// Restrict the abundance samples to included clinical subjects and the
/// clinical records to subjects with proteomics data.
pub fn align_samples(
    matrix: &AbundanceMatrix,
    records: &[SampleRecord],
    delimiter: &str,
) -> Result<(AbundanceMatrix, Vec<SampleRecord>)> {
    let included: HashSet<&str> = records.iter().map(|r| r.subject.as_str()).collect();
    let aligned = matrix.retain_samples(|s| included.contains(SampleId::parse(s, delimiter).subject.as_str()));

    let measured: HashSet<String> = aligned
        .samples
        .iter()
        .map(|s| SampleId::parse(s, delimiter).subject)
        .collect();
    let kept: Vec<SampleRecord> = records
        .iter()
        .filter(|r| measured.contains(&r.subject))
        .cloned()
        .collect();

    let dropped = matrix.n_samples() - aligned.n_samples();
    if dropped > 0 {
        log::info!(
            "Dropped {} abundance samples without an included clinical record",
            dropped
        );
    }

    if aligned.n_samples() == 0 {
        return Err(PipelineError::EmptyResultSet(
            "no abundance sample matches an included clinical subject".to_string(),
        ));
    }
    Ok((aligned, kept))
}

/// Warn where the workbook's group label disagrees with the configured lists.
pub fn check_recorded_groups(groups: &GroupAssignment, records: &[SampleRecord]) -> usize {
    let mut mismatches = 0;
    for record in records {
        if let Some(recorded) = record.recorded_group {
            let assigned = groups.assign_subject(&record.subject);
            if recorded != assigned {
                log::warn!(
                    "Subject {} is recorded as {} but assigned {}",
                    record.subject,
                    recorded,
                    assigned
                );
                mismatches += 1;
            }
        }
    }
    mismatches
}

/// Pivot the samples x proteins matrix into one row per (protein, sample).
pub fn to_tidy(matrix: &AbundanceMatrix, covariates: &[SampleCovariates]) -> Vec<TidyRow> {
    let mut rows = Vec::with_capacity(matrix.n_samples() * matrix.n_proteins());
    for (p, protein) in matrix.proteins.iter().enumerate() {
        for (s, cov) in covariates.iter().enumerate() {
            rows.push(TidyRow {
                protein: protein.clone(),
                sample: cov.sample.clone(),
                subject: cov.subject.clone(),
                replicate: cov.replicate,
                sex: cov.sex,
                treatment: cov.treatment,
                response: matrix.get(s, p),
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GroupsConfig;

    fn matrix() -> AbundanceMatrix {
        AbundanceMatrix::new(
            vec![
                "2343_sample 1".into(),
                "2343_sample 2".into(),
                "9999_sample 1".into(),
                "5555_sample 1".into(),
            ],
            vec!["P1".into(), "P2".into()],
            vec![
                vec![Some(1.0), Some(2.0)],
                vec![Some(1.5), None],
                vec![Some(3.0), Some(4.0)],
                vec![Some(5.0), Some(6.0)],
            ],
        )
        .unwrap()
    }

    fn records() -> Vec<SampleRecord> {
        ["2343", "9999", "7777"]
            .iter()
            .map(|s| SampleRecord {
                subject: s.to_string(),
                recorded_group: None,
                sex: if *s == "2343" { Sex::Female } else { Sex::Male },
                acquisition_date: None,
            })
            .collect()
    }

    fn groups() -> GroupAssignment {
        GroupAssignment::new(
            &GroupsConfig {
                sc_subjects: vec!["2343".into()],
                pbs_subjects: vec![],
            },
            "_",
        )
        .unwrap()
    }

    #[test]
    fn aligns_samples_with_clinical_records() {
        let (aligned, kept) = align_samples(&matrix(), &records(), "_").unwrap();
        assert_eq!(aligned.n_samples(), 3);
        assert!(!aligned.samples.iter().any(|s| s.starts_with("5555")));
        let kept: Vec<_> = kept.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(kept, vec!["2343", "9999"]);
    }

    #[test]
    fn tidy_rows_carry_covariates() {
        let (aligned, kept) = align_samples(&matrix(), &records(), "_").unwrap();
        let covariates = sample_covariates(&aligned, &groups(), &kept);
        let tidy = to_tidy(&aligned, &covariates);
        assert_eq!(tidy.len(), 6);

        let row = tidy
            .iter()
            .find(|r| r.protein == "P2" && r.sample == "2343_sample 2")
            .unwrap();
        assert_eq!(row.replicate, Some(2));
        assert_eq!(row.treatment, Treatment::HiHthSc);
        assert_eq!(row.sex, Sex::Female);
        assert_eq!(row.response, None);

        let control = tidy.iter().find(|r| r.subject == "9999").unwrap();
        assert_eq!(control.treatment, Treatment::Control);
    }

    #[test]
    fn reports_recorded_group_mismatches() {
        let mut recs = records();
        recs[0].recorded_group = Some(Treatment::HiHthPbs);
        recs[1].recorded_group = Some(Treatment::Control);
        assert_eq!(check_recorded_groups(&groups(), &recs), 1);
    }

    #[test]
    fn no_overlap_is_empty_result() {
        let recs = vec![SampleRecord {
            subject: "0000".into(),
            recorded_group: None,
            sex: Sex::Unknown,
            acquisition_date: None,
        }];
        let err = align_samples(&matrix(), &recs, "_").unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResultSet(_)));
    }
}
