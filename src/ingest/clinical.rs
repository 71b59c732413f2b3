use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::config::ColumnConfig;
use crate::error::{PipelineError, Result};
use crate::groups::Treatment;
use crate::ingest::sheet::Sheet;

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y", "%Y/%m/%d", "%d-%m-%Y"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

impl Sex {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "m" | "male" => Sex::Male,
            "f" | "female" => Sex::Female,
            _ => Sex::Unknown,
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Unknown => "NA",
        };
        f.write_str(s)
    }
}

/// One subject of the clinical workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub subject: String,
    /// Group label as recorded in the workbook, if any
    pub recorded_group: Option<Treatment>,
    pub sex: Sex,
    pub acquisition_date: Option<NaiveDate>,
}

/// Parse the clinical table, keeping included rows and dropping `excluded`.
pub fn parse_clinical(
    sheet: &Sheet,
    columns: &ColumnConfig,
    excluded: Option<&str>,
) -> Result<Vec<SampleRecord>> {
    let subject_col = sheet.column_index(&columns.clinical_subject)?;
    let included_col = sheet.column_index(&columns.clinical_included)?;
    let group_col = optional_column(sheet, &columns.clinical_group);
    let sex_col = optional_column(sheet, &columns.clinical_sex);
    let date_col = optional_column(sheet, &columns.clinical_date);

    let included_values: HashSet<String> = columns
        .included_values
        .iter()
        .map(|v| v.trim().to_ascii_lowercase())
        .collect();

    let mut records = Vec::new();
    let mut seen = HashSet::new();
    let mut not_included = 0usize;

    for row in 0..sheet.len() {
        let Some(subject) = sheet.cell(row, subject_col) else {
            continue;
        };

        let flag = sheet
            .cell(row, included_col)
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_default();
        if !included_values.contains(&flag) {
            not_included += 1;
            continue;
        }

        if excluded.is_some_and(|ex| ex.trim() == subject) {
            log::info!("Excluding subject {} from the clinical table", subject);
            continue;
        }

        if !seen.insert(subject.to_string()) {
            return Err(PipelineError::InvalidInput(format!(
                "subject {} appears more than once in the clinical table",
                subject
            )));
        }

        let recorded_group = group_col
            .and_then(|c| sheet.cell(row, c))
            .and_then(|raw| {
                let parsed = Treatment::parse_label(raw);
                if parsed.is_none() {
                    log::warn!("Unrecognized group label '{}' for subject {}", raw, subject);
                }
                parsed
            });

        let sex = sex_col
            .and_then(|c| sheet.cell(row, c))
            .map(Sex::parse)
            .unwrap_or(Sex::Unknown);

        let acquisition_date = date_col.and_then(|c| sheet.cell(row, c)).and_then(|raw| {
            let parsed = parse_date(raw);
            if parsed.is_none() {
                log::warn!("Unparseable date '{}' for subject {}", raw, subject);
            }
            parsed
        });

        records.push(SampleRecord {
            subject: subject.to_string(),
            recorded_group,
            sex,
            acquisition_date,
        });
    }

    log::info!(
        "Clinical table: {} included subjects ({} rows not flagged as included)",
        records.len(),
        not_included
    );

    if records.is_empty() {
        return Err(PipelineError::EmptyResultSet(
            "no clinical rows remain after inclusion filtering".to_string(),
        ));
    }
    Ok(records)
}

fn optional_column(sheet: &Sheet, name: &str) -> Option<usize> {
    let col = sheet.find_column(name);
    if col.is_none() {
        log::warn!("Clinical column '{}' not found; treating as absent", name);
    }
    col
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // Workbook datetimes may carry a time part.
    let date_part = raw.split([' ', 'T']).next().unwrap_or(raw);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clinical_sheet() -> Sheet {
        let headers = ["Piglet", "Included", "Group", "Sex", "Date"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let row = |cells: [&str; 5]| -> Vec<Option<String>> {
            cells
                .iter()
                .map(|c| if c.is_empty() { None } else { Some(c.to_string()) })
                .collect()
        };
        Sheet::new(
            headers,
            vec![
                row(["2343", "Yes", "HI+HTH+SC", "M", "2019-03-04"]),
                row(["2401", "yes", "HI+HTH+PBS", "F", "05/03/2019"]),
                row(["2402", "No", "CONTROL", "F", "2019-03-06"]),
                row(["2410", "yes", "CONTROL", "", ""]),
            ],
        )
    }

    #[test]
    fn keeps_included_rows_and_drops_excluded_subject() {
        let records =
            parse_clinical(&clinical_sheet(), &ColumnConfig::default(), Some("2410")).unwrap();
        let subjects: Vec<_> = records.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(subjects, vec!["2343", "2401"]);
        assert_eq!(records[0].sex, Sex::Male);
        assert_eq!(records[1].recorded_group, Some(Treatment::HiHthPbs));
        assert_eq!(
            records[1].acquisition_date,
            NaiveDate::from_ymd_opt(2019, 3, 5)
        );
    }

    #[test]
    fn missing_optional_cells_are_unknown() {
        let records = parse_clinical(&clinical_sheet(), &ColumnConfig::default(), None).unwrap();
        let last = records.last().unwrap();
        assert_eq!(last.subject, "2410");
        assert_eq!(last.sex, Sex::Unknown);
        assert_eq!(last.acquisition_date, None);
    }

    #[test]
    fn empty_after_filtering_is_an_error() {
        let mut sheet = clinical_sheet();
        for row in &mut sheet.rows {
            row[1] = Some("no".to_string());
        }
        let err = parse_clinical(&sheet, &ColumnConfig::default(), None).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResultSet(_)));
    }

    #[test]
    fn unknown_inclusion_column_is_rejected() {
        let sheet = Sheet::new(
            vec!["Piglet".to_string(), "Incl.".to_string()],
            vec![
                vec![Some("2343".to_string()), Some("yes".to_string())],
                vec![Some("2402".to_string()), Some("no".to_string())],
            ],
        );
        let err = parse_clinical(&sheet, &ColumnConfig::default(), None).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn parses_common_date_layouts() {
        assert_eq!(parse_date("2019-03-04 00:00:00"), NaiveDate::from_ymd_opt(2019, 3, 4));
        assert_eq!(parse_date("04.03.2019"), NaiveDate::from_ymd_opt(2019, 3, 4));
        assert_eq!(parse_date("March"), None);
    }
}
