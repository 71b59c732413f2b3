//! Ranked fold-change lists and the per-contrast fold-change exports they
//! are built from.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::ColumnConfig;
use crate::error::{PipelineError, Result};
use crate::idmap::PeakName;
use crate::ingest::{read_sheet, Sheet};

/// Scale of the fold-change column in an export file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldChangeScale {
    /// Already log2
    #[default]
    Log2,
    /// Plain ratio, converted to log2 on load
    Ratio,
}

/// Identifiers with scores, unique and sorted by descending score.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedList {
    entries: Vec<(String, f64)>,
}

impl RankedList {
    /// Build a ranked list. Ids must be unique and scores finite.
    pub fn new(mut entries: Vec<(String, f64)>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        for (id, score) in &entries {
            if !seen.insert(id.as_str()) {
                return Err(PipelineError::InvalidInput(format!(
                    "identifier {id} appears twice in a ranked list"
                )));
            }
            if !score.is_finite() {
                return Err(PipelineError::InvalidInput(format!(
                    "identifier {id} has non-finite score {score}"
                )));
            }
        }
        sort_descending(&mut entries);
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn scores(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(_, s)| *s)
    }

    /// Re-sort in place. A no-op on an already ranked list.
    pub fn sort(&mut self) {
        sort_descending(&mut self.entries);
    }

    /// Strictly descending by score (ties ordered by id).
    pub fn is_ranked(&self) -> bool {
        self.entries.windows(2).all(|w| rank_order(&w[0], &w[1]).is_lt())
    }

    /// Entries with `|score| > cutoff`, still ranked.
    pub fn threshold(&self, cutoff: f64) -> Result<RankedList> {
        let kept: Vec<(String, f64)> = self
            .entries
            .iter()
            .filter(|(_, s)| s.abs() > cutoff)
            .cloned()
            .collect();
        if kept.is_empty() {
            return Err(PipelineError::EmptyResultSet(format!(
                "no identifier of {} has |fold change| > {}",
                self.entries.len(),
                cutoff
            )));
        }
        Ok(Self { entries: kept })
    }
}

fn rank_order(a: &(String, f64), b: &(String, f64)) -> std::cmp::Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

fn sort_descending(entries: &mut [(String, f64)]) {
    entries.sort_by(rank_order);
}

/// One row of a fold-change export.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldChangeRow {
    pub peak: PeakName,
    /// log2 fold change
    pub log2_fc: f64,
    pub p_value: Option<f64>,
}

/// A per-contrast fold-change export, named by its file stem.
#[derive(Debug, Clone)]
pub struct FoldChangeExport {
    pub contrast: String,
    pub path: PathBuf,
    pub rows: Vec<FoldChangeRow>,
}

impl FoldChangeExport {
    /// `(accession, log2 fold change)` pairs in file order.
    pub fn accession_scores(&self) -> Vec<(String, f64)> {
        self.rows
            .iter()
            .map(|r| (r.peak.accession.clone(), r.log2_fc))
            .collect()
    }

    /// Rows whose exported p-value is at most `alpha`. Rows without one
    /// never count.
    pub fn significant_count(&self, alpha: f64) -> usize {
        self.rows
            .iter()
            .filter(|r| r.p_value.is_some_and(|p| p <= alpha))
            .count()
    }
}

/// Load every export matching `pattern`, sorted by path.
pub fn load_fold_change_exports(pattern: &str, columns: &ColumnConfig) -> Result<Vec<FoldChangeExport>> {
    let paths = glob::glob(pattern)
        .map_err(|e| PipelineError::Config(format!("invalid fold-change glob '{pattern}': {e}")))?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => log::warn!("Skipping unreadable glob match: {}", e),
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(PipelineError::EmptyResultSet(format!(
            "no fold-change export matches '{pattern}'"
        )));
    }

    files.iter().map(|path| load_export(path, columns)).collect()
}

fn load_export(path: &Path, columns: &ColumnConfig) -> Result<FoldChangeExport> {
    let sheet = read_sheet(path, None)?;
    let rows = parse_export(&sheet, columns).map_err(|e| match e {
        PipelineError::InvalidInput(msg) => {
            PipelineError::InvalidInput(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })?;
    let contrast = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.trim_end_matches(".csv").trim_end_matches(".tsv").to_string())
        .unwrap_or_else(|| path.display().to_string());

    log::info!("Loaded {} fold changes for contrast {}", rows.len(), contrast);
    Ok(FoldChangeExport {
        contrast,
        path: path.to_path_buf(),
        rows,
    })
}

/// Parse the peak-name, fold-change and optional p-value columns.
pub fn parse_export(sheet: &Sheet, columns: &ColumnConfig) -> Result<Vec<FoldChangeRow>> {
    let peak_col = sheet.column_index(&columns.peak_name)?;
    let fc_col = sheet.column_index(&columns.fold_change)?;
    let p_col = sheet.find_column(&columns.p_value);

    let mut rows = Vec::with_capacity(sheet.len());
    for r in 0..sheet.len() {
        let Some(name) = sheet.cell(r, peak_col) else {
            continue;
        };
        let peak = PeakName::parse(name)?;
        let Some(raw_fc) = sheet.cell(r, fc_col) else {
            log::debug!("No fold change for {}, skipping", name);
            continue;
        };
        let fc: f64 = raw_fc.parse().map_err(|_| {
            PipelineError::InvalidInput(format!("fold change '{raw_fc}' for {name} is not numeric"))
        })?;
        let log2_fc = match columns.fold_change_scale {
            FoldChangeScale::Log2 => fc,
            FoldChangeScale::Ratio if fc > 0.0 => fc.log2(),
            FoldChangeScale::Ratio => {
                return Err(PipelineError::InvalidInput(format!(
                    "fold-change ratio {fc} for {name} is not positive"
                )))
            }
        };
        let p_value = p_col
            .and_then(|c| sheet.cell(r, c))
            .and_then(|raw| raw.parse::<f64>().ok());
        rows.push(FoldChangeRow { peak, log2_fc, p_value });
    }

    if rows.is_empty() {
        return Err(PipelineError::EmptyResultSet("fold-change export has no rows".to_string()));
    }
    Ok(rows)
}
