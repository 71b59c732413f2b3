use std::collections::HashSet;

use crate::config::ColumnConfig;
use crate::error::{PipelineError, Result};
use crate::ingest::sheet::Sheet;

/// Samples x proteins matrix of response intensities; cells may be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct AbundanceMatrix {
    pub samples: Vec<String>,
    pub proteins: Vec<String>,
    /// One row per sample, one entry per protein.
    values: Vec<Vec<Option<f64>>>,
}

impl AbundanceMatrix {
    pub fn new(
        samples: Vec<String>,
        proteins: Vec<String>,
        values: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        if values.len() != samples.len() {
            return Err(PipelineError::InvalidInput(format!(
                "{} sample rows for {} sample names",
                values.len(),
                samples.len()
            )));
        }
        if let Some((i, row)) = values
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != proteins.len())
        {
            return Err(PipelineError::InvalidInput(format!(
                "sample {} has {} values for {} proteins",
                samples[i],
                row.len(),
                proteins.len()
            )));
        }
        Ok(Self {
            samples,
            proteins,
            values,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn n_proteins(&self) -> usize {
        self.proteins.len()
    }

    pub fn get(&self, sample: usize, protein: usize) -> Option<f64> {
        self.values[sample][protein]
    }

    pub fn column(&self, protein: usize) -> Vec<Option<f64>> {
        self.values.iter().map(|row| row[protein]).collect()
    }

    pub fn missing_count(&self) -> usize {
        self.values
            .iter()
            .map(|row| row.iter().filter(|v| v.is_none()).count())
            .sum()
    }

    /// Keep only the given protein columns, in the given order.
    pub fn select_proteins(&self, keep: &[usize]) -> Self {
        Self {
            samples: self.samples.clone(),
            proteins: keep.iter().map(|&p| self.proteins[p].clone()).collect(),
            values: self
                .values
                .iter()
                .map(|row| keep.iter().map(|&p| row[p]).collect())
                .collect(),
        }
    }

    /// Keep only the samples accepted by `keep`.
    pub fn retain_samples<F: Fn(&str) -> bool>(&self, keep: F) -> Self {
        let (samples, values) = self
            .samples
            .iter()
            .zip(&self.values)
            .filter(|(s, _)| keep(s.as_str()))
            .map(|(s, row)| (s.clone(), row.clone()))
            .unzip();
        Self {
            samples,
            proteins: self.proteins.clone(),
            values,
        }
    }

    /// Apply `f` to every present value.
    pub fn map_values<F: Fn(f64) -> f64>(&self, f: F) -> Self {
        Self {
            samples: self.samples.clone(),
            proteins: self.proteins.clone(),
            values: self
                .values
                .iter()
                .map(|row| row.iter().map(|v| v.map(&f)).collect())
                .collect(),
        }
    }

    /// Dense row-major copy; `None` when any cell is missing.
    pub fn to_dense(&self) -> Option<Vec<f64>> {
        self.values.iter().flatten().copied().collect()
    }
}

/// The two blocks of the wide abundance export.
#[derive(Debug, Clone)]
pub struct AbundanceTables {
    /// One row per replicate run (`2343_sample 1`, `2343_sample 2`)
    pub replicates: AbundanceMatrix,
    /// One row per subject (`2343_mean`); empty when the export has no mean block
    pub means: AbundanceMatrix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Replicate,
    Mean,
}

/// Split the wide protein-by-sample table into replicate and mean matrices.
///
/// The first column holds protein identifiers; remaining headers are
/// classified by the configured markers. Columns matching neither marker
/// (descriptions, gene names) are skipped.
pub fn parse_abundance(sheet: &Sheet, columns: &ColumnConfig) -> Result<AbundanceTables> {
    let mean_marker = columns.mean_marker.to_ascii_lowercase();
    let replicate_marker = columns.replicate_marker.to_ascii_lowercase();

    let mut blocks: Vec<(usize, Block)> = Vec::new();
    for (idx, header) in sheet.headers.iter().enumerate().skip(1) {
        let lower = header.to_ascii_lowercase();
        if lower.contains(&mean_marker) {
            blocks.push((idx, Block::Mean));
        } else if lower.contains(&replicate_marker) {
            blocks.push((idx, Block::Replicate));
        } else {
            log::debug!("Skipping non-measurement column '{}'", header);
        }
    }

    if blocks.is_empty() {
        return Err(PipelineError::InvalidInput(format!(
            "no column header contains '{}' or '{}'",
            columns.replicate_marker, columns.mean_marker
        )));
    }

    let mut proteins = Vec::with_capacity(sheet.len());
    let mut seen = HashSet::new();
    // Column-major while reading: one Vec per measurement column.
    let mut cells: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(sheet.len()); blocks.len()];

    for row in 0..sheet.len() {
        let Some(protein) = sheet.cell(row, 0) else {
            log::warn!("Row {} has no protein identifier; skipped", row + 2);
            continue;
        };
        if !seen.insert(protein.to_string()) {
            return Err(PipelineError::InvalidInput(format!(
                "protein {} appears more than once",
                protein
            )));
        }
        proteins.push(protein.to_string());

        for (slot, (col, _)) in blocks.iter().enumerate() {
            let value = match sheet.cell(row, *col) {
                None => None,
                Some(raw) => parse_intensity(raw, protein, &sheet.headers[*col])?,
            };
            cells[slot].push(value);
        }
    }

    let build = |block: Block| -> Result<AbundanceMatrix> {
        let (samples, values): (Vec<String>, Vec<Vec<Option<f64>>>) = blocks
            .iter()
            .zip(&cells)
            .filter(|((_, b), _)| *b == block)
            .map(|((col, _), column)| (sheet.headers[*col].clone(), column.clone()))
            .unzip();
        AbundanceMatrix::new(samples, proteins.clone(), values)
    };

    let tables = AbundanceTables {
        replicates: build(Block::Replicate)?,
        means: build(Block::Mean)?,
    };

    log::info!(
        "Abundance table: {} proteins, {} replicate columns, {} mean columns",
        proteins.len(),
        tables.replicates.n_samples(),
        tables.means.n_samples()
    );
    Ok(tables)
}

fn parse_intensity(raw: &str, protein: &str, column: &str) -> Result<Option<f64>> {
    let value: f64 = raw.parse().map_err(|_| {
        PipelineError::InvalidInput(format!(
            "non-numeric intensity '{}' for {} in column '{}'",
            raw, protein, column
        ))
    })?;
    if value.is_nan() {
        return Ok(None);
    }
    if value < 0.0 || value.is_infinite() {
        return Err(PipelineError::InvalidInput(format!(
            "invalid intensity {} for {} in column '{}'",
            value, protein, column
        )));
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide_sheet() -> Sheet {
        let headers = ["Protein", "2343_sample 1", "2343_sample 2", "2343_mean", "Description"]
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
                row(["sp|P1|A_PIG", "10", "12", "11", "kinase"]),
                row(["sp|P2|B_PIG", "4", "", "4", "ligase"]),
            ],
        )
    }

    #[test]
    fn splits_replicate_and_mean_blocks() {
        let tables = parse_abundance(&wide_sheet(), &ColumnConfig::default()).unwrap();
        assert_eq!(tables.replicates.samples, vec!["2343_sample 1", "2343_sample 2"]);
        assert_eq!(tables.means.samples, vec!["2343_mean"]);
        assert_eq!(tables.replicates.proteins, vec!["sp|P1|A_PIG", "sp|P2|B_PIG"]);
        assert_eq!(tables.replicates.get(1, 0), Some(12.0));
        assert_eq!(tables.replicates.get(1, 1), None);
        assert_eq!(tables.means.get(0, 1), Some(4.0));
    }

    #[test]
    fn rejects_duplicate_proteins() {
        let mut sheet = wide_sheet();
        sheet.rows[1][0] = Some("sp|P1|A_PIG".to_string());
        assert!(parse_abundance(&sheet, &ColumnConfig::default()).is_err());
    }

    #[test]
    fn rejects_negative_and_text_intensities() {
        let mut sheet = wide_sheet();
        sheet.rows[0][1] = Some("-3".to_string());
        assert!(parse_abundance(&sheet, &ColumnConfig::default()).is_err());

        let mut sheet = wide_sheet();
        sheet.rows[0][1] = Some("high".to_string());
        assert!(parse_abundance(&sheet, &ColumnConfig::default()).is_err());
    }

    #[test]
    fn selects_columns_and_samples() {
        let tables = parse_abundance(&wide_sheet(), &ColumnConfig::default()).unwrap();
        let only_p2 = tables.replicates.select_proteins(&[1]);
        assert_eq!(only_p2.proteins, vec!["sp|P2|B_PIG"]);
        assert_eq!(only_p2.missing_count(), 1);

        let first = tables.replicates.retain_samples(|s| s.ends_with('1'));
        assert_eq!(first.samples, vec!["2343_sample 1"]);
        assert_eq!(first.to_dense(), Some(vec![10.0, 4.0]));
    }

    #[test]
    fn new_checks_dimensions() {
        let err = AbundanceMatrix::new(
            vec!["s1".into()],
            vec!["p1".into(), "p2".into()],
            vec![vec![Some(1.0)]],
        );
        assert!(err.is_err());
    }
}
