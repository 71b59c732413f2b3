use nalgebra::DMatrix;
use std::fs;
use std::path::{Path, PathBuf};

use crate::compare::{ComparisonTable, VolcanoPoint};
use crate::enrich::EnrichmentResult;
use crate::error::Result;
use crate::ordination::{Pca, Scaled, SparsePca};
use crate::ranked::RankedList;
use crate::reshape::{SampleCovariates, TidyRow};

const MISSING: &str = "NA";

/// Writes result tables as CSV files below one results directory.
pub struct ResultWriter {
    dir: PathBuf,
}

impl ResultWriter {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn make_path(&self, name: &str) -> PathBuf {
        self.dir.join(file_safe(name))
    }

    fn writer(&self, name: &str) -> Result<(csv::Writer<fs::File>, PathBuf)> {
        let path = self.make_path(name);
        let wtr = csv::WriterBuilder::new().from_path(&path)?;
        Ok((wtr, path))
    }

    /// The tidy long-form table, one row per (protein, sample).
    pub fn write_tidy_csv(&self, rows: &[TidyRow]) -> Result<PathBuf> {
        let (mut wtr, path) = self.writer("tidy.csv")?;
        wtr.write_record(["protein", "sample", "subject", "replicate", "sex", "treatment", "response"])?;
        for row in rows {
            wtr.write_record([
                row.protein.clone(),
                row.sample.clone(),
                row.subject.clone(),
                row.replicate.map_or_else(|| MISSING.to_string(), |r| r.to_string()),
                row.sex.to_string(),
                row.treatment.to_string(),
                fmt_opt(row.response),
            ])?;
        }
        wtr.flush()?;
        Ok(path)
    }

    /// PCA outputs: `{prefix}_loadings.csv`, `{prefix}_scores.csv` (with
    /// sample covariates) and `{prefix}_variance.csv`.
    pub fn write_pca(&self, prefix: &str, scaled: &Scaled, pca: &Pca, covariates: &[SampleCovariates]) -> Result<Vec<PathBuf>> {
        let mut paths = vec![
            self.write_loadings(&format!("{prefix}_loadings.csv"), &scaled.proteins, &pca.loadings)?,
            self.write_scores(&format!("{prefix}_scores.csv"), &scaled.samples, &pca.scores, covariates)?,
        ];

        let (mut wtr, path) = self.writer(&format!("{prefix}_variance.csv"))?;
        wtr.write_record(["component", "sdev", "variance_ratio", "cumulative_ratio"])?;
        for k in 0..pca.n_components() {
            wtr.write_record([
                component_name(k),
                pca.sdev[k].to_string(),
                pca.variance_ratio[k].to_string(),
                pca.cumulative_ratio[k].to_string(),
            ])?;
        }
        wtr.flush()?;
        paths.push(path);
        Ok(paths)
    }

    pub fn write_sparse_pca(
        &self,
        prefix: &str,
        scaled: &Scaled,
        spca: &SparsePca,
        covariates: &[SampleCovariates],
    ) -> Result<Vec<PathBuf>> {
        let mut paths = vec![
            self.write_loadings(&format!("{prefix}_loadings.csv"), &scaled.proteins, &spca.loadings)?,
            self.write_scores(&format!("{prefix}_scores.csv"), &scaled.samples, &spca.scores, covariates)?,
        ];

        let (mut wtr, path) = self.writer(&format!("{prefix}_variance.csv"))?;
        wtr.write_record(["component", "variance_ratio", "nonzero_loadings"])?;
        for k in 0..spca.variance_ratio.len() {
            let nonzero = spca.loadings.column(k).iter().filter(|v| **v != 0.0).count();
            wtr.write_record([
                component_name(k),
                spca.variance_ratio[k].to_string(),
                nonzero.to_string(),
            ])?;
        }
        wtr.flush()?;
        paths.push(path);
        Ok(paths)
    }

    fn write_loadings(&self, name: &str, proteins: &[String], loadings: &DMatrix<f64>) -> Result<PathBuf> {
        let (mut wtr, path) = self.writer(name)?;
        let mut header = vec!["protein".to_string()];
        header.extend((0..loadings.ncols()).map(component_name));
        wtr.write_record(&header)?;

        for (i, protein) in proteins.iter().enumerate() {
            let mut record = vec![protein.clone()];
            record.extend(loadings.row(i).iter().map(|v| v.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(path)
    }

    fn write_scores(
        &self,
        name: &str,
        samples: &[String],
        scores: &DMatrix<f64>,
        covariates: &[SampleCovariates],
    ) -> Result<PathBuf> {
        let (mut wtr, path) = self.writer(name)?;
        let mut header: Vec<String> = ["sample", "subject", "treatment", "sex", "acquisition_date"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        header.extend((0..scores.ncols()).map(component_name));
        wtr.write_record(&header)?;

        for (i, sample) in samples.iter().enumerate() {
            let cov = covariates.iter().find(|c| &c.sample == sample);
            let mut record = vec![
                sample.clone(),
                cov.map_or_else(|| MISSING.to_string(), |c| c.subject.clone()),
                cov.map_or_else(|| MISSING.to_string(), |c| c.treatment.to_string()),
                cov.map_or_else(|| MISSING.to_string(), |c| c.sex.to_string()),
                cov.and_then(|c| c.acquisition_date)
                    .map_or_else(|| MISSING.to_string(), |d| d.to_string()),
            ];
            record.extend(scores.row(i).iter().map(|v| v.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(path)
    }

    /// Omnibus ANOVA per protein with the global BH column.
    pub fn write_omnibus(&self, table: &ComparisonTable) -> Result<PathBuf> {
        let (mut wtr, path) = self.writer("anova_omnibus.csv")?;
        wtr.write_record(["protein", "f_statistic", "p_value", "p_adjust"])?;
        for row in &table.rows {
            wtr.write_record([
                row.protein.clone(),
                row.f_statistic.to_string(),
                row.omnibus_p.to_string(),
                row.omnibus_fdr.to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(path)
    }

    /// Tukey p-values, one column per contrast.
    pub fn write_tukey(&self, table: &ComparisonTable) -> Result<PathBuf> {
        self.write_per_contrast("tukey_p_values.csv", table, |row, c| row.tukey_p[c])
    }

    /// log2 fold changes, one column per contrast.
    pub fn write_fold_changes(&self, table: &ComparisonTable) -> Result<PathBuf> {
        self.write_per_contrast("log2_fold_changes.csv", table, |row, c| row.log2_fc[c])
    }

    fn write_per_contrast<F>(&self, name: &str, table: &ComparisonTable, value: F) -> Result<PathBuf>
    where
        F: Fn(&crate::compare::ComparisonRow, usize) -> Option<f64>,
    {
        let (mut wtr, path) = self.writer(name)?;
        let mut header = vec!["protein".to_string()];
        header.extend(table.contrasts.iter().map(|c| c.name.clone()));
        wtr.write_record(&header)?;

        for row in &table.rows {
            let mut record = vec![row.protein.clone()];
            record.extend((0..table.contrasts.len()).map(|c| fmt_opt(value(row, c))));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(path)
    }

    /// Significant proteins of one contrast, one id per line.
    pub fn write_significant(&self, contrast: &str, ids: &[&str]) -> Result<PathBuf> {
        let (mut wtr, path) = self.writer(&format!("significant_{contrast}.csv"))?;
        wtr.write_record(["protein"])?;
        for id in ids {
            wtr.write_record([id])?;
        }
        wtr.flush()?;
        Ok(path)
    }

    pub fn write_volcano(&self, contrast: &str, points: &[VolcanoPoint]) -> Result<PathBuf> {
        let (mut wtr, path) = self.writer(&format!("volcano_{contrast}.csv"))?;
        for point in points {
            wtr.serialize(point)?;
        }
        wtr.flush()?;
        Ok(path)
    }

    pub fn write_ranked(&self, contrast: &str, id_column: &str, ranked: &RankedList) -> Result<PathBuf> {
        let (mut wtr, path) = self.writer(&format!("ranked_{contrast}.csv"))?;
        wtr.write_record([id_column, "log2_fc"])?;
        for (id, score) in ranked.entries() {
            wtr.write_record([id.clone(), score.to_string()])?;
        }
        wtr.flush()?;
        Ok(path)
    }

    /// Enrichment results; member genes joined with `/`.
    pub fn write_enrichment(&self, name: &str, results: &[EnrichmentResult]) -> Result<PathBuf> {
        let (mut wtr, path) = self.writer(name)?;
        wtr.write_record([
            "method",
            "corpus",
            "term",
            "description",
            "set_size",
            "overlap",
            "score",
            "p_value",
            "p_adjust",
            "genes",
        ])?;
        for r in results {
            wtr.write_record([
                format!("{:?}", r.method).to_uppercase(),
                r.corpus.clone(),
                r.term.clone(),
                r.description.clone(),
                r.set_size.to_string(),
                r.overlap.to_string(),
                r.score.to_string(),
                r.p_value.to_string(),
                r.p_adjust.to_string(),
                r.genes.join("/"),
            ])?;
        }
        wtr.flush()?;
        Ok(path)
    }
}

fn component_name(k: usize) -> String {
    format!("PC{}", k + 1)
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| v.to_string())
}

/// Keep contrast labels like `HI+HTH+SC-CONTROL` readable while avoiding
/// path separators and spaces.
fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ' ' | ':' => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{Contrast, ComparisonRow};
    use crate::enrich::Method;
    use crate::groups::Factor;

    fn temp_writer(name: &str) -> (ResultWriter, PathBuf) {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        (ResultWriter::new(&dir).unwrap(), dir)
    }

    fn table() -> ComparisonTable {
        ComparisonTable {
            factor: Factor::Injury,
            contrasts: vec![Contrast {
                reference: 0,
                level: 1,
                name: "HI-CONTROL".into(),
            }],
            rows: vec![ComparisonRow {
                protein: "sp|P1|A_PIG".into(),
                f_statistic: 12.5,
                omnibus_p: 0.004,
                omnibus_fdr: 0.008,
                tukey_p: vec![Some(0.004)],
                log2_fc: vec![None],
            }],
            skipped: vec![],
        }
    }

    #[test]
    fn writes_per_contrast_tables_with_na() {
        let (writer, dir) = temp_writer("swath_pipeline_test_csv_tables");
        let tukey = writer.write_tukey(&table()).unwrap();
        let fc = writer.write_fold_changes(&table()).unwrap();

        assert_eq!(
            fs::read_to_string(tukey).unwrap(),
            "protein,HI-CONTROL\nsp|P1|A_PIG,0.004\n"
        );
        assert_eq!(fs::read_to_string(fc).unwrap(), "protein,HI-CONTROL\nsp|P1|A_PIG,NA\n");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn tidy_rows_use_short_sex_codes_and_na() {
        use crate::groups::Treatment;
        use crate::ingest::Sex;

        let (writer, dir) = temp_writer("swath_pipeline_test_csv_tidy");
        let rows = vec![TidyRow {
            protein: "sp|P1|A_PIG".into(),
            sample: "2343_mean".into(),
            subject: "2343".into(),
            replicate: None,
            sex: Sex::Female,
            treatment: Treatment::HiHthSc,
            response: None,
        }];
        let text = fs::read_to_string(writer.write_tidy_csv(&rows).unwrap()).unwrap();
        assert_eq!(
            text,
            "protein,sample,subject,replicate,sex,treatment,response\n\
             sp|P1|A_PIG,2343_mean,2343,NA,F,HI+HTH+SC,NA\n"
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn contrast_names_become_safe_file_names() {
        let (writer, dir) = temp_writer("swath_pipeline_test_csv_names");
        let path = writer
            .write_significant("HI+HTH+SC-CONTROL", &["sp|P1|A_PIG"])
            .unwrap();
        assert!(path.ends_with("significant_HI+HTH+SC-CONTROL.csv"));
        assert_eq!(file_safe("a b/c"), "a_b_c");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn enrichment_genes_are_slash_joined() {
        let (writer, dir) = temp_writer("swath_pipeline_test_csv_enrich");
        let result = EnrichmentResult {
            method: Method::Ora,
            corpus: "KEGG".into(),
            term: "ssc00010".into(),
            description: "Glycolysis, gluconeogenesis".into(),
            set_size: 10,
            overlap: 2,
            score: 3.5,
            p_value: 0.001,
            p_adjust: 0.01,
            genes: vec!["100".into(), "200".into()],
        };
        let path = writer.write_enrichment("ora_test.csv", &[result]).unwrap();
        let text = fs::read_to_string(path).unwrap();
        let line = text.lines().nth(1).unwrap();
        assert!(line.starts_with("ORA,KEGG,ssc00010,\"Glycolysis, gluconeogenesis\""));
        assert!(line.ends_with("100/200"));
        let _ = fs::remove_dir_all(dir);
    }
}
