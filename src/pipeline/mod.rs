//! Stage orchestration: ingest, reshape, missing-data policies, group
//! comparison, ordination and enrichment, in that order. Any stage error
//! stops the run.

pub mod reader;

use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::compare::{compare_groups, ComparisonTable};
use crate::config::Settings;
use crate::enrich::{enrich_contrast, AnnotationCorpus, EnrichmentOptions};
use crate::error::{PipelineError, Result};
use crate::groups::{GroupAssignment, Treatment};
use crate::idmap::{IdMapping, PeakName};
use crate::ingest::{parse_abundance, parse_clinical, read_sheet, AbundanceMatrix};
use crate::missing::{check_mean_block, collapse_replicates, complete_case_columns};
use crate::ordination::{center_scale, pca, sparse_pca};
use crate::ranked::{load_fold_change_exports, RankedList};
use crate::reshape::{align_samples, check_recorded_groups, sample_covariates, to_tidy, SampleCovariates};
use crate::writer::csv::ResultWriter;
use crate::writer::parquet::write_tidy;

/// Per-stage counts recorded in the run report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineSummary {
    pub replicate_samples: usize,
    pub subjects: usize,
    pub proteins: usize,
    pub missing_replicate_cells: usize,
    /// Cells of the exported mean block resolved from a single replicate
    pub mean_cells_resolved: usize,
    pub subjects_per_group: BTreeMap<String, usize>,
    pub group_label_mismatches: usize,
    pub tidy_rows: usize,
    pub tested_proteins: usize,
    pub skipped_proteins: usize,
    pub significant_per_contrast: BTreeMap<String, usize>,
    pub complete_case_proteins: usize,
    pub zero_variance_proteins: usize,
    pub pca_components: usize,
    pub sparse_components: usize,
    pub enrichment: BTreeMap<String, ContrastSummary>,
    pub artifacts: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContrastSummary {
    pub ranked: usize,
    pub unmapped: usize,
    pub ambiguous: usize,
    pub duplicate_targets: usize,
    pub subset: usize,
    pub ora_terms: usize,
    pub gsea_terms: usize,
}

/// Run every stage, writing results below `results_dir`.
pub fn run(settings: &Settings, results_dir: &Path, progress: &ProgressBar) -> Result<PipelineSummary> {
    let columns = &settings.columns;
    let delim = columns.subject_delimiter.as_str();
    let writer = ResultWriter::new(results_dir)?;
    let mut summary = PipelineSummary::default();

    // Ingest
    progress.set_message("ingest");
    let abundance_path = required(settings.storage.abundance_path.as_deref(), "abundance_path")?;
    let clinical_path = required(settings.storage.clinical_path.as_deref(), "clinical_path")?;
    let tables = parse_abundance(
        &read_sheet(abundance_path, settings.storage.abundance_sheet.as_deref())?,
        columns,
    )?;
    let records = parse_clinical(
        &read_sheet(clinical_path, settings.storage.clinical_sheet.as_deref())?,
        columns,
        settings.analysis.excluded_subject.as_deref(),
    )?;
    let groups = GroupAssignment::new(&settings.groups, delim)?;

    // Reshape
    progress.set_message("reshape");
    let (replicates, records) = align_samples(&tables.replicates, &records, delim)?;
    summary.group_label_mismatches = check_recorded_groups(&groups, &records);
    summary.replicate_samples = replicates.n_samples();
    summary.proteins = replicates.n_proteins();
    summary.missing_replicate_cells = replicates.missing_count();

    let replicate_cov = sample_covariates(&replicates, &groups, &records);
    let tidy = to_tidy(&replicates, &replicate_cov);
    summary.tidy_rows = write_tidy(&tidy, &writer.make_path("tidy.parquet"))?;
    summary.artifacts.push(writer.make_path("tidy.parquet"));
    summary.artifacts.push(writer.write_tidy_csv(&tidy)?);

    // Missing-data policies
    progress.set_message("missing data");
    let means = collapse_replicates(&replicates, delim, &columns.mean_marker)?;
    if tables.means.n_samples() > 0 {
        let (exported, _) = align_samples(&tables.means, &records, delim)?;
        summary.mean_cells_resolved = check_mean_block(&replicates, &exported, delim)?;
    }
    let mean_cov = sample_covariates(&means, &groups, &records);
    summary.subjects = means.n_samples();
    for treatment in Treatment::ALL {
        let n = mean_cov.iter().filter(|c| c.treatment == treatment).count();
        summary.subjects_per_group.insert(treatment.label().to_string(), n);
    }
    log::info!("Subjects per group: {:?}", summary.subjects_per_group);

    // Group comparison
    progress.set_message("group comparison");
    let table = compare_groups(&means, &mean_cov, settings.analysis.factor, progress)?;
    summary.tested_proteins = table.rows.len();
    summary.skipped_proteins = table.skipped.len();
    write_comparison(&writer, &table, settings, &mut summary)?;

    // Ordination
    progress.set_message("ordination");
    ordinate(&writer, &replicates, &replicate_cov, settings, &mut summary)?;

    // Identifier mapping and enrichment
    progress.set_message("enrichment");
    enrich(&writer, &table, settings, &mut summary)?;

    Ok(summary)
}

fn required<'a>(path: Option<&'a Path>, key: &str) -> Result<&'a Path> {
    path.ok_or_else(|| PipelineError::Config(format!("storage.{key} is required")))
}

fn write_comparison(
    writer: &ResultWriter,
    table: &ComparisonTable,
    settings: &Settings,
    summary: &mut PipelineSummary,
) -> Result<()> {
    let alpha = settings.analysis.alpha;
    summary.artifacts.push(writer.write_omnibus(table)?);
    summary.artifacts.push(writer.write_tukey(table)?);
    summary.artifacts.push(writer.write_fold_changes(table)?);

    for (c, contrast) in table.contrasts.iter().enumerate() {
        let ids: Vec<&str> = table
            .significant(c, alpha)
            .into_iter()
            .map(|r| r.protein.as_str())
            .collect();
        log::info!(
            "{}: {} proteins with Tukey p <= {}",
            contrast.name,
            ids.len(),
            alpha
        );
        summary
            .significant_per_contrast
            .insert(contrast.name.clone(), ids.len());
        summary.artifacts.push(writer.write_significant(&contrast.name, &ids)?);

        let points = table.volcano(c, alpha, settings.enrichment.fold_change_cutoff);
        summary.artifacts.push(writer.write_volcano(&contrast.name, &points)?);
    }
    Ok(())
}

fn ordinate(
    writer: &ResultWriter,
    replicates: &AbundanceMatrix,
    covariates: &[SampleCovariates],
    settings: &Settings,
    summary: &mut PipelineSummary,
) -> Result<()> {
    let analysis = &settings.analysis;
    let complete = complete_case_columns(replicates)?;
    summary.complete_case_proteins = complete.n_proteins();

    let input = if analysis.log2_transform {
        complete.map_values(|v| (v + 1.0).log2())
    } else {
        complete
    };
    let scaled = center_scale(&input)?;
    summary.zero_variance_proteins = scaled.dropped.len();

    let mut fit = pca(&scaled)?;
    if let Some(k) = analysis.pca_components {
        fit = fit.truncate(k);
    }
    summary.pca_components = fit.n_components();
    log::info!(
        "PCA on {} samples x {} proteins: PC1 explains {:.1}%",
        scaled.samples.len(),
        scaled.proteins.len(),
        fit.variance_ratio.first().copied().unwrap_or(0.0) * 100.0
    );
    summary.artifacts.extend(writer.write_pca("pca", &scaled, &fit, covariates)?);

    if analysis.sparse_components > 0 {
        let spca = sparse_pca(&scaled, analysis.sparse_components, analysis.sparse_cardinality)?;
        summary.sparse_components = spca.variance_ratio.len();
        summary
            .artifacts
            .extend(writer.write_sparse_pca("sparse_pca", &scaled, &spca, covariates)?);
    }
    Ok(())
}

/// `(accession, log2 fold change)` per contrast, from the configured export
/// files or else from the computed comparison table.
fn contrast_scores(table: &ComparisonTable, settings: &Settings) -> Result<Vec<(String, Vec<(String, f64)>)>> {
    if let Some(pattern) = settings.storage.fold_change_glob.as_deref() {
        let exports = load_fold_change_exports(pattern, &settings.columns)?;
        return Ok(exports
            .into_iter()
            .map(|e| {
                log::info!(
                    "{}: {} of {} exported fold changes with p <= {}",
                    e.contrast,
                    e.significant_count(settings.analysis.alpha),
                    e.rows.len(),
                    settings.analysis.alpha
                );
                let scores = e.accession_scores();
                (e.contrast, scores)
            })
            .collect());
    }

    let mut out = Vec::with_capacity(table.contrasts.len());
    for (c, contrast) in table.contrasts.iter().enumerate() {
        let mut scores = Vec::new();
        for row in &table.rows {
            if let Some(fc) = row.log2_fc[c] {
                scores.push((PeakName::parse(&row.protein)?.accession, fc));
            }
        }
        out.push((contrast.name.clone(), scores));
    }
    Ok(out)
}

fn enrich(
    writer: &ResultWriter,
    table: &ComparisonTable,
    settings: &Settings,
    summary: &mut PipelineSummary,
) -> Result<()> {
    let config = &settings.enrichment;
    let Some(mapping_path) = config.id_mapping_path.as_deref() else {
        log::info!("No id_mapping_path configured; skipping identifier mapping and enrichment");
        return Ok(());
    };

    let mapping = IdMapping::load(mapping_path, config.target, config.target_first)?;
    let corpora = config
        .corpora
        .iter()
        .map(|c| AnnotationCorpus::load(&c.name, &c.path))
        .collect::<Result<Vec<_>>>()?;
    if corpora.is_empty() {
        log::warn!("No annotation corpora configured; writing ranked lists only");
    }
    let options = EnrichmentOptions::from(config);

    for (contrast, scores) in contrast_scores(table, settings)? {
        let mapped = mapping.map_scores(&scores, config.ambiguity, config.unmapped)?;
        let ranked = RankedList::new(mapped.scores)?;
        summary.artifacts.push(writer.write_ranked(
            &contrast,
            config.target.column_name(),
            &ranked,
        )?);

        let mut entry = ContrastSummary {
            ranked: ranked.len(),
            unmapped: mapped.unmapped.len(),
            ambiguous: mapped.ambiguous,
            duplicate_targets: mapped.duplicate_targets,
            ..Default::default()
        };

        if !corpora.is_empty() {
            let result = enrich_contrast(&ranked, config.fold_change_cutoff, &corpora, &options)
                .map_err(|e| match e {
                    PipelineError::EmptyResultSet(msg) => {
                        PipelineError::EmptyResultSet(format!("{contrast}: {msg}"))
                    }
                    other => other,
                })?;
            entry.subset = result.subset_size;
            entry.ora_terms = result.ora.len();
            entry.gsea_terms = result.gsea.len();
            summary
                .artifacts
                .push(writer.write_enrichment(&format!("ora_{contrast}.csv"), &result.ora)?);
            summary
                .artifacts
                .push(writer.write_enrichment(&format!("gsea_{contrast}.csv"), &result.gsea)?);
        }

        summary.enrichment.insert(contrast, entry);
    }
    Ok(())
}
