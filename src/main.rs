use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::time::Duration;

use swath_pipeline::cli::Args;
use swath_pipeline::config::Settings;
use swath_pipeline::logging;
use swath_pipeline::pipeline::{self, PipelineSummary};
use swath_pipeline::report::{RunReport, RunStatus};
use swath_pipeline::runs::{cleanup_old_runs, RunContext};

fn main() -> Result<()> {
    let args = Args::parse();
    let log_file = logging::init();

    // Load settings from YAML, with CLI overrides
    let mut settings = Settings::load_from_yaml(args.config.as_deref())?;
    settings = settings.merge_with_cli(args.abundance, args.clinical, args.output, args.log_level);
    log_file.set_level(&settings.logging.log_level);

    // Resolve paths relative to current working directory (project root)
    let root = env::current_dir()?;
    settings.resolve_paths(&root)?;

    // Create run context (timestamped directory, optionally overridden)
    let run_context = RunContext::new_with_run_id(&settings.runs.runs_dir, args.run_id)?;
    log_file.attach(&run_context.log_path())?;

    log::info!("Run ID: {}", run_context.run_id);
    log::info!("Run directory: {}", run_context.run_dir.display());

    settings.save_snapshot(&run_context.config_snapshot_path())?;
    log::info!(
        "Config snapshot saved to {}",
        run_context.config_snapshot_path().display()
    );

    log::info!("Configuration ready");
    for (label, path) in [
        ("Abundance", &settings.storage.abundance_path),
        ("Clinical", &settings.storage.clinical_path),
    ] {
        match path {
            Some(path) => log::info!("  {}: {}", label, path.display()),
            None => log::error!("  {}: (not set)", label),
        }
    }
    match settings.enrichment.id_mapping_path {
        Some(ref path) => log::info!("  Id mapping: {}", path.display()),
        None => log::warn!("  Id mapping: (not set)"),
    }
    log::info!("  Factor: {:?}", settings.analysis.factor);
    log::info!("  Alpha: {}", settings.analysis.alpha);
    log::info!("  Rayon threads: {}", rayon::current_num_threads());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("[{spinner}] {msg} {pos}")?);
    pb.enable_steady_tick(Duration::from_millis(200));

    let result = pipeline::run(&settings, run_context.results_dir(), &pb);
    pb.finish_and_clear();

    // Generate report (even on error)
    let (status, summary) = match &result {
        Ok(summary) => (RunStatus::Success, Some(summary.clone())),
        Err(e) => (
            RunStatus::Error {
                message: format!("{:#}", e),
            },
            None,
        ),
    };
    if let Some(ref summary) = summary {
        print_summary(summary);
    }

    let report = RunReport::generate(&run_context, status, summary);
    if let Err(e) = report.save_yaml(&run_context.report_path()) {
        log::error!("Failed to save report: {}", e);
    } else {
        log::info!("Report saved to {}", run_context.report_path().display());
    }

    match cleanup_old_runs(&settings.runs.runs_dir, settings.runs.keep_runs, &run_context) {
        Ok(removed) if !removed.is_empty() => log::info!("Removed {} old run(s)", removed.len()),
        Ok(_) => {}
        Err(e) => log::warn!("Failed to cleanup old runs: {}", e),
    }

    result.map(|_| ()).map_err(Into::into)
}

fn print_summary(summary: &PipelineSummary) {
    log::info!("=== Run Summary ===");
    log::info!(
        "Samples: {} replicates, {} subjects, {} proteins ({} missing cells)",
        summary.replicate_samples,
        summary.subjects,
        summary.proteins,
        summary.missing_replicate_cells
    );
    log::info!(
        "ANOVA: {} tested, {} skipped",
        summary.tested_proteins,
        summary.skipped_proteins
    );
    for (contrast, n) in &summary.significant_per_contrast {
        log::info!("  {}: {} significant", contrast, n);
    }
    log::info!(
        "Ordination: {} complete-case proteins, {} PCs, {} sparse PCs",
        summary.complete_case_proteins,
        summary.pca_components,
        summary.sparse_components
    );
    for (contrast, e) in &summary.enrichment {
        log::info!(
            "  {}: {} ranked ({} unmapped), {} ORA / {} GSEA terms",
            contrast,
            e.ranked,
            e.unmapped,
            e.ora_terms,
            e.gsea_terms
        );
    }
    log::info!("Artifacts written: {}", summary.artifacts.len());
}
