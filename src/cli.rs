use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "swath_pipeline")]
#[command(about = "Group comparison, ordination and enrichment for SWATH protein abundance tables")]
#[command(version)]
pub struct Args {
    /// Path to config YAML file (default: config.yaml in root)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the wide protein abundance table (.csv, .tsv, .xlsx)
    /// Overrides config.yaml value if provided
    #[arg(short, long)]
    pub abundance: Option<PathBuf>,

    /// Path to the clinical metadata table
    /// Overrides config.yaml value if provided
    #[arg(long)]
    pub clinical: Option<PathBuf>,

    /// Directory receiving runs (one timestamped subdirectory per run)
    /// Overrides config.yaml value if provided
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Force the run id instead of the timestamp-derived one
    #[arg(long)]
    pub run_id: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,
}
