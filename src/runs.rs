//! Run directories.
//!
//! Every invocation writes below `{runs_dir}/{run_id}/`:
//!
//! ```text
//! run_20210315_093000/
//!   config_snapshot.yaml
//!   pipeline.log
//!   report.yaml        written last, also on failure
//!   results/           every CSV and Parquet artifact
//! ```
//!
//! A directory holding `report.yaml` belongs to a finished run and is never
//! written into again.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const RUN_PREFIX: &str = "run_";
const REPORT_FILE: &str = "report.yaml";
const LOG_FILE: &str = "pipeline.log";
const SNAPSHOT_FILE: &str = "config_snapshot.yaml";
const RESULTS_DIR: &str = "results";

/// Paths and timing of one pipeline run.
pub struct RunContext {
    pub run_dir: PathBuf,
    /// Directory name, always `run_`-prefixed
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    results_dir: PathBuf,
}

impl RunContext {
    /// Fresh run named after the UTC start time.
    pub fn new(runs_dir: &Path) -> Result<Self> {
        Self::new_with_run_id(runs_dir, None)
    }

    /// Create the run directory and its `results/` subdirectory.
    ///
    /// Without an override the id is `run_YYYYMMDD_HHMMSS`, suffixed `_2`,
    /// `_3`, ... when that second is already taken. A named run id may point
    /// at an existing directory only if that run never finished (no
    /// `report.yaml`); its stale results are cleared.
    pub fn new_with_run_id(runs_dir: &Path, run_id_override: Option<String>) -> Result<Self> {
        let start_time = Utc::now();

        let (run_id, run_dir) = match run_id_override {
            Some(raw) => {
                let run_id = normalize_run_id(&raw)?;
                let run_dir = runs_dir.join(&run_id);
                if run_dir.join(REPORT_FILE).exists() {
                    return Err(anyhow!(
                        "Run {} already finished in {}; choose another run id",
                        run_id,
                        run_dir.display()
                    ));
                }
                let stale = run_dir.join(RESULTS_DIR);
                if stale.exists() {
                    log::warn!("Reusing unfinished run {}; clearing {}", run_id, stale.display());
                    fs::remove_dir_all(&stale)
                        .with_context(|| format!("Failed to clear {}", stale.display()))?;
                }
                (run_id, run_dir)
            }
            None => free_timestamped_dir(runs_dir, &start_time),
        };

        let results_dir = run_dir.join(RESULTS_DIR);
        fs::create_dir_all(&results_dir).with_context(|| {
            format!("Failed to create run directory: {}", results_dir.display())
        })?;

        Ok(Self {
            run_dir,
            run_id,
            start_time,
            results_dir,
        })
    }

    pub fn report_path(&self) -> PathBuf {
        self.run_dir.join(REPORT_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.run_dir.join(LOG_FILE)
    }

    pub fn config_snapshot_path(&self) -> PathBuf {
        self.run_dir.join(SNAPSHOT_FILE)
    }

    /// Directory receiving result tables; exists once the context does.
    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }
}

fn free_timestamped_dir(runs_dir: &Path, start_time: &DateTime<Utc>) -> (String, PathBuf) {
    let base = format!("{RUN_PREFIX}{}", start_time.format("%Y%m%d_%H%M%S"));
    let mut run_id = base.clone();
    let mut n = 1;
    while runs_dir.join(&run_id).exists() {
        n += 1;
        run_id = format!("{base}_{n}");
    }
    let run_dir = runs_dir.join(&run_id);
    (run_id, run_dir)
}

fn normalize_run_id(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("run_id cannot be empty"));
    }

    let normalized = if trimmed.starts_with(RUN_PREFIX) {
        trimmed.to_string()
    } else {
        format!("{RUN_PREFIX}{trimmed}")
    };

    // Also rules out path separators and `..`.
    if !normalized
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(anyhow!(
            "run_id may only contain ASCII letters/numbers, '_' and '-'"
        ));
    }

    Ok(normalized)
}

/// Remove old run directories so that at most `keep_count` remain.
///
/// The current run always survives. Other `run_*` directories are ranked by
/// modification time, newest first, since named runs do not sort by date.
/// Returns the removed directories.
pub fn cleanup_old_runs(runs_dir: &Path, keep_count: usize, current: &RunContext) -> Result<Vec<PathBuf>> {
    if !runs_dir.exists() {
        return Ok(Vec::new());
    }

    let mut others: Vec<(SystemTime, PathBuf)> = fs::read_dir(runs_dir)
        .with_context(|| format!("Failed to read runs directory: {}", runs_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path != &current.run_dir
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(RUN_PREFIX))
        })
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, path)
        })
        .collect();

    others.sort_by(|a, b| b.cmp(a));

    let mut removed = Vec::new();
    for (_, dir) in others.into_iter().skip(keep_count.saturating_sub(1)) {
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                log::debug!("Removed old run {}", dir.display());
                removed.push(dir);
            }
            Err(e) => log::warn!("Failed to remove old run directory {}: {}", dir.display(), e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn runs_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("swath_pipeline_runs_{name}"));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn new_run_lays_out_results_dir() {
        let root = runs_root("layout");

        let ctx = RunContext::new(&root).unwrap();
        assert!(ctx.run_id.starts_with("run_"));
        assert!(ctx.results_dir().is_dir());
        assert_eq!(ctx.results_dir(), ctx.run_dir.join("results"));
        assert!(ctx.report_path().ends_with("report.yaml"));
        assert!(ctx.log_path().ends_with("pipeline.log"));
        assert!(ctx.config_snapshot_path().ends_with("config_snapshot.yaml"));

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn same_second_runs_get_distinct_ids() {
        let root = runs_root("same_second");
        let start = Utc::now();

        let (first, dir) = free_timestamped_dir(&root, &start);
        fs::create_dir_all(&dir).unwrap();
        let (second, _) = free_timestamped_dir(&root, &start);
        assert_eq!(second, format!("{first}_2"));

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn unfinished_named_run_is_reused_with_clean_results() {
        let root = runs_root("reuse");

        let ctx = RunContext::new_with_run_id(&root, Some("pilot".into())).unwrap();
        assert_eq!(ctx.run_id, "run_pilot");
        File::create(ctx.results_dir().join("tidy.csv")).unwrap();

        let again = RunContext::new_with_run_id(&root, Some("run_pilot".into())).unwrap();
        assert!(again.results_dir().is_dir());
        assert!(!again.results_dir().join("tidy.csv").exists());

        File::create(again.report_path()).unwrap();
        assert!(RunContext::new_with_run_id(&root, Some("pilot".into())).is_err());

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn run_id_rejects_path_characters() {
        assert!(normalize_run_id("../escape").is_err());
        assert!(normalize_run_id("a/b").is_err());
        assert!(normalize_run_id("bad id").is_err());
        assert!(normalize_run_id("  ").is_err());
        assert_eq!(normalize_run_id("batch-2").unwrap(), "run_batch-2");
    }

    #[test]
    fn cleanup_keeps_current_run() {
        let root = runs_root("cleanup");
        let current = RunContext::new_with_run_id(&root, Some("20210101_120000".into())).unwrap();
        for name in ["run_20210102_120000", "run_20210103_120000", "run_pilot", "notes"] {
            fs::create_dir_all(root.join(name)).unwrap();
        }

        let removed = cleanup_old_runs(&root, 2, &current).unwrap();
        assert_eq!(removed.len(), 2);

        let remaining: Vec<String> = fs::read_dir(&root)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(remaining.len(), 3);
        assert!(remaining.contains(&current.run_id));
        assert!(remaining.contains(&"notes".to_string()));

        // Keeping zero still leaves the current run.
        cleanup_old_runs(&root, 0, &current).unwrap();
        assert!(current.run_dir.is_dir());
        assert!(!root.join("run_20210103_120000").exists());

        let _ = fs::remove_dir_all(&root);
    }
}
