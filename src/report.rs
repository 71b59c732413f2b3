//! Run report generation and YAML serialization.
//!
//! A report captures the environment, wall time, outcome and the per-stage
//! counts of a single run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use sysinfo::System;

use crate::pipeline::PipelineSummary;
use crate::runs::RunContext;

/// Status of a pipeline run.
#[derive(Serialize, Clone, Debug)]
#[serde(tag = "status")]
pub enum RunStatus {
    Success,
    Error { message: String },
}

/// Complete report for a single run.
#[derive(Serialize, Clone, Debug)]
pub struct RunReport {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub duration_secs: f64,
    #[serde(flatten)]
    pub status: RunStatus,

    pub environment: EnvironmentInfo,
    /// Absent when the run failed before any stage finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<PipelineSummary>,
}

/// Environment information about the system.
#[derive(Serialize, Clone, Debug)]
pub struct EnvironmentInfo {
    pub os: String,
    pub os_version: String,
    pub cpu_model: String,
    pub cpu_cores: usize,
    pub total_memory_gb: f64,
    pub rayon_threads: usize,
}

impl EnvironmentInfo {
    /// Gather environment information from the system.
    pub fn gather() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let os = System::name().unwrap_or_else(|| "Unknown".to_string());
        let os_version = System::os_version().unwrap_or_else(|| "Unknown".to_string());

        let cpu_model = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let cpu_cores = sys.cpus().len();
        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);

        Self {
            os,
            os_version,
            cpu_model,
            cpu_cores,
            total_memory_gb,
            rayon_threads: rayon::current_num_threads(),
        }
    }
}

impl RunReport {
    /// Generate a complete run report.
    pub fn generate(
        run_context: &RunContext,
        status: RunStatus,
        summary: Option<PipelineSummary>,
    ) -> Self {
        let elapsed = Utc::now() - run_context.start_time;
        let duration_secs = elapsed.num_milliseconds().max(0) as f64 / 1000.0;

        Self {
            run_id: run_context.run_id.clone(),
            timestamp: run_context.start_time,
            duration_secs,
            status,
            environment: EnvironmentInfo::gather(),
            summary,
        }
    }

    /// Save the report as YAML to the specified path.
    pub fn save_yaml(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize report to YAML")?;

        fs::write(path, yaml)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_info_gather() {
        let env_info = EnvironmentInfo::gather();
        assert!(!env_info.os.is_empty());
        assert!(env_info.cpu_cores > 0);
        assert!(env_info.total_memory_gb > 0.0);
        assert!(env_info.rayon_threads > 0);
    }

    #[test]
    fn test_run_status_serialization() {
        let success = RunStatus::Success;
        let yaml = serde_yaml::to_string(&success).unwrap();
        assert!(yaml.contains("Success"));

        let error = RunStatus::Error {
            message: "Test error".to_string(),
        };
        let yaml = serde_yaml::to_string(&error).unwrap();
        assert!(yaml.contains("Error"));
        assert!(yaml.contains("Test error"));
    }

    #[test]
    fn report_carries_stage_summary() {
        let temp_dir = std::env::temp_dir().join("swath_pipeline_test_report");
        let _ = fs::remove_dir_all(&temp_dir);
        let ctx = RunContext::new(&temp_dir).unwrap();

        let mut summary = PipelineSummary::default();
        summary.tested_proteins = 42;
        let report = RunReport::generate(&ctx, RunStatus::Success, Some(summary));
        report.save_yaml(&ctx.report_path()).unwrap();

        let text = fs::read_to_string(ctx.report_path()).unwrap();
        assert!(text.contains("status: Success"));
        assert!(text.contains("tested_proteins: 42"));

        let failed = RunReport::generate(
            &ctx,
            RunStatus::Error {
                message: "boom".into(),
            },
            None,
        );
        let yaml = serde_yaml::to_string(&failed).unwrap();
        assert!(!yaml.contains("summary"));

        let _ = fs::remove_dir_all(&temp_dir);
    }
}
