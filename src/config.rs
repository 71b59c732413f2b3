use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::groups::Factor;
use crate::idmap::{AmbiguityPolicy, TargetNamespace, UnmappedPolicy};
use crate::ranked::FoldChangeScale;

/// Root configuration structure with versioning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Configuration schema version for compatibility tracking
    pub version: String,
    /// Input tables
    pub storage: StorageConfig,
    /// Run directory lifecycle
    #[serde(default)]
    pub runs: RunsConfig,
    /// Column names and header markers of the input tables
    #[serde(default)]
    pub columns: ColumnConfig,
    /// Subject to treatment-group assignment
    #[serde(default)]
    pub groups: GroupsConfig,
    /// Group comparison and ordination parameters
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Identifier mapping and enrichment parameters
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Wide protein abundance table (.csv, .tsv, .xlsx, .ods)
    pub abundance_path: Option<PathBuf>,
    /// Worksheet holding the abundance matrix (first sheet when unset)
    #[serde(default)]
    pub abundance_sheet: Option<String>,
    /// Clinical metadata table
    pub clinical_path: Option<PathBuf>,
    /// Worksheet holding the clinical records (first sheet when unset)
    #[serde(default)]
    pub clinical_sheet: Option<String>,
    /// Glob matching per-contrast fold-change exports. When unset the ranked
    /// lists are built from the computed comparison table.
    #[serde(default)]
    pub fold_change_glob: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunsConfig {
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,
    /// Number of most recent run directories kept after a run
    #[serde(default = "default_keep_runs")]
    pub keep_runs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    /// Header token marking a per-replicate column (`2343_sample 2`)
    #[serde(default = "default_replicate_marker")]
    pub replicate_marker: String,
    /// Header token marking a per-sample mean column (`2343_mean`)
    #[serde(default = "default_mean_marker")]
    pub mean_marker: String,
    /// Separator between subject id and the rest of a sample id
    #[serde(default = "default_subject_delimiter")]
    pub subject_delimiter: String,
    #[serde(default = "default_clinical_subject")]
    pub clinical_subject: String,
    #[serde(default = "default_clinical_included")]
    pub clinical_included: String,
    /// Values of the inclusion column that count as included (case-insensitive)
    #[serde(default = "default_included_values")]
    pub included_values: Vec<String>,
    #[serde(default = "default_clinical_group")]
    pub clinical_group: String,
    #[serde(default = "default_clinical_sex")]
    pub clinical_sex: String,
    #[serde(default = "default_clinical_date")]
    pub clinical_date: String,
    #[serde(default = "default_peak_name_column")]
    pub peak_name: String,
    #[serde(default = "default_fold_change_column")]
    pub fold_change: String,
    #[serde(default = "default_p_value_column")]
    pub p_value: String,
    /// Scale of the exported fold-change column
    #[serde(default)]
    pub fold_change_scale: FoldChangeScale,
}

/// Explicit subject lists; every subject not listed is CONTROL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupsConfig {
    #[serde(default)]
    pub sc_subjects: Vec<String>,
    #[serde(default)]
    pub pbs_subjects: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Significance cutoff applied to unadjusted Tukey p-values
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Grouping factor of the per-protein ANOVA
    #[serde(default)]
    pub factor: Factor,
    /// log2-transform intensities before ordination
    #[serde(default = "default_true")]
    pub log2_transform: bool,
    /// Number of principal components written (all when unset)
    #[serde(default)]
    pub pca_components: Option<usize>,
    #[serde(default = "default_sparse_components")]
    pub sparse_components: usize,
    /// Non-zero loadings retained per sparse component
    #[serde(default = "default_sparse_cardinality")]
    pub sparse_cardinality: usize,
    /// Subject removed from the clinical table before any analysis
    #[serde(default)]
    pub excluded_subject: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Annotation corpus name (KEGG, Reactome, GO, DO, DGN, MeSH, ...)
    pub name: String,
    /// GMT file, optionally gzipped
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Accession to target identifier table; enrichment is skipped when unset
    #[serde(default)]
    pub id_mapping_path: Option<PathBuf>,
    #[serde(default)]
    pub target: TargetNamespace,
    /// Column order of the mapping file is `target<TAB>accession` when true
    #[serde(default = "default_true")]
    pub target_first: bool,
    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,
    #[serde(default)]
    pub unmapped: UnmappedPolicy,
    /// |log2 fold change| must exceed this to enter the ORA subset
    #[serde(default = "default_fold_change_cutoff")]
    pub fold_change_cutoff: f64,
    #[serde(default)]
    pub corpora: Vec<CorpusConfig>,
    #[serde(default = "default_min_set_size")]
    pub min_set_size: usize,
    #[serde(default = "default_max_set_size")]
    pub max_set_size: usize,
    /// Adjusted p-value cutoff for reported terms
    #[serde(default = "default_alpha")]
    pub p_cutoff: f64,
    #[serde(default = "default_permutations")]
    pub permutations: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Logging configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_runs_dir() -> PathBuf {
    PathBuf::from("runs")
}

fn default_keep_runs() -> usize {
    10
}

fn default_replicate_marker() -> String {
    "sample".to_string()
}

fn default_mean_marker() -> String {
    "mean".to_string()
}

fn default_subject_delimiter() -> String {
    "_".to_string()
}

fn default_clinical_subject() -> String {
    "Piglet".to_string()
}

fn default_clinical_included() -> String {
    "Included".to_string()
}

fn default_included_values() -> Vec<String> {
    ["yes", "y", "1", "true", "x"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_clinical_group() -> String {
    "Group".to_string()
}

fn default_clinical_sex() -> String {
    "Sex".to_string()
}

fn default_clinical_date() -> String {
    "Date".to_string()
}

fn default_peak_name_column() -> String {
    "Peak Name".to_string()
}

fn default_fold_change_column() -> String {
    "Fold Change".to_string()
}

fn default_p_value_column() -> String {
    "p-value".to_string()
}

fn default_alpha() -> f64 {
    0.05
}

fn default_true() -> bool {
    true
}

fn default_sparse_components() -> usize {
    3
}

fn default_sparse_cardinality() -> usize {
    20
}

fn default_fold_change_cutoff() -> f64 {
    1.1
}

fn default_min_set_size() -> usize {
    10
}

fn default_max_set_size() -> usize {
    500
}

fn default_permutations() -> usize {
    1000
}

fn default_seed() -> u64 {
    42
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            runs_dir: default_runs_dir(),
            keep_runs: default_keep_runs(),
        }
    }
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            replicate_marker: default_replicate_marker(),
            mean_marker: default_mean_marker(),
            subject_delimiter: default_subject_delimiter(),
            clinical_subject: default_clinical_subject(),
            clinical_included: default_clinical_included(),
            included_values: default_included_values(),
            clinical_group: default_clinical_group(),
            clinical_sex: default_clinical_sex(),
            clinical_date: default_clinical_date(),
            peak_name: default_peak_name_column(),
            fold_change: default_fold_change_column(),
            p_value: default_p_value_column(),
            fold_change_scale: FoldChangeScale::default(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            factor: Factor::default(),
            log2_transform: true,
            pca_components: None,
            sparse_components: default_sparse_components(),
            sparse_cardinality: default_sparse_cardinality(),
            excluded_subject: None,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            id_mapping_path: None,
            target: TargetNamespace::default(),
            target_first: true,
            ambiguity: AmbiguityPolicy::default(),
            unmapped: UnmappedPolicy::default(),
            fold_change_cutoff: default_fold_change_cutoff(),
            corpora: Vec::new(),
            min_set_size: default_min_set_size(),
            max_set_size: default_max_set_size(),
            p_cutoff: default_alpha(),
            permutations: default_permutations(),
            seed: default_seed(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file. Falls back to defaults if file is missing.
    /// Fails fast with clear error message if YAML parsing fails.
    pub fn load_from_yaml(config_path: Option<&Path>) -> Result<Self> {
        let path = if let Some(p) = config_path {
            p.to_path_buf()
        } else {
            PathBuf::from("config.yaml")
        };

        let config_str = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "Config file not found at {:?}, using hardcoded defaults",
                    path
                );
                return Ok(Self::default());
            }
            Err(e) => return Err(e).context(format!("Failed to read config file at {:?}", path)),
        };

        let settings = Self::from_yaml_str(&config_str)
            .with_context(|| format!("Failed to parse config at {:?}: invalid YAML structure", path))?;

        log::info!(
            "Loaded config from {:?} (version: {})",
            path,
            settings.version
        );
        Ok(settings)
    }

    /// Parse settings from YAML text and validate them.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml)?;

        if settings.version != "1.0" {
            log::warn!(
                "Config version mismatch: expected 1.0, got {}. Continuing with current schema.",
                settings.version
            );
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Merge CLI arguments into settings, with CLI taking precedence
    pub fn merge_with_cli(
        mut self,
        cli_abundance: Option<PathBuf>,
        cli_clinical: Option<PathBuf>,
        cli_output: Option<PathBuf>,
        cli_log_level: Option<String>,
    ) -> Self {
        if let Some(abundance) = cli_abundance {
            self.storage.abundance_path = Some(abundance);
            log::info!("CLI override: abundance_path");
        }

        if let Some(clinical) = cli_clinical {
            self.storage.clinical_path = Some(clinical);
            log::info!("CLI override: clinical_path");
        }

        if let Some(output) = cli_output {
            self.runs.runs_dir = output;
            log::info!("CLI override: runs_dir");
        }

        if let Some(level) = cli_log_level {
            self.logging.log_level = level;
            log::info!("CLI override: log_level");
        }

        self
    }

    /// Resolve paths relative to the project root
    pub fn resolve_paths(&mut self, root: &Path) -> Result<()> {
        self.runs.runs_dir = resolve_path(&self.runs.runs_dir, root)?;

        if let Some(ref mut path) = self.storage.abundance_path {
            *path = resolve_path(path, root)?;
        }
        if let Some(ref mut path) = self.storage.clinical_path {
            *path = resolve_path(path, root)?;
        }
        if let Some(ref mut pattern) = self.storage.fold_change_glob {
            let resolved = resolve_path(Path::new(pattern.as_str()), root)?;
            *pattern = resolved.to_string_lossy().to_string();
        }
        if let Some(ref mut path) = self.enrichment.id_mapping_path {
            *path = resolve_path(path, root)?;
        }
        for corpus in &mut self.enrichment.corpora {
            corpus.path = resolve_path(&corpus.path, root)?;
        }

        Ok(())
    }

    /// Save the effective settings next to the run artifacts.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config snapshot")?;
        fs::write(path, yaml)
            .with_context(|| format!("Failed to write config snapshot to {}", path.display()))?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !(self.analysis.alpha > 0.0 && self.analysis.alpha <= 1.0) {
            return Err(anyhow!("analysis.alpha must be in (0, 1], got {}", self.analysis.alpha));
        }
        if self.analysis.sparse_cardinality == 0 {
            return Err(anyhow!("analysis.sparse_cardinality must be at least 1"));
        }
        if self.enrichment.min_set_size > self.enrichment.max_set_size {
            return Err(anyhow!(
                "enrichment.min_set_size ({}) exceeds max_set_size ({})",
                self.enrichment.min_set_size,
                self.enrichment.max_set_size
            ));
        }
        if self.enrichment.fold_change_cutoff < 0.0 {
            return Err(anyhow!("enrichment.fold_change_cutoff must be non-negative"));
        }
        if self.columns.subject_delimiter.is_empty() {
            return Err(anyhow!("columns.subject_delimiter cannot be empty"));
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            storage: StorageConfig::default(),
            runs: RunsConfig::default(),
            columns: ColumnConfig::default(),
            groups: GroupsConfig::default(),
            analysis: AnalysisConfig::default(),
            enrichment: EnrichmentConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Resolve a path to be either relative to root or return as-is if absolute
fn resolve_path(path: &Path, root: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(root.join(path))
    }
}
