//! UniProt accession → KEGG / Entrez identifier translation.
//!
//! Peak names in the abundance and fold-change tables are composite
//! `db|accession|entry` strings (e.g. `sp|P02768|ALBU_PIG`). The accession is
//! looked up in a two-column mapping file such as the output of the KEGG
//! `conv` service (target column first by default):
//!
//! ```text
//! ssc:396960	up:P02768
//! ssc:100152	up:P00355
//! ```
//!
//! Namespace prefixes (`up:`, `ssc:`, `ncbi-geneid:`) are optional and
//! stripped on load.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::pipeline::reader::open_text_reader;

/// The parts of a `db|accession|entry` peak name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeakName {
    pub database: String,
    pub accession: String,
    pub entry: String,
}

impl PeakName {
    pub fn parse(raw: &str) -> Result<Self> {
        let fields: Vec<&str> = raw.trim().split('|').collect();
        match fields.as_slice() {
            [db, accession, entry] if !accession.trim().is_empty() => Ok(Self {
                database: db.trim().to_string(),
                accession: accession.trim().to_string(),
                entry: entry.trim().to_string(),
            }),
            _ => Err(PipelineError::InvalidInput(format!(
                "peak name '{raw}' is not of the form db|accession|entry"
            ))),
        }
    }
}

/// Identifier namespace the accessions are translated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetNamespace {
    #[default]
    Kegg,
    Entrez,
}

impl TargetNamespace {
    /// Column header used for mapped identifiers in result tables.
    pub fn column_name(self) -> &'static str {
        match self {
            TargetNamespace::Kegg => "kegg_id",
            TargetNamespace::Entrez => "entrez_id",
        }
    }

    fn validate(self, id: &str) -> bool {
        match self {
            TargetNamespace::Kegg => !id.is_empty(),
            TargetNamespace::Entrez => !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()),
        }
    }
}

/// What to do when one accession maps to several target identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Keep the first target in mapping-file order
    #[default]
    First,
    /// Fail with `IdentifierMappingFailure`
    Error,
    /// Emit one row per target
    FanOut,
}

/// What to do with accessions absent from the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedPolicy {
    #[default]
    Fail,
    Drop,
}

/// Accession → target identifiers, preserving file order per accession.
#[derive(Debug, Clone, Default)]
pub struct IdMapping {
    pub target: TargetNamespace,
    entries: HashMap<String, Vec<String>>,
}

/// Result of translating a keyed score list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedScores {
    /// `(target id, score)` in input order, target ids unique
    pub scores: Vec<(String, f64)>,
    pub unmapped: Vec<String>,
    /// Accessions with more than one target
    pub ambiguous: usize,
    /// Target ids already claimed by an earlier accession
    pub duplicate_targets: usize,
}

impl IdMapping {
    /// Load a tab- or whitespace-separated two-column mapping file.
    ///
    /// `target_first` selects the column order `target accession`.
    /// Lines starting with `#` are comments.
    pub fn load(path: &Path, target: TargetNamespace, target_first: bool) -> Result<Self> {
        let reader = open_text_reader(path)?;
        let mapping = Self::from_reader(reader, target, target_first)?;
        log::info!(
            "Loaded {} accession mappings to {:?} from {}",
            mapping.len(),
            target,
            path.display()
        );
        Ok(mapping)
    }

    pub fn from_reader<R: BufRead>(reader: R, target: TargetNamespace, target_first: bool) -> Result<Self> {
        let mut mapping = Self {
            target,
            entries: HashMap::new(),
        };

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            if fields.len() != 2 {
                return Err(PipelineError::InvalidInput(format!(
                    "mapping line {} has {} fields, expected 2",
                    line_no + 1,
                    fields.len()
                )));
            }
            let (acc, id) = if target_first {
                (fields[1], fields[0])
            } else {
                (fields[0], fields[1])
            };
            let (acc, id) = (strip_namespace(acc), strip_namespace(id));
            if !target.validate(id) {
                return Err(PipelineError::InvalidInput(format!(
                    "mapping line {}: '{}' is not a valid {} identifier",
                    line_no + 1,
                    id,
                    target.column_name()
                )));
            }
            mapping.insert(acc, id);
        }

        Ok(mapping)
    }

    pub fn insert(&mut self, accession: &str, target: &str) {
        let targets = self.entries.entry(accession.to_string()).or_default();
        if !targets.iter().any(|t| t == target) {
            targets.push(target.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, accession: &str) -> Option<&[String]> {
        self.entries.get(accession).map(Vec::as_slice)
    }

    /// Translate `(accession, score)` pairs into `(target, score)` pairs.
    ///
    /// Duplicate target ids keep the first row in input order. An empty
    /// result is an `EmptyResultSet`.
    pub fn map_scores(
        &self,
        scores: &[(String, f64)],
        ambiguity: AmbiguityPolicy,
        unmapped: UnmappedPolicy,
    ) -> Result<MappedScores> {
        let mut out = MappedScores::default();
        let mut seen: HashSet<&str> = HashSet::new();

        for (accession, score) in scores {
            let Some(targets) = self.lookup(accession) else {
                out.unmapped.push(accession.clone());
                continue;
            };

            let chosen: &[String] = if targets.len() > 1 {
                out.ambiguous += 1;
                match ambiguity {
                    AmbiguityPolicy::First => &targets[..1],
                    AmbiguityPolicy::FanOut => targets,
                    AmbiguityPolicy::Error => {
                        return Err(PipelineError::IdentifierMappingFailure(format!(
                            "{} maps to {} {} identifiers ({})",
                            accession,
                            targets.len(),
                            self.target.column_name(),
                            targets.join(", ")
                        )))
                    }
                }
            } else {
                targets
            };

            for id in chosen {
                if seen.insert(id.as_str()) {
                    out.scores.push((id.clone(), *score));
                } else {
                    out.duplicate_targets += 1;
                }
            }
        }

        if !out.unmapped.is_empty() {
            match unmapped {
                UnmappedPolicy::Fail => {
                    let preview: Vec<&str> = out.unmapped.iter().take(5).map(String::as_str).collect();
                    return Err(PipelineError::IdentifierMappingFailure(format!(
                        "{} of {} accessions have no {} (first: {})",
                        out.unmapped.len(),
                        scores.len(),
                        self.target.column_name(),
                        preview.join(", ")
                    )));
                }
                UnmappedPolicy::Drop => log::warn!(
                    "Dropped {} unmapped accessions of {}",
                    out.unmapped.len(),
                    scores.len()
                ),
            }
        }
        if out.duplicate_targets > 0 {
            log::warn!(
                "Dropped {} rows whose {} was already taken",
                out.duplicate_targets,
                self.target.column_name()
            );
        }
        if out.scores.is_empty() {
            return Err(PipelineError::EmptyResultSet(format!(
                "no accession mapped to a {}",
                self.target.column_name()
            )));
        }

        Ok(out)
    }
}

pub(crate) fn strip_namespace(raw: &str) -> &str {
    raw.split_once(':').map_or(raw, |(_, id)| id)
}
