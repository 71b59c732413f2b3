//! Annotation corpora in GMT format: one gene set per line,
//! `term<TAB>description<TAB>gene<TAB>gene...`.

use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::idmap::strip_namespace;
use crate::pipeline::reader::open_text_reader;

#[derive(Debug, Clone, PartialEq)]
pub struct GeneSet {
    pub term: String,
    pub description: String,
    /// Unique members in file order
    pub genes: Vec<String>,
}

/// A named collection of gene sets (KEGG, Reactome, GO, DO, DGN, MeSH...).
#[derive(Debug, Clone)]
pub struct AnnotationCorpus {
    pub name: String,
    pub sets: Vec<GeneSet>,
}

impl AnnotationCorpus {
    /// Load a `.gmt` or `.gmt.gz` file. A missing file is an I/O error and a
    /// file without gene sets is an `EmptyResultSet`.
    pub fn load(name: &str, path: &Path) -> Result<Self> {
        let reader = open_text_reader(path)?;
        let corpus = Self::from_reader(name, reader)?;
        log::info!(
            "Loaded corpus {} with {} gene sets from {}",
            name,
            corpus.sets.len(),
            path.display()
        );
        Ok(corpus)
    }

    pub fn from_reader<R: BufRead>(name: &str, reader: R) -> Result<Self> {
        let mut sets = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let term = fields.next().unwrap_or_default().trim();
            if term.is_empty() {
                return Err(PipelineError::InvalidInput(format!(
                    "{} line {}: missing term id",
                    name,
                    line_no + 1
                )));
            }
            let description = fields.next().unwrap_or_default().trim();

            let mut seen = HashSet::new();
            let genes: Vec<String> = fields
                .map(|g| strip_namespace(g.trim()))
                .filter(|g| !g.is_empty() && seen.insert(*g))
                .map(str::to_string)
                .collect();
            if genes.is_empty() {
                log::debug!("{}: term {} has no genes", name, term);
                continue;
            }

            sets.push(GeneSet {
                term: term.to_string(),
                description: description.to_string(),
                genes,
            });
        }

        if sets.is_empty() {
            return Err(PipelineError::EmptyResultSet(format!(
                "annotation corpus {name} contains no gene sets"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            sets,
        })
    }
}
