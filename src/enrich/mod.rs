//! Over-representation and gene-set enrichment of ranked fold-change lists
//! against named annotation corpora.

pub mod corpus;
pub mod gsea;
pub mod ora;

pub use corpus::{AnnotationCorpus, GeneSet};
pub use gsea::gsea;
pub use ora::ora;

use serde::Serialize;

use crate::config::EnrichmentConfig;
use crate::error::Result;
use crate::ranked::RankedList;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Ora,
    Gsea,
}

/// One tested term.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentResult {
    pub method: Method,
    pub corpus: String,
    pub term: String,
    pub description: String,
    /// Set members present in the universe / ranked list
    pub set_size: usize,
    /// ORA: hits in the subset. GSEA: leading-edge size
    pub overlap: usize,
    /// ORA: fold enrichment. GSEA: normalized enrichment score
    pub score: f64,
    pub p_value: f64,
    pub p_adjust: f64,
    /// ORA: hits. GSEA: leading-edge genes
    pub genes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentOptions {
    pub min_set_size: usize,
    pub max_set_size: usize,
    /// Report terms with adjusted p at most this
    pub p_cutoff: f64,
    pub permutations: usize,
    pub seed: u64,
}

impl From<&EnrichmentConfig> for EnrichmentOptions {
    fn from(config: &EnrichmentConfig) -> Self {
        Self {
            min_set_size: config.min_set_size,
            max_set_size: config.max_set_size,
            p_cutoff: config.p_cutoff,
            permutations: config.permutations,
            seed: config.seed,
        }
    }
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self::from(&EnrichmentConfig::default())
    }
}

/// ORA and GSEA results of one contrast across every corpus.
#[derive(Debug, Clone, Default)]
pub struct ContrastEnrichment {
    pub subset_size: usize,
    pub ora: Vec<EnrichmentResult>,
    pub gsea: Vec<EnrichmentResult>,
}

/// Enrich one contrast: the `|score| > cutoff` subset against the ranked
/// background for ORA, the full ranked list for GSEA.
///
/// An empty subset is a hard stop.
pub fn enrich_contrast(
    ranked: &RankedList,
    cutoff: f64,
    corpora: &[AnnotationCorpus],
    options: &EnrichmentOptions,
) -> Result<ContrastEnrichment> {
    let subset = ranked.threshold(cutoff)?;
    let subset_ids: Vec<&str> = subset.ids().collect();
    let universe: Vec<&str> = ranked.ids().collect();

    let mut out = ContrastEnrichment {
        subset_size: subset.len(),
        ..Default::default()
    };
    for corpus in corpora {
        let over = ora(&subset_ids, &universe, corpus, options);
        let gse = gsea(ranked, corpus, options);
        log::info!(
            "{}: {} ORA and {} GSEA terms pass p.adjust <= {}",
            corpus.name,
            over.len(),
            gse.len(),
            options.p_cutoff
        );
        out.ora.extend(over);
        out.gsea.extend(gse);
    }
    Ok(out)
}
