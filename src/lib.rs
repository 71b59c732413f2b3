//! SWATH proteomics pipeline: ingest of wide abundance exports, reshaping,
//! missing-data handling, per-protein group comparison, ordination and
//! annotation enrichment of ranked fold-change lists.

pub mod cli;
pub mod compare;
pub mod config;
pub mod enrich;
pub mod error;
pub mod groups;
pub mod idmap;
pub mod ingest;
pub mod logging;
pub mod missing;
pub mod ordination;
pub mod pipeline;
pub mod ranked;
pub mod report;
pub mod reshape;
pub mod runs;
pub mod schema;
pub mod stats;
pub mod writer;
