//! Ingestion of the abundance export and the clinical workbook.

pub mod abundance;
pub mod clinical;
pub mod sheet;

pub use abundance::{parse_abundance, AbundanceMatrix, AbundanceTables};
pub use clinical::{parse_clinical, SampleRecord, Sex};
pub use sheet::{read_sheet, Sheet};
