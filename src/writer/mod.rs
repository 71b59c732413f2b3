//! Result artifacts: CSV tables for every analysis stage and the Parquet
//! tidy export.

pub mod csv;
pub mod parquet;
