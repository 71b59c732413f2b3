use arrow::array::{ArrayRef, Float64Builder, StringBuilder, UInt32Builder};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{WriterProperties, WriterVersion};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::reshape::TidyRow;
use crate::schema::schema_ref;

const BATCH_ROWS: usize = 64 * 1024;
const ZSTD_LEVEL: i32 = 3;

/// Column builders for one record batch of the tidy table.
struct TidyBuilders {
    protein: StringBuilder,
    sample: StringBuilder,
    subject: StringBuilder,
    replicate: UInt32Builder,
    sex: StringBuilder,
    treatment: StringBuilder,
    response: Float64Builder,
}

impl TidyBuilders {
    fn new(capacity: usize) -> Self {
        Self {
            protein: StringBuilder::with_capacity(capacity, capacity * 24),
            sample: StringBuilder::with_capacity(capacity, capacity * 16),
            subject: StringBuilder::with_capacity(capacity, capacity * 8),
            replicate: UInt32Builder::with_capacity(capacity),
            sex: StringBuilder::with_capacity(capacity, capacity * 2),
            treatment: StringBuilder::with_capacity(capacity, capacity * 10),
            response: Float64Builder::with_capacity(capacity),
        }
    }

    fn append(&mut self, row: &TidyRow) {
        self.protein.append_value(&row.protein);
        self.sample.append_value(&row.sample);
        self.subject.append_value(&row.subject);
        self.replicate.append_option(row.replicate);
        self.sex.append_value(row.sex.to_string());
        self.treatment.append_value(row.treatment.label());
        self.response.append_option(row.response);
    }

    fn finish(&mut self) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(self.protein.finish()),
            Arc::new(self.sample.finish()),
            Arc::new(self.subject.finish()),
            Arc::new(self.replicate.finish()),
            Arc::new(self.sex.finish()),
            Arc::new(self.treatment.finish()),
            Arc::new(self.response.finish()),
        ];
        Ok(RecordBatch::try_new(schema_ref(), columns)?)
    }
}

/// Write the tidy table to a zstd-compressed Parquet file.
pub fn write_tidy(rows: &[TidyRow], output: &Path) -> Result<usize> {
    let file = File::create(output)?;
    let props = writer_properties()?;
    let mut writer = ArrowWriter::try_new(file, schema_ref(), Some(props))?;

    for chunk in rows.chunks(BATCH_ROWS) {
        let mut builders = TidyBuilders::new(chunk.len());
        for row in chunk {
            builders.append(row);
        }
        writer.write(&builders.finish()?)?;
    }

    let file_metadata = writer.close()?;
    let total_bytes: i64 = file_metadata.row_groups.iter().map(|rg| rg.total_byte_size).sum();
    log::info!(
        "Wrote Parquet: {} ({} rows, {:.2} MB)",
        output.display(),
        rows.len(),
        total_bytes as f64 / (1024.0 * 1024.0)
    );

    Ok(rows.len())
}

fn writer_properties() -> Result<WriterProperties> {
    let zstd_level = ZstdLevel::try_new(ZSTD_LEVEL)
        .map_err(|e| PipelineError::Config(format!("invalid zstd level: {e}")))?;

    Ok(WriterProperties::builder()
        .set_writer_version(WriterVersion::PARQUET_2_0)
        .set_compression(Compression::ZSTD(zstd_level))
        // Protein, subject and group columns repeat heavily
        .set_dictionary_enabled(true)
        .set_max_row_group_size(BATCH_ROWS)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::Treatment;
    use crate::ingest::Sex;
    use parquet::file::reader::{FileReader, SerializedFileReader};

    #[test]
    fn writes_readable_parquet() {
        let dir = std::env::temp_dir().join("swath_pipeline_test_parquet");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tidy.parquet");

        let rows: Vec<TidyRow> = (0..5)
            .map(|i| TidyRow {
                protein: format!("sp|P{i}|X_PIG"),
                sample: "2343_sample 1".into(),
                subject: "2343".into(),
                replicate: Some(1),
                sex: Sex::Female,
                treatment: Treatment::HiHthSc,
                response: if i == 2 { None } else { Some(i as f64) },
            })
            .collect();

        assert_eq!(write_tidy(&rows, &path).unwrap(), 5);

        let reader = SerializedFileReader::new(File::open(&path).unwrap()).unwrap();
        let meta = reader.metadata().file_metadata();
        assert_eq!(meta.num_rows(), 5);
        assert_eq!(meta.schema_descr().num_columns(), 7);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
