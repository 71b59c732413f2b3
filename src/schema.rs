use arrow::datatypes::{DataType, Field, Schema};
use std::sync::Arc;

/// Creates the Arrow schema for the tidy long-form abundance table.
///
/// One row per (protein, sample):
/// - protein: Utf8 (peak name)
/// - sample: Utf8 (abundance column id)
/// - subject: Utf8
/// - replicate: UInt32 (absent for per-subject means)
/// - sex: Utf8 (M / F / NA)
/// - treatment: Utf8 (CONTROL, HI+HTH+PBS, HI+HTH+SC)
/// - response: Float64 (missing when not quantified)
pub fn create_tidy_schema() -> Schema {
    Schema::new(vec![
        Field::new("protein", DataType::Utf8, false),
        Field::new("sample", DataType::Utf8, false),
        Field::new("subject", DataType::Utf8, false),
        Field::new("replicate", DataType::UInt32, true),
        Field::new("sex", DataType::Utf8, false),
        Field::new("treatment", DataType::Utf8, false),
        Field::new("response", DataType::Float64, true),
    ])
}

/// Returns the Arc<Schema> for use with Arrow writers
pub fn schema_ref() -> Arc<Schema> {
    Arc::new(create_tidy_schema())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_has_expected_columns() {
        let schema = create_tidy_schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            vec!["protein", "sample", "subject", "replicate", "sex", "treatment", "response"]
        );
        assert!(schema.field_with_name("response").unwrap().is_nullable());
        assert!(!schema.field_with_name("protein").unwrap().is_nullable());
    }
}
