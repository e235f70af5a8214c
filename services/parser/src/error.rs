use thiserror::Error;

/// Failures that abort an ingestion run.
///
/// Data-quality problems inside a sheet (unparseable counts, unknown month
/// names, rows whose in-file year disagrees with the file name) are never
/// reported here; they are resolved by the coercion policy.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unexpected columns in {file}: expected {expected}, got {actual}")]
    SchemaMismatch {
        file: String,
        expected: usize,
        actual: usize,
    },

    #[error("File name '{file}' does not start with a four-digit year")]
    FilenameYear { file: String },

    #[error("Year {year} from file name '{file}' is outside {min}..={max}")]
    YearOutOfRange {
        file: String,
        year: i32,
        min: i32,
        max: i32,
    },

    #[error("Workbook {file} has no sheets")]
    NoSheets { file: String },

    #[error("Sheet in {file} has no header at row {row}")]
    MissingHeader { file: String, row: usize },

    #[error("Failed to read workbook {file}: {source}")]
    Workbook {
        file: String,
        #[source]
        source: calamine::Error,
    },

    #[error("Invalid boundary file {file}: {message}")]
    Boundary { file: String, message: String },

    #[error("Invalid setting {key}='{value}': {message}")]
    Config {
        key: String,
        value: String,
        message: String,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
