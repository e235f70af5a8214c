//! Detention records normalization and aggregation.
//!
//! Yearly "Detenidos" workbooks are reconciled against a fixed header layout,
//! filtered on the in-file year, coerced to typed records and concatenated
//! into one dataset. The dataset can be exported as CSV or aggregated by
//! administrative unit and joined against boundary geometries.
//!
//! This crate must be DETERMINISTIC: same files + same config = same output.

pub mod aggregate;
pub mod coerce;
pub mod config;
pub mod error;
pub mod export;
pub mod geo;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod schema;
pub mod source;

pub use aggregate::{aggregate, filter_nationality, AggregateRow, GroupKey};
pub use config::Settings;
pub use error::{IngestError, Result};
pub use export::{export_csv, write_csv};
pub use geo::{
    build_map, join_boundaries, relative_index, to_feature_collection, AdminLevel, BoundaryFeature,
    BoundaryProvider, GeoJsonBoundaries, JoinedFeature, Measure,
};
pub use normalize::{geometry_key, normalize};
pub use pipeline::{assemble, load_dataset, ExportLayout, PipelineConfig};
pub use record::{Dataset, DetentionRecord, FileReport, Month};
pub use schema::{reconcile_headers, Field, FieldMap, HeaderSchema, MonthTable};
pub use source::{discover_sources, year_from_filename, RawCell, RowSource, WorkbookSource};
