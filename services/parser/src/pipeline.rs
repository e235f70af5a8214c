//! Per-file normalization (reconcile -> year filter -> coerce) and the
//! assembly of every file into one dataset.
//!
//! The run is all-or-nothing: the first file that fails reconciliation
//! aborts the assembly and no partial dataset is returned.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::coerce::{coerce_count, coerce_month, coerce_numeric, month_label};
use crate::error::{IngestError, Result};
use crate::record::{Dataset, DetentionRecord, FileReport};
use crate::schema::{reconcile_headers, ColumnMap, Field, FieldMap, HeaderSchema, MonthTable};
use crate::source::{discover_sources, file_name, year_from_filename, RawCell, RowSource};

/// Zero-based row index of the header in the source workbooks.
pub const DEFAULT_HEADER_ROW: usize = 6;

/// Column set of the exported table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportLayout {
    /// All twelve canonical fields.
    #[default]
    Full,
    /// `year, comuna, offense, nat, n_det`.
    Compact,
}

impl ExportLayout {
    pub fn fields(self) -> &'static [Field] {
        match self {
            ExportLayout::Full => &[
                Field::Year,
                Field::Detained,
                Field::Region,
                Field::Province,
                Field::Comuna,
                Field::Zones,
                Field::Prefecture,
                Field::Detachment,
                Field::Month,
                Field::Nationality,
                Field::Offense,
                Field::Count,
            ],
            ExportLayout::Compact => &[
                Field::Year,
                Field::Comuna,
                Field::Offense,
                Field::Nationality,
                Field::Count,
            ],
        }
    }
}

impl FromStr for ExportLayout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(ExportLayout::Full),
            "compact" => Ok(ExportLayout::Compact),
            other => Err(format!("unknown layout '{other}', expected full or compact")),
        }
    }
}

/// Everything a run depends on besides the files themselves.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub schema: HeaderSchema,
    pub fields: FieldMap,
    pub months: MonthTable,
    pub header_row: usize,
    /// Coerce month names to numbers; otherwise keep the raw label.
    pub convert_months: bool,
    pub layout: ExportLayout,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema: HeaderSchema::default(),
            fields: FieldMap::default(),
            months: MonthTable::default(),
            header_row: DEFAULT_HEADER_ROW,
            convert_months: true,
            layout: ExportLayout::default(),
        }
    }
}

/// A sheet cut at its header row.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<RawCell>>,
}

/// Splits raw sheet rows at `header_row` and drops fully blank data rows.
/// Data rows are padded or cut to the header width.
pub fn prepare_sheet(file: &str, mut rows: Vec<Vec<RawCell>>, header_row: usize) -> Result<SheetTable> {
    if rows.len() <= header_row {
        return Err(IngestError::MissingHeader {
            file: file.to_string(),
            row: header_row,
        });
    }
    let body = rows.split_off(header_row + 1);
    let header_cells = rows.pop().unwrap_or_default();
    let headers: Vec<String> = header_cells.iter().map(|c| c.to_string().trim().to_string()).collect();
    let width = headers.len();

    let rows = body
        .into_iter()
        .filter(|row| !row.iter().all(RawCell::is_blank))
        .map(|mut row| {
            row.resize(width, RawCell::Empty);
            row
        })
        .collect();

    Ok(SheetTable { headers, rows })
}

/// Output of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTable {
    pub records: Vec<DetentionRecord>,
    pub fields: BTreeSet<Field>,
    pub report: FileReport,
}

/// Runs one sheet through reconcile -> year filter -> coerce.
pub fn process_sheet(file: &str, year: i32, table: SheetTable, config: &PipelineConfig) -> Result<FileTable> {
    let columns = reconcile_headers(file, &table.headers, &config.schema, &config.fields)?;
    let raw_rows = table.rows.len();

    let rows = filter_year(&columns, table.rows, year);
    let dropped = raw_rows - rows.len();
    if dropped > 0 {
        debug!(file, year, dropped, "rows dropped by in-file year check");
    }

    let records: Vec<DetentionRecord> = rows
        .iter()
        .map(|row| coerce_row(&columns, row, year, config))
        .collect();

    let mut fields: BTreeSet<Field> = columns.fields().collect();
    fields.insert(Field::Year);
    fields.insert(Field::Count);

    let report = FileReport {
        file: file.to_string(),
        year,
        raw_rows,
        kept_rows: records.len(),
        dropped_year_mismatch: dropped,
    };
    Ok(FileTable {
        records,
        fields,
        report,
    })
}

/// Keeps rows whose in-file year equals `year`. Without a year column every
/// row passes.
pub fn filter_year(columns: &ColumnMap, rows: Vec<Vec<RawCell>>, year: i32) -> Vec<Vec<RawCell>> {
    let Some(pos) = columns.position(Field::Year) else {
        return rows;
    };
    let expected = f64::from(year);
    rows.into_iter()
        .filter(|row| row.get(pos).and_then(coerce_numeric) == Some(expected))
        .collect()
}

fn coerce_row(columns: &ColumnMap, row: &[RawCell], year: i32, config: &PipelineConfig) -> DetentionRecord {
    let mut record = DetentionRecord::new(year);
    for field in columns.fields() {
        let Some(cell) = columns.position(field).and_then(|p| row.get(p)) else {
            continue;
        };
        match field {
            // The in-file year only filtered; the file name wins.
            Field::Year => {}
            Field::Count => record.detention_count = coerce_count(cell),
            Field::Month if config.convert_months => record.month = coerce_month(cell, &config.months),
            Field::Month => record.month = month_label(cell),
            text => {
                if let Some(slot) = record.text_mut(text) {
                    *slot = cell.to_text();
                }
            }
        }
    }
    record
}

/// Reads, normalizes and concatenates `files` in the order given.
pub fn assemble(source: &dyn RowSource, files: &[PathBuf], config: &PipelineConfig) -> Result<Dataset> {
    let mut dataset = Dataset::default();
    let mut present: BTreeSet<Field> = [Field::Year, Field::Count].into_iter().collect();

    for path in files {
        let table = load_file(source, path, config)?;
        info!(
            file = %table.report.file,
            year = table.report.year,
            raw_rows = table.report.raw_rows,
            kept_rows = table.report.kept_rows,
            "file normalized"
        );
        present.extend(table.fields.iter().copied());
        dataset.records.extend(table.records);
        dataset.reports.push(table.report);
    }

    // With no files every layout column is kept, so the export is a full header
    dataset.columns = config
        .layout
        .fields()
        .iter()
        .copied()
        .filter(|f| files.is_empty() || present.contains(f))
        .collect();
    Ok(dataset)
}

/// Normalizes a single workbook.
pub fn load_file(source: &dyn RowSource, path: &Path, config: &PipelineConfig) -> Result<FileTable> {
    let file = file_name(path);
    let year = year_from_filename(path)?;
    let rows = source.read_rows(path)?;
    let table = prepare_sheet(&file, rows, config.header_row)?;
    process_sheet(&file, year, table, config)
}

/// Discovers every source under `dir` and assembles them, sorted by name.
pub fn load_dataset(source: &dyn RowSource, dir: &Path, extensions: &[&str], config: &PipelineConfig) -> Result<Dataset> {
    let files = discover_sources(dir, extensions)?;
    if files.is_empty() {
        warn!(dir = %dir.display(), "no source workbooks found");
    }
    assemble(source, &files, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Month;

    fn text(s: &str) -> RawCell {
        RawCell::from(s)
    }

    fn header_row() -> Vec<RawCell> {
        HeaderSchema::detenidos_v1()
            .labels
            .iter()
            .map(|l| if l.is_empty() { RawCell::Empty } else { text(l) })
            .collect()
    }

    fn data_row(year: RawCell, month: &str, nat: &str, total: RawCell) -> Vec<RawCell> {
        vec![
            RawCell::Empty,
            text("Detenido"),
            text("Región de Arica y Parinacota"),
            text("Arica"),
            text("Arica"),
            text("Zona Arica"),
            text("Pref. Arica"),
            text("1ra Comisaría"),
            year,
            text(month),
            text(nat),
            text("Hurto"),
            total,
        ]
    }

    fn sheet(rows: Vec<Vec<RawCell>>) -> Vec<Vec<RawCell>> {
        let mut all = vec![vec![text("Carabineros de Chile")], vec![], vec![], vec![], vec![], vec![]];
        all.push(header_row());
        all.extend(rows);
        all
    }

    // -------------------------------------------------------------------------
    // SHEET PREPARATION
    // -------------------------------------------------------------------------

    #[test]
    fn test_prepare_sheet_skips_preamble_and_blank_rows() {
        let rows = sheet(vec![
            data_row(RawCell::Number(2021.0), "Enero", "CHILENA", RawCell::Number(1.0)),
            vec![RawCell::Empty, text("  "), RawCell::Empty],
            vec![],
            data_row(RawCell::Number(2021.0), "Enero", "CHILENA", RawCell::Number(2.0)),
        ]);
        let table = prepare_sheet("2021.xlsb", rows, DEFAULT_HEADER_ROW).unwrap();
        assert_eq!(table.headers.len(), 13);
        assert_eq!(table.headers[8], "Año");
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn test_prepare_sheet_pads_short_rows() {
        let mut rows = sheet(vec![]);
        rows.push(vec![RawCell::Empty, text("Detenido")]);
        let table = prepare_sheet("2021.xlsb", rows, DEFAULT_HEADER_ROW).unwrap();
        assert_eq!(table.rows[0].len(), 13);
        assert_eq!(table.rows[0][12], RawCell::Empty);
    }

    #[test]
    fn test_prepare_sheet_missing_header() {
        let rows = vec![vec![text("solo preámbulo")]; 3];
        let err = prepare_sheet("2021.xlsb", rows, DEFAULT_HEADER_ROW).unwrap_err();
        assert!(matches!(err, IngestError::MissingHeader { row: 6, .. }));
    }

    // -------------------------------------------------------------------------
    // PER-FILE PIPELINE
    // -------------------------------------------------------------------------

    #[test]
    fn test_process_sheet_filters_and_coerces() {
        let rows = sheet(vec![
            data_row(RawCell::Number(2022.0), "Septiembre", "BOLIVIANA", text("5")),
            data_row(RawCell::Number(2021.0), "Enero", "PERUANA", text("7")),
            data_row(text("2022"), "Sin mes", "CHILENA", text("abc")),
        ]);
        let config = PipelineConfig::default();
        let table = prepare_sheet("2022_x.xlsb", rows, config.header_row).unwrap();
        let out = process_sheet("2022_x.xlsb", 2022, table, &config).unwrap();

        assert_eq!(out.report.raw_rows, 3);
        assert_eq!(out.report.kept_rows, 2);
        assert_eq!(out.report.dropped_year_mismatch, 1);

        let first = &out.records[0];
        assert_eq!(first.year, 2022);
        assert_eq!(first.month, Month::Number(9));
        assert_eq!(first.nationality.as_deref(), Some("BOLIVIANA"));
        assert_eq!(first.region.as_deref(), Some("Región de Arica y Parinacota"));
        assert_eq!(first.detachment.as_deref(), Some("1ra Comisaría"));
        assert_eq!(first.detention_count, 5);

        let second = &out.records[1];
        assert_eq!(second.month, Month::Undefined);
        assert_eq!(second.detention_count, 0);
    }

    #[test]
    fn test_process_sheet_keeps_raw_month_without_month_stage() {
        let rows = sheet(vec![data_row(RawCell::Number(2021.0), "Marzo", "CHILENA", text("1"))]);
        let config = PipelineConfig {
            convert_months: false,
            ..PipelineConfig::default()
        };
        let table = prepare_sheet("2021.xlsb", rows, config.header_row).unwrap();
        let out = process_sheet("2021.xlsb", 2021, table, &config).unwrap();
        assert_eq!(out.records[0].month, Month::Label("Marzo".to_string()));
    }

    #[test]
    fn test_process_sheet_without_year_column_keeps_all_rows() {
        let config = PipelineConfig {
            schema: HeaderSchema {
                version: "test",
                labels: vec!["Comuna".into(), "Año".into(), "Total".into()],
            },
            fields: FieldMap::new([("comuna", Field::Comuna), ("total", Field::Count)]),
            ..PipelineConfig::default()
        };
        let table = SheetTable {
            headers: vec![String::new(); 3],
            rows: vec![
                vec![text("Arica"), RawCell::Number(1999.0), RawCell::Number(2.0)],
                vec![text("Iquique"), text("otro"), RawCell::Number(3.0)],
            ],
        };
        let out = process_sheet("2021.xlsb", 2021, table, &config).unwrap();
        assert_eq!(out.records.len(), 2);
        assert!(out.records.iter().all(|r| r.year == 2021));
        assert!(!out.fields.contains(&Field::Region));
        assert!(out.fields.contains(&Field::Comuna));
    }

    #[test]
    fn test_process_sheet_schema_mismatch() {
        let table = SheetTable {
            headers: vec![String::new(); 12],
            rows: vec![],
        };
        let err = process_sheet("2021.xlsb", 2021, table, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            IngestError::SchemaMismatch {
                expected: 13,
                actual: 12,
                ..
            }
        ));
    }

    #[test]
    fn test_year_filter_non_numeric_in_file_year_dropped() {
        let config = PipelineConfig::default();
        let rows = sheet(vec![
            data_row(text("n/a"), "Enero", "CHILENA", text("1")),
            data_row(RawCell::Empty, "Enero", "CHILENA", text("1")),
            data_row(RawCell::Number(2021.5), "Enero", "CHILENA", text("1")),
        ]);
        let table = prepare_sheet("2021.xlsb", rows, config.header_row).unwrap();
        let out = process_sheet("2021.xlsb", 2021, table, &config).unwrap();
        assert!(out.records.is_empty());
        assert_eq!(out.report.dropped_year_mismatch, 3);
    }

    // -------------------------------------------------------------------------
    // LAYOUTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_layout_columns() {
        let names: Vec<&str> = ExportLayout::Compact.fields().iter().map(|f| f.as_str()).collect();
        assert_eq!(names, vec!["year", "comuna", "offense", "nat", "n_det"]);
        assert_eq!(ExportLayout::Full.fields().len(), 12);
    }

    #[test]
    fn test_layout_from_str() {
        assert_eq!("FULL".parse::<ExportLayout>(), Ok(ExportLayout::Full));
        assert_eq!("compact".parse::<ExportLayout>(), Ok(ExportLayout::Compact));
        assert!("wide".parse::<ExportLayout>().is_err());
    }
}
