//! End-to-end runs over an in-memory workbook source.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use detenciones_parser::{
    aggregate, assemble, build_map, load_dataset, source::WORKBOOK_EXTENSIONS, to_feature_collection, write_csv, AdminLevel, BoundaryFeature,
    BoundaryProvider, ExportLayout, GroupKey, HeaderSchema, IngestError, Measure, Month,
    PipelineConfig, RawCell, RowSource,
};

#[derive(Default)]
struct MemorySource {
    sheets: HashMap<PathBuf, Vec<Vec<RawCell>>>,
}

impl MemorySource {
    fn with(mut self, path: &str, rows: Vec<Vec<RawCell>>) -> Self {
        self.sheets.insert(PathBuf::from(path), rows);
        self
    }
}

impl RowSource for MemorySource {
    fn read_rows(&self, path: &Path) -> detenciones_parser::Result<Vec<Vec<RawCell>>> {
        self.sheets
            .get(path)
            .cloned()
            .ok_or_else(|| IngestError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)))
    }
}

struct StaticBoundaries(Vec<BoundaryFeature>);

impl BoundaryProvider for StaticBoundaries {
    fn features(&self, level: AdminLevel) -> detenciones_parser::Result<Option<Vec<BoundaryFeature>>> {
        Ok((level == AdminLevel::Region).then(|| self.0.clone()))
    }
}

fn text(s: &str) -> RawCell {
    RawCell::from(s)
}

fn sheet(rows: Vec<Vec<RawCell>>) -> Vec<Vec<RawCell>> {
    let mut all: Vec<Vec<RawCell>> = vec![vec![text("DETENIDOS A NIVEL NACIONAL")]];
    all.extend(std::iter::repeat(Vec::new()).take(5));
    all.push(
        HeaderSchema::detenidos_v1()
            .labels
            .iter()
            .map(|l| text(l))
            .collect(),
    );
    all.extend(rows);
    all
}

fn row(region: &str, comuna: &str, year: f64, month: &str, nat: &str, total: RawCell) -> Vec<RawCell> {
    vec![
        RawCell::Empty,
        text("Detenido"),
        text(region),
        text("Provincia"),
        text(comuna),
        text("Zona"),
        text("Prefectura"),
        text("Destacamento"),
        RawCell::Number(year),
        text(month),
        text(nat),
        text("Hurto simple"),
        total,
    ]
}

fn source() -> MemorySource {
    MemorySource::default()
        .with(
            "data/2021_x.xlsb",
            sheet(vec![
                row("Región de Tarapacá", "Iquique", 2021.0, "Enero", "BOLIVIANA", RawCell::Number(3.0)),
                row("Región de Tarapacá", "Alto Hospicio", 2021.0, "Setiembre", "CHILENA", text("4")),
            ]),
        )
        .with(
            "data/2022_x.xlsb",
            sheet(vec![
                row("Región de Tarapacá", "Iquique", 2022.0, "Marzo", "BOLIVIANA", RawCell::Number(5.0)),
                row("Región de Antofagasta", "Calama", 2021.0, "Abril", "BOLIVIANA", RawCell::Number(50.0)),
                vec![RawCell::Empty; 13],
                row("Región de Antofagasta", "Calama", 2022.0, "Mayo", "PERUANA", text("s/i")),
            ]),
        )
}

fn files() -> Vec<PathBuf> {
    vec![PathBuf::from("data/2021_x.xlsb"), PathBuf::from("data/2022_x.xlsb")]
}

#[test]
fn test_two_files_with_year_mismatch() {
    let dataset = assemble(&source(), &files(), &PipelineConfig::default()).unwrap();

    assert_eq!(dataset.reports.len(), 2);
    assert_eq!(dataset.reports[0].kept_rows, 2);
    assert_eq!(dataset.reports[1].raw_rows, 3);
    assert_eq!(dataset.reports[1].kept_rows, 2);
    assert_eq!(dataset.reports[1].dropped_year_mismatch, 1);

    assert_eq!(dataset.len(), 4);
    let years: Vec<i32> = dataset.records.iter().map(|r| r.year).collect();
    assert_eq!(years, vec![2021, 2021, 2022, 2022]);

    let comunas: Vec<&str> = dataset.records.iter().filter_map(|r| r.comuna.as_deref()).collect();
    assert_eq!(comunas, vec!["Iquique", "Alto Hospicio", "Iquique", "Calama"]);

    assert_eq!(dataset.records[1].month, Month::Number(9));
    assert_eq!(dataset.records[3].detention_count, 0);
    assert_eq!(dataset.total_detentions(), 12);
}

#[test]
fn test_schema_mismatch_aborts_whole_run() {
    let mut bad = sheet(vec![]);
    bad[6].pop();
    let source = source().with("data/2023_x.xlsb", bad);
    let mut all = files();
    all.push(PathBuf::from("data/2023_x.xlsb"));

    let err = assemble(&source, &all, &PipelineConfig::default()).unwrap_err();
    assert_eq!(err.to_string(), "Unexpected columns in 2023_x.xlsb: expected 13, got 12");
}

#[test]
fn test_file_without_year_prefix_fails() {
    let source = MemorySource::default().with("data/detenidos.xlsb", sheet(vec![]));
    let err = assemble(&source, &[PathBuf::from("data/detenidos.xlsb")], &PipelineConfig::default())
        .unwrap_err();
    assert!(matches!(err, IngestError::FilenameYear { .. }));
}

#[test]
fn test_compact_export_without_months() {
    let config = PipelineConfig {
        layout: ExportLayout::Compact,
        convert_months: false,
        ..PipelineConfig::default()
    };
    let dataset = assemble(&source(), &files(), &config).unwrap();
    assert_eq!(dataset.records[0].month, Month::Label("Enero".to_string()));

    let mut buf = Vec::new();
    write_csv(&dataset, &mut buf).unwrap();
    let csv = String::from_utf8(buf).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "year,comuna,offense,nat,n_det");
    assert_eq!(lines[1], "2021,Iquique,Hurto simple,BOLIVIANA,3");
    assert_eq!(lines.len(), 5);
}

#[test]
fn test_aggregate_and_join_regions() {
    let dataset = assemble(&source(), &files(), &PipelineConfig::default()).unwrap();

    let rows = aggregate(&dataset.records, Some("bol"), GroupKey::Region);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].key, "Región de Tarapacá");
    assert_eq!(rows[0].n_det, 8);

    let boundaries = StaticBoundaries(
        ["Tarapacá", "Antofagasta"]
            .iter()
            .map(|name| BoundaryFeature {
                name: name.to_string(),
                geometry: serde_json::Value::Null,
                properties: serde_json::Map::new(),
            })
            .collect(),
    );

    let all = aggregate(&dataset.records, None, GroupKey::Region);
    let joined = build_map(AdminLevel::Region, &all, &boundaries, Measure::RelativeIndex)
        .unwrap()
        .unwrap();
    assert_eq!(joined[0].n_det, 12);
    assert_eq!(joined[1].n_det, 0);
    assert!((joined[0].value - 2.0).abs() < 1e-9);
    assert!(joined[1].value.abs() < 1e-9);

    let fc = to_feature_collection(&joined);
    assert_eq!(fc["features"].as_array().map(Vec::len), Some(2));

    assert!(build_map(AdminLevel::Comuna, &all, &boundaries, Measure::Count)
        .unwrap()
        .is_none());
}

#[test]
fn test_empty_data_dir_exports_header_only() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not a workbook").unwrap();

    let dataset = load_dataset(&MemorySource::default(), dir.path(), WORKBOOK_EXTENSIONS, &PipelineConfig::default())
        .unwrap();
    assert!(dataset.is_empty());
    assert!(dataset.reports.is_empty());
    assert_eq!(dataset.total_detentions(), 0);

    let mut out = Vec::new();
    write_csv(&dataset, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(
        text,
        "year,detained,region,province,comuna,zones,prefecture,detachment,month,nat,offense,n_det\n"
    );
}
