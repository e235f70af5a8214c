//! Raw workbook access and source file discovery.

use std::fmt;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use tracing::debug;

use crate::error::{IngestError, Result};

/// Extensions calamine can open (it auto-detects the format).
pub const WORKBOOK_EXTENSIONS: &[&str] = &["xlsb", "xlsx", "xlsm", "xls", "ods"];

/// Plausible calendar years for a source file name.
pub const MIN_YEAR: i32 = 2000;
pub const MAX_YEAR: i32 = 2100;

/// One untyped spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl RawCell {
    /// Empty cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Trimmed text content, `None` for blank cells.
    pub fn to_text(&self) -> Option<String> {
        match self {
            RawCell::Empty => None,
            RawCell::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for RawCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawCell::Empty => Ok(()),
            RawCell::Text(s) => f.write_str(s),
            // Whole floats print without the trailing ".0" a sheet never shows
            RawCell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            RawCell::Number(n) => write!(f, "{}", n),
            RawCell::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for RawCell {
    fn from(s: &str) -> Self {
        RawCell::Text(s.to_string())
    }
}

impl From<f64> for RawCell {
    fn from(n: f64) -> Self {
        RawCell::Number(n)
    }
}

impl From<&Data> for RawCell {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty => RawCell::Empty,
            Data::String(s) => RawCell::Text(s.clone()),
            Data::Float(f) => RawCell::Number(*f),
            Data::Int(i) => RawCell::Number(*i as f64),
            Data::Bool(b) => RawCell::Bool(*b),
            other => RawCell::Text(format!("{}", other)),
        }
    }
}

/// Anything that can hand back the rows of a workbook's first sheet.
///
/// Rows are absolute: row 0 is the first sheet row and column 0 is column A,
/// so header offsets and column counts do not depend on the used range.
pub trait RowSource {
    fn read_rows(&self, path: &Path) -> Result<Vec<Vec<RawCell>>>;
}

/// Reads `.xlsb`/`.xlsx`/`.xls`/`.ods` workbooks through calamine.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkbookSource;

impl RowSource for WorkbookSource {
    fn read_rows(&self, path: &Path) -> Result<Vec<Vec<RawCell>>> {
        let file = file_name(path);
        let workbook_err = |source: calamine::Error| IngestError::Workbook {
            file: file.clone(),
            source,
        };

        let mut workbook = open_workbook_auto(path).map_err(workbook_err)?;
        let sheet_names = workbook.sheet_names().to_vec();
        let sheet_name = sheet_names
            .first()
            .ok_or_else(|| IngestError::NoSheets { file: file.clone() })?;

        let range = workbook.worksheet_range(sheet_name).map_err(workbook_err)?;
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        debug!(
            file = %file,
            sheet = %sheet_name,
            rows = range.height(),
            cols = range.width(),
            start_row,
            start_col,
            "read sheet"
        );

        // calamine trims leading empty rows/columns from the used range
        let mut rows: Vec<Vec<RawCell>> = vec![Vec::new(); start_row as usize];
        for row in range.rows() {
            let mut cells = vec![RawCell::Empty; start_col as usize];
            cells.extend(row.iter().map(RawCell::from));
            rows.push(cells);
        }
        Ok(rows)
    }
}

/// File name used in error messages and reports.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Year encoded in the first four characters of the file name.
pub fn year_from_filename(path: &Path) -> Result<i32> {
    let file = file_name(path);
    let prefix: String = file.chars().take(4).collect();
    if prefix.len() != 4 || !prefix.chars().all(|c| c.is_ascii_digit()) {
        return Err(IngestError::FilenameYear { file });
    }
    let year: i32 = prefix
        .parse()
        .map_err(|_| IngestError::FilenameYear { file: file.clone() })?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(IngestError::YearOutOfRange {
            file,
            year,
            min: MIN_YEAR,
            max: MAX_YEAR,
        });
    }
    Ok(year)
}

fn has_year_prefix(name: &str) -> bool {
    name.len() >= 4 && name.bytes().take(4).all(|b| b.is_ascii_digit())
}

/// Lists `<yyyy><suffix>.<ext>` files under `dir`, sorted by file name.
/// Anything else in the directory is ignored.
pub fn discover_sources(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = file_name(&path);
        let ext_ok = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(&e)));
        if has_year_prefix(&name) && ext_ok {
            found.push(path);
        } else {
            debug!(file = %name, "skipping non-source file");
        }
    }
    found.sort_by_key(|p| file_name(p));
    Ok(found)
}
