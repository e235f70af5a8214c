//! Expected raw layout of the detention workbooks and the lookup tables that
//! map it onto canonical fields.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{IngestError, Result};
use crate::normalize::normalize;

/// Canonical, language-neutral field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Year,
    Detained,
    Region,
    Province,
    Comuna,
    Zones,
    Prefecture,
    Detachment,
    Month,
    Nationality,
    Offense,
    Count,
}

impl Field {
    pub const ALL: [Field; 12] = [
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
    ];

    /// Column name used in the exported table.
    pub const fn as_str(self) -> &'static str {
        match self {
            Field::Year => "year",
            Field::Detained => "detained",
            Field::Region => "region",
            Field::Province => "province",
            Field::Comuna => "comuna",
            Field::Zones => "zones",
            Field::Prefecture => "prefecture",
            Field::Detachment => "detachment",
            Field::Month => "month",
            Field::Nationality => "nat",
            Field::Offense => "offense",
            Field::Count => "n_det",
        }
    }
}

/// Ordered raw header labels a workbook must carry at its header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSchema {
    pub version: &'static str,
    pub labels: Vec<String>,
}

impl HeaderSchema {
    /// Layout of the "Detenidos_Nacional" yearly extracts. The first column
    /// has no label.
    pub fn detenidos_v1() -> Self {
        let labels = [
            "",
            "Detenido",
            "Región",
            "Provincia",
            "Comuna",
            "Zonas",
            "Prefectura",
            "Destacamentos",
            "Año",
            "Mes",
            "Nacionalidad",
            "Delitos o faltas",
            "Total",
        ];
        Self {
            version: "detenidos-v1",
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn arity(&self) -> usize {
        self.labels.len()
    }
}

impl Default for HeaderSchema {
    fn default() -> Self {
        Self::detenidos_v1()
    }
}

/// Normalized header label -> canonical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    entries: HashMap<String, Field>,
}

impl FieldMap {
    /// Builds a map from raw labels; keys are normalized on insert so
    /// accented and unaccented spellings collapse onto the same entry.
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, Field)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(label, field)| (normalize(label), field))
                .collect(),
        }
    }

    pub fn lookup(&self, label: &str) -> Option<Field> {
        self.entries.get(&normalize(label)).copied()
    }
}

impl Default for FieldMap {
    fn default() -> Self {
        Self::new([
            ("detenido", Field::Detained),
            ("región", Field::Region),
            ("region", Field::Region),
            ("provincia", Field::Province),
            ("comuna", Field::Comuna),
            ("zonas", Field::Zones),
            ("prefectura", Field::Prefecture),
            ("destacamentos", Field::Detachment),
            ("año", Field::Year),
            ("ano", Field::Year),
            ("anio", Field::Year),
            ("mes", Field::Month),
            ("nacionalidad", Field::Nationality),
            ("delitos o faltas", Field::Offense),
            ("total", Field::Count),
        ])
    }
}

/// Position of every canonical field in a reconciled sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    columns: Vec<Option<Field>>,
}

impl ColumnMap {
    pub fn position(&self, field: Field) -> Option<usize> {
        self.columns.iter().position(|c| *c == Some(field))
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.columns.iter().flatten().copied()
    }
}

/// Validates a raw header row against `schema` and maps it to fields.
///
/// The raw labels only count: on a width match they are replaced by the
/// schema labels positionally, then each label goes through `fields`.
/// Labels unknown to `fields` stay unmapped.
pub fn reconcile_headers(
    file: &str,
    raw_headers: &[String],
    schema: &HeaderSchema,
    fields: &FieldMap,
) -> Result<ColumnMap> {
    if raw_headers.len() != schema.arity() {
        return Err(IngestError::SchemaMismatch {
            file: file.to_string(),
            expected: schema.arity(),
            actual: raw_headers.len(),
        });
    }

    let columns: Vec<Option<Field>> = schema.labels.iter().map(|l| fields.lookup(l)).collect();
    debug!(
        file,
        schema = schema.version,
        mapped = columns.iter().flatten().count(),
        "headers reconciled"
    );
    Ok(ColumnMap { columns })
}

/// Localized month name -> month number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthTable {
    names: HashMap<String, u32>,
}

impl MonthTable {
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, u32)>) -> Self {
        Self {
            names: entries
                .into_iter()
                .map(|(name, n)| (normalize(name), n))
                .collect(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.names.get(&normalize(name)).copied()
    }
}

impl Default for MonthTable {
    fn default() -> Self {
        Self::new([
            ("enero", 1),
            ("febrero", 2),
            ("marzo", 3),
            ("abril", 4),
            ("mayo", 5),
            ("junio", 6),
            ("julio", 7),
            ("agosto", 8),
            ("septiembre", 9),
            ("setiembre", 9),
            ("octubre", 10),
            ("noviembre", 11),
            ("diciembre", 12),
        ])
    }
}
