use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::schema::Field;

/// Month of a detention record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Month {
    Number(u32),
    /// Raw label, kept when the month stage is disabled.
    Label(String),
    Undefined,
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Month::Number(n) => write!(f, "{}", n),
            Month::Label(s) => f.write_str(s),
            Month::Undefined => Ok(()),
        }
    }
}

/// One row of the unified dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetentionRecord {
    /// Always the year from the source file name.
    pub year: i32,
    pub detained: Option<String>,
    pub region: Option<String>,
    pub province: Option<String>,
    pub comuna: Option<String>,
    pub zone: Option<String>,
    pub prefecture: Option<String>,
    pub detachment: Option<String>,
    pub month: Month,
    pub nationality: Option<String>,
    pub offense: Option<String>,
    pub detention_count: i64,
}

impl DetentionRecord {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            detained: None,
            region: None,
            province: None,
            comuna: None,
            zone: None,
            prefecture: None,
            detachment: None,
            month: Month::Undefined,
            nationality: None,
            offense: None,
            detention_count: 0,
        }
    }

    /// Text slot backing a free-text field; `None` for year, month and count.
    pub fn text_mut(&mut self, field: Field) -> Option<&mut Option<String>> {
        match field {
            Field::Detained => Some(&mut self.detained),
            Field::Region => Some(&mut self.region),
            Field::Province => Some(&mut self.province),
            Field::Comuna => Some(&mut self.comuna),
            Field::Zones => Some(&mut self.zone),
            Field::Prefecture => Some(&mut self.prefecture),
            Field::Detachment => Some(&mut self.detachment),
            Field::Nationality => Some(&mut self.nationality),
            Field::Offense => Some(&mut self.offense),
            Field::Year | Field::Month | Field::Count => None,
        }
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        match field {
            Field::Detained => self.detained.as_deref(),
            Field::Region => self.region.as_deref(),
            Field::Province => self.province.as_deref(),
            Field::Comuna => self.comuna.as_deref(),
            Field::Zones => self.zone.as_deref(),
            Field::Prefecture => self.prefecture.as_deref(),
            Field::Detachment => self.detachment.as_deref(),
            Field::Nationality => self.nationality.as_deref(),
            Field::Offense => self.offense.as_deref(),
            Field::Year | Field::Month | Field::Count => None,
        }
    }

    /// Export representation of `field`; missing values are empty.
    pub fn value(&self, field: Field) -> String {
        match field {
            Field::Year => self.year.to_string(),
            Field::Month => self.month.to_string(),
            Field::Count => self.detention_count.to_string(),
            other => self.text(other).unwrap_or_default().to_string(),
        }
    }
}

/// Per-file outcome of an assembly run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub file: String,
    pub year: i32,
    pub raw_rows: usize,
    pub kept_rows: usize,
    pub dropped_year_mismatch: usize,
}

/// The unified table plus what went into it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub records: Vec<DetentionRecord>,
    /// Output columns, in export order.
    pub columns: Vec<Field>,
    pub reports: Vec<FileReport>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted distinct nationality values.
    pub fn nationalities(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| r.nationality.as_deref())
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn total_detentions(&self) -> i64 {
        self.records
            .iter()
            .fold(0i64, |acc, r| acc.saturating_add(r.detention_count))
    }
}
