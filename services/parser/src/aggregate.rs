use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;

use crate::normalize::normalize;
use crate::record::DetentionRecord;
use crate::schema::Field;

/// Administrative field a table can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Region,
    Province,
    Comuna,
    Zone,
    Prefecture,
    Detachment,
}

impl GroupKey {
    pub const fn field(self) -> Field {
        match self {
            GroupKey::Region => Field::Region,
            GroupKey::Province => Field::Province,
            GroupKey::Comuna => Field::Comuna,
            GroupKey::Zone => Field::Zones,
            GroupKey::Prefecture => Field::Prefecture,
            GroupKey::Detachment => Field::Detachment,
        }
    }
}

impl FromStr for GroupKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "region" => Ok(GroupKey::Region),
            "province" | "provincia" => Ok(GroupKey::Province),
            "comuna" => Ok(GroupKey::Comuna),
            "zone" | "zones" | "zona" | "zonas" => Ok(GroupKey::Zone),
            "prefecture" | "prefectura" => Ok(GroupKey::Prefecture),
            "detachment" | "destacamento" | "destacamentos" => Ok(GroupKey::Detachment),
            other => Err(format!("unknown administrative key '{other}'")),
        }
    }
}

/// Summed detentions for one administrative unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateRow {
    pub key: String,
    pub n_det: i64,
}

/// Case-insensitive substring match on nationality. A record without
/// nationality never matches.
pub fn nationality_matches(record: &DetentionRecord, needle_lower: &str) -> bool {
    record
        .nationality
        .as_deref()
        .is_some_and(|n| n.to_lowercase().contains(needle_lower))
}

/// Records surviving the optional nationality filter. A blank filter keeps
/// everything; otherwise the filter is matched as given, surrounding spaces
/// included.
pub fn filter_nationality<'a>(
    records: &'a [DetentionRecord],
    nationality: Option<&str>,
) -> Vec<&'a DetentionRecord> {
    match nationality.filter(|n| !n.trim().is_empty()) {
        Some(needle) => {
            let needle = needle.to_lowercase();
            records
                .iter()
                .filter(|r| nationality_matches(r, &needle))
                .collect()
        }
        None => records.iter().collect(),
    }
}

/// Sums `detention_count` per distinct value of `key` among the records that
/// pass the nationality filter. Rows without a value for `key` are skipped.
/// Output is sorted by key.
pub fn aggregate(
    records: &[DetentionRecord],
    nationality: Option<&str>,
    key: GroupKey,
) -> Vec<AggregateRow> {
    let field = key.field();
    let mut sums: BTreeMap<&str, i64> = BTreeMap::new();
    for record in filter_nationality(records, nationality) {
        let Some(value) = record.text(field).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        let sum = sums.entry(value).or_insert(0);
        *sum = sum.saturating_add(record.detention_count);
    }
    sums.into_iter()
        .map(|(key, n_det)| AggregateRow {
            key: key.to_string(),
            n_det,
        })
        .collect()
}
