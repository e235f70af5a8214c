//! Boundary geometries and the join between aggregated keys and feature
//! names.
//!
//! Both sides of the join are reduced with [`geometry_key`]; region names on
//! the aggregate side also lose their "Región de " prefix, which the boundary
//! files omit. A failed match is not an error: the feature keeps a zero
//! count.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::aggregate::{AggregateRow, GroupKey};
use crate::error::{IngestError, Result};
use crate::normalize::{geometry_key, normalize, strip_leading_phrase};

/// Leading phrases removed from region names before joining.
pub const REGION_PREFIXES: &[&str] = &["REGIÓN DE ", "REGION DE "];

/// Administrative levels that have boundary geometries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminLevel {
    Region,
    Prefecture,
    Comuna,
}

impl AdminLevel {
    pub const ALL: [AdminLevel; 3] = [AdminLevel::Region, AdminLevel::Prefecture, AdminLevel::Comuna];

    pub const fn label(self) -> &'static str {
        match self {
            AdminLevel::Region => "Región",
            AdminLevel::Prefecture => "Prefectura",
            AdminLevel::Comuna => "Comuna",
        }
    }

    pub const fn group_key(self) -> GroupKey {
        match self {
            AdminLevel::Region => GroupKey::Region,
            AdminLevel::Prefecture => GroupKey::Prefecture,
            AdminLevel::Comuna => GroupKey::Comuna,
        }
    }

    pub const fn boundary_file(self) -> &'static str {
        match self {
            AdminLevel::Region => "regiones.geojson",
            AdminLevel::Prefecture => "prefecturas.geojson",
            AdminLevel::Comuna => "comunas.geojson",
        }
    }

    /// Feature property holding the unit name.
    pub const fn name_property(self) -> &'static str {
        self.label()
    }

    pub const fn aggregate_prefixes(self) -> &'static [&'static str] {
        match self {
            AdminLevel::Region => REGION_PREFIXES,
            AdminLevel::Prefecture | AdminLevel::Comuna => &[],
        }
    }
}

impl FromStr for AdminLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "region" => Ok(AdminLevel::Region),
            "prefectura" | "prefecture" => Ok(AdminLevel::Prefecture),
            "comuna" => Ok(AdminLevel::Comuna),
            other => Err(format!("unknown level '{other}', expected region, prefectura or comuna")),
        }
    }
}

/// Map measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Measure {
    #[default]
    Count,
    RelativeIndex,
}

impl FromStr for Measure {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "count" | "total" | "n_det" => Ok(Measure::Count),
            "relative_index" | "index" | "dpi" => Ok(Measure::RelativeIndex),
            other => Err(format!("unknown measure '{other}', expected count or relative_index")),
        }
    }
}

/// One named polygon feature.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryFeature {
    pub name: String,
    pub geometry: Value,
    pub properties: Map<String, Value>,
}

/// Source of boundary geometries per level.
pub trait BoundaryProvider {
    /// `Ok(None)` when there is no geometry for `level`.
    fn features(&self, level: AdminLevel) -> Result<Option<Vec<BoundaryFeature>>>;
}

/// GeoJSON FeatureCollections stored as `<dir>/<level file>`.
#[derive(Debug, Clone)]
pub struct GeoJsonBoundaries {
    dir: PathBuf,
}

impl GeoJsonBoundaries {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, level: AdminLevel) -> PathBuf {
        self.dir.join(level.boundary_file())
    }
}

impl BoundaryProvider for GeoJsonBoundaries {
    fn features(&self, level: AdminLevel) -> Result<Option<Vec<BoundaryFeature>>> {
        let path = self.path_for(level);
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        parse_feature_collection(&path, &text, level.name_property()).map(Some)
    }
}

#[derive(Deserialize)]
struct RawCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    features: Vec<RawFeature>,
}

#[derive(Deserialize)]
struct RawFeature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    geometry: Value,
}

/// Parses a FeatureCollection, reading each name from `name_key`.
/// Features without that property get an empty name.
pub fn parse_feature_collection(path: &Path, text: &str, name_key: &str) -> Result<Vec<BoundaryFeature>> {
    let boundary_err = |message: String| IngestError::Boundary {
        file: path.display().to_string(),
        message,
    };
    let collection: RawCollection = serde_json::from_str(text).map_err(|e| boundary_err(e.to_string()))?;
    if collection.kind != "FeatureCollection" {
        return Err(boundary_err(format!("expected FeatureCollection, found {}", collection.kind)));
    }

    Ok(collection
        .features
        .into_iter()
        .map(|f| {
            let properties = f.properties.unwrap_or_default();
            let name = match properties.get(name_key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            BoundaryFeature {
                name,
                geometry: f.geometry,
                properties,
            }
        })
        .collect())
}

/// A boundary feature with its joined count and displayed value.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedFeature {
    pub name: String,
    pub geometry: Value,
    pub properties: Map<String, Value>,
    pub n_det: i64,
    pub value: f64,
}

/// Join key of an aggregate row at `level`.
pub fn aggregate_join_key(level: AdminLevel, key: &str) -> String {
    geometry_key(&strip_leading_phrase(key, level.aggregate_prefixes()))
}

/// Left join of `features` with `aggregates`, in feature order. Aggregate
/// keys that collide after normalization are summed; features without a
/// match get zero.
pub fn join_boundaries(
    level: AdminLevel,
    aggregates: &[AggregateRow],
    features: Vec<BoundaryFeature>,
) -> Vec<JoinedFeature> {
    let mut by_key: HashMap<String, i64> = HashMap::new();
    for row in aggregates {
        let sum = by_key.entry(aggregate_join_key(level, &row.key)).or_insert(0);
        *sum = sum.saturating_add(row.n_det);
    }

    let mut matched = 0usize;
    let joined: Vec<JoinedFeature> = features
        .into_iter()
        .map(|f| {
            let n_det = match by_key.get(&geometry_key(&f.name)) {
                Some(n) => {
                    matched += 1;
                    *n
                }
                None => 0,
            };
            JoinedFeature {
                name: f.name,
                geometry: f.geometry,
                properties: f.properties,
                n_det,
                value: n_det as f64,
            }
        })
        .collect();

    debug!(
        level = level.label(),
        features = joined.len(),
        matched,
        aggregate_keys = by_key.len(),
        "boundaries joined"
    );
    joined
}

/// Share of the total divided by the uniform share `1 / n`; 1.0 means the
/// unit got exactly its uniform share. A zero total gives all zeros.
pub fn relative_index(counts: &[i64]) -> Vec<f64> {
    let total = counts.iter().fold(0i64, |acc, &c| acc.saturating_add(c));
    if counts.is_empty() || total == 0 {
        return vec![0.0; counts.len()];
    }
    let uniform = 1.0 / counts.len() as f64;
    counts
        .iter()
        .map(|&c| (c as f64 / total as f64) / uniform)
        .collect()
}

/// Fills `value` with the selected measure. Counts are untouched.
pub fn apply_measure(joined: &mut [JoinedFeature], measure: Measure) {
    match measure {
        Measure::Count => {
            for f in joined.iter_mut() {
                f.value = f.n_det as f64;
            }
        }
        Measure::RelativeIndex => {
            let counts: Vec<i64> = joined.iter().map(|f| f.n_det).collect();
            for (f, index) in joined.iter_mut().zip(relative_index(&counts)) {
                f.value = index;
            }
        }
    }
}

/// Aggregates at `level` and joins against the provider's geometries.
/// `Ok(None)` when the provider has no geometry for the level.
pub fn build_map(
    level: AdminLevel,
    aggregates: &[AggregateRow],
    provider: &dyn BoundaryProvider,
    measure: Measure,
) -> Result<Option<Vec<JoinedFeature>>> {
    let Some(features) = provider.features(level)? else {
        return Ok(None);
    };
    let mut joined = join_boundaries(level, aggregates, features);
    apply_measure(&mut joined, measure);
    Ok(Some(joined))
}

/// GeoJSON FeatureCollection with `name`, `n_det` and `value` added to each
/// feature's properties.
pub fn to_feature_collection(joined: &[JoinedFeature]) -> Value {
    let features: Vec<Value> = joined
        .iter()
        .map(|f| {
            let mut properties = f.properties.clone();
            properties.insert("name".to_string(), json!(f.name));
            properties.insert("n_det".to_string(), json!(f.n_det));
            properties.insert("value".to_string(), json!(f.value));
            json!({
                "type": "Feature",
                "properties": properties,
                "geometry": f.geometry,
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}
