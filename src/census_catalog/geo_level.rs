//! Geographic aggregation levels.
//!
//! Every level is derived from the base unit (radio censal) by grouping on a
//! prefix of the hierarchy key columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hierarchy key columns of the base geographic unit, coarsest first.
pub const BASE_UNIT_COLUMNS: [&str; 4] = ["PROV", "DEPTO", "FRACC", "RADIO"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown geographic level '{0}' (expected RADIO, FRACC, DEPTO or PROV)")]
pub struct UnknownGeoLevelError(pub String);

/// Granularity of the output layer, finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GeoLevel {
    Radio,
    Fracc,
    Depto,
    Prov,
}

/// Shape of one level: which key columns it groups by and whether
/// base-unit geometries have to be unioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelLayout {
    pub group_columns: &'static [&'static str],
    pub dissolve: bool,
}

impl GeoLevel {
    pub const ALL: [GeoLevel; 4] = [GeoLevel::Radio, GeoLevel::Fracc, GeoLevel::Depto, GeoLevel::Prov];

    pub fn as_str(&self) -> &'static str {
        match self {
            GeoLevel::Radio => "RADIO",
            GeoLevel::Fracc => "FRACC",
            GeoLevel::Depto => "DEPTO",
            GeoLevel::Prov => "PROV",
        }
    }

    pub fn layout(&self) -> LevelLayout {
        match self {
            GeoLevel::Radio => LevelLayout {
                group_columns: &BASE_UNIT_COLUMNS,
                dissolve: false,
            },
            GeoLevel::Fracc => LevelLayout {
                group_columns: &BASE_UNIT_COLUMNS[..3],
                dissolve: true,
            },
            GeoLevel::Depto => LevelLayout {
                group_columns: &BASE_UNIT_COLUMNS[..2],
                dissolve: true,
            },
            GeoLevel::Prov => LevelLayout {
                group_columns: &BASE_UNIT_COLUMNS[..1],
                dissolve: true,
            },
        }
    }

    /// Number of dash-separated parts in a filter code for this level.
    ///
    /// RADIO codes are the year's native identifier, a single opaque part.
    pub fn filter_code_parts(&self) -> usize {
        match self {
            GeoLevel::Radio | GeoLevel::Prov => 1,
            GeoLevel::Depto => 2,
            GeoLevel::Fracc => 3,
        }
    }

    /// Output identifier expression, qualified against `alias`.
    ///
    /// RADIO uses the native id column, coarser levels dash-join their keys.
    pub fn id_expression(&self, alias: &str, geo_id_column: &str) -> String {
        match self {
            GeoLevel::Radio => format!("{}.{}", alias, geo_id_column),
            GeoLevel::Prov => format!("{}.PROV", alias),
            GeoLevel::Fracc | GeoLevel::Depto => self
                .layout()
                .group_columns
                .iter()
                .map(|col| format!("{}.{}", alias, col))
                .collect::<Vec<_>>()
                .join(" || '-' || "),
        }
    }
}

impl fmt::Display for GeoLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeoLevel {
    type Err = UnknownGeoLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "RADIO" => Ok(GeoLevel::Radio),
            "FRACC" => Ok(GeoLevel::Fracc),
            "DEPTO" => Ok(GeoLevel::Depto),
            "PROV" => Ok(GeoLevel::Prov),
            _ => Err(UnknownGeoLevelError(s.to_string())),
        }
    }
}
