//! Per-year dataset registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default location of the published census Parquet files.
pub const DEFAULT_BASE_URL: &str = "https://data.source.coop/nlebovits/censo-argentino";

const ENTITY_TYPES: &[&str] = &["HOGAR", "PERSONA", "VIVIENDA"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown census year '{0}' (available: 2022, 2010)")]
pub struct UnknownYearError(pub String);

/// A census year with published data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CensusYear {
    #[serde(rename = "2022")]
    Y2022,
    #[serde(rename = "2010")]
    Y2010,
}

impl CensusYear {
    /// Available years, most recent first.
    pub const ALL: [CensusYear; 2] = [CensusYear::Y2022, CensusYear::Y2010];

    pub fn as_str(&self) -> &'static str {
        match self {
            CensusYear::Y2022 => "2022",
            CensusYear::Y2010 => "2010",
        }
    }

    /// Name of the native radio identifier column in this year's geometry table.
    pub fn geo_id_column(&self) -> &'static str {
        match self {
            CensusYear::Y2022 => "COD_2022",
            CensusYear::Y2010 => "COD_2010",
        }
    }

    /// Build the dataset description for this year rooted at `base_url`.
    pub fn schema(&self, base_url: &str) -> CensusYearSchema {
        let base = base_url.trim_end_matches('/');
        let year = self.as_str();
        CensusYearSchema {
            year: *self,
            geo_id_column: self.geo_id_column().to_string(),
            entity_types: ENTITY_TYPES.iter().map(|e| e.to_string()).collect(),
            urls: DataUrls {
                fact_table: format!("{}/{}/census-data.parquet", base, year),
                metadata_table: format!("{}/{}/metadata.parquet", base, year),
                geometry_table: format!("{}/{}/radios.parquet", base, year),
            },
        }
    }
}

impl Default for CensusYear {
    fn default() -> Self {
        CensusYear::Y2022
    }
}

impl fmt::Display for CensusYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CensusYear {
    type Err = UnknownYearError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "2022" => Ok(CensusYear::Y2022),
            "2010" => Ok(CensusYear::Y2010),
            other => Err(UnknownYearError(other.to_string())),
        }
    }
}

/// Remote locations of the three tables published for a year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataUrls {
    /// One row per geographic unit x variable x category, with a count.
    pub fact_table: String,
    /// Variable codes, labels, entity types and category labels.
    pub metadata_table: String,
    /// Base geographic units (radios) with hierarchy keys and polygons.
    pub geometry_table: String,
}

/// Immutable description of one census year's datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusYearSchema {
    pub year: CensusYear,
    pub geo_id_column: String,
    pub entity_types: Vec<String>,
    pub urls: DataUrls,
}
