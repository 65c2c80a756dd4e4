//! In-memory vector layer handed to the caller.

use geo_types::Geometry;
use serde::{Deserialize, Serialize};

use crate::engine::SqlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    String,
    Integer,
    Double,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// One geometry with its attribute values, in field order.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub attributes: Vec<SqlValue>,
}

/// Receives a field schema, then features.
pub trait FeatureSink {
    fn set_fields(&mut self, fields: Vec<FieldDef>);

    fn add_feature(&mut self, feature: Feature);
}

#[derive(Debug, Clone, PartialEq)]
pub struct CensusLayer {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub features: Vec<Feature>,
    /// SQL that produced the layer, for query logs.
    pub query: Option<String>,
}

impl CensusLayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            features: Vec::new(),
            query: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Value of field `name` on feature `index`.
    pub fn attribute(&self, index: usize, name: &str) -> Option<&SqlValue> {
        let field = self.field_index(name)?;
        self.features.get(index)?.attributes.get(field)
    }
}

impl FeatureSink for CensusLayer {
    fn set_fields(&mut self, fields: Vec<FieldDef>) {
        self.fields = fields;
    }

    fn add_feature(&mut self, feature: Feature) {
        self.features.push(feature);
    }
}

/// `Censo {year} - {code} ({level})`, or the variable count when several.
pub fn layer_name(year: impl std::fmt::Display, variable_codes: &[String], level: impl std::fmt::Display) -> String {
    match variable_codes {
        [single] => format!("Censo {} - {} ({})", year, single, level),
        many => format!("Censo {} - {} variables ({})", year, many.len(), level),
    }
}
