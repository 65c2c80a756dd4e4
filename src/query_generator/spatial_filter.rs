//! Bounding-box filter.
//!
//! Polygon literals are not bindable like scalars, so the coordinates are
//! embedded as text. They are `f64`s checked to be finite, never free text.

use serde::{Deserialize, Serialize};

use super::common::{qualified_column, GEOMETRY_ALIAS};
use super::errors::QueryGeneratorError;

/// Axis-aligned box in EPSG:4326 (lon/lat).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BoundingBox {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Result<Self, QueryGeneratorError> {
        let bbox = Self {
            xmin,
            ymin,
            xmax,
            ymax,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn validate(&self) -> Result<(), QueryGeneratorError> {
        let finite = [self.xmin, self.ymin, self.xmax, self.ymax]
            .iter()
            .all(|v| v.is_finite());
        if finite && self.xmin <= self.xmax && self.ymin <= self.ymax {
            Ok(())
        } else {
            Err(QueryGeneratorError::InvalidBoundingBox {
                xmin: self.xmin,
                ymin: self.ymin,
                xmax: self.xmax,
                ymax: self.ymax,
            })
        }
    }

    /// Closed ring: min/min, max/min, max/max, min/max, min/min.
    pub fn to_wkt(&self) -> String {
        let ring = [
            (self.xmin, self.ymin),
            (self.xmax, self.ymin),
            (self.xmax, self.ymax),
            (self.xmin, self.ymax),
            (self.xmin, self.ymin),
        ];
        let coords = ring
            .iter()
            .map(|(x, y)| format!("{} {}", x, y))
            .collect::<Vec<_>>()
            .join(", ");
        format!("POLYGON(({}))", coords)
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {}, {})", self.xmin, self.ymin, self.xmax, self.ymax)
    }
}

/// Intersects predicate against the geometry-side column, or empty for `None`.
pub fn build_spatial_filter(bbox: Option<&BoundingBox>) -> Result<String, QueryGeneratorError> {
    let Some(bbox) = bbox else {
        return Ok(String::new());
    };
    bbox.validate()?;
    Ok(format!(
        "ST_Intersects({}, ST_GeomFromText('{}'))",
        qualified_column(GEOMETRY_ALIAS, "geometry"),
        bbox.to_wkt()
    ))
}
