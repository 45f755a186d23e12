//! Bounding-box parsing and validation
//!
//! The `bbox` query parameter is four comma-separated numbers in WGS84
//! degrees: `minx,miny,maxx,maxy`. A box with inverted axes is rejected
//! here, before any SQL is built.

use std::fmt;
use std::str::FromStr;

use geo_types::{LineString, Polygon};
use serde::Serialize;

use crate::{HexgateError, Result};

/// An axis-aligned bounding rectangle in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// The whole-world extent, used when a collection is empty.
    pub const WORLD: BoundingBox = BoundingBox {
        min_x: -180.0,
        min_y: -90.0,
        max_x: 180.0,
        max_y: 90.0,
    };

    /// Create a box, rejecting inverted axes and non-finite values.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        let values = [min_x, min_y, max_x, max_y];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(HexgateError::InvalidParameter(
                "bbox values must be finite numbers".to_string(),
            ));
        }
        if min_x > max_x || min_y > max_y {
            return Err(HexgateError::InvalidParameter(format!(
                "bbox min must not exceed max: {},{},{},{}",
                min_x, min_y, max_x, max_y
            )));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// The box as `[minx, miny, maxx, maxy]`, the order used in extent
    /// metadata.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    /// The closed corner ring as a geo-types polygon, counter-clockwise
    /// starting from the south-west corner.
    pub fn to_polygon(&self) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (self.min_x, self.min_y),
                (self.max_x, self.min_y),
                (self.max_x, self.max_y),
                (self.min_x, self.max_y),
                (self.min_x, self.min_y),
            ]),
            vec![],
        )
    }

    /// The corner ring as WKT, ready for `ST_GeomFromText`.
    pub fn to_wkt(&self) -> String {
        format!(
            "POLYGON(({} {}, {} {}, {} {}, {} {}, {} {}))",
            self.min_x,
            self.min_y,
            self.max_x,
            self.min_y,
            self.max_x,
            self.max_y,
            self.min_x,
            self.max_y,
            self.min_x,
            self.min_y
        )
    }

    /// True when the box has zero width or height. Such boxes are valid
    /// input but may defeat the covering tiler.
    pub fn is_degenerate(&self) -> bool {
        self.min_x == self.max_x || self.min_y == self.max_y
    }
}

impl FromStr for BoundingBox {
    type Err = HexgateError;

    fn from_str(s: &str) -> Result<Self> {
        let tokens: Vec<&str> = s.split(',').map(str::trim).collect();
        if tokens.len() != 4 {
            return Err(HexgateError::InvalidParameter(format!(
                "bbox must have 4 values, got {}",
                tokens.len()
            )));
        }
        let mut values = [0.0f64; 4];
        for (i, token) in tokens.iter().enumerate() {
            values[i] = token.parse().map_err(|_| {
                HexgateError::InvalidParameter(format!("bbox value is not a number: '{}'", token))
            })?;
        }
        Self::new(values[0], values[1], values[2], values[3])
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}
