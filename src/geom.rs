//! WKT geometry decoding and GeoJSON-shaped output
//!
//! The query engine returns geometries as well-known text
//! (`ST_AsText(ST_GeomFromWKB(...))`). This module decodes the supported
//! subset into a coordinate model that serializes directly as a GeoJSON
//! geometry object. Anything outside the subset (MULTI* variants,
//! geometry collections, unparseable text) becomes [`Geometry::Unsupported`]
//! with a logged warning: a feature without geometry must not abort an
//! otherwise valid page of results.
//!
//! Encoding is only needed for the bounding-box polygon fed to
//! `ST_GeomFromText` and for round-trip tests; it emits the same grammar
//! in reverse.

use std::str::FromStr;

use geo_types::Geometry as GeoGeometry;
use serde::Serialize;
use tracing::warn;

/// A decoded geometry in GeoJSON coordinate order `[x, y]`.
///
/// Serializes as a GeoJSON geometry object:
/// `{"type": "Point", "coordinates": [x, y]}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point([f64; 2]),
    LineString(Vec<[f64; 2]>),
    /// Outer ring first, then zero or more hole rings.
    Polygon(Vec<Vec<[f64; 2]>>),
    /// Marker for geometry kinds outside the supported subset. Callers
    /// render it as a null geometry.
    Unsupported,
}

impl Geometry {
    pub fn is_supported(&self) -> bool {
        !matches!(self, Geometry::Unsupported)
    }

    /// `Some(self)` for supported variants, `None` for the marker.
    pub fn into_supported(self) -> Option<Geometry> {
        match self {
            Geometry::Unsupported => None,
            geom => Some(geom),
        }
    }
}

/// Decode a WKT string into the supported geometry subset.
///
/// Never fails: unsupported or malformed input yields
/// [`Geometry::Unsupported`] and a warning.
pub fn decode_wkt(text: &str) -> Geometry {
    let parsed = match parse_wkt(text) {
        Ok(geom) => geom,
        Err(err) => {
            warn!(error = %err, "failed to parse WKT geometry");
            return Geometry::Unsupported;
        }
    };

    match parsed {
        GeoGeometry::Point(p) => Geometry::Point([p.x(), p.y()]),
        GeoGeometry::LineString(line) => {
            Geometry::LineString(line.0.iter().map(|c| [c.x, c.y]).collect())
        }
        GeoGeometry::Polygon(poly) => {
            let mut rings = Vec::with_capacity(1 + poly.interiors().len());
            rings.push(poly.exterior().0.iter().map(|c| [c.x, c.y]).collect());
            for hole in poly.interiors() {
                rings.push(hole.0.iter().map(|c| [c.x, c.y]).collect());
            }
            Geometry::Polygon(rings)
        }
        other => {
            warn!(
                kind = geometry_kind(&other),
                "unsupported WKT geometry type"
            );
            Geometry::Unsupported
        }
    }
}

/// Encode a supported geometry back to WKT. `None` for the marker.
pub fn encode_wkt(geom: &Geometry) -> Option<String> {
    match geom {
        Geometry::Point([x, y]) => Some(format!("POINT ({} {})", x, y)),
        Geometry::LineString(points) => Some(format!("LINESTRING ({})", join_pairs(points))),
        Geometry::Polygon(rings) => {
            let inner: Vec<String> = rings
                .iter()
                .map(|ring| format!("({})", join_pairs(ring)))
                .collect();
            Some(format!("POLYGON ({})", inner.join(", ")))
        }
        Geometry::Unsupported => None,
    }
}

fn join_pairs(points: &[[f64; 2]]) -> String {
    points
        .iter()
        .map(|[x, y]| format!("{} {}", x, y))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_wkt(text: &str) -> Result<GeoGeometry<f64>, String> {
    wkt::Wkt::from_str(text)
        .map_err(|e| format!("{:?}", e))
        .and_then(|w| w.try_into().map_err(|e| format!("{:?}", e)))
}

fn geometry_kind(geom: &GeoGeometry<f64>) -> &'static str {
    match geom {
        GeoGeometry::MultiPoint(_) => "MultiPoint",
        GeoGeometry::MultiLineString(_) => "MultiLineString",
        GeoGeometry::MultiPolygon(_) => "MultiPolygon",
        GeoGeometry::GeometryCollection(_) => "GeometryCollection",
        _ => "other",
    }
}
