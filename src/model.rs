//! Wire types for the feature API
//!
//! Response documents follow the OGC API - Features shapes: link
//! objects, collection metadata with spatial extents, and GeoJSON
//! feature collections with pagination metadata.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::bbox::BoundingBox;
use crate::geom::Geometry;

/// CRS identifier used for all collections.
pub const CRS84: &str = "http://www.opengis.net/def/crs/OGC/1.3/CRS84";

/// A typed hyperlink.
#[derive(Debug, Clone, Serialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Link {
    pub fn new(href: impl Into<String>, rel: &str, media_type: &str) -> Self {
        Self {
            href: href.into(),
            rel: rel.to_string(),
            media_type: Some(media_type.to_string()),
            title: None,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SpatialExtent {
    pub bbox: Vec<[f64; 4]>,
    pub crs: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemporalExtent {
    pub interval: Vec<[Option<String>; 2]>,
}

/// Spatial and temporal extent of a collection.
#[derive(Debug, Clone, Serialize)]
pub struct Extent {
    pub spatial: SpatialExtent,
    pub temporal: TemporalExtent,
}

impl Extent {
    /// Extent document for a bounding box; `None` (empty collection)
    /// falls back to the whole world.
    pub fn from_bbox(bbox: Option<BoundingBox>) -> Self {
        Self {
            spatial: SpatialExtent {
                bbox: vec![bbox.unwrap_or(BoundingBox::WORLD).to_array()],
                crs: CRS84.to_string(),
            },
            temporal: TemporalExtent {
                interval: vec![[None, None]],
            },
        }
    }
}

/// Collection metadata document.
#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    pub id: String,
    pub title: String,
    pub description: String,
    pub links: Vec<Link>,
    pub extent: Extent,
    #[serde(rename = "itemType")]
    pub item_type: String,
    pub crs: Vec<String>,
    #[serde(rename = "storageCrs")]
    pub storage_crs: String,
}

impl Collection {
    pub fn new(id: &str, links: Vec<Link>, extent: Extent) -> Self {
        // "road_segments" -> "Road Segments"
        let title = id
            .split('_')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            id: id.to_string(),
            title,
            description: format!("Geospatial features from the {} table", id),
            links,
            extent,
            item_type: "feature".to_string(),
            crs: vec![CRS84.to_string()],
            storage_crs: CRS84.to_string(),
        }
    }
}

/// `/collections` response document.
#[derive(Debug, Clone, Serialize)]
pub struct Collections {
    pub links: Vec<Link>,
    pub collections: Vec<Collection>,
}

/// Landing page document.
#[derive(Debug, Clone, Serialize)]
pub struct LandingPage {
    pub title: String,
    pub description: String,
    pub links: Vec<Link>,
}

/// Conformance declaration document.
#[derive(Debug, Clone, Serialize)]
pub struct Conformance {
    #[serde(rename = "conformsTo")]
    pub conforms_to: Vec<String>,
}

/// A GeoJSON feature. `geometry` is `null` when the stored geometry
/// could not be decoded into the supported subset.
#[derive(Debug, Clone, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub geometry: Option<Geometry>,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(id: Option<Value>, geometry: Option<Geometry>, properties: Map<String, Value>) -> Self {
        Self {
            kind: "Feature".to_string(),
            id,
            geometry,
            properties,
        }
    }
}

/// A GeoJSON feature collection page.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
    pub links: Vec<Link>,
    #[serde(rename = "timeStamp")]
    pub time_stamp: String,
    #[serde(rename = "numberReturned")]
    pub number_returned: usize,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>, links: Vec<Link>, time_stamp: String) -> Self {
        let number_returned = features.len();
        Self {
            kind: "FeatureCollection".to_string(),
            features,
            links,
            time_stamp,
            number_returned,
        }
    }
}
