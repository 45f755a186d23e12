//! Feature query orchestration
//!
//! [`FeatureService`] is the entry point used by the HTTP surface and
//! the CLI. For each query it validates the collection and parameters,
//! computes the partition covering, assembles validated SQL, executes
//! it through the worker pool, and shapes the result into a GeoJSON
//! page or an Arrow stream.
//!
//! Pagination intentionally uses the returned==limit heuristic: a
//! `next` link is emitted exactly when the page is full, which can
//! produce one superfluous `next` when a collection ends on a page
//! boundary. That trade avoids a second existence probe per request.

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::bbox::BoundingBox;
use crate::config::ServiceConfig;
use crate::cover;
use crate::engine::{EnginePool, JsonRow};
use crate::extent::ExtentResolver;
use crate::geom::{self, Geometry};
use crate::model::{Collection, Collections, Extent, Feature, FeatureCollection, Link};
use crate::sql::{self, TableRef};
use crate::{HexgateError, Result};

/// Output encoding for a feature query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    GeoJson,
    Arrow,
}

impl FromStr for OutputFormat {
    type Err = HexgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" | "geojson" => Ok(OutputFormat::GeoJson),
            "arrow" => Ok(OutputFormat::Arrow),
            other => Err(HexgateError::InvalidParameter(format!(
                "unknown output format: '{}'",
                other
            ))),
        }
    }
}

/// A validated-on-construction, immutable feature query.
#[derive(Debug, Clone)]
pub struct FeatureQuery {
    pub collection: String,
    pub bbox: Option<BoundingBox>,
    /// `None` means the configured default page size.
    pub limit: Option<usize>,
    pub offset: usize,
    /// Property columns to project; `None` selects everything.
    pub properties: Option<Vec<String>>,
    pub format: OutputFormat,
}

impl FeatureQuery {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            bbox: None,
            limit: None,
            offset: 0,
            properties: None,
            format: OutputFormat::GeoJson,
        }
    }
}

/// Result of a feature query.
pub enum QueryOutput {
    Page(FeatureCollection),
    Arrow(Vec<u8>),
}

pub struct FeatureService {
    pool: Arc<EnginePool>,
    extents: ExtentResolver,
    config: ServiceConfig,
}

impl FeatureService {
    pub fn new(pool: Arc<EnginePool>, config: ServiceConfig) -> Self {
        let extents = ExtentResolver::new(pool.clone());
        Self {
            pool,
            extents,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn extents(&self) -> &ExtentResolver {
        &self.extents
    }

    /// Table names in the configured catalog schema.
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        let statement = sql::listing_select(&self.config.catalog, &self.config.schema)?;
        let rows = self.pool.query_rows(&statement).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("table_name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// The `/collections` document.
    pub async fn collections_document(&self) -> Result<Collections> {
        let names = self.list_collections().await?;
        let mut collections = Vec::with_capacity(names.len());
        for name in &names {
            collections.push(self.build_collection(name).await);
        }
        Ok(Collections {
            links: vec![Link::new(
                format!("{}/collections", self.base_url()),
                "self",
                "application/json",
            )],
            collections,
        })
    }

    /// The `/collections/{id}` document. `NotFound` for unknown ids.
    pub async fn collection_document(&self, id: &str) -> Result<Collection> {
        self.require_collection(id).await?;
        Ok(self.build_collection(id).await)
    }

    /// The cached spatial extent of a collection; `None` when empty.
    pub async fn collection_extent(&self, id: &str) -> Result<Option<BoundingBox>> {
        self.require_collection(id).await?;
        let table = self.table_ref(id);
        self.extents
            .resolve(&table, &self.config.geometry_column)
            .await
    }

    /// Execute a feature query and shape the result.
    pub async fn query_features(&self, query: &FeatureQuery) -> Result<QueryOutput> {
        let limit = self.resolve_limit(query.limit)?;
        if let Some(properties) = &query.properties {
            sql::validate_projection(properties)?;
        }
        if query.format == OutputFormat::Arrow && !self.config.enable_arrow {
            return Err(HexgateError::InvalidParameter(
                "Arrow output is not enabled".to_string(),
            ));
        }

        self.require_collection(&query.collection).await?;
        let table = self.table_ref(&query.collection);

        // Pruning is an optimization only: a failed covering degrades to
        // the exact filter over every partition.
        let cells = match &query.bbox {
            Some(bbox) => match cover::bbox_cells(bbox, self.config.h3_resolution) {
                Ok(cells) => cells,
                Err(err) => {
                    warn!(bbox = %bbox, error = %err, "partition pruning degraded to full scan");
                    BTreeSet::new()
                }
            },
            None => BTreeSet::new(),
        };

        let filter = sql::spatial_filter(
            query.bbox.as_ref(),
            &cells,
            &self.config.geometry_column,
            &self.config.cell_column,
        )?;

        match query.format {
            OutputFormat::Arrow => {
                let statement = sql::bulk_select(&table, &filter, limit, query.offset)?;
                let bytes = self.pool.query_ipc(&statement).await?;
                Ok(QueryOutput::Arrow(bytes))
            }
            OutputFormat::GeoJson => {
                let statement = sql::feature_select(
                    &table,
                    query.properties.as_deref(),
                    &filter,
                    &self.config.geometry_column,
                    limit,
                    query.offset,
                )?;
                let rows = self.pool.query_rows(&statement).await?;
                let features: Vec<Feature> = rows
                    .into_iter()
                    .map(|row| self.feature_from_row(row))
                    .collect();
                let links = self.page_links(query, limit, features.len());
                Ok(QueryOutput::Page(FeatureCollection::new(
                    features,
                    links,
                    now_utc(),
                )))
            }
        }
    }

    async fn require_collection(&self, id: &str) -> Result<()> {
        let names = self.list_collections().await?;
        if names.iter().any(|name| name == id) {
            Ok(())
        } else {
            Err(HexgateError::NotFound(id.to_string()))
        }
    }

    async fn build_collection(&self, id: &str) -> Collection {
        let table = self.table_ref(id);
        let extent = match self
            .extents
            .resolve(&table, &self.config.geometry_column)
            .await
        {
            Ok(extent) => extent,
            Err(err) => {
                warn!(collection = id, error = %err, "could not compute extent");
                None
            }
        };
        let base = self.base_url();
        let links = vec![
            Link::new(
                format!("{}/collections/{}", base, id),
                "self",
                "application/json",
            ),
            Link::new(
                format!("{}/collections/{}/items", base, id),
                "items",
                "application/geo+json",
            ),
        ];
        Collection::new(id, links, Extent::from_bbox(extent))
    }

    fn feature_from_row(&self, mut row: JsonRow) -> Feature {
        let geometry = row
            .remove("geom_wkt")
            .and_then(|value| value.as_str().map(str::to_string))
            .map(|text| geom::decode_wkt(&text))
            .and_then(Geometry::into_supported);

        row.remove(&self.config.cell_column);
        row.remove(&self.config.geometry_column);

        let id = row.get("id").cloned();
        Feature::new(id, geometry, row)
    }

    fn page_links(&self, query: &FeatureQuery, limit: usize, returned: usize) -> Vec<Link> {
        let base = format!("{}/collections/{}/items", self.base_url(), query.collection);

        let mut self_params = Vec::new();
        if let Some(bbox) = &query.bbox {
            self_params.push(format!("bbox={}", bbox));
        }
        if limit != self.config.default_limit {
            self_params.push(format!("limit={}", limit));
        }
        if query.offset > 0 {
            self_params.push(format!("offset={}", query.offset));
        }
        let mut links = vec![Link::new(
            href_with(&base, &self_params),
            "self",
            "application/geo+json",
        )];

        // A full page gets a next link. When the collection ends exactly
        // on a page boundary this emits one superfluous link whose page
        // turns out empty.
        if returned == limit {
            let mut next_params = Vec::new();
            if let Some(bbox) = &query.bbox {
                next_params.push(format!("bbox={}", bbox));
            }
            next_params.push(format!("limit={}", limit));
            next_params.push(format!("offset={}", query.offset + limit));
            links.push(Link::new(
                href_with(&base, &next_params),
                "next",
                "application/geo+json",
            ));
        }
        links
    }

    fn resolve_limit(&self, limit: Option<usize>) -> Result<usize> {
        match limit {
            None => Ok(self.config.default_limit),
            Some(value) if (1..=self.config.max_limit).contains(&value) => Ok(value),
            Some(value) => Err(HexgateError::InvalidParameter(format!(
                "limit must be between 1 and {}, got {}",
                self.config.max_limit, value
            ))),
        }
    }

    fn table_ref(&self, table: &str) -> TableRef {
        TableRef::new(&self.config.catalog, &self.config.schema, table)
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }
}

fn now_utc() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn href_with(base: &str, params: &[String]) -> String {
    if params.is_empty() {
        base.to_string()
    } else {
        format!("{}?{}", base, params.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::engine::mock::{row, Reply, ScriptedEngine};

    fn listing(names: &[&str]) -> Reply {
        Reply::Rows(
            names
                .iter()
                .map(|name| row(&[("table_name", json!(name))]))
                .collect(),
        )
    }

    fn point_row(id: i64, x: f64, y: f64) -> JsonRow {
        row(&[
            ("id", json!(id)),
            ("name", json!(format!("feature-{}", id))),
            ("h3_cell", json!("85283473fffffff")),
            ("geometry", json!(null)),
            ("geom_wkt", json!(format!("POINT ({} {})", x, y))),
        ])
    }

    fn service_with(
        replies: Vec<Reply>,
        config: ServiceConfig,
    ) -> (FeatureService, Arc<Mutex<Vec<String>>>) {
        let engine = ScriptedEngine::new(replies);
        let seen = engine.seen();
        let pool = Arc::new(
            EnginePool::new(vec![Box::new(engine)], Duration::from_secs(5)).unwrap(),
        );
        (FeatureService::new(pool, config), seen)
    }

    #[tokio::test]
    async fn bbox_query_returns_matching_features() {
        let (service, seen) = service_with(
            vec![
                listing(&["points"]),
                Reply::Rows(vec![point_row(1, 0.0, 0.0), point_row(2, 1.0, 1.0)]),
            ],
            ServiceConfig::default(),
        );

        let mut query = FeatureQuery::new("points");
        query.bbox = Some("-5,-5,5,5".parse().unwrap());
        query.limit = Some(10);

        let page = match service.query_features(&query).await.unwrap() {
            QueryOutput::Page(page) => page,
            QueryOutput::Arrow(_) => panic!("expected a page"),
        };

        assert_eq!(page.number_returned, 2);
        assert_eq!(
            page.features[0].geometry,
            Some(Geometry::Point([0.0, 0.0]))
        );
        // Internal columns are stripped from properties.
        assert!(!page.features[0].properties.contains_key("h3_cell"));
        assert!(!page.features[0].properties.contains_key("geometry"));
        assert!(!page.features[0].properties.contains_key("geom_wkt"));
        assert_eq!(page.features[0].properties["name"], "feature-1");
        // Partial page: no next link.
        assert!(page.links.iter().all(|link| link.rel != "next"));

        let statements = seen.lock().unwrap();
        assert_eq!(statements.len(), 2);
        assert!(statements[1].contains("h3_cell IN ("));
        assert!(statements[1].contains("ST_Intersects"));
        assert!(statements[1].contains("LIMIT 10 OFFSET 0"));
    }

    #[tokio::test]
    async fn full_page_emits_next_link() {
        let (service, _) = service_with(
            vec![
                listing(&["points"]),
                Reply::Rows(vec![point_row(1, 0.0, 0.0), point_row(2, 1.0, 1.0)]),
            ],
            ServiceConfig::default(),
        );

        let mut query = FeatureQuery::new("points");
        query.limit = Some(2);

        let page = match service.query_features(&query).await.unwrap() {
            QueryOutput::Page(page) => page,
            QueryOutput::Arrow(_) => panic!("expected a page"),
        };

        assert_eq!(page.number_returned, 2);
        let next = page
            .links
            .iter()
            .find(|link| link.rel == "next")
            .expect("full page must carry a next link");
        assert!(next.href.contains("limit=2"));
        assert!(next.href.contains("offset=2"));
    }

    #[tokio::test]
    async fn no_bbox_uses_universal_predicate() {
        let (service, seen) = service_with(
            vec![listing(&["points"]), Reply::Rows(vec![])],
            ServiceConfig::default(),
        );

        let query = FeatureQuery::new("points");
        service.query_features(&query).await.unwrap();

        let statements = seen.lock().unwrap();
        assert!(statements[1].contains("WHERE 1=1"));
    }

    #[tokio::test]
    async fn degenerate_bbox_degrades_to_exact_filter() {
        let (service, seen) = service_with(
            vec![
                listing(&["points"]),
                Reply::Rows(vec![point_row(1, 1.0, 2.0)]),
            ],
            ServiceConfig::default(),
        );

        let mut query = FeatureQuery::new("points");
        // Zero-area box: the covering fails internally and the query
        // falls back to the exact intersects test alone.
        query.bbox = Some(BoundingBox::new(1.0, 2.0, 1.0, 2.0).unwrap());

        let page = match service.query_features(&query).await.unwrap() {
            QueryOutput::Page(page) => page,
            QueryOutput::Arrow(_) => panic!("expected a page"),
        };
        assert_eq!(page.number_returned, 1);

        let statements = seen.lock().unwrap();
        assert!(!statements[1].contains(" IN ("));
        assert!(statements[1].contains("ST_Intersects"));
    }

    #[tokio::test]
    async fn unknown_collection_is_not_found() {
        let (service, seen) = service_with(
            vec![listing(&["points"])],
            ServiceConfig::default(),
        );

        let query = FeatureQuery::new("missing");
        let err = service.query_features(&query).await.unwrap_err();
        assert!(matches!(err, HexgateError::NotFound(_)));
        // Only the listing query ran.
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unsafe_projection_is_rejected_before_any_query() {
        let (service, seen) = service_with(vec![], ServiceConfig::default());

        let mut query = FeatureQuery::new("points");
        query.properties = Some(vec!["name".to_string(), "x; DROP TABLE x".to_string()]);

        let err = service.query_features(&query).await.unwrap_err();
        assert!(matches!(err, HexgateError::InvalidParameter(_)));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_limit_is_rejected() {
        let (service, _) = service_with(vec![], ServiceConfig::default());

        let mut query = FeatureQuery::new("points");
        query.limit = Some(0);
        assert!(matches!(
            service.query_features(&query).await.unwrap_err(),
            HexgateError::InvalidParameter(_)
        ));

        query.limit = Some(10_001);
        assert!(matches!(
            service.query_features(&query).await.unwrap_err(),
            HexgateError::InvalidParameter(_)
        ));
    }

    #[tokio::test]
    async fn arrow_format_requires_the_flag() {
        let (service, seen) = service_with(vec![], ServiceConfig::default());

        let mut query = FeatureQuery::new("points");
        query.format = OutputFormat::Arrow;

        let err = service.query_features(&query).await.unwrap_err();
        assert!(matches!(err, HexgateError::InvalidParameter(_)));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn arrow_format_bypasses_row_decoding() {
        let config = ServiceConfig {
            enable_arrow: true,
            ..ServiceConfig::default()
        };
        let (service, seen) = service_with(
            vec![listing(&["points"]), Reply::Ipc(vec![1, 2, 3])],
            config,
        );

        let mut query = FeatureQuery::new("points");
        query.format = OutputFormat::Arrow;

        match service.query_features(&query).await.unwrap() {
            QueryOutput::Arrow(bytes) => assert_eq!(bytes, vec![1, 2, 3]),
            QueryOutput::Page(_) => panic!("expected Arrow output"),
        }

        let statements = seen.lock().unwrap();
        assert!(statements[1].starts_with("SELECT * FROM"));
        assert!(!statements[1].contains("geom_wkt"));
    }

    #[tokio::test]
    async fn unsupported_geometry_becomes_null() {
        let (service, _) = service_with(
            vec![
                listing(&["points"]),
                Reply::Rows(vec![row(&[
                    ("id", json!(1)),
                    ("geom_wkt", json!("MULTIPOINT ((0 0), (1 1))")),
                ])]),
            ],
            ServiceConfig::default(),
        );

        let page = match service
            .query_features(&FeatureQuery::new("points"))
            .await
            .unwrap()
        {
            QueryOutput::Page(page) => page,
            QueryOutput::Arrow(_) => panic!("expected a page"),
        };
        assert_eq!(page.number_returned, 1);
        assert!(page.features[0].geometry.is_none());
    }

    #[tokio::test]
    async fn projection_passes_through_to_the_engine() {
        let (service, seen) = service_with(
            vec![listing(&["points"]), Reply::Rows(vec![])],
            ServiceConfig::default(),
        );

        let mut query = FeatureQuery::new("points");
        query.properties = Some(vec!["id".to_string(), "no_such_column".to_string()]);
        service.query_features(&query).await.unwrap();

        let statements = seen.lock().unwrap();
        assert!(statements[1].starts_with("SELECT id, no_such_column, ST_AsText"));
    }

    #[tokio::test]
    async fn engine_rejection_of_projection_surfaces_as_upstream() {
        let (service, _) = service_with(
            vec![
                listing(&["points"]),
                Reply::Fail("Binder Error: no_such_column".to_string()),
            ],
            ServiceConfig::default(),
        );

        let mut query = FeatureQuery::new("points");
        query.properties = Some(vec!["no_such_column".to_string()]);
        let err = service.query_features(&query).await.unwrap_err();
        assert!(matches!(err, HexgateError::Upstream(_)));
    }

    #[tokio::test]
    async fn collection_document_includes_extent_and_links() {
        let (service, _) = service_with(
            vec![
                listing(&["points"]),
                Reply::Rows(vec![row(&[
                    ("minx", json!(-10.0)),
                    ("miny", json!(-5.0)),
                    ("maxx", json!(10.0)),
                    ("maxy", json!(5.0)),
                ])]),
            ],
            ServiceConfig::default(),
        );

        let collection = service.collection_document("points").await.unwrap();
        assert_eq!(collection.id, "points");
        assert_eq!(
            collection.extent.spatial.bbox[0],
            [-10.0, -5.0, 10.0, 5.0]
        );
        assert!(collection
            .links
            .iter()
            .any(|link| link.rel == "items" && link.href.ends_with("/collections/points/items")));
    }

    #[tokio::test]
    async fn empty_collection_reports_world_extent() {
        let (service, _) = service_with(
            vec![
                listing(&["empty"]),
                Reply::Rows(vec![row(&[
                    ("minx", json!(null)),
                    ("miny", json!(null)),
                    ("maxx", json!(null)),
                    ("maxy", json!(null)),
                ])]),
            ],
            ServiceConfig::default(),
        );

        let collection = service.collection_document("empty").await.unwrap();
        assert_eq!(
            collection.extent.spatial.bbox[0],
            [-180.0, -90.0, 180.0, 90.0]
        );
    }
}
