//! HTTP surface
//!
//! Thin axum routing over [`FeatureService`]. Handlers parse and
//! validate request parameters, delegate to the service, and map the
//! error taxonomy to transport status codes with a structured
//! `{code, description}` body. Upstream engine failures are surfaced
//! generically; the underlying SQL never leaves the process.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bbox::BoundingBox;
use crate::model::{Collection, Collections, Conformance, LandingPage, Link};
use crate::service::{FeatureQuery, FeatureService, OutputFormat, QueryOutput};
use crate::{HexgateError, VERSION};

/// Media type of the bulk columnar output.
pub const ARROW_STREAM: &str = "application/vnd.apache.arrow.stream";

const CONFORMANCE_CLASSES: [&str; 5] = [
    "http://www.opengis.net/spec/ogcapi-features-1/1.0/conf/core",
    "http://www.opengis.net/spec/ogcapi-features-1/1.0/conf/oas30",
    "http://www.opengis.net/spec/ogcapi-features-1/1.0/conf/geojson",
    "http://www.opengis.net/spec/ogcapi-common-1/1.0/conf/core",
    "http://www.opengis.net/spec/ogcapi-common-2/1.0/conf/collections",
];

/// Build the application router. Middleware (CORS, tracing) is layered
/// on by the server binary.
pub fn router(service: Arc<FeatureService>) -> Router {
    Router::new()
        .route("/", get(landing_handler))
        .route("/conformance", get(conformance_handler))
        .route("/health", get(health_handler))
        .route("/collections", get(collections_handler))
        .route("/collections/:collection_id", get(collection_handler))
        .route("/collections/:collection_id/items", get(items_handler))
        .with_state(service)
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters of the items endpoint. Everything arrives as text
/// so that malformed values produce the structured error body instead
/// of the extractor's default rejection.
#[derive(Debug, Deserialize)]
struct ItemsParams {
    bbox: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
    properties: Option<String>,
    f: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

/// Structured error body: `{"code": ..., "description": ...}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    description: String,
}

// ============================================================================
// Error Handling
// ============================================================================

/// Error wrapper carrying the mapped status code.
pub struct ApiErrorResponse {
    status: StatusCode,
    body: ErrorBody,
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<HexgateError> for ApiErrorResponse {
    fn from(err: HexgateError) -> Self {
        let (status, code, description) = match &err {
            HexgateError::InvalidParameter(msg) => {
                (StatusCode::BAD_REQUEST, "InvalidParameter", msg.clone())
            }
            HexgateError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                format!("Collection {} not found", id),
            ),
            // The detailed message was already logged with query
            // context; the client gets a generic failure.
            HexgateError::Upstream(_) => (
                StatusCode::BAD_GATEWAY,
                "UpstreamQueryError",
                "query execution failed".to_string(),
            ),
            HexgateError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, "Timeout", msg.clone()),
            HexgateError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "An internal server error occurred".to_string(),
            ),
        };
        ApiErrorResponse {
            status,
            body: ErrorBody {
                code: code.to_string(),
                description,
            },
        }
    }
}

// ============================================================================
// Handler Functions
// ============================================================================

async fn landing_handler(State(service): State<Arc<FeatureService>>) -> Json<LandingPage> {
    let config = service.config();
    let base = config.base_url.trim_end_matches('/');
    Json(LandingPage {
        title: config.title.clone(),
        description: config.description.clone(),
        links: vec![
            Link::new(format!("{}/", base), "self", "application/json")
                .with_title("This document"),
            Link::new(format!("{}/conformance", base), "conformance", "application/json")
                .with_title("Conformance declaration"),
            Link::new(format!("{}/collections", base), "data", "application/json")
                .with_title("Collections"),
        ],
    })
}

async fn conformance_handler() -> Json<Conformance> {
    Json(Conformance {
        conforms_to: CONFORMANCE_CLASSES.iter().map(|s| s.to_string()).collect(),
    })
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "hexgate".to_string(),
        version: VERSION.to_string(),
    })
}

async fn collections_handler(
    State(service): State<Arc<FeatureService>>,
) -> Result<Json<Collections>, ApiErrorResponse> {
    Ok(Json(service.collections_document().await?))
}

async fn collection_handler(
    State(service): State<Arc<FeatureService>>,
    Path(collection_id): Path<String>,
) -> Result<Json<Collection>, ApiErrorResponse> {
    Ok(Json(service.collection_document(&collection_id).await?))
}

async fn items_handler(
    State(service): State<Arc<FeatureService>>,
    Path(collection_id): Path<String>,
    Query(params): Query<ItemsParams>,
    headers: HeaderMap,
) -> Result<Response, ApiErrorResponse> {
    let query = build_query(&collection_id, &params, &headers)?;
    info!(
        collection = %collection_id,
        bbox = ?params.bbox,
        "executing feature query"
    );

    match service.query_features(&query).await? {
        QueryOutput::Page(page) => Ok((
            [(header::CONTENT_TYPE, "application/geo+json")],
            Json(page),
        )
            .into_response()),
        QueryOutput::Arrow(bytes) => {
            Ok(([(header::CONTENT_TYPE, ARROW_STREAM)], bytes).into_response())
        }
    }
}

fn build_query(
    collection_id: &str,
    params: &ItemsParams,
    headers: &HeaderMap,
) -> Result<FeatureQuery, ApiErrorResponse> {
    let mut query = FeatureQuery::new(collection_id);

    if let Some(bbox) = &params.bbox {
        query.bbox = Some(bbox.parse::<BoundingBox>()?);
    }
    if let Some(limit) = &params.limit {
        query.limit = Some(limit.parse().map_err(|_| {
            HexgateError::InvalidParameter(format!("limit is not a number: '{}'", limit))
        })?);
    }
    if let Some(offset) = &params.offset {
        query.offset = offset.parse().map_err(|_| {
            HexgateError::InvalidParameter(format!("offset is not a number: '{}'", offset))
        })?;
    }
    if let Some(properties) = &params.properties {
        query.properties = Some(
            properties
                .split(',')
                .map(|name| name.trim().to_string())
                .collect(),
        );
    }

    let accepts_arrow = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains(ARROW_STREAM))
        .unwrap_or(false);
    query.format = match &params.f {
        Some(f) => OutputFormat::from_str(f)?,
        None if accepts_arrow => OutputFormat::Arrow,
        None => OutputFormat::GeoJson,
    };

    Ok(query)
}
