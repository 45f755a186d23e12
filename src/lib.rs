/*!
hexgate - feature queries over hex-partitioned Iceberg tables

hexgate exposes an OGC API - Features-shaped query surface over geospatial
tables stored in an Apache Iceberg catalog, partitioned by H3 cell. Client
bounding-box filters are translated into partition-pruned SQL and executed
through DuckDB; results come back as GeoJSON features with pagination
metadata, or as a raw Arrow IPC stream for bulk consumers.

# Architecture

```text
HTTP surface (axum) ──► FeatureService
                            │
         ┌──────────────────┼──────────────────┐
         ▼                  ▼                  ▼
   BoundingBox         H3 covering        SQL builder
   parsing (bbox)      (cover)            (sql)
         │                  │                  │
         └──────────────────┴──────────────────┘
                            │
                      EnginePool (FIFO workers)
                            │
                      DuckDB + Iceberg catalog
                            │
                      WKT decode (geom) ──► GeoJSON features
```

The covering step is a pruning optimization only: the exact
`ST_Intersects` predicate is always applied as well, so a failed covering
degrades to a full scan instead of failing the request.
*/

use thiserror::Error;

pub mod bbox;
pub mod config;
pub mod cover;
pub mod engine;
pub mod extent;
pub mod geom;
pub mod http;
pub mod model;
pub mod service;
pub mod sql;

pub use bbox::BoundingBox;
pub use config::{EngineConfig, ServiceConfig};
pub use engine::{EnginePool, QueryEngine};
pub use geom::Geometry;
pub use service::{FeatureQuery, FeatureService, OutputFormat, QueryOutput};

/// Crate version, surfaced by the CLI and the `/health` endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors produced by the hexgate library.
///
/// The HTTP layer maps each variant to a transport status code; see
/// `http::ApiErrorResponse`. Degraded partition pruning is deliberately
/// not an error: it is logged and the query falls back to the exact
/// spatial filter.
#[derive(Error, Debug)]
pub enum HexgateError {
    /// Malformed client input: bbox, limit, output format, or an unsafe
    /// projection identifier.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The requested collection does not exist in the catalog.
    #[error("Collection not found: {0}")]
    NotFound(String),

    /// The query engine failed to execute a statement (bad SQL, catalog
    /// unreachable). The message is logged with query context but the
    /// HTTP layer surfaces it generically.
    #[error("Upstream query error: {0}")]
    Upstream(String),

    /// Queue residency plus execution exceeded the per-request deadline.
    #[error("Query timed out: {0}")]
    Timeout(String),

    /// Invariant violation, e.g. an unvalidated identifier reaching the
    /// SQL builder.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, HexgateError>;
