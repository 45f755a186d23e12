//! Service and engine configuration
//!
//! Defaults mirror a small production deployment: two engine workers,
//! resolution-5 partition cells, 1000-row default pages. Binaries
//! populate these from CLI flags and environment variables.

use std::time::Duration;

/// Configuration for the feature service layer.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service title for the landing page.
    pub title: String,
    /// Service description for the landing page.
    pub description: String,
    /// Public base URL used to build self/next links.
    pub base_url: String,
    /// Catalog name the tables live under.
    pub catalog: String,
    /// Schema name within the catalog.
    pub schema: String,
    /// Geometry column name (WKB-encoded).
    pub geometry_column: String,
    /// Partition cell column name.
    pub cell_column: String,
    /// H3 resolution of the partition cells.
    pub h3_resolution: u8,
    /// Page size applied when the client sends no limit.
    pub default_limit: usize,
    /// Upper bound on the client-requested limit.
    pub max_limit: usize,
    /// Whether the bulk Arrow output form is enabled.
    pub enable_arrow: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            title: "hexgate".to_string(),
            description: "Feature queries over H3-partitioned Iceberg tables".to_string(),
            base_url: "http://localhost:3400".to_string(),
            catalog: "polaris".to_string(),
            schema: "default".to_string(),
            geometry_column: "geometry".to_string(),
            cell_column: "h3_cell".to_string(),
            h3_resolution: 5,
            default_limit: 1000,
            max_limit: 10000,
            enable_arrow: false,
        }
    }
}

/// Configuration for DuckDB sessions and the worker pool.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Threads per DuckDB session.
    pub threads: usize,
    /// DuckDB memory limit, e.g. "2GB".
    pub memory_limit: String,
    /// Number of pool workers, each owning one session.
    pub pool_size: usize,
    /// Deadline covering queue residency plus execution.
    pub query_timeout: Duration,
    /// Install/load the iceberg, spatial, httpfs and h3 extensions on
    /// startup. Disabled for offline and test runs.
    pub install_extensions: bool,
    /// S3 region for object-store reads.
    pub s3_region: Option<String>,
    /// Iceberg REST catalog endpoint; no catalog is attached when unset.
    pub catalog_uri: Option<String>,
    /// Catalog name to attach under.
    pub catalog_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 2,
            memory_limit: "2GB".to_string(),
            pool_size: 2,
            query_timeout: Duration::from_secs(30),
            install_extensions: true,
            s3_region: None,
            catalog_uri: None,
            catalog_name: "polaris".to_string(),
        }
    }
}
