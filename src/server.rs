/*!
hexgate HTTP Server

Serves OGC API - Features endpoints over H3-partitioned Iceberg tables.

## Usage

```bash
hexgate-server --host 0.0.0.0 --port 3400 --catalog-uri http://polaris:8181
```

## Endpoints

- `GET /` - Landing page
- `GET /conformance` - Conformance declaration
- `GET /collections` - List feature collections (catalog tables)
- `GET /collections/{id}` - Collection metadata
- `GET /collections/{id}/items` - Feature query (GeoJSON or Arrow)
- `GET /health` - Health check
*/

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hexgate::engine::{DuckDbEngine, EnginePool, QueryEngine};
use hexgate::{http, EngineConfig, FeatureService, ServiceConfig, VERSION};

/// CLI arguments for the HTTP server
#[derive(Parser)]
#[command(name = "hexgate-server")]
#[command(about = "OGC API - Features server over H3-partitioned Iceberg tables")]
#[command(version = VERSION)]
struct Cli {
    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind to
    #[arg(long, default_value = "3400")]
    port: u16,

    /// Public base URL used in links (defaults to http://host:port)
    #[arg(long)]
    base_url: Option<String>,

    /// Iceberg REST catalog endpoint; no catalog is attached when unset
    #[arg(long, env = "POLARIS_ENDPOINT")]
    catalog_uri: Option<String>,

    /// Catalog name to attach under
    #[arg(long, env = "POLARIS_CATALOG", default_value = "polaris")]
    catalog: String,

    /// Schema holding the feature tables
    #[arg(long, default_value = "default")]
    schema: String,

    /// S3 region for object-store reads
    #[arg(long, env = "AWS_REGION")]
    s3_region: Option<String>,

    /// Threads per DuckDB session
    #[arg(long, default_value = "2")]
    threads: usize,

    /// DuckDB memory limit
    #[arg(long, default_value = "2GB")]
    memory_limit: String,

    /// Number of pool workers (engine sessions)
    #[arg(long, default_value = "2")]
    pool_size: usize,

    /// Per-request deadline in seconds (queue plus execution)
    #[arg(long, default_value = "30")]
    query_timeout_secs: u64,

    /// H3 resolution of the partition cells
    #[arg(long, default_value = "5")]
    h3_resolution: u8,

    /// Page size when the client sends no limit
    #[arg(long, default_value = "1000")]
    default_limit: usize,

    /// Upper bound on the client-requested limit
    #[arg(long, default_value = "10000")]
    max_limit: usize,

    /// Enable the bulk Arrow output form
    #[arg(long, default_value = "false")]
    enable_arrow: bool,

    /// Skip DuckDB extension install/load (offline development)
    #[arg(long, default_value = "false")]
    no_extensions: bool,

    /// CORS allowed origins (comma-separated)
    #[arg(long, default_value = "*")]
    cors_origin: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hexgate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let engine_config = EngineConfig {
        threads: cli.threads,
        memory_limit: cli.memory_limit.clone(),
        pool_size: cli.pool_size.max(1),
        query_timeout: Duration::from_secs(cli.query_timeout_secs),
        install_extensions: !cli.no_extensions,
        s3_region: cli.s3_region.clone(),
        catalog_uri: cli.catalog_uri.clone(),
        catalog_name: cli.catalog.clone(),
    };

    let service_config = ServiceConfig {
        base_url: cli
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", cli.host, cli.port)),
        catalog: cli.catalog.clone(),
        schema: cli.schema.clone(),
        h3_resolution: cli.h3_resolution,
        default_limit: cli.default_limit,
        max_limit: cli.max_limit,
        enable_arrow: cli.enable_arrow,
        ..ServiceConfig::default()
    };

    // The first session does extension install and catalog attachment;
    // the rest share the same database.
    info!("initializing {} DuckDB session(s)", engine_config.pool_size);
    let root = DuckDbEngine::open(&engine_config)?;
    let mut engines: Vec<Box<dyn QueryEngine>> = Vec::with_capacity(engine_config.pool_size);
    for _ in 1..engine_config.pool_size {
        engines.push(Box::new(root.try_clone()?));
    }
    engines.push(Box::new(root));

    let pool = Arc::new(EnginePool::new(engines, engine_config.query_timeout)?);
    let service = Arc::new(FeatureService::new(pool, service_config));

    // Configure CORS
    let cors = if cli.cors_origin == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(vec![header::CONTENT_TYPE])
    } else {
        let origins: Vec<_> = cli
            .cors_origin
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(vec![header::CONTENT_TYPE])
    };

    let app = http::router(service)
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    info!("starting hexgate server on {}", addr);
    info!("  GET /                       - Landing page");
    info!("  GET /conformance            - Conformance declaration");
    info!("  GET /collections            - List collections");
    info!("  GET /collections/:id        - Collection metadata");
    info!("  GET /collections/:id/items  - Feature query");
    info!("  GET /health                 - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
