/*!
hexgate Command Line Interface

Query feature collections from the terminal: list catalog tables,
inspect extents, run bounding-box feature queries, or execute raw SQL
against the attached catalog for debugging.
*/

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use hexgate::engine::{DuckDbEngine, EnginePool, QueryEngine};
use hexgate::service::{FeatureQuery, OutputFormat, QueryOutput};
use hexgate::{BoundingBox, EngineConfig, FeatureService, ServiceConfig, VERSION};

#[derive(Parser)]
#[command(name = "hexgate")]
#[command(about = "Feature queries over H3-partitioned Iceberg tables")]
#[command(version = VERSION)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
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

    /// Skip DuckDB extension install/load (offline development)
    #[arg(long, default_value = "false")]
    no_extensions: bool,

    /// Per-query deadline in seconds
    #[arg(long, default_value = "60")]
    query_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// List the feature collections in the catalog
    Collections,

    /// Show the spatial extent of a collection
    Extent {
        /// Collection (table) name
        collection: String,
    },

    /// Query features from a collection as GeoJSON
    Features {
        /// Collection (table) name
        collection: String,

        /// Bounding box: minx,miny,maxx,maxy
        #[arg(long)]
        bbox: Option<String>,

        /// Maximum number of features to return
        #[arg(long)]
        limit: Option<usize>,

        /// Number of features to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Comma-separated list of properties to project
        #[arg(long)]
        properties: Option<String>,

        /// Output file path (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Execute a raw SQL statement (for debugging)
    Sql {
        /// The SQL statement to execute
        query: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let engine_config = EngineConfig {
        install_extensions: !cli.connection.no_extensions,
        s3_region: cli.connection.s3_region.clone(),
        catalog_uri: cli.connection.catalog_uri.clone(),
        catalog_name: cli.connection.catalog.clone(),
        pool_size: 1,
        query_timeout: Duration::from_secs(cli.connection.query_timeout_secs),
        ..EngineConfig::default()
    };
    let service_config = ServiceConfig {
        catalog: cli.connection.catalog.clone(),
        schema: cli.connection.schema.clone(),
        ..ServiceConfig::default()
    };

    let engine = DuckDbEngine::open(&engine_config).context("failed to initialize DuckDB")?;
    let engines: Vec<Box<dyn QueryEngine>> = vec![Box::new(engine)];
    let pool = Arc::new(EnginePool::new(engines, engine_config.query_timeout)?);
    let service = FeatureService::new(pool.clone(), service_config);

    match cli.command {
        Commands::Collections => {
            let names = service.list_collections().await?;
            for name in names {
                println!("{}", name);
            }
        }

        Commands::Extent { collection } => {
            match service.collection_extent(&collection).await? {
                Some(extent) => println!("{}", extent),
                None => println!("{} is empty (whole-world extent applies)", collection),
            }
        }

        Commands::Features {
            collection,
            bbox,
            limit,
            offset,
            properties,
            output,
        } => {
            let mut query = FeatureQuery::new(&collection);
            if let Some(bbox) = bbox {
                query.bbox = Some(bbox.parse::<BoundingBox>()?);
            }
            query.limit = limit;
            query.offset = offset;
            query.properties =
                properties.map(|p| p.split(',').map(|s| s.trim().to_string()).collect());
            query.format = OutputFormat::GeoJson;

            let page = match service.query_features(&query).await? {
                QueryOutput::Page(page) => page,
                QueryOutput::Arrow(_) => unreachable!("CLI only requests GeoJSON"),
            };
            let json = serde_json::to_string_pretty(&page)?;

            match output {
                Some(path) => {
                    std::fs::write(&path, &json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!(
                        "{} feature(s) written to {}",
                        page.number_returned,
                        path.display()
                    );
                }
                None => println!("{}", json),
            }
        }

        Commands::Sql { query } => {
            let rows = pool.query_rows(&query).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(())
}
