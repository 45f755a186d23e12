//! DuckDB-backed query engine
//!
//! Each engine wraps one DuckDB session. Startup configures session
//! pragmas, optionally installs the iceberg/spatial/httpfs/h3
//! extensions, and attaches the Iceberg REST catalog. Worker sessions
//! are cloned from the first one and share the same in-memory database,
//! so the catalog attachment is done once.

use arrow::datatypes::Schema;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::{params, Connection};
use serde_json::Value;
use tracing::{debug, error, info};

use super::{JsonRow, QueryEngine};
use crate::config::EngineConfig;
use crate::sql::{quote_literal, validate_identifier};
use crate::{HexgateError, Result};

pub struct DuckDbEngine {
    conn: Connection,
}

impl DuckDbEngine {
    /// Open and configure a session according to `config`.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        info!("initializing DuckDB session");
        let conn = Connection::open_in_memory()
            .map_err(|e| HexgateError::Upstream(format!("failed to open DuckDB: {}", e)))?;
        let engine = Self { conn };
        engine.configure(config)?;
        Ok(engine)
    }

    /// A second session over the same database, for another pool worker.
    pub fn try_clone(&self) -> Result<Self> {
        let conn = self
            .conn
            .try_clone()
            .map_err(|e| HexgateError::Upstream(format!("failed to clone DuckDB session: {}", e)))?;
        Ok(Self { conn })
    }

    /// Run a batch of statements. Used for fixture loading in tests and
    /// by the CLI; the service itself only issues SELECTs.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| HexgateError::Upstream(format!("statement failed: {}", e)))
    }

    fn configure(&self, config: &EngineConfig) -> Result<()> {
        self.execute_batch(&format!("SET threads={}", config.threads))?;
        self.execute_batch(&format!(
            "SET memory_limit={}",
            quote_literal(&config.memory_limit)?
        ))?;

        if config.install_extensions {
            info!("installing DuckDB extensions");
            self.execute_batch(
                "INSTALL iceberg; INSTALL spatial; INSTALL httpfs; INSTALL h3 FROM community;",
            )?;
            self.execute_batch("LOAD iceberg; LOAD spatial; LOAD httpfs; LOAD h3;")?;
        }

        if let Some(region) = &config.s3_region {
            self.execute_batch(&format!("SET s3_region={}", quote_literal(region)?))?;
        }

        if let Some(uri) = &config.catalog_uri {
            let name = validate_identifier(&config.catalog_name)?;
            info!(catalog = name, uri = %uri, "attaching Iceberg catalog");
            self.execute_batch(&format!(
                "CREATE OR REPLACE CATALOG {} FROM iceberg('rest', uri={})",
                name,
                quote_literal(&format!("{}/v1/{}", uri.trim_end_matches('/'), name))?
            ))?;
        }

        Ok(())
    }
}

impl QueryEngine for DuckDbEngine {
    fn query_rows(&self, sql: &str) -> Result<Vec<JsonRow>> {
        let mut stmt = self.conn.prepare(sql).map_err(|e| query_error(sql, e))?;
        let mut rows = stmt.query(params![]).map_err(|e| query_error(sql, e))?;

        let mut columns: Vec<String> = Vec::new();
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| query_error(sql, e))? {
            if columns.is_empty() {
                let stmt: &duckdb::Statement<'_> = row.as_ref();
                columns = stmt.column_names().iter().map(|c| c.to_string()).collect();
            }
            let mut record = JsonRow::new();
            for (idx, name) in columns.iter().enumerate() {
                let value = row.get_ref(idx).map_err(|e| query_error(sql, e))?;
                record.insert(name.clone(), value_to_json(value));
            }
            out.push(record);
        }
        Ok(out)
    }

    fn query_ipc(&self, sql: &str) -> Result<Vec<u8>> {
        let mut stmt = self.conn.prepare(sql).map_err(|e| query_error(sql, e))?;
        let batches: Vec<RecordBatch> = stmt
            .query_arrow(params![])
            .map_err(|e| query_error(sql, e))?
            .collect();

        let schema = match batches.first() {
            Some(batch) => batch.schema(),
            None => std::sync::Arc::new(Schema::empty()),
        };

        let mut buffer = Vec::new();
        let mut writer = StreamWriter::try_new(&mut buffer, &schema)
            .map_err(|e| HexgateError::Internal(format!("Arrow stream setup failed: {}", e)))?;
        for batch in &batches {
            writer
                .write(batch)
                .map_err(|e| HexgateError::Internal(format!("Arrow write failed: {}", e)))?;
        }
        writer
            .finish()
            .map_err(|e| HexgateError::Internal(format!("Arrow finish failed: {}", e)))?;
        drop(writer);
        Ok(buffer)
    }
}

fn query_error(sql: &str, err: duckdb::Error) -> HexgateError {
    error!(sql, error = %err, "query execution failed");
    HexgateError::Upstream(err.to_string())
}

/// Convert a single DuckDB value to JSON.
fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(v) => Value::from(v),
        ValueRef::SmallInt(v) => Value::from(v),
        ValueRef::Int(v) => Value::from(v),
        ValueRef::BigInt(v) => Value::from(v),
        ValueRef::HugeInt(v) => match i64::try_from(v) {
            Ok(v) => Value::from(v),
            Err(_) => Value::String(v.to_string()),
        },
        ValueRef::UTinyInt(v) => Value::from(v),
        ValueRef::USmallInt(v) => Value::from(v),
        ValueRef::UInt(v) => Value::from(v),
        ValueRef::UBigInt(v) => Value::from(v),
        ValueRef::Float(v) => serde_json::Number::from_f64(v as f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Double(v) => serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Decimal(d) => Value::String(d.to_string()),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        // Binary columns have no JSON representation; the service strips
        // the WKB geometry column anyway.
        ValueRef::Blob(_) => Value::Null,
        ValueRef::Date32(days) => {
            let epoch = chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
            let date = epoch + chrono::Duration::days(days as i64);
            Value::String(date.format("%Y-%m-%d").to_string())
        }
        ValueRef::Timestamp(unit, v) => {
            let micros = match unit {
                TimeUnit::Second => v.saturating_mul(1_000_000),
                TimeUnit::Millisecond => v.saturating_mul(1_000),
                TimeUnit::Microsecond => v,
                TimeUnit::Nanosecond => v / 1_000,
            };
            match chrono::DateTime::from_timestamp_micros(micros) {
                Some(ts) => Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()),
                None => Value::Null,
            }
        }
        other => {
            debug!("converting unsupported DuckDB type to string: {:?}", other);
            Value::String(format!("{:?}", other))
        }
    }
}
