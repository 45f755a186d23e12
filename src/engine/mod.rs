//! Query-engine abstraction layer
//!
//! The service talks to its analytical engine through the
//! [`QueryEngine`] trait: SQL text in, JSON-typed rows (or an Arrow IPC
//! stream) out. The production implementation is a DuckDB session with
//! the Iceberg catalog attached; tests substitute scripted engines.
//!
//! Engines are owned by the worker pool ([`EnginePool`]), one session
//! per worker, and are never shared between threads.

use serde_json::{Map, Value};

use crate::{HexgateError, Result};

pub mod duckdb;
pub mod pool;

pub use self::duckdb::DuckDbEngine;
pub use self::pool::EnginePool;

/// One result row as a name -> JSON value mapping.
pub type JsonRow = Map<String, Value>;

/// A synchronous SQL execution backend.
///
/// Implementations run on pool worker threads; each worker owns its
/// engine exclusively, so no interior synchronization is required.
pub trait QueryEngine: Send {
    /// Execute a statement and return all rows.
    fn query_rows(&self, sql: &str) -> Result<Vec<JsonRow>>;

    /// Execute a statement and return the result as an Arrow IPC
    /// stream. Engines without columnar output keep the default.
    fn query_ipc(&self, sql: &str) -> Result<Vec<u8>> {
        let _ = sql;
        Err(HexgateError::Internal(
            "this engine does not support Arrow output".to_string(),
        ))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted engines for service and router tests.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use serde_json::Value;

    use super::{JsonRow, QueryEngine};
    use crate::{HexgateError, Result};

    /// Build a row from `(column, value)` pairs.
    pub fn row(fields: &[(&str, Value)]) -> JsonRow {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// One scripted response.
    pub enum Reply {
        Rows(Vec<JsonRow>),
        Ipc(Vec<u8>),
        Fail(String),
    }

    /// Replays a queue of responses in submission order and records the
    /// SQL it was handed.
    pub struct ScriptedEngine {
        replies: Arc<Mutex<VecDeque<Reply>>>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedEngine {
        pub fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.into())),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Handle for inspecting executed SQL after the fact.
        pub fn seen(&self) -> Arc<Mutex<Vec<String>>> {
            self.seen.clone()
        }

        fn next_reply(&self, sql: &str) -> Result<Reply> {
            self.seen.lock().unwrap().push(sql.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| HexgateError::Upstream("scripted engine exhausted".to_string()))
        }
    }

    impl QueryEngine for ScriptedEngine {
        fn query_rows(&self, sql: &str) -> Result<Vec<JsonRow>> {
            match self.next_reply(sql)? {
                Reply::Rows(rows) => Ok(rows),
                Reply::Ipc(_) => Err(HexgateError::Internal(
                    "scripted Ipc reply for a rows query".to_string(),
                )),
                Reply::Fail(message) => Err(HexgateError::Upstream(message)),
            }
        }

        fn query_ipc(&self, sql: &str) -> Result<Vec<u8>> {
            match self.next_reply(sql)? {
                Reply::Ipc(bytes) => Ok(bytes),
                Reply::Rows(_) => Err(HexgateError::Internal(
                    "scripted Rows reply for an ipc query".to_string(),
                )),
                Reply::Fail(message) => Err(HexgateError::Upstream(message)),
            }
        }
    }

    /// Engine that sleeps before answering; for timeout tests.
    pub struct SlowEngine {
        pub delay: std::time::Duration,
        pub calls: Arc<AtomicUsize>,
    }

    impl QueryEngine for SlowEngine {
        fn query_rows(&self, _sql: &str) -> Result<Vec<JsonRow>> {
            std::thread::sleep(self.delay);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }
}
