//! Bounded FIFO worker pool for engine sessions
//!
//! DuckDB sessions are not safe for concurrent submission, so the pool
//! owns a small fixed number of worker threads, each with its own
//! session. Queries enqueue on a shared channel and are taken in
//! first-in-first-out order; requests beyond pool capacity wait in the
//! queue instead of opening more sessions. A per-request timeout covers
//! queue residency plus execution.
//!
//! If a caller gives up (timeout, client disconnect) the reply channel
//! closes; the worker finishes its statement and discards the result,
//! since the engine offers no mid-query cancellation. If the submission
//! channel itself is gone (all workers dead), submissions fail without
//! touching in-flight work.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use super::{JsonRow, QueryEngine};
use crate::{HexgateError, Result};

enum Job {
    Rows {
        sql: String,
        reply: oneshot::Sender<Result<Vec<JsonRow>>>,
    },
    Ipc {
        sql: String,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },
}

pub struct EnginePool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
    timeout: Duration,
}

impl EnginePool {
    /// Start one worker per engine. The pool is the only owner of the
    /// sessions; it is built once at startup and passed by reference.
    pub fn new(engines: Vec<Box<dyn QueryEngine>>, timeout: Duration) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(engines.len());
        for (index, engine) in engines.into_iter().enumerate() {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("engine-worker-{}", index))
                .spawn(move || worker_loop(engine, receiver))
                .map_err(|e| {
                    HexgateError::Internal(format!("failed to spawn engine worker: {}", e))
                })?;
            workers.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers,
            timeout,
        })
    }

    /// Execute a statement on the next free worker, returning rows.
    pub async fn query_rows(&self, sql: &str) -> Result<Vec<JsonRow>> {
        let (reply, receiver) = oneshot::channel();
        self.submit(Job::Rows {
            sql: sql.to_string(),
            reply,
        })?;
        self.await_reply(receiver).await
    }

    /// Execute a statement on the next free worker, returning an Arrow
    /// IPC stream.
    pub async fn query_ipc(&self, sql: &str) -> Result<Vec<u8>> {
        let (reply, receiver) = oneshot::channel();
        self.submit(Job::Ipc {
            sql: sql.to_string(),
            reply,
        })?;
        self.await_reply(receiver).await
    }

    fn submit(&self, job: Job) -> Result<()> {
        let sender = self.sender.as_ref().ok_or_else(pool_unavailable)?;
        sender.send(job).map_err(|_| pool_unavailable())
    }

    async fn await_reply<T>(&self, receiver: oneshot::Receiver<Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, receiver).await {
            Err(_) => Err(HexgateError::Timeout(format!(
                "query exceeded the {:?} deadline",
                self.timeout
            ))),
            // The worker dropped the reply channel without answering.
            Ok(Err(_)) => Err(pool_unavailable()),
            Ok(Ok(result)) => result,
        }
    }
}

impl Drop for EnginePool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain the queue and exit.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn pool_unavailable() -> HexgateError {
    HexgateError::Upstream("query pool unavailable".to_string())
}

fn worker_loop(engine: Box<dyn QueryEngine>, jobs: Arc<Mutex<mpsc::Receiver<Job>>>) {
    loop {
        // Take the next job, releasing the lock before executing it.
        let job = {
            let guard = match jobs.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            match guard.recv() {
                Ok(job) => job,
                Err(_) => return,
            }
        };

        match job {
            Job::Rows { sql, reply } => {
                let result = engine.query_rows(&sql);
                if reply.send(result).is_err() {
                    debug!("caller gone before query completed; result discarded");
                }
            }
            Job::Ipc { sql, reply } => {
                let result = engine.query_ipc(&sql);
                if reply.send(result).is_err() {
                    debug!("caller gone before query completed; result discarded");
                }
            }
        }
    }
}
