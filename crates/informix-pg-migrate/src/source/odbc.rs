//! ODBC-based Informix source.
//!
//! Requires the IBM Informix Client SDK (or CSDK) ODBC driver registered in
//! `odbcinst.ini`; the driver name is configurable.
//!
//! ODBC handles are not shared across threads here. A dedicated worker thread
//! owns the environment and the connection for the whole run and serves
//! requests from a channel. Streamed queries push one batch at a time into a
//! channel of capacity one, so at most two batches exist in memory: the one
//! being written and the one waiting.

use std::thread::JoinHandle;

use async_trait::async_trait;
use odbc_api::buffers::TextRowSet;
use odbc_api::parameter::InputParameter;
use odbc_api::{Connection, ConnectionOptions, Cursor, Environment, IntoParameter};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::SourceConnection;
use crate::config::SourceConfig;
use crate::core::value::{Batch, Row, SqlParam};
use crate::error::{MigrateError, Result};

/// Rows fetched per round trip for catalog queries.
const CATALOG_FETCH_ROWS: usize = 1000;

/// Longest catalog value fetched (names are at most 128 bytes).
const CATALOG_MAX_TEXT: usize = 4096;

enum Request {
    Query {
        sql: String,
        params: Vec<SqlParam>,
        reply: oneshot::Sender<Result<Vec<Row>>>,
    },
    Stream {
        sql: String,
        batch_size: usize,
        batches: mpsc::Sender<Result<Batch>>,
    },
}

/// Informix connection served by a dedicated ODBC worker thread.
pub struct OdbcSource {
    requests: std::sync::Mutex<Option<mpsc::Sender<Request>>>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
    description: String,
}

impl OdbcSource {
    /// Connect to the source database.
    ///
    /// # Errors
    ///
    /// Returns `MigrateError::Connection` if the ODBC environment cannot be
    /// created, the driver is missing or the server rejects the login.
    pub async fn connect(config: &SourceConfig, password: &str) -> Result<Self> {
        let connection_string = config.connection_string(password);
        let max_text = config.max_text_length;
        let description = config.describe();

        let (request_tx, request_rx) = mpsc::channel::<Request>(1);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        let context = description.clone();
        let worker = std::thread::Builder::new()
            .name("odbc-source".into())
            .spawn(move || run_worker(connection_string, max_text, context, ready_tx, request_rx))
            .map_err(|e| MigrateError::connection(e.to_string(), "spawning ODBC worker"))?;

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                return Err(MigrateError::connection(
                    "ODBC worker exited before connecting",
                    description,
                ))
            }
        }

        info!("Connected to Informix: {}", description);

        Ok(Self {
            requests: std::sync::Mutex::new(Some(request_tx)),
            worker: std::sync::Mutex::new(Some(worker)),
            description,
        })
    }

    fn sender(&self) -> Result<mpsc::Sender<Request>> {
        self.requests
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or_else(|| MigrateError::connection("source connection is closed", &self.description))
    }

    fn worker_gone(&self) -> MigrateError {
        MigrateError::connection("ODBC worker stopped", &self.description)
    }
}

#[async_trait]
impl SourceConnection for OdbcSource {
    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
        let (reply, response) = oneshot::channel();
        self.sender()?
            .send(Request::Query {
                sql: sql.to_string(),
                params: params.to_vec(),
                reply,
            })
            .await
            .map_err(|_| self.worker_gone())?;
        response.await.map_err(|_| self.worker_gone())?
    }

    async fn stream(&self, sql: &str, batch_size: usize) -> Result<mpsc::Receiver<Result<Batch>>> {
        let (batches, receiver) = mpsc::channel(1);
        self.sender()?
            .send(Request::Stream {
                sql: sql.to_string(),
                batch_size: batch_size.max(1),
                batches,
            })
            .await
            .map_err(|_| self.worker_gone())?;
        Ok(receiver)
    }

    async fn close(&self) {
        // Dropping the sender ends the worker loop.
        if let Ok(mut guard) = self.requests.lock() {
            guard.take();
        }
        let worker = self.worker.lock().ok().and_then(|mut guard| guard.take());
        if let Some(worker) = worker {
            let joined = tokio::task::spawn_blocking(move || worker.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                warn!("ODBC worker did not shut down cleanly");
            }
        }
        debug!("Closed Informix connection");
    }
}

fn run_worker(
    connection_string: String,
    max_text: usize,
    context: String,
    ready: oneshot::Sender<Result<()>>,
    mut requests: mpsc::Receiver<Request>,
) {
    let env = match Environment::new() {
        Ok(env) => env,
        Err(e) => {
            let _ = ready.send(Err(MigrateError::connection(
                format!(
                    "Failed to create ODBC environment: {}. \
                     Make sure unixODBC and the Informix ODBC driver are installed.",
                    e
                ),
                context,
            )));
            return;
        }
    };

    let conn = match env.connect_with_connection_string(&connection_string, ConnectionOptions::default())
    {
        Ok(conn) => conn,
        Err(e) => {
            let _ = ready.send(Err(MigrateError::connection(e.to_string(), context)));
            return;
        }
    };

    if ready.send(Ok(())).is_err() {
        return;
    }

    while let Some(request) = requests.blocking_recv() {
        match request {
            Request::Query { sql, params, reply } => {
                let _ = reply.send(run_query(&conn, &sql, &params));
            }
            Request::Stream {
                sql,
                batch_size,
                batches,
            } => {
                if let Err(e) = stream_query(&conn, &sql, batch_size, max_text, &batches) {
                    let _ = batches.blocking_send(Err(e));
                }
            }
        }
    }
}

fn bind(params: &[SqlParam]) -> Vec<Box<dyn InputParameter>> {
    params
        .iter()
        .map(|p| -> Box<dyn InputParameter> {
            match p {
                SqlParam::Int(v) => Box::new(*v),
                SqlParam::Text(v) => Box::new(v.clone().into_parameter()),
            }
        })
        .collect()
}

fn run_query(conn: &Connection<'_>, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
    let bound = bind(params);
    let mut rows = Vec::new();

    if let Some(mut cursor) = conn.execute(sql, bound.as_slice())? {
        let mut buffers = TextRowSet::for_cursor(CATALOG_FETCH_ROWS, &mut cursor, Some(CATALOG_MAX_TEXT))?;
        let mut row_cursor = cursor.bind_buffer(&mut buffers)?;
        while let Some(batch) = row_cursor.fetch_with_truncation_check(true)? {
            rows.extend(batch_rows(batch));
        }
    }

    Ok(rows)
}

fn stream_query(
    conn: &Connection<'_>,
    sql: &str,
    batch_size: usize,
    max_text: usize,
    batches: &mpsc::Sender<Result<Batch>>,
) -> Result<()> {
    let Some(mut cursor) = conn.execute(sql, ())? else {
        return Ok(());
    };

    let mut buffers = TextRowSet::for_cursor(batch_size, &mut cursor, Some(max_text))?;
    let mut row_cursor = cursor.bind_buffer(&mut buffers)?;
    while let Some(batch) = row_cursor.fetch_with_truncation_check(true)? {
        if batches.blocking_send(Ok(batch_rows(batch))).is_err() {
            debug!("Stream consumer went away, closing cursor");
            break;
        }
    }

    Ok(())
}

fn batch_rows(batch: &TextRowSet) -> Vec<Row> {
    (0..batch.num_rows())
        .map(|row| {
            (0..batch.num_cols())
                .map(|col| {
                    batch
                        .at(col, row)
                        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                })
                .collect()
        })
        .collect()
}
