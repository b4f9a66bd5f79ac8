//! tokio-postgres implementation of [`TargetConnection`].

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::{debug, info, warn};

use super::{InsertStatement, TargetConnection, TlsBuilder};
use crate::config::TargetConfig;
use crate::core::value::{Row, SqlParam};
use crate::error::{MigrateError, Result};

/// Single PostgreSQL connection held for the whole run.
pub struct PgTarget {
    client: Client,
    connection: JoinHandle<()>,
    in_transaction: AtomicBool,
}

impl PgTarget {
    /// Connect to the target database.
    pub async fn connect(config: &TargetConfig, password: &str) -> Result<Self> {
        let pg_config: PgConfig = config
            .connection_string(password)
            .parse()
            .map_err(|e: tokio_postgres::Error| {
                MigrateError::connection(e.to_string(), config.describe())
            })?;

        let tls = TlsBuilder::parse(&config.ssl_mode)?.build()?;
        let (client, connection) = match tls {
            Some(connector) => {
                let (client, conn) = pg_config
                    .connect(connector)
                    .await
                    .map_err(|e| MigrateError::connection(e.to_string(), config.describe()))?;
                (client, spawn_connection(conn))
            }
            None => {
                let (client, conn) = pg_config
                    .connect(NoTls)
                    .await
                    .map_err(|e| MigrateError::connection(e.to_string(), config.describe()))?;
                (client, spawn_connection(conn))
            }
        };

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::connection(e.to_string(), config.describe()))?;

        info!("Connected to PostgreSQL: {}", config.describe());

        Ok(Self {
            client,
            connection,
            in_transaction: AtomicBool::new(false),
        })
    }

    async fn begin_if_needed(&self) -> Result<()> {
        if !self.in_transaction.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.client.batch_execute("BEGIN").await {
                self.in_transaction.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        }
        Ok(())
    }
}

fn spawn_connection<S, T>(connection: tokio_postgres::Connection<S, T>) -> JoinHandle<()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("PostgreSQL connection closed with error: {}", e);
        }
    })
}

fn bind_params(params: &[SqlParam]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    params
        .iter()
        .map(|p| -> Box<dyn ToSql + Sync + Send> {
            match p {
                SqlParam::Int(v) => Box::new(*v),
                SqlParam::Text(v) => Box::new(v.clone()),
            }
        })
        .collect()
}

#[async_trait]
impl TargetConnection for PgTarget {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        self.begin_if_needed().await?;
        let boxed = bind_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = boxed
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();
        debug!("execute: {}", sql);
        Ok(self.client.execute(sql, &refs).await?)
    }

    async fn execute_batch(&self, insert: &InsertStatement, rows: &[Row]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.begin_if_needed().await?;

        let mut inserted = 0u64;
        for chunk in rows.chunks(insert.rows_per_statement()) {
            let sql = insert.sql(chunk.len());
            let values = insert.params(chunk);
            let refs: Vec<&(dyn ToSql + Sync)> =
                values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
            inserted += self.client.execute(sql.as_str(), &refs).await?;
        }
        Ok(inserted)
    }

    async fn query_i64(&self, sql: &str, params: &[SqlParam]) -> Result<Option<i64>> {
        let boxed = bind_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = boxed
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();
        let row = self.client.query_opt(sql, &refs).await?;
        match row {
            Some(row) => Ok(row.try_get::<_, Option<i64>>(0)?),
            None => Ok(None),
        }
    }

    async fn query_text(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
        let boxed = bind_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> = boxed
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();
        let rows = self.client.query(sql, &refs).await?;
        rows.iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| row.try_get::<_, Option<String>>(i).map_err(MigrateError::from))
                    .collect::<Result<Row>>()
            })
            .collect()
    }

    async fn commit(&self) -> Result<()> {
        if self.in_transaction.swap(false, Ordering::SeqCst) {
            self.client.batch_execute("COMMIT").await?;
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        if self.in_transaction.swap(false, Ordering::SeqCst) {
            self.client.batch_execute("ROLLBACK").await?;
        }
        Ok(())
    }

    async fn close(&self) {
        if self.in_transaction.load(Ordering::SeqCst) {
            if let Err(e) = self.rollback().await {
                warn!("Rollback on close failed: {}", e);
            }
        }
        self.connection.abort();
    }
}
