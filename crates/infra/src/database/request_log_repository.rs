//! Durable request log repository
//!
//! Rows follow the append-mostly contract of [`RequestLog`]: created
//! `Pending` before the call, resolved once per leg afterwards, never
//! deleted by this subsystem. The append/cap semantics live on the domain
//! type; the repository reads the row, applies the mutation and writes it
//! back inside one connection checkout.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};
use taxbridge_core::ports::RequestLogStore;
use taxbridge_domain::{HttpMethod, RequestLog, RequestStatus, Result, TaxBridgeError};

use crate::errors::InfraError;

use super::manager::DatabaseManager;

/// SQLite-backed implementation of the `RequestLogStore` port.
#[derive(Clone)]
pub struct SqliteRequestLogStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteRequestLogStore {
    pub fn new(manager: &DatabaseManager) -> Self {
        Self { pool: manager.pool() }
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|err| TaxBridgeError::from(InfraError::from(err)))?;
            work(&conn)
        })
        .await
        .map_err(|err| TaxBridgeError::Internal(format!("blocking task join failed: {err}")))?
    }

    fn fetch(conn: &rusqlite::Connection, id: &str) -> Result<RequestLog> {
        conn.query_row(
            "SELECT id, service, url, method, request_data, status, output, error,
                    description, reference_doctype, reference_name, created_at
             FROM request_log WHERE id = ?1",
            params![id],
            row_to_log,
        )
        .map_err(|err| TaxBridgeError::from(InfraError::from(err)))
    }

    fn store(conn: &rusqlite::Connection, log: &RequestLog) -> Result<()> {
        conn.execute(
            "UPDATE request_log
             SET status = ?2, output = ?3, error = ?4, description = ?5
             WHERE id = ?1",
            params![
                log.id,
                log.status.as_str(),
                log.output,
                log.error,
                log.description,
            ],
        )
        .map_err(|err| TaxBridgeError::from(InfraError::from(err)))?;
        Ok(())
    }
}

fn row_to_log(row: &Row<'_>) -> rusqlite::Result<RequestLog> {
    let method_raw: String = row.get(3)?;
    let status_raw: String = row.get(5)?;
    let created_raw: String = row.get(11)?;

    Ok(RequestLog {
        id: row.get(0)?,
        service: row.get(1)?,
        url: row.get(2)?,
        method: parse_method(&method_raw),
        request_data: row.get(4)?,
        status: parse_status(&status_raw),
        output: row.get(6)?,
        error: row.get(7)?,
        description: row.get(8)?,
        reference_doctype: row.get(9)?,
        reference_name: row.get(10)?,
        created_at: DateTime::<Utc>::from_str(&created_raw).unwrap_or_else(|_| Utc::now()),
    })
}

fn parse_method(raw: &str) -> HttpMethod {
    match raw {
        "GET" => HttpMethod::Get,
        "PATCH" => HttpMethod::Patch,
        "PUT" => HttpMethod::Put,
        _ => HttpMethod::Post,
    }
}

fn parse_status(raw: &str) -> RequestStatus {
    match raw {
        "Completed" => RequestStatus::Completed,
        "Failed" => RequestStatus::Failed,
        _ => RequestStatus::Pending,
    }
}

#[async_trait]
impl RequestLogStore for SqliteRequestLogStore {
    async fn create(&self, log: &RequestLog) -> Result<()> {
        let log = log.clone();
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO request_log
                 (id, service, url, method, request_data, status, output, error,
                  description, reference_doctype, reference_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    log.id,
                    log.service,
                    log.url,
                    log.method.as_str(),
                    log.request_data,
                    log.status.as_str(),
                    log.output,
                    log.error,
                    log.description,
                    log.reference_doctype,
                    log.reference_name,
                    log.created_at.to_rfc3339(),
                ],
            )
            .map_err(|err| TaxBridgeError::from(InfraError::from(err)))?;
            Ok(())
        })
        .await
    }

    async fn complete(
        &self,
        id: &str,
        output: Option<&str>,
        description: Option<&str>,
    ) -> Result<()> {
        let id = id.to_string();
        let output = output.map(str::to_string);
        let description = description.map(str::to_string);
        self.run_blocking(move |conn| {
            let mut log = Self::fetch(conn, &id)?;
            log.status = RequestStatus::Completed;
            if let Some(output) = output.as_deref() {
                log.append_output(output);
            }
            if let Some(description) = description.as_deref() {
                log.append_description(description);
            }
            Self::store(conn, &log)
        })
        .await
    }

    async fn fail(&self, id: &str, error: &str) -> Result<()> {
        let id = id.to_string();
        let error = error.to_string();
        self.run_blocking(move |conn| {
            let mut log = Self::fetch(conn, &id)?;
            log.status = RequestStatus::Failed;
            log.append_error(&error);
            Self::store(conn, &log)
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<RequestLog> {
        let id = id.to_string();
        self.run_blocking(move |conn| Self::fetch(conn, &id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (SqliteRequestLogStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let manager = DatabaseManager::new(&dir.path().join("bridge.db"), 2).unwrap();
        (SqliteRequestLogStore::new(&manager), dir)
    }

    fn sample_log(id: &str) -> RequestLog {
        RequestLog::new(
            id,
            "Save sales invoice",
            "https://api.fiscal.test/v1/sales-invoices/",
            HttpMethod::Post,
            Some(r#"{"document_name":"SINV-1"}"#.to_string()),
        )
        .with_reference("Sales Invoice", "SINV-1")
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let (store, _dir) = store().await;
        store.create(&sample_log("log-1")).await.unwrap();

        let fetched = store.get("log-1").await.unwrap();
        assert_eq!(fetched.status, RequestStatus::Pending);
        assert_eq!(fetched.method, HttpMethod::Post);
        assert_eq!(fetched.reference_name.as_deref(), Some("SINV-1"));
        assert!(fetched.request_data.unwrap().contains("SINV-1"));
    }

    #[tokio::test]
    async fn complete_appends_output_and_description() {
        let (store, _dir) = store().await;
        store.create(&sample_log("log-1")).await.unwrap();

        store.complete("log-1", Some(r#"{"id":"inv-1"}"#), None).await.unwrap();
        store.complete("log-1", Some("second page"), Some("Page 2 of 3")).await.unwrap();

        let fetched = store.get("log-1").await.unwrap();
        assert_eq!(fetched.status, RequestStatus::Completed);
        let output = fetched.output.unwrap();
        assert!(output.contains("inv-1"));
        assert!(output.contains("second page"));
        assert_eq!(fetched.description.as_deref(), Some("Page 2 of 3"));
    }

    #[tokio::test]
    async fn fail_accumulates_deduplicated_errors() {
        let (store, _dir) = store().await;
        store.create(&sample_log("log-1")).await.unwrap();

        store.fail("log-1", "timeout after 30s").await.unwrap();
        store.fail("log-1", "timeout after 30s").await.unwrap();
        store.fail("log-1", "connection reset").await.unwrap();

        let fetched = store.get("log-1").await.unwrap();
        assert_eq!(fetched.status, RequestStatus::Failed);
        assert_eq!(fetched.error.as_deref(), Some("timeout after 30s\nconnection reset"));
    }

    #[tokio::test]
    async fn missing_row_maps_to_not_found() {
        let (store, _dir) = store().await;
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, TaxBridgeError::NotFound(_)));
    }
}
