//! # TaxBridge Infra
//!
//! Infrastructure adapters for the ERP to fiscal-service integration:
//!
//! - `http` - retrying HTTP client built on reqwest
//! - `remote` - transport, auth, classification, handlers, orchestrator
//! - `jobs` - in-process background job queue and worker
//! - `scheduling` - cron-based submission sweep
//! - `database` - SQLite-backed request log
//! - `config` - environment/file configuration loader
//! - `observability` - lightweight performance counters
//! - `stores` - in-memory port implementations for the out-of-scope ERP
//!   storage

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod jobs;
pub mod observability;
pub mod remote;
pub mod scheduling;
pub mod stores;

pub use errors::InfraError;
pub use http::HttpClient;
