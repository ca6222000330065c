//! Remote fiscal-service integration
//!
//! The request/response pipeline: typed calls built from route templates,
//! a transport executing one HTTP call with bearer auth and a single
//! 401-triggered refresh-and-retry, a response classifier dispatching to
//! the per-route handler table, the sequential sales orchestrator, and the
//! reconciliation applier.

pub mod auth;
pub mod classifier;
pub mod errors;
pub mod handlers;
pub mod orchestrator;
pub mod reconciler;
pub mod request;
pub mod response;
pub mod transport;

pub use auth::TokenManager;
pub use classifier::{extract_error_message, is_success, pagination_description};
pub use errors::{RemoteError, RemoteErrorCategory};
pub use handlers::{FiscalApi, HandlerContext, HandlerDeps, HandlerRegistry, RequestReference, ResponseHandler};
pub use orchestrator::{PipelineExecutor, SalesOrchestrator};
pub use reconciler::Reconciler;
pub use request::RemoteCall;
pub use response::ResponseBody;
pub use transport::Transport;
