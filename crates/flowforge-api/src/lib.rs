//! HTTP orchestration surface: request/response wiring around the search, synthesis, and
//! registry crates (components C12 through C18).

pub mod auth;
pub mod dto;
pub mod error;
pub mod idempotency;
pub mod jobs;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod service;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::build_router;
pub use service::OrchestrationService;
pub use state::AppState;
