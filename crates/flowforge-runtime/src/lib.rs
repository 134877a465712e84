//! Executor adapters bridging a blueprint to whatever actually runs it (component C2), plus
//! the `workflow.yml` manifest renderer and manual blueprint loader that sit alongside it.
//!
//! [`MockExecutor`] is the deterministic, network-free default; [`ExternalExecutor`] bridges
//! to an HTTP-hosted runtime behind a timeout, bounded retry, and circuit breaker.

pub mod external;
pub mod manifest;
pub mod mock;

pub use external::ExternalExecutor;
pub use manifest::{load_manual_blueprint, parse_manual_blueprint, render_workflow_yaml};
pub use mock::MockExecutor;
