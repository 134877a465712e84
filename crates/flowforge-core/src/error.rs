//! Unified error taxonomy (spec section 7), mapped onto HTTP status codes by the API layer.

use thiserror::Error;

/// FlowForge result type.
pub type Result<T> = std::result::Result<T, ForgeError>;

/// Errors that can occur anywhere in the optimization pipeline.
///
/// Every variant corresponds to one of the design-level error kinds in the specification's
/// error handling section; [`ForgeError::status_code`] realizes the HTTP mapping.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ForgeError {
    /// Malformed input, bad ratios, invalid idempotency key, path outside an allow-list.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or invalid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Valid credentials, insufficient role permission.
    #[error("permission denied: {0}")]
    Forbidden(String),

    /// Agent, version, or job does not exist, or belongs to another tenant.
    #[error("not found: {0}")]
    NotFound(String),

    /// An idempotent request with the same key is still in flight.
    #[error("request in progress: {0}")]
    Conflict(String),

    /// Executor failure or timeout. Callers that hit this in the evaluation path must
    /// absorb it into a `CaseExecution` rather than propagate it (spec section 7).
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Executor circuit breaker is open.
    #[error("circuit open: {0}")]
    CircuitOpen(String),

    /// Durable storage commit failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Process startup configuration failed validation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic I/O failure (artifact store, manual blueprint loading).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForgeError {
    /// HTTP status code this error maps to, per spec section 7.
    pub fn status_code(&self) -> u16 {
        match self {
            ForgeError::Validation(_) => 400,
            ForgeError::Unauthorized(_) => 401,
            ForgeError::Forbidden(_) => 403,
            ForgeError::NotFound(_) => 404,
            ForgeError::Conflict(_) => 409,
            ForgeError::Runtime(_) | ForgeError::CircuitOpen(_) => 500,
            ForgeError::Persistence(_) => 500,
            ForgeError::Configuration(_) => 500,
            ForgeError::Serialization(_) => 500,
            ForgeError::Io(_) => 500,
        }
    }

    /// A short machine-readable kind tag, used in structured log fields and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForgeError::Validation(_) => "validation_error",
            ForgeError::Unauthorized(_) => "auth_error",
            ForgeError::Forbidden(_) => "auth_error",
            ForgeError::NotFound(_) => "not_found",
            ForgeError::Conflict(_) => "conflict",
            ForgeError::Runtime(_) => "runtime_error",
            ForgeError::CircuitOpen(_) => "circuit_open",
            ForgeError::Persistence(_) => "persistence_error",
            ForgeError::Configuration(_) => "configuration_error",
            ForgeError::Serialization(_) => "serialization_error",
            ForgeError::Io(_) => "io_error",
        }
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(err: serde_json::Error) -> Self {
        ForgeError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(ForgeError::Validation("x".into()).status_code(), 400);
        assert_eq!(ForgeError::Unauthorized("x".into()).status_code(), 401);
        assert_eq!(ForgeError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(ForgeError::NotFound("x".into()).status_code(), 404);
        assert_eq!(ForgeError::Conflict("x".into()).status_code(), 409);
        assert_eq!(ForgeError::Persistence("x".into()).status_code(), 500);
    }

    #[test]
    fn display_never_leaks_debug_internals() {
        let err = ForgeError::Validation("bad ratio".into());
        assert_eq!(err.to_string(), "validation error: bad ratio");
    }
}
