//! Idempotency-key bookkeeping for mutating endpoints (C14, spec section 4.15).
//!
//! Keyed by `(scope, key)` where `scope` is `"{tenant_id}:{operation}"`; a second request
//! with the same idempotency key while the first is still in flight gets `Conflict`, and
//! once the first completes, the same key replays the stored response instead of re-running
//! the operation.

use dashmap::DashMap;
use flowforge_core::error::{ForgeError, Result};
use flowforge_core::models::{IdempotencyRecord, IdempotencyStatus};

/// What the caller should do after calling [`IdempotencyStore::begin`].
pub enum BeginOutcome {
    /// No prior record; the caller should run the operation and call `complete`.
    Start,
    /// The operation already completed; replay this response verbatim.
    Replay(serde_json::Value),
}

#[derive(Default)]
pub struct IdempotencyStore {
    records: DashMap<String, IdempotencyRecord>,
}

fn composite_key(scope: &str, key: &str) -> String {
    format!("{scope}|{key}")
}

impl IdempotencyStore {
    pub fn new() -> Self {
        IdempotencyStore::default()
    }

    pub fn begin(&self, scope: &str, key: &str) -> Result<BeginOutcome> {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(ForgeError::Validation("idempotency key must not be empty".to_string()));
        }
        let composite = composite_key(scope, trimmed);

        if let Some(existing) = self.records.get(&composite) {
            return match existing.status {
                IdempotencyStatus::Completed => {
                    Ok(BeginOutcome::Replay(existing.response.clone().unwrap_or(serde_json::Value::Null)))
                }
                IdempotencyStatus::InProgress => {
                    Err(ForgeError::Conflict(format!("request with idempotency key '{trimmed}' is already in progress")))
                }
            };
        }

        let now = chrono::Utc::now();
        self.records.insert(
            composite,
            IdempotencyRecord { status: IdempotencyStatus::InProgress, response: None, created_at: now, updated_at: now },
        );
        Ok(BeginOutcome::Start)
    }

    pub fn complete(&self, scope: &str, key: &str, response: serde_json::Value) {
        let composite = composite_key(scope, key.trim());
        if let Some(mut record) = self.records.get_mut(&composite) {
            record.status = IdempotencyStatus::Completed;
            record.response = Some(response);
            record.updated_at = chrono::Utc::now();
        }
    }

    /// Removes an in-progress record so a failed operation can be retried under the same key.
    pub fn discard(&self, scope: &str, key: &str) {
        let composite = composite_key(scope, key.trim());
        self.records.remove(&composite);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected() {
        let store = IdempotencyStore::new();
        let err = store.begin("tenant:optimize", "  ").unwrap_err();
        assert!(matches!(err, ForgeError::Validation(_)));
    }

    #[test]
    fn second_begin_while_in_progress_is_conflict() {
        let store = IdempotencyStore::new();
        assert!(matches!(store.begin("tenant:optimize", "key-1").unwrap(), BeginOutcome::Start));
        let err = store.begin("tenant:optimize", "key-1").unwrap_err();
        assert!(matches!(err, ForgeError::Conflict(_)));
    }

    #[test]
    fn completed_request_replays_stored_response() {
        let store = IdempotencyStore::new();
        store.begin("tenant:optimize", "key-1").unwrap();
        store.complete("tenant:optimize", "key-1", serde_json::json!({"run_id": "run-1"}));
        match store.begin("tenant:optimize", "key-1").unwrap() {
            BeginOutcome::Replay(response) => assert_eq!(response["run_id"], "run-1"),
            BeginOutcome::Start => panic!("expected replay"),
        }
    }

    #[test]
    fn discard_allows_retry_under_the_same_key() {
        let store = IdempotencyStore::new();
        store.begin("tenant:optimize", "key-1").unwrap();
        store.discard("tenant:optimize", "key-1");
        assert!(matches!(store.begin("tenant:optimize", "key-1").unwrap(), BeginOutcome::Start));
    }

    #[test]
    fn scopes_are_isolated_per_tenant() {
        let store = IdempotencyStore::new();
        store.begin("tenant-a:optimize", "key-1").unwrap();
        assert!(matches!(store.begin("tenant-b:optimize", "key-1").unwrap(), BeginOutcome::Start));
    }
}
