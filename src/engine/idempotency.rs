//! At-most-once order dispatch per `(snapshot_id, symbol)`.
//!
//! The guard remembers every dispatch attempted this process lifetime, and
//! the derived client order id makes retries idempotent on the exchange
//! side as well: the same key always produces the same id.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum DispatchStatus {
    Pending,
    Completed { order_id: String },
    Failed,
}

/// Outcome of a dispatch-begin attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchDecision {
    /// First attempt for this key; proceed
    New,
    /// Already dispatched (or in flight); do not place another order
    Duplicate { order_id: Option<String> },
}

#[derive(Default)]
pub struct DispatchGuard {
    records: Mutex<HashMap<String, DispatchStatus>>,
}

impl DispatchGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch key for a cycle's order
    pub fn key(snapshot_id: &str, symbol: &str) -> String {
        format!("{snapshot_id}:{symbol}")
    }

    /// Deterministic exchange client order id for a key (fits the common
    /// 36-char exchange limit).
    pub fn client_order_id(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        let hex: String = digest
            .iter()
            .take(15)
            .map(|b| format!("{b:02x}"))
            .collect();
        format!("hx-{hex}")
    }

    /// Claim the key. Completed and in-flight dispatches are duplicates;
    /// a previously failed dispatch may be retried.
    pub fn begin(&self, key: &str) -> DispatchDecision {
        let mut records = self.records.lock().expect("dispatch guard lock poisoned");
        match records.get(key) {
            Some(DispatchStatus::Completed { order_id }) => {
                warn!(key, order_id, "duplicate dispatch suppressed");
                DispatchDecision::Duplicate {
                    order_id: Some(order_id.clone()),
                }
            }
            Some(DispatchStatus::Pending) => {
                warn!(key, "dispatch already in flight");
                DispatchDecision::Duplicate { order_id: None }
            }
            Some(DispatchStatus::Failed) | None => {
                records.insert(key.to_string(), DispatchStatus::Pending);
                debug!(key, "dispatch claimed");
                DispatchDecision::New
            }
        }
    }

    pub fn complete(&self, key: &str, order_id: &str) {
        self.records
            .lock()
            .expect("dispatch guard lock poisoned")
            .insert(
                key.to_string(),
                DispatchStatus::Completed {
                    order_id: order_id.to_string(),
                },
            );
    }

    pub fn fail(&self, key: &str) {
        self.records
            .lock()
            .expect("dispatch guard lock poisoned")
            .insert(key.to_string(), DispatchStatus::Failed);
    }
}
