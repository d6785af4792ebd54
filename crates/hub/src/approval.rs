//! Tool-call approval gate.
//!
//! Unless a server (or an individual tool) is configured for auto-approval,
//! every dispatch pauses here until an out-of-band reviewer resolves it.
//! The waiting call is parked on a `oneshot`; the CLI (or any other frontend)
//! subscribes to pending requests and answers them. A timeout ensures a
//! call never blocks forever.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The decision made by a reviewer.
#[derive(Debug)]
pub enum ApprovalDecision {
    Approved,
    Denied { reason: Option<String> },
}

/// A pending approval waiting for review.
struct PendingApproval {
    respond: oneshot::Sender<ApprovalDecision>,
}

/// Serializable snapshot of a pending approval, delivered to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub server: String,
    pub tool: String,
    pub arguments: Value,
    pub created_at: DateTime<Utc>,
}

/// The outcome of waiting on the gate.
#[derive(Debug, PartialEq, Eq)]
pub enum GateOutcome {
    Approved,
    Denied { reason: Option<String> },
    TimedOut,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Thread-safe store of pending tool-call approvals.
pub struct ApprovalStore {
    pending: RwLock<HashMap<Uuid, PendingApproval>>,
    requests: RwLock<HashMap<Uuid, ApprovalRequest>>,
    subscriber: RwLock<Option<mpsc::UnboundedSender<ApprovalRequest>>>,
    /// When set, every gate resolves immediately (headless runs, tests).
    approve_all: AtomicBool,
    timeout: Duration,
}

impl ApprovalStore {
    /// Create a new store with the given approval timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            requests: RwLock::new(HashMap::new()),
            subscriber: RwLock::new(None),
            approve_all: AtomicBool::new(false),
            timeout,
        }
    }

    /// Resolve every gate immediately without review.
    pub fn set_approve_all(&self, approve: bool) {
        self.approve_all.store(approve, Ordering::SeqCst);
    }

    /// Register the (single) reviewer. New pending requests are pushed onto
    /// the returned channel.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ApprovalRequest> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.subscriber.write() = Some(tx);
        rx
    }

    /// Park the calling task until the request is approved, denied, or the
    /// timeout elapses.
    pub async fn wait_for_approval(
        &self,
        server: &str,
        tool: &str,
        arguments: &Value,
    ) -> GateOutcome {
        if self.approve_all.load(Ordering::SeqCst) {
            return GateOutcome::Approved;
        }

        let id = Uuid::new_v4();
        let request = ApprovalRequest {
            id,
            server: server.to_owned(),
            tool: tool.to_owned(),
            arguments: arguments.clone(),
            created_at: Utc::now(),
        };

        let (tx, rx) = oneshot::channel();
        self.pending.write().insert(id, PendingApproval { respond: tx });
        self.requests.write().insert(id, request.clone());

        let notified = {
            let subscriber = self.subscriber.read();
            match subscriber.as_ref() {
                Some(sub) => sub.send(request).is_ok(),
                None => false,
            }
        };
        if !notified {
            tracing::warn!(
                server = %server,
                tool = %tool,
                "tool call awaiting approval but no reviewer is subscribed"
            );
        }

        let outcome = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(ApprovalDecision::Approved)) => GateOutcome::Approved,
            Ok(Ok(ApprovalDecision::Denied { reason })) => GateOutcome::Denied { reason },
            // Sender dropped without a decision: treat as denial.
            Ok(Err(_)) => GateOutcome::Denied { reason: None },
            Err(_) => GateOutcome::TimedOut,
        };

        self.pending.write().remove(&id);
        self.requests.write().remove(&id);
        outcome
    }

    /// Resolve a pending approval as approved. Returns `true` if found.
    pub fn approve(&self, id: &Uuid) -> bool {
        if let Some(pending) = self.pending.write().remove(id) {
            let _ = pending.respond.send(ApprovalDecision::Approved);
            return true;
        }
        false
    }

    /// Resolve a pending approval as denied. Returns `true` if found.
    pub fn deny(&self, id: &Uuid, reason: Option<String>) -> bool {
        if let Some(pending) = self.pending.write().remove(id) {
            let _ = pending.respond.send(ApprovalDecision::Denied { reason });
            return true;
        }
        false
    }

    /// List all currently pending approvals.
    pub fn list_pending(&self) -> Vec<ApprovalRequest> {
        self.requests.read().values().cloned().collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_store() -> ApprovalStore {
        ApprovalStore::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn approve_unblocks_waiter() {
        let store = std::sync::Arc::new(make_store());
        let mut rx = store.subscribe();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .wait_for_approval("fs", "read_file", &json!({"path": "/tmp/a"}))
                    .await
            })
        };

        let request = rx.recv().await.unwrap();
        assert_eq!(request.server, "fs");
        assert_eq!(request.tool, "read_file");
        assert!(store.approve(&request.id));

        assert_eq!(waiter.await.unwrap(), GateOutcome::Approved);
        assert!(store.list_pending().is_empty());
    }

    #[tokio::test]
    async fn deny_unblocks_waiter_with_reason() {
        let store = std::sync::Arc::new(make_store());
        let mut rx = store.subscribe();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_for_approval("fs", "rm", &json!({})).await })
        };

        let request = rx.recv().await.unwrap();
        assert!(store.deny(&request.id, Some("too dangerous".into())));

        match waiter.await.unwrap() {
            GateOutcome::Denied { reason } => {
                assert_eq!(reason.as_deref(), Some("too dangerous"));
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn gate_times_out_without_reviewer() {
        let store = ApprovalStore::new(Duration::from_millis(50));
        let outcome = store.wait_for_approval("fs", "read_file", &json!({})).await;
        assert_eq!(outcome, GateOutcome::TimedOut);
        assert!(store.list_pending().is_empty());
    }

    #[tokio::test]
    async fn approve_all_skips_the_gate() {
        let store = ApprovalStore::new(Duration::from_millis(50));
        store.set_approve_all(true);
        let outcome = store.wait_for_approval("fs", "read_file", &json!({})).await;
        assert_eq!(outcome, GateOutcome::Approved);
    }

    #[test]
    fn approve_nonexistent_returns_false() {
        let store = make_store();
        assert!(!store.approve(&Uuid::new_v4()));
        assert!(!store.deny(&Uuid::new_v4(), None));
    }
}
