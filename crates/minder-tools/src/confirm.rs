//! Confirmation broker for human-in-the-loop gating.
//!
//! A gated call suspends on a oneshot receiver keyed by request id; the
//! controlling session resolves it explicitly, and a timeout or dropped
//! sender resolves to deny. The wait never leaves the loop stuck.

use log::{debug, info, warn};
use minder_protocol::ApprovalDecision;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Tracks pending confirmation requests awaiting a user decision.
#[derive(Default)]
pub struct ConfirmationBroker {
    pending: Mutex<HashMap<Uuid, oneshot::Sender<ApprovalDecision>>>,
}

impl ConfirmationBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new pending request, returning its id and the receiver the
    /// dispatcher waits on.
    pub fn begin(&self) -> (Uuid, oneshot::Receiver<ApprovalDecision>) {
        let request_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);
        debug!("confirmation requested (request_id={})", request_id);
        (request_id, rx)
    }

    /// Resolve a pending request. Returns false if the id is unknown or
    /// already resolved.
    pub fn resolve(&self, request_id: Uuid, decision: ApprovalDecision) -> bool {
        let Some(sender) = self.pending.lock().remove(&request_id) else {
            warn!(
                "confirmation resolution for unknown request (request_id={})",
                request_id
            );
            return false;
        };
        info!(
            "confirmation resolved (request_id={}, decision={:?})",
            request_id, decision
        );
        sender.send(decision).is_ok()
    }

    /// Wait for a decision, resolving to deny on timeout or a dropped
    /// sender.
    pub async fn wait(
        &self,
        request_id: Uuid,
        receiver: oneshot::Receiver<ApprovalDecision>,
        timeout: Duration,
    ) -> ApprovalDecision {
        match tokio::time::timeout(timeout, receiver).await {
            Ok(result) => result.unwrap_or(ApprovalDecision::Deny),
            Err(_) => {
                warn!(
                    "confirmation timed out, denying (request_id={})",
                    request_id
                );
                self.pending.lock().remove(&request_id);
                ApprovalDecision::Deny
            }
        }
    }

    /// Number of unresolved requests.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn resolved_request_delivers_decision() {
        let broker = ConfirmationBroker::new();
        let (request_id, receiver) = broker.begin();
        assert!(broker.resolve(request_id, ApprovalDecision::Approve));
        let decision = broker
            .wait(request_id, receiver, Duration::from_secs(1))
            .await;
        assert_eq!(decision, ApprovalDecision::Approve);
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_resolves_to_deny_and_clears_pending() {
        let broker = ConfirmationBroker::new();
        let (request_id, receiver) = broker.begin();
        let decision = broker
            .wait(request_id, receiver, Duration::from_millis(50))
            .await;
        assert_eq!(decision, ApprovalDecision::Deny);
        assert_eq!(broker.pending_count(), 0);
        // late resolution finds nothing to resolve
        assert!(!broker.resolve(request_id, ApprovalDecision::Approve));
    }

    #[tokio::test]
    async fn unknown_request_id_is_rejected() {
        let broker = ConfirmationBroker::new();
        assert!(!broker.resolve(Uuid::new_v4(), ApprovalDecision::Deny));
    }
}
