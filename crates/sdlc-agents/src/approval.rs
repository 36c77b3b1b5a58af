//! Human approval gate: published stories plus a single-slot decision
//! signal.
//!
//! The reviewer publishes the drafted stories here and then awaits one
//! verdict. The decision slot is a watch channel rather than a poll-and-
//! sleep loop, so the reviewer wakes as soon as the human acts, and the
//! slot is cleared on consumption so a stale verdict cannot leak into a
//! later review round.
//!
//! The gate never drives the workflow itself: the machine only ever
//! observes the messages the reviewer emits after consulting it.

use tokio::sync::{watch, Mutex};
use tracing::info;

use crate::stories::Story;

/// The human verdict on a published story collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Revise,
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("cannot approve: no non-empty story collection is visible")]
    NothingToApprove,
}

pub struct ApprovalGate {
    stories_tx: watch::Sender<Vec<Story>>,
    decision_tx: watch::Sender<Option<Decision>>,
    decision_rx: Mutex<watch::Receiver<Option<Decision>>>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        let (stories_tx, _) = watch::channel(Vec::new());
        let (decision_tx, decision_rx) = watch::channel(None);
        Self {
            stories_tx,
            decision_tx,
            decision_rx: Mutex::new(decision_rx),
        }
    }

    /// Publish the current story collection for human review.
    ///
    /// Replaces whatever was visible before; notifies all subscribers even
    /// when the content is unchanged (a revise round may republish the same
    /// draft).
    pub fn publish(&self, stories: &[Story]) {
        info!(count = stories.len(), "stories published for review");
        self.stories_tx.send_replace(stories.to_vec());
    }

    /// Snapshot of the stories currently visible to the human.
    pub fn pending_stories(&self) -> Vec<Story> {
        self.stories_tx.borrow().clone()
    }

    /// Subscribe to story publications (UI/driver side).
    pub fn subscribe_stories(&self) -> watch::Receiver<Vec<Story>> {
        self.stories_tx.subscribe()
    }

    /// Record human approval.
    ///
    /// Refused unless a non-empty story collection has been published; an
    /// empty review panel must never authorize ticket creation.
    pub fn approve(&self) -> Result<(), GateError> {
        if self.stories_tx.borrow().is_empty() {
            return Err(GateError::NothingToApprove);
        }
        info!("stories approved");
        self.decision_tx.send_replace(Some(Decision::Approve));
        Ok(())
    }

    /// Record a revision request.
    pub fn request_revision(&self) {
        info!("revision requested");
        self.decision_tx.send_replace(Some(Decision::Revise));
    }

    /// Wait for the next human decision and consume it.
    pub async fn wait_decision(&self) -> Decision {
        let mut rx = self.decision_rx.lock().await;
        let decision = loop {
            if let Some(d) = *rx.borrow_and_update() {
                break d;
            }
            // The sender lives in `self`, so the channel cannot close while
            // this borrow exists.
            rx.changed().await.expect("decision sender dropped");
        };
        self.decision_tx.send_replace(None);
        decision
    }
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self::new()
    }
}
