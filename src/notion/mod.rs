// src/notion/mod.rs
//! Review-inbox capability: push routed signals out for human review, poll
//! decisions back. The engine only ever sees this trait; rate limiting and
//! retry policy live behind it.

pub mod client;

use std::sync::Mutex;

use anyhow::Result;

use crate::filter::FilterResult;
use crate::signal::{Decision, RejectionReason, StoredSignal};

/// One decision row pulled from the inbox, keyed by the reference handed out
/// at push time.
#[derive(Debug, Clone, PartialEq)]
pub struct InboxDecision {
    pub external_ref: String,
    pub decision: Decision,
    pub rejection_reason: Option<RejectionReason>,
    pub notes: Option<String>,
}

#[async_trait::async_trait]
pub trait ReviewInbox: Send + Sync {
    /// Push one signal with its routing context; returns the opaque external
    /// reference id.
    async fn push(&self, signal: &StoredSignal, result: &FilterResult) -> Result<String>;

    /// Pull decision records for previously pushed signals.
    async fn poll_decisions(&self) -> Result<Vec<InboxDecision>>;
}

// --- Test helper ---

/// In-memory inbox: records pushes, hands out sequential refs, and serves
/// whatever decisions tests queue up.
pub struct MockInbox {
    pub pushed: Mutex<Vec<(u64, String)>>,
    pub decisions: Mutex<Vec<InboxDecision>>,
}

impl MockInbox {
    pub fn new() -> Self {
        Self {
            pushed: Mutex::new(Vec::new()),
            decisions: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_decision(&self, d: InboxDecision) {
        self.decisions.lock().unwrap().push(d);
    }
}

impl Default for MockInbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ReviewInbox for MockInbox {
    async fn push(&self, signal: &StoredSignal, _result: &FilterResult) -> Result<String> {
        let mut pushed = self.pushed.lock().unwrap();
        let external_ref = format!("mock-page-{}", pushed.len() + 1);
        pushed.push((signal.id, external_ref.clone()));
        Ok(external_ref)
    }

    async fn poll_decisions(&self) -> Result<Vec<InboxDecision>> {
        Ok(self.decisions.lock().unwrap().clone())
    }
}
