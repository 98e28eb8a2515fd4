// src/signal.rs
//! Core signal types: raw collector output, stored records, and review decisions.
//!
//! A `Signal` is what a collector hands over; a `StoredSignal` is what the store
//! owns after dedup-insert. Collectors never hold a `StoredSignal`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// External source a signal was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceApi {
    Hn,
    Reddit,
    BevnetRss,
    NoshRss,
    UsptoTm,
}

impl SourceApi {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceApi::Hn => "hn",
            SourceApi::Reddit => "reddit",
            SourceApi::BevnetRss => "bevnet_rss",
            SourceApi::NoshRss => "nosh_rss",
            SourceApi::UsptoTm => "uspto_tm",
        }
    }
}

impl fmt::Display for SourceApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw collector output. Ephemeral until `SignalStore::save_signal` accepts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub source_api: SourceApi,
    /// Source-native identifier (HN object id, Reddit fullname, RSS GUID, TM serial).
    pub source_id: String,
    pub title: String,
    pub url: Option<String>,
    /// Opaque per-source extras (subreddit, points, filing owner, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw_metadata: BTreeMap<String, String>,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("signal from {0} has an empty source_id")]
    MissingSourceId(SourceApi),
    #[error("signal {0}/{1} has an empty title")]
    MissingTitle(SourceApi, String),
}

impl Signal {
    /// Text handed to the filter stages: title plus any free-text description.
    pub fn filter_text(&self) -> String {
        match self.raw_metadata.get("description") {
            Some(d) if !d.trim().is_empty() => format!("{} {}", self.title, d),
            _ => self.title.clone(),
        }
    }

    /// Ingestion-time validation. Malformed signals are logged and dropped,
    /// never stored.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source_id.trim().is_empty() {
            return Err(ValidationError::MissingSourceId(self.source_api));
        }
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingTitle(
                self.source_api,
                self.source_id.clone(),
            ));
        }
        Ok(())
    }
}

/// Lifecycle of a stored signal. Transitions are one-directional; the store
/// rejects backward moves and skipped states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    New,
    PendingFilter,
    AutoRejected,
    LlmRejected,
    LlmReview,
    LlmAutoApprove,
    InNotion,
    Approved,
    Rejected,
}

impl SignalStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SignalStatus::AutoRejected
                | SignalStatus::LlmRejected
                | SignalStatus::Approved
                | SignalStatus::Rejected
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::New => "new",
            SignalStatus::PendingFilter => "pending_filter",
            SignalStatus::AutoRejected => "auto_rejected",
            SignalStatus::LlmRejected => "llm_rejected",
            SignalStatus::LlmReview => "llm_review",
            SignalStatus::LlmAutoApprove => "llm_auto_approve",
            SignalStatus::InNotion => "in_notion",
            SignalStatus::Approved => "approved",
            SignalStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal as owned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSignal {
    pub id: u64,
    /// 32 lowercase hex chars derived from immutable source identity.
    pub content_hash: String,
    pub status: SignalStatus,
    /// Review-inbox page reference, set once the signal is pushed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub signal: Signal,
}

/// Outcome of a human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

/// Why a reviewer rejected a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    NotConsumer,
    WrongCategory,
    TooEarly,
    TooLate,
    InsufficientInfo,
    Other,
}

impl RejectionReason {
    /// Lenient parse for values coming back from the review inbox.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "not_consumer" => Some(Self::NotConsumer),
            "wrong_category" => Some(Self::WrongCategory),
            "too_early" => Some(Self::TooEarly),
            "too_late" => Some(Self::TooLate),
            "insufficient_info" => Some(Self::InsufficientInfo),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// One human decision synced back from the review inbox. Append-only truth;
/// re-syncing the identical decision is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAction {
    pub signal_id: u64,
    pub decision: Decision,
    /// Present only when rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<RejectionReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub synced_at: DateTime<Utc>,
}

/// One collection pass, recorded for health monitoring. Never mutated after
/// completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorRun {
    pub source_api: SourceApi,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub signals_found: usize,
    pub signals_new: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
