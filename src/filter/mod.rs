// src/filter/mod.rs
//! Thesis filter pipeline: stage 1 is the free hard disqualifier, stage 2 the
//! paid LLM classification routed by score. Stage 1 failing means stage 2 is
//! never invoked: cost avoidance is the whole point of having two stages.

pub mod disqualify;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{DynClassifier, ThesisClassification};
use crate::signal::StoredSignal;
use disqualify::{Disqualifier, DisqualifyResult};

/// Scores below this are rejected outright.
pub const REVIEW_THRESHOLD: f32 = 0.5;
/// Scores at or above this skip human review.
pub const AUTO_APPROVE_THRESHOLD: f32 = 0.85;

/// Routing outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterResultType {
    AutoReject,
    LlmReject,
    LlmReview,
    LlmAutoApprove,
    /// The classifier failed; the signal stays retryable. Never conflated with
    /// a low-score rejection.
    ClassificationError,
}

impl FilterResultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterResultType::AutoReject => "auto_reject",
            FilterResultType::LlmReject => "llm_reject",
            FilterResultType::LlmReview => "llm_review",
            FilterResultType::LlmAutoApprove => "llm_auto_approve",
            FilterResultType::ClassificationError => "classification_error",
        }
    }
}

/// One evaluation of one signal. Immutable once created; the store appends
/// these as the audit trail, so a re-evaluated signal accumulates several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    pub signal_id: u64,
    pub result_type: FilterResultType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disqualify_result: Option<DisqualifyResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<ThesisClassification>,
    /// Classifier failure detail, kept for the audit trail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl FilterResult {
    pub fn auto_reject(signal_id: u64, disqualify: DisqualifyResult) -> Self {
        Self {
            signal_id,
            result_type: FilterResultType::AutoReject,
            disqualify_result: Some(disqualify),
            classification: None,
            error: None,
            evaluated_at: Utc::now(),
        }
    }

    pub fn routed(
        signal_id: u64,
        result_type: FilterResultType,
        disqualify_result: Option<DisqualifyResult>,
        classification: Option<ThesisClassification>,
    ) -> Self {
        Self {
            signal_id,
            result_type,
            disqualify_result,
            classification,
            error: None,
            evaluated_at: Utc::now(),
        }
    }

    pub fn classification_error(
        signal_id: u64,
        disqualify_result: Option<DisqualifyResult>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            signal_id,
            result_type: FilterResultType::ClassificationError,
            disqualify_result,
            classification: None,
            error: Some(error.into()),
            evaluated_at: Utc::now(),
        }
    }
}

/// Fixed routing policy. Both bounds are the lower edge of their bucket:
/// 0.5 routes to review, 0.85 routes to auto-approve.
pub fn route_score(score: f32) -> FilterResultType {
    if score < REVIEW_THRESHOLD {
        FilterResultType::LlmReject
    } else if score < AUTO_APPROVE_THRESHOLD {
        FilterResultType::LlmReview
    } else {
        FilterResultType::LlmAutoApprove
    }
}

/// Composes the hard disqualifier and the injected classifier into a single
/// routing decision per signal.
pub struct FilterPipeline {
    disqualifier: Disqualifier,
    classifier: DynClassifier,
}

impl FilterPipeline {
    pub fn new(disqualifier: Disqualifier, classifier: DynClassifier) -> Self {
        Self {
            disqualifier,
            classifier,
        }
    }

    /// Evaluate one signal. Infallible by design: classifier failures become a
    /// `ClassificationError` audit row rather than a dropped signal.
    pub async fn evaluate(&self, signal: &StoredSignal) -> FilterResult {
        let text = signal.signal.filter_text();

        let dq = self.disqualifier.evaluate(&text);
        if !dq.passed {
            tracing::debug!(
                target: "filter",
                signal_id = signal.id,
                category = ?dq.category,
                "hard disqualified"
            );
            return FilterResult::auto_reject(signal.id, dq);
        }

        match self.classifier.classify(&text).await {
            Ok(classification) => {
                let result_type = route_score(classification.score);
                tracing::info!(
                    target: "filter",
                    signal_id = signal.id,
                    score = classification.score,
                    category = classification.category.as_str(),
                    outcome = result_type.as_str(),
                    "classified"
                );
                FilterResult::routed(signal.id, result_type, Some(dq), Some(classification))
            }
            Err(e) => {
                tracing::warn!(
                    target: "filter",
                    signal_id = signal.id,
                    error = %e,
                    "classification failed; signal left retryable"
                );
                FilterResult::classification_error(signal.id, Some(dq), e.to_string())
            }
        }
    }
}
