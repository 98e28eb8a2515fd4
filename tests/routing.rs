// tests/routing.rs
// Routing-threshold boundaries and the stage-1 short-circuit, exercised
// through the filter pipeline with a counting mock classifier.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use consumer_signal_engine::classify::{ClassifyError, MockClassifier, ThesisCategory};
use consumer_signal_engine::filter::disqualify::Disqualifier;
use consumer_signal_engine::filter::{route_score, FilterPipeline, FilterResultType};
use consumer_signal_engine::signal::{Signal, SignalStatus, SourceApi, StoredSignal};

fn mk_stored(title: &str) -> StoredSignal {
    StoredSignal {
        id: 1,
        content_hash: "ab".repeat(16),
        status: SignalStatus::PendingFilter,
        external_ref: None,
        created_at: Utc::now(),
        signal: Signal {
            source_api: SourceApi::BevnetRss,
            source_id: "guid-1".into(),
            title: title.into(),
            url: None,
            raw_metadata: BTreeMap::new(),
            collected_at: Utc::now(),
        },
    }
}

async fn outcome_for_score(score: f32) -> FilterResultType {
    let mock = Arc::new(MockClassifier::fixed(score, ThesisCategory::ConsumerCpg));
    let pipeline = FilterPipeline::new(Disqualifier::default(), mock);
    pipeline
        .evaluate(&mk_stored("Sparkling tea brand expands"))
        .await
        .result_type
}

/// 0.5 and 0.85 are the inclusive lower bound of their buckets.
#[tokio::test]
async fn score_boundaries_route_exactly_as_documented() {
    assert_eq!(outcome_for_score(0.49999).await, FilterResultType::LlmReject);
    assert_eq!(outcome_for_score(0.5).await, FilterResultType::LlmReview);
    assert_eq!(outcome_for_score(0.8499).await, FilterResultType::LlmReview);
    assert_eq!(
        outcome_for_score(0.85).await,
        FilterResultType::LlmAutoApprove
    );
}

#[test]
fn route_score_is_pure_policy() {
    assert_eq!(route_score(0.0), FilterResultType::LlmReject);
    assert_eq!(route_score(1.0), FilterResultType::LlmAutoApprove);
}

/// A disqualified signal must never reach the paid stage. Verified by call
/// count, not a network mock.
#[tokio::test]
async fn disqualified_signal_never_reaches_the_classifier() {
    let mock = Arc::new(MockClassifier::fixed(0.99, ThesisCategory::ConsumerCpg));
    let pipeline = FilterPipeline::new(Disqualifier::default(), mock.clone());

    let r = pipeline
        .evaluate(&mk_stored("b2b saas platform for fleet telematics"))
        .await;
    assert_eq!(r.result_type, FilterResultType::AutoReject);
    assert_eq!(mock.calls(), 0);
    let dq = r.disqualify_result.unwrap();
    assert!(!dq.passed);
    assert_eq!(dq.category.unwrap().as_str(), "b2b");
}

/// Consumer-positive suppression: a positive term outside the matched
/// disqualifying phrase cancels the rejection, so the signal goes on to the
/// classifier. This asserts the documented precedence for the ambiguous rule.
#[tokio::test]
async fn suppressed_disqualification_proceeds_to_stage_two() {
    let mock = Arc::new(MockClassifier::fixed(0.6, ThesisCategory::ConsumerHealthTech));
    let pipeline = FilterPipeline::new(Disqualifier::default(), mock.clone());

    let r = pipeline
        .evaluate(&mk_stored("fitness app built with modern API"))
        .await;
    assert_eq!(mock.calls(), 1, "suppression must cancel the auto-reject");
    assert_eq!(r.result_type, FilterResultType::LlmReview);
    // The stage-1 verdict in the audit row shows the pass.
    assert!(r.disqualify_result.unwrap().passed);
}

/// Classifier failures are a distinct outcome, never a rejection.
#[tokio::test]
async fn classifier_error_yields_classification_error() {
    let mock = Arc::new(MockClassifier::failing(|| ClassifyError::QuotaExhausted));
    let pipeline = FilterPipeline::new(Disqualifier::default(), mock);

    let r = pipeline
        .evaluate(&mk_stored("Sparkling tea brand expands"))
        .await;
    assert_eq!(r.result_type, FilterResultType::ClassificationError);
    assert!(r.error.as_deref().unwrap().contains("budget exhausted"));
}
