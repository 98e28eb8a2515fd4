// tests/pipeline_e2e.rs
// Full lifecycle through the orchestrator: collect → dedup-insert → filter →
// push → poll, including crash-shaped interruptions between stages.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use consumer_signal_engine::classify::{ClassifyError, MockClassifier, ThesisCategory};
use consumer_signal_engine::collect::hn::HnCollector;
use consumer_signal_engine::collect::rss::IndustryRssCollector;
use consumer_signal_engine::collect::SignalCollector;
use consumer_signal_engine::filter::disqualify::Disqualifier;
use consumer_signal_engine::filter::FilterPipeline;
use consumer_signal_engine::notion::{InboxDecision, MockInbox, ReviewInbox};
use consumer_signal_engine::pipeline::Pipeline;
use consumer_signal_engine::signal::{Decision, Signal, SignalStatus, SourceApi};
use consumer_signal_engine::SignalStore;

fn hn_collectors() -> Vec<Box<dyn SignalCollector>> {
    vec![Box::new(HnCollector::from_fixture(include_str!(
        "fixtures/hn_search.json"
    )))]
}

fn nosh_collectors() -> Vec<Box<dyn SignalCollector>> {
    vec![Box::new(IndustryRssCollector::nosh_fixture(include_str!(
        "fixtures/nosh_rss.xml"
    )))]
}

fn auto_approve_filter() -> FilterPipeline {
    FilterPipeline::new(
        Disqualifier::default(),
        Arc::new(MockClassifier::fixed(0.9, ThesisCategory::ConsumerCpg)),
    )
}

/// The canonical happy path: a 0.9-scoring consumer signal is pushed, its
/// external reference stored, a poll returns approved, and exactly one user
/// action row exists at the end.
#[tokio::test]
async fn signal_reaches_approved_through_the_full_pipeline() {
    let store = Arc::new(SignalStore::in_memory());
    let inbox = Arc::new(MockInbox::new());
    let pipeline = Pipeline::new(
        store.clone(),
        hn_collectors(),
        auto_approve_filter(),
        inbox.clone(),
    );

    // Pass 1: ingest, filter, push. The fixture has one consumer signal and
    // one hard-disqualified b2b post.
    let stats = pipeline.run_once().await;
    assert_eq!(stats.signals_found, 2);
    assert_eq!(stats.signals_new, 2);
    assert_eq!(stats.filtered, 2);
    assert_eq!(stats.pushed, 1);
    assert_eq!(stats.errors, 0);

    let pushed = inbox.pushed.lock().unwrap().clone();
    assert_eq!(pushed.len(), 1);
    let (signal_id, external_ref) = pushed[0].clone();
    assert_eq!(
        store.get(signal_id).unwrap().status,
        SignalStatus::InNotion
    );

    // A reviewer approves it in the inbox.
    inbox.queue_decision(InboxDecision {
        external_ref: external_ref.clone(),
        decision: Decision::Approved,
        rejection_reason: None,
        notes: Some("strong fit".into()),
    });

    // Pass 2: nothing new to ingest or push; the decision syncs back.
    let stats = pipeline.run_once().await;
    assert_eq!(stats.signals_new, 0);
    assert_eq!(stats.pushed, 0);
    assert_eq!(stats.decisions_applied, 1);

    let final_signal = store.get(signal_id).unwrap();
    assert_eq!(final_signal.status, SignalStatus::Approved);
    assert_eq!(final_signal.external_ref.as_deref(), Some(external_ref.as_str()));
    let action = store.user_action(signal_id).unwrap();
    assert_eq!(action.decision, Decision::Approved);
    assert_eq!(action.notes.as_deref(), Some("strong fit"));

    // Pass 3: the inbox still reports the same decision; re-sync is a no-op
    // and the row count stays at one.
    let stats = pipeline.run_once().await;
    assert_eq!(stats.errors, 0);
    assert_eq!(store.get(signal_id).unwrap().status, SignalStatus::Approved);
    assert_eq!(
        store.user_action(signal_id).unwrap().synced_at,
        action.synced_at
    );
}

#[tokio::test]
async fn auto_rejected_signal_is_terminal_and_never_pushed() {
    let store = Arc::new(SignalStore::in_memory());
    let inbox = Arc::new(MockInbox::new());
    let pipeline = Pipeline::new(
        store.clone(),
        hn_collectors(),
        auto_approve_filter(),
        inbox.clone(),
    );
    pipeline.run_once().await;

    let rejected: Vec<_> = store
        .signals_in_review()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(rejected.len(), 1, "only the consumer signal is in review");

    // The b2b post ended terminal with one audit row and no LLM involvement.
    let all_pushed = inbox.pushed.lock().unwrap().len();
    assert_eq!(all_pushed, 1);
}

/// A conflicting later decision is surfaced as an error and changes nothing.
#[tokio::test]
async fn conflicting_decision_is_rejected_and_state_preserved() {
    let store = Arc::new(SignalStore::in_memory());
    let inbox = Arc::new(MockInbox::new());
    let pipeline = Pipeline::new(
        store.clone(),
        hn_collectors(),
        auto_approve_filter(),
        inbox.clone(),
    );
    pipeline.run_once().await;
    let (signal_id, external_ref) = inbox.pushed.lock().unwrap()[0].clone();

    inbox.queue_decision(InboxDecision {
        external_ref: external_ref.clone(),
        decision: Decision::Approved,
        rejection_reason: None,
        notes: None,
    });
    pipeline.run_once().await;
    assert_eq!(store.get(signal_id).unwrap().status, SignalStatus::Approved);

    // The reviewer later flips the page to rejected: append-only truth wins.
    inbox.queue_decision(InboxDecision {
        external_ref,
        decision: Decision::Rejected,
        rejection_reason: None,
        notes: None,
    });
    let stats = pipeline.run_once().await;
    assert!(stats.errors >= 1);
    assert_eq!(store.get(signal_id).unwrap().status, SignalStatus::Approved);
}

/// Classifier outage: signals stay `pending_filter` with an audit row, and the
/// next run (with the classifier back) routes them.
#[tokio::test]
async fn classification_errors_are_retried_on_the_next_run() {
    let store = Arc::new(SignalStore::in_memory());
    let inbox = Arc::new(MockInbox::new());

    let down = Pipeline::new(
        store.clone(),
        nosh_collectors(),
        FilterPipeline::new(
            Disqualifier::default(),
            Arc::new(MockClassifier::failing(|| ClassifyError::Timeout)),
        ),
        inbox.clone(),
    );
    let stats = down.run_once().await;
    assert_eq!(stats.signals_new, 2);
    assert_eq!(stats.pushed, 0);

    let pending = store.signals_awaiting_filter();
    assert_eq!(pending.len(), 2);
    for s in &pending {
        assert_eq!(s.status, SignalStatus::PendingFilter);
        assert_eq!(store.filter_results(s.id).len(), 1);
    }

    // Same store, working classifier: the retry pass routes both signals.
    let up = Pipeline::new(
        store.clone(),
        nosh_collectors(),
        auto_approve_filter(),
        inbox.clone(),
    );
    let stats = up.run_once().await;
    assert_eq!(stats.signals_new, 0, "re-collection dedups against the store");
    assert_eq!(stats.filtered, 2);
    assert_eq!(stats.pushed, 2);
    for s in store.signals_in_review() {
        assert_eq!(store.filter_results(s.id).len(), 2);
    }
}

/// Inbox outage: routed signals stay routed-but-unpushed, and the next run
/// pushes them. No signal or audit row is lost.
#[tokio::test]
async fn push_failures_resume_on_the_next_run() {
    struct DownInbox;

    #[async_trait::async_trait]
    impl ReviewInbox for DownInbox {
        async fn push(
            &self,
            _signal: &consumer_signal_engine::StoredSignal,
            _result: &consumer_signal_engine::FilterResult,
        ) -> anyhow::Result<String> {
            anyhow::bail!("inbox down")
        }
        async fn poll_decisions(&self) -> anyhow::Result<Vec<InboxDecision>> {
            Ok(Vec::new())
        }
    }

    let store = Arc::new(SignalStore::in_memory());
    let down = Pipeline::new(
        store.clone(),
        nosh_collectors(),
        auto_approve_filter(),
        Arc::new(DownInbox),
    );
    let stats = down.run_once().await;
    assert_eq!(stats.pushed, 0);
    assert!(stats.errors >= 2);
    assert_eq!(store.signals_ready_to_push().len(), 2);

    let inbox = Arc::new(MockInbox::new());
    let up = Pipeline::new(
        store.clone(),
        nosh_collectors(),
        auto_approve_filter(),
        inbox.clone(),
    );
    let stats = up.run_once().await;
    assert_eq!(stats.pushed, 2);
    assert_eq!(store.signals_ready_to_push().len(), 0);
    assert_eq!(store.signals_in_review().len(), 2);
}

/// Collector failures are telemetry, not pipeline failures; invalid signals
/// are dropped at ingestion without poisoning the rest of the batch.
#[tokio::test]
async fn collector_errors_and_invalid_signals_do_not_stop_the_run() {
    struct FlakyCollector;

    #[async_trait::async_trait]
    impl SignalCollector for FlakyCollector {
        async fn collect(&self) -> anyhow::Result<Vec<Signal>> {
            anyhow::bail!("rate limited")
        }
        fn source_api(&self) -> SourceApi {
            SourceApi::Reddit
        }
    }

    struct SloppyCollector;

    #[async_trait::async_trait]
    impl SignalCollector for SloppyCollector {
        async fn collect(&self) -> anyhow::Result<Vec<Signal>> {
            Ok(vec![
                Signal {
                    source_api: SourceApi::UsptoTm,
                    source_id: "  ".into(), // invalid: dropped at ingestion
                    title: "GHOSTMARK".into(),
                    url: None,
                    raw_metadata: BTreeMap::new(),
                    collected_at: Utc::now(),
                },
                Signal {
                    source_api: SourceApi::UsptoTm,
                    source_id: "97999111".into(),
                    title: "SUNROOT SNACKS".into(),
                    url: None,
                    raw_metadata: BTreeMap::new(),
                    collected_at: Utc::now(),
                },
            ])
        }
        fn source_api(&self) -> SourceApi {
            SourceApi::UsptoTm
        }
    }

    let store = Arc::new(SignalStore::in_memory());
    let pipeline = Pipeline::new(
        store.clone(),
        vec![Box::new(FlakyCollector), Box::new(SloppyCollector)],
        auto_approve_filter(),
        Arc::new(MockInbox::new()),
    );
    let stats = pipeline.run_once().await;

    // The valid trademark made it all the way through.
    assert_eq!(stats.signals_new, 1);
    assert_eq!(stats.pushed, 1);
    assert!(stats.errors >= 2); // one collector failure + one dropped signal

    let runs = store.collector_runs();
    assert_eq!(runs.len(), 2);
    assert!(runs[0].error.as_deref().unwrap().contains("rate limited"));
    assert!(runs[1].error.is_none());
    assert_eq!(runs[1].signals_found, 2);
    assert_eq!(runs[1].signals_new, 1);
}
