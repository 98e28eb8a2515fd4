// src/pipeline.rs
//! Pipeline orchestrator: collect → dedup-insert → filter → push → poll.
//!
//! Every stage reads its work list from the store, so a crash mid-run leaves
//! signals in a well-defined state (`pending_filter`, or routed-but-unpushed)
//! that the next run resumes from. Per-signal contract errors are logged and
//! the loop moves on; nothing here aborts a whole run.

use std::sync::Arc;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::task::JoinHandle;

use crate::collect::SignalCollector;
use crate::filter::FilterPipeline;
use crate::notion::ReviewInbox;
use crate::signal::UserAction;
use crate::store::{SignalStore, StoreError};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Completed pipeline passes.");
        describe_counter!("pipeline_signals_new_total", "Newly stored signals.");
        describe_counter!(
            "pipeline_decisions_applied_total",
            "User decisions synced from the review inbox."
        );
        describe_gauge!("pipeline_last_run_ts", "Unix ts when the pipeline last ran.");
    });
}

/// Per-run telemetry, logged at the end of each pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub signals_found: usize,
    pub signals_new: usize,
    pub filtered: usize,
    pub pushed: usize,
    pub decisions_applied: usize,
    pub errors: usize,
}

pub struct Pipeline {
    store: Arc<SignalStore>,
    collectors: Vec<Box<dyn SignalCollector>>,
    filter: FilterPipeline,
    inbox: Arc<dyn ReviewInbox>,
}

impl Pipeline {
    pub fn new(
        store: Arc<SignalStore>,
        collectors: Vec<Box<dyn SignalCollector>>,
        filter: FilterPipeline,
        inbox: Arc<dyn ReviewInbox>,
    ) -> Self {
        Self {
            store,
            collectors,
            filter,
            inbox,
        }
    }

    /// One full pass over all stages. Each stage is independently retryable.
    pub async fn run_once(&self) -> RunStats {
        ensure_metrics_described();
        let mut stats = RunStats::default();

        self.collect_stage(&mut stats).await;
        self.filter_stage(&mut stats).await;
        self.push_stage(&mut stats).await;
        self.poll_stage(&mut stats).await;

        counter!("pipeline_runs_total").increment(1);
        counter!("pipeline_signals_new_total").increment(stats.signals_new as u64);
        counter!("pipeline_decisions_applied_total").increment(stats.decisions_applied as u64);
        gauge!("pipeline_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);

        tracing::info!(
            target: "pipeline",
            found = stats.signals_found,
            new = stats.signals_new,
            filtered = stats.filtered,
            pushed = stats.pushed,
            decisions = stats.decisions_applied,
            errors = stats.errors,
            "pipeline pass complete"
        );
        stats
    }

    async fn collect_stage(&self, stats: &mut RunStats) {
        for collector in &self.collectors {
            let source = collector.source_api();
            let run_id = self.store.collector_run_started(source);
            match collector.collect().await {
                Ok(signals) => {
                    let found = signals.len();
                    let mut new = 0usize;
                    for signal in signals {
                        match self.store.save_signal(signal) {
                            Ok((_, true)) => new += 1,
                            Ok((_, false)) => {}
                            Err(StoreError::Validation(e)) => {
                                // Malformed at the source; log and drop.
                                tracing::warn!(
                                    target: "pipeline",
                                    source = source.as_str(),
                                    error = %e,
                                    "dropping invalid signal"
                                );
                                stats.errors += 1;
                            }
                            Err(e) => {
                                tracing::error!(
                                    target: "pipeline",
                                    source = source.as_str(),
                                    error = %e,
                                    "save_signal failed"
                                );
                                stats.errors += 1;
                            }
                        }
                    }
                    stats.signals_found += found;
                    stats.signals_new += new;
                    self.store.collector_run_completed(run_id, found, new, None);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "pipeline",
                        source = source.as_str(),
                        error = ?e,
                        "collector error"
                    );
                    stats.errors += 1;
                    self.store
                        .collector_run_completed(run_id, 0, 0, Some(e.to_string()));
                }
            }
        }
    }

    async fn filter_stage(&self, stats: &mut RunStats) {
        for signal in self.store.signals_awaiting_filter() {
            if let Err(e) = self.store.begin_filter(signal.id) {
                tracing::error!(target: "pipeline", signal_id = signal.id, error = %e, "begin_filter failed");
                stats.errors += 1;
                continue;
            }
            let result = self.filter.evaluate(&signal).await;
            match self.store.record_filter_result(signal.id, result) {
                Ok(()) => stats.filtered += 1,
                Err(e) => {
                    tracing::error!(
                        target: "pipeline",
                        signal_id = signal.id,
                        error = %e,
                        "record_filter_result failed"
                    );
                    stats.errors += 1;
                }
            }
        }
    }

    async fn push_stage(&self, stats: &mut RunStats) {
        for signal in self.store.signals_ready_to_push() {
            // The latest audit row carries the score/category the inbox shows.
            let Some(result) = self.store.filter_results(signal.id).into_iter().last() else {
                tracing::error!(target: "pipeline", signal_id = signal.id, "routed signal has no filter result");
                stats.errors += 1;
                continue;
            };
            match self.inbox.push(&signal, &result).await {
                Ok(external_ref) => match self.store.mark_pushed(signal.id, &external_ref) {
                    Ok(()) => stats.pushed += 1,
                    Err(e) => {
                        tracing::error!(
                            target: "pipeline",
                            signal_id = signal.id,
                            error = %e,
                            "mark_pushed failed"
                        );
                        stats.errors += 1;
                    }
                },
                Err(e) => {
                    // Inbox trouble: state untouched, retried next run.
                    tracing::warn!(
                        target: "pipeline",
                        signal_id = signal.id,
                        error = ?e,
                        "push failed; will retry"
                    );
                    stats.errors += 1;
                }
            }
        }
    }

    async fn poll_stage(&self, stats: &mut RunStats) {
        let decisions = match self.inbox.poll_decisions().await {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(target: "pipeline", error = ?e, "poll failed; will retry");
                stats.errors += 1;
                return;
            }
        };

        for d in decisions {
            let Some(signal) = self.store.find_by_external_ref(&d.external_ref) else {
                tracing::debug!(
                    target: "pipeline",
                    external_ref = %d.external_ref,
                    "decision for unknown page"
                );
                continue;
            };
            let action = UserAction {
                signal_id: signal.id,
                decision: d.decision,
                rejection_reason: d.rejection_reason,
                notes: d.notes,
                synced_at: chrono::Utc::now(),
            };
            match self.store.record_user_action(signal.id, action) {
                Ok(()) => stats.decisions_applied += 1,
                Err(e @ StoreError::ConflictingDecision { .. }) => {
                    tracing::error!(
                        target: "pipeline",
                        signal_id = signal.id,
                        error = %e,
                        "conflicting review decision"
                    );
                    stats.errors += 1;
                }
                Err(e) => {
                    tracing::error!(
                        target: "pipeline",
                        signal_id = signal.id,
                        error = %e,
                        "record_user_action failed"
                    );
                    stats.errors += 1;
                }
            }
        }
    }
}

/// Spawn the interval scheduler driving `run_once`.
pub fn spawn_scheduler(pipeline: Arc<Pipeline>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let stats = pipeline.run_once().await;
            tracing::info!(
                target: "scheduler",
                new = stats.signals_new,
                pushed = stats.pushed,
                decisions = stats.decisions_applied,
                "scheduled pipeline tick"
            );
        }
    })
}
