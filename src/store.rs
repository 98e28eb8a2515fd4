// src/store.rs
//! Signal store: the sole shared mutable resource in the engine.
//!
//! All mutations are serialized through one `Mutex`, which is the transactional
//! boundary: `save_signal` is atomic-exclusive per fingerprint (at most one row
//! per content hash, ever) and the per-signal transitions are atomic per row.
//! `FilterResult` and `UserAction` rows are append-only truth; `status` is the
//! cached projection the orchestrator resumes from after a crash.
//!
//! Durability is a JSON snapshot written after every mutation with the usual
//! tmp-file + rename dance, loaded again at startup.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::dedup;
use crate::filter::{FilterResult, FilterResultType};
use crate::signal::{
    CollectorRun, Decision, Signal, SignalStatus, SourceApi, StoredSignal, UserAction,
    ValidationError,
};

/// Contract errors. These are programming/consistency faults of the calling
/// operation: fatal to it, harmless to every other row.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("signal {0} not found")]
    NotFound(u64),

    #[error("signal {id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        id: u64,
        from: SignalStatus,
        to: SignalStatus,
    },

    #[error("signal {id}: decision {attempted:?} conflicts with recorded {recorded:?}")]
    ConflictingDecision {
        id: u64,
        recorded: Decision,
        attempted: Decision,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    next_id: u64,
    signals: BTreeMap<u64, StoredSignal>,
    filter_results: Vec<FilterResult>,
    user_actions: BTreeMap<u64, UserAction>,
    collector_runs: Vec<CollectorRun>,
    /// Rebuilt from `signals` on load; the uniqueness index for dedup.
    #[serde(skip)]
    by_hash: HashMap<String, u64>,
    #[serde(skip)]
    by_external_ref: HashMap<String, u64>,
}

impl StoreState {
    fn rebuild_indexes(&mut self) {
        self.by_hash = self
            .signals
            .values()
            .map(|s| (s.content_hash.clone(), s.id))
            .collect();
        self.by_external_ref = self
            .signals
            .values()
            .filter_map(|s| s.external_ref.clone().map(|r| (r, s.id)))
            .collect();
    }
}

#[derive(Debug)]
pub struct SignalStore {
    /// None for throwaway in-memory stores (tests).
    path: Option<PathBuf>,
    inner: Mutex<StoreState>,
}

impl SignalStore {
    /// Volatile store for tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(StoreState::default()),
        }
    }

    /// Open (or initialize) a snapshot-backed store.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let mut state = if path.exists() {
            let s = fs::read_to_string(&path)
                .with_context(|| format!("reading signal store at {}", path.display()))?;
            serde_json::from_str(&s)
                .with_context(|| format!("parsing signal store at {}", path.display()))?
        } else {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating store dir {}", dir.display()))?;
            }
            StoreState::default()
        };
        state.rebuild_indexes();
        tracing::info!(
            target: "store",
            path = %path.display(),
            signals = state.signals.len(),
            "signal store opened"
        );
        Ok(Self {
            path: Some(path),
            inner: Mutex::new(state),
        })
    }

    /// Best-effort snapshot; a failed write never fails the mutation. The
    /// in-memory state stays authoritative and the next mutation retries.
    fn persist(&self, state: &StoreState) {
        let Some(path) = &self.path else { return };
        if let Err(e) = write_snapshot(path, state) {
            tracing::warn!(target: "store", error = ?e, "store snapshot write failed");
        }
    }

    /* ----------------------------
    Mutations
    ---------------------------- */

    /// Fingerprint + insert. On fingerprint collision returns the existing row
    /// with `is_new = false` and performs no mutation: this is the sole dedup
    /// enforcement point.
    pub fn save_signal(&self, signal: Signal) -> Result<(StoredSignal, bool), StoreError> {
        signal.validate()?;
        let hash = dedup::fingerprint_raw(signal.source_api, &signal.source_id);

        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let state = &mut *guard;
        if let Some(&existing_id) = state.by_hash.get(&hash) {
            let existing = state.signals[&existing_id].clone();
            return Ok((existing, false));
        }

        let id = state.next_id;
        state.next_id += 1;
        let stored = StoredSignal {
            id,
            content_hash: hash.clone(),
            status: SignalStatus::New,
            external_ref: None,
            created_at: Utc::now(),
            signal,
        };
        state.signals.insert(id, stored.clone());
        state.by_hash.insert(hash, id);
        self.persist(state);
        Ok((stored, true))
    }

    /// Claim a signal for filtering: `new` → `pending_filter`. Accepts a signal
    /// already in `pending_filter` so an interrupted run can resume it.
    pub fn begin_filter(&self, signal_id: u64) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let state = &mut *guard;
        let signal = state
            .signals
            .get_mut(&signal_id)
            .ok_or(StoreError::NotFound(signal_id))?;
        match signal.status {
            SignalStatus::New => {
                signal.status = SignalStatus::PendingFilter;
                self.persist(state);
                Ok(())
            }
            SignalStatus::PendingFilter => Ok(()),
            from => Err(StoreError::InvalidTransition {
                id: signal_id,
                from,
                to: SignalStatus::PendingFilter,
            }),
        }
    }

    /// Append the audit row and transition per its result type. A
    /// classification-error row is recorded but leaves the signal
    /// `pending_filter` for a later retry pass.
    pub fn record_filter_result(
        &self,
        signal_id: u64,
        result: FilterResult,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let state = &mut *guard;
        let signal = state
            .signals
            .get_mut(&signal_id)
            .ok_or(StoreError::NotFound(signal_id))?;

        let target = match result.result_type {
            FilterResultType::AutoReject => Some(SignalStatus::AutoRejected),
            FilterResultType::LlmReject => Some(SignalStatus::LlmRejected),
            FilterResultType::LlmReview => Some(SignalStatus::LlmReview),
            FilterResultType::LlmAutoApprove => Some(SignalStatus::LlmAutoApprove),
            FilterResultType::ClassificationError => None,
        };

        // Double-filter guard: only a claimed signal may record an outcome.
        if signal.status != SignalStatus::PendingFilter {
            return Err(StoreError::InvalidTransition {
                id: signal_id,
                from: signal.status,
                to: target.unwrap_or(SignalStatus::PendingFilter),
            });
        }

        if let Some(to) = target {
            signal.status = to;
        }
        state.filter_results.push(result);
        self.persist(state);
        Ok(())
    }

    /// `llm_review`/`llm_auto_approve` → `in_notion`, remembering the external
    /// page reference for the poll stage.
    pub fn mark_pushed(&self, signal_id: u64, external_ref: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let state = &mut *guard;
        let signal = state
            .signals
            .get_mut(&signal_id)
            .ok_or(StoreError::NotFound(signal_id))?;
        match signal.status {
            SignalStatus::LlmReview | SignalStatus::LlmAutoApprove => {
                signal.status = SignalStatus::InNotion;
                signal.external_ref = Some(external_ref.to_string());
                state
                    .by_external_ref
                    .insert(external_ref.to_string(), signal_id);
                self.persist(state);
                Ok(())
            }
            from => Err(StoreError::InvalidTransition {
                id: signal_id,
                from,
                to: SignalStatus::InNotion,
            }),
        }
    }

    /// `in_notion` → `approved`/`rejected`. Re-applying the identical decision
    /// is a no-op; a different decision than the recorded one is a conflict.
    /// Review decisions are append-only truth, never overwritten.
    pub fn record_user_action(
        &self,
        signal_id: u64,
        action: UserAction,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let state = &mut *guard;
        let signal = state
            .signals
            .get_mut(&signal_id)
            .ok_or(StoreError::NotFound(signal_id))?;

        if let Some(recorded) = state.user_actions.get(&signal_id) {
            if recorded.decision == action.decision {
                return Ok(());
            }
            return Err(StoreError::ConflictingDecision {
                id: signal_id,
                recorded: recorded.decision,
                attempted: action.decision,
            });
        }

        let to = match action.decision {
            Decision::Approved => SignalStatus::Approved,
            Decision::Rejected => SignalStatus::Rejected,
        };
        if signal.status != SignalStatus::InNotion {
            return Err(StoreError::InvalidTransition {
                id: signal_id,
                from: signal.status,
                to,
            });
        }
        signal.status = to;
        state.user_actions.insert(signal_id, action);
        self.persist(state);
        Ok(())
    }

    /// Health telemetry: start a collection pass. Returns a run handle.
    pub fn collector_run_started(&self, source_api: SourceApi) -> u64 {
        let mut state = self.inner.lock().expect("store mutex poisoned");
        state.collector_runs.push(CollectorRun {
            source_api,
            started_at: Utc::now(),
            completed_at: None,
            signals_found: 0,
            signals_new: 0,
            error: None,
        });
        let run_id = (state.collector_runs.len() - 1) as u64;
        self.persist(&state);
        run_id
    }

    /// Complete a collection pass. Logged-only on an unknown handle: telemetry
    /// must never be fatal to the pipeline.
    pub fn collector_run_completed(
        &self,
        run_id: u64,
        signals_found: usize,
        signals_new: usize,
        error: Option<String>,
    ) {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let state = &mut *guard;
        match state.collector_runs.get_mut(run_id as usize) {
            Some(run) if run.completed_at.is_none() => {
                run.completed_at = Some(Utc::now());
                run.signals_found = signals_found;
                run.signals_new = signals_new;
                run.error = error;
            }
            Some(_) => {
                tracing::warn!(target: "store", run_id, "collector run already completed");
                return;
            }
            None => {
                tracing::warn!(target: "store", run_id, "unknown collector run");
                return;
            }
        }
        self.persist(state);
    }

    /* ----------------------------
    Queries
    ---------------------------- */

    pub fn get(&self, signal_id: u64) -> Option<StoredSignal> {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .signals
            .get(&signal_id)
            .cloned()
    }

    pub fn find_by_external_ref(&self, external_ref: &str) -> Option<StoredSignal> {
        let state = self.inner.lock().expect("store mutex poisoned");
        state
            .by_external_ref
            .get(external_ref)
            .and_then(|id| state.signals.get(id))
            .cloned()
    }

    /// Signals the filter stage should pick up: freshly stored ones plus any
    /// left `pending_filter` by a crashed or errored earlier run.
    pub fn signals_awaiting_filter(&self) -> Vec<StoredSignal> {
        self.signals_with(|s| {
            matches!(s.status, SignalStatus::New | SignalStatus::PendingFilter)
        })
    }

    /// Routed to human review but not yet pushed to the inbox.
    pub fn signals_ready_to_push(&self) -> Vec<StoredSignal> {
        self.signals_with(|s| {
            matches!(
                s.status,
                SignalStatus::LlmReview | SignalStatus::LlmAutoApprove
            )
        })
    }

    /// Pushed and awaiting a human decision.
    pub fn signals_in_review(&self) -> Vec<StoredSignal> {
        self.signals_with(|s| s.status == SignalStatus::InNotion)
    }

    fn signals_with(&self, pred: impl Fn(&StoredSignal) -> bool) -> Vec<StoredSignal> {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .signals
            .values()
            .filter(|s| pred(s))
            .cloned()
            .collect()
    }

    /// Full audit trail for one signal, oldest first.
    pub fn filter_results(&self, signal_id: u64) -> Vec<FilterResult> {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .filter_results
            .iter()
            .filter(|r| r.signal_id == signal_id)
            .cloned()
            .collect()
    }

    pub fn user_action(&self, signal_id: u64) -> Option<UserAction> {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .user_actions
            .get(&signal_id)
            .cloned()
    }

    pub fn collector_runs(&self) -> Vec<CollectorRun> {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .collector_runs
            .clone()
    }

    /// Status histogram for run summaries.
    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let state = self.inner.lock().expect("store mutex poisoned");
        let mut out = BTreeMap::new();
        for s in state.signals.values() {
            *out.entry(s.status.as_str().to_string()).or_insert(0) += 1;
        }
        out
    }
}

fn write_snapshot(path: &Path, state: &StoreState) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(state)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterResult;
    use crate::signal::{RejectionReason, SourceApi};
    use std::collections::BTreeMap as Map;

    fn mk_signal(api: SourceApi, source_id: &str) -> Signal {
        Signal {
            source_api: api,
            source_id: source_id.to_string(),
            title: format!("title for {source_id}"),
            url: Some("https://example.com".into()),
            raw_metadata: Map::new(),
            collected_at: Utc::now(),
        }
    }

    fn review_result(signal_id: u64) -> FilterResult {
        FilterResult::routed(
            signal_id,
            FilterResultType::LlmReview,
            None,
            Some(crate::classify::ThesisClassification::new(
                0.6,
                crate::classify::ThesisCategory::ConsumerCpg,
                "r",
                "m",
            )),
        )
    }

    fn approved(signal_id: u64) -> UserAction {
        UserAction {
            signal_id,
            decision: Decision::Approved,
            rejection_reason: None,
            notes: None,
            synced_at: Utc::now(),
        }
    }

    #[test]
    fn save_signal_dedups_on_normalized_identity() {
        let store = SignalStore::in_memory();
        let (first, is_new) = store
            .save_signal(mk_signal(SourceApi::Reddit, "t3_abc"))
            .unwrap();
        assert!(is_new);
        // Same identity, different presentation.
        let (second, is_new) = store
            .save_signal(mk_signal(SourceApi::Reddit, "abc"))
            .unwrap();
        assert!(!is_new);
        assert_eq!(first.id, second.id);
        assert_eq!(store.signals_awaiting_filter().len(), 1);
    }

    #[test]
    fn save_signal_rejects_invalid_signals() {
        let store = SignalStore::in_memory();
        let err = store.save_signal(mk_signal(SourceApi::Hn, "  ")).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.signals_awaiting_filter().is_empty());
    }

    #[test]
    fn full_lifecycle_to_approved() {
        let store = SignalStore::in_memory();
        let (s, _) = store.save_signal(mk_signal(SourceApi::Hn, "41237")).unwrap();

        store.begin_filter(s.id).unwrap();
        store.record_filter_result(s.id, review_result(s.id)).unwrap();
        assert_eq!(store.get(s.id).unwrap().status, SignalStatus::LlmReview);

        store.mark_pushed(s.id, "notion-page-1").unwrap();
        let pushed = store.get(s.id).unwrap();
        assert_eq!(pushed.status, SignalStatus::InNotion);
        assert_eq!(pushed.external_ref.as_deref(), Some("notion-page-1"));
        assert_eq!(
            store.find_by_external_ref("notion-page-1").unwrap().id,
            s.id
        );

        store.record_user_action(s.id, approved(s.id)).unwrap();
        assert_eq!(store.get(s.id).unwrap().status, SignalStatus::Approved);
        assert!(store.user_action(s.id).is_some());
    }

    #[test]
    fn double_filter_is_an_invalid_transition() {
        let store = SignalStore::in_memory();
        let (s, _) = store.save_signal(mk_signal(SourceApi::Hn, "1")).unwrap();
        store.begin_filter(s.id).unwrap();
        store.record_filter_result(s.id, review_result(s.id)).unwrap();

        let err = store
            .record_filter_result(s.id, review_result(s.id))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn classification_error_row_keeps_signal_retryable() {
        let store = SignalStore::in_memory();
        let (s, _) = store.save_signal(mk_signal(SourceApi::Hn, "1")).unwrap();
        store.begin_filter(s.id).unwrap();

        let row = FilterResult::classification_error(s.id, None, "timed out");
        store.record_filter_result(s.id, row).unwrap();
        assert_eq!(store.get(s.id).unwrap().status, SignalStatus::PendingFilter);
        assert_eq!(store.filter_results(s.id).len(), 1);

        // The retry pass picks it up and may now conclude.
        store.begin_filter(s.id).unwrap();
        store.record_filter_result(s.id, review_result(s.id)).unwrap();
        assert_eq!(store.get(s.id).unwrap().status, SignalStatus::LlmReview);
        assert_eq!(store.filter_results(s.id).len(), 2);
    }

    #[test]
    fn filter_requires_claimed_signal() {
        let store = SignalStore::in_memory();
        let (s, _) = store.save_signal(mk_signal(SourceApi::Hn, "1")).unwrap();
        // No begin_filter: the signal is still `new`.
        let err = store
            .record_filter_result(s.id, review_result(s.id))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn mark_pushed_requires_routed_status() {
        let store = SignalStore::in_memory();
        let (s, _) = store.save_signal(mk_signal(SourceApi::Hn, "1")).unwrap();
        let err = store.mark_pushed(s.id, "ref").unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn identical_decision_is_a_noop_conflicting_is_an_error() {
        let store = SignalStore::in_memory();
        let (s, _) = store.save_signal(mk_signal(SourceApi::Hn, "1")).unwrap();
        store.begin_filter(s.id).unwrap();
        store.record_filter_result(s.id, review_result(s.id)).unwrap();
        store.mark_pushed(s.id, "ref").unwrap();

        store.record_user_action(s.id, approved(s.id)).unwrap();
        // Identical re-sync: no-op.
        store.record_user_action(s.id, approved(s.id)).unwrap();
        assert_eq!(store.get(s.id).unwrap().status, SignalStatus::Approved);

        // Conflicting re-sync: error, state unchanged.
        let conflicting = UserAction {
            decision: Decision::Rejected,
            rejection_reason: Some(RejectionReason::TooEarly),
            ..approved(s.id)
        };
        let err = store.record_user_action(s.id, conflicting).unwrap_err();
        assert!(matches!(err, StoreError::ConflictingDecision { .. }));
        assert_eq!(store.get(s.id).unwrap().status, SignalStatus::Approved);
    }

    #[test]
    fn unknown_signal_is_not_found() {
        let store = SignalStore::in_memory();
        assert!(matches!(
            store.begin_filter(99).unwrap_err(),
            StoreError::NotFound(99)
        ));
        assert!(matches!(
            store.record_user_action(99, approved(99)).unwrap_err(),
            StoreError::NotFound(99)
        ));
    }

    #[test]
    fn collector_runs_record_health() {
        let store = SignalStore::in_memory();
        let run = store.collector_run_started(SourceApi::BevnetRss);
        store.collector_run_completed(run, 10, 3, None);
        let runs = store.collector_runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].signals_found, 10);
        assert_eq!(runs[0].signals_new, 3);
        assert!(runs[0].completed_at.is_some());

        // Unknown handles are logged, never fatal.
        store.collector_run_completed(42, 0, 0, Some("boom".into()));
    }

    #[test]
    fn snapshot_roundtrip_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.json");

        let id = {
            let store = SignalStore::open(&path).unwrap();
            let (s, _) = store.save_signal(mk_signal(SourceApi::Hn, "41237")).unwrap();
            store.begin_filter(s.id).unwrap();
            store.record_filter_result(s.id, review_result(s.id)).unwrap();
            store.mark_pushed(s.id, "page-9").unwrap();
            s.id
        };

        let reopened = SignalStore::open(&path).unwrap();
        let s = reopened.get(id).unwrap();
        assert_eq!(s.status, SignalStatus::InNotion);
        assert_eq!(s.external_ref.as_deref(), Some("page-9"));
        assert_eq!(reopened.filter_results(id).len(), 1);
        // Indexes are rebuilt, so dedup still holds after restart.
        let (_, is_new) = reopened
            .save_signal(mk_signal(SourceApi::Hn, "41237"))
            .unwrap();
        assert!(!is_new);
        assert_eq!(reopened.find_by_external_ref("page-9").unwrap().id, id);
    }
}
