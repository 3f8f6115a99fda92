//! Refresh-cycle driver
//!
//! One refresh cycle is: log-range query -> decode -> reconcile -> resolve ->
//! assemble -> publish. The published view is a single versioned snapshot
//! replaced atomically at the end of a successful cycle.
//!
//! Two guards keep the view consistent:
//!
//! - **single-flight**: `try_refresh` starts nothing while a refresh is in
//!   progress, so timer ticks never pile up;
//! - **supersession**: every cycle takes a monotonically increasing number at
//!   start and re-checks it at apply time. If a newer cycle started in the
//!   meantime, the older result is discarded (last-started-wins), so stale
//!   latency never overwrites fresh data.
//!
//! A cycle-level failure (the log query itself) leaves the previous view
//! intact; per-record and per-proposal failures are absorbed inside the
//! cycle and never abort it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use primitive_types::U256;
use tracing::{debug, info, warn};

use crate::proposals::{
    assemble, decode_proposal_created, reconcile, resolve_all, ProposalView, StateSource,
};
use crate::rpc::RawLog;
use crate::types::Result;

/// Source of the cycle's single log-range query
#[async_trait]
pub trait LogSource: Send + Sync {
    /// All ProposalCreated records in the configured range
    async fn proposal_logs(&self) -> Result<Vec<RawLog>>;
}

/// What happened to one refresh attempt
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The cycle completed and its snapshot is now the latest view
    Applied(Arc<ProposalView>),
    /// A newer cycle started before this one could apply; result discarded
    Superseded,
    /// A refresh was already in flight; nothing was started
    AlreadyRunning,
}

/// Drives refresh cycles and owns the latest published view
pub struct Watcher<L, S> {
    logs: Arc<L>,
    states: Arc<S>,
    max_concurrency: usize,
    /// Number of cycles ever started; doubles as the supersession fence
    cycles_started: AtomicU64,
    /// Single-flight flag for `try_refresh`
    refreshing: AtomicBool,
    /// Consumer-pinned selection, if any
    pinned: Mutex<Option<U256>>,
    latest: Mutex<Option<Arc<ProposalView>>>,
}

impl<L: LogSource, S: StateSource> Watcher<L, S> {
    pub fn new(logs: Arc<L>, states: Arc<S>, max_concurrency: usize) -> Self {
        Self {
            logs,
            states,
            max_concurrency,
            cycles_started: AtomicU64::new(0),
            refreshing: AtomicBool::new(false),
            pinned: Mutex::new(None),
            latest: Mutex::new(None),
        }
    }

    /// Pin the current selection to an explicit id, or clear the pin.
    ///
    /// The pin persists across refresh cycles; when the pinned id is absent
    /// from a cycle's resolved set, selection falls back to the most recent
    /// proposal for that snapshot.
    pub fn pin(&self, id: Option<U256>) {
        *lock(&self.pinned) = id;
    }

    /// The most recently published snapshot, if any cycle has completed
    pub fn latest(&self) -> Option<Arc<ProposalView>> {
        lock(&self.latest).clone()
    }

    /// Run one full refresh cycle.
    ///
    /// Concurrent callers are allowed; the supersession fence guarantees only
    /// the last-started cycle publishes. Prefer [`Watcher::try_refresh`] for
    /// timer loops.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let cycle = self.cycles_started.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(cycle, "refresh cycle started");

        // total log-query failure aborts the cycle; previous view intact
        let raw = self.logs.proposal_logs().await?;

        let mut facts = Vec::with_capacity(raw.len());
        for record in &raw {
            match decode_proposal_created(record) {
                Ok(fact) => facts.push(fact),
                Err(e) => {
                    warn!(error = %e, block = %record.block_number, "dropping undecodable record")
                }
            }
        }

        let reconciliation = reconcile(facts);
        let resolved = resolve_all(
            self.states.as_ref(),
            &reconciliation.proposals,
            self.max_concurrency,
        )
        .await;

        let pinned = *lock(&self.pinned);
        let view = assemble(resolved, pinned, reconciliation.conflicts, cycle);

        // last-started-wins, compared under the publish lock
        let mut latest = lock(&self.latest);
        if self.cycles_started.load(Ordering::SeqCst) != cycle {
            debug!(cycle, "stale cycle discarded");
            return Ok(RefreshOutcome::Superseded);
        }

        let snapshot = Arc::new(view);
        *latest = Some(Arc::clone(&snapshot));
        info!(
            cycle,
            proposals = snapshot.len(),
            conflicts = snapshot.conflicts.len(),
            "view published"
        );
        Ok(RefreshOutcome::Applied(snapshot))
    }

    /// Single-flight refresh: starts a cycle only if none is in progress
    pub async fn try_refresh(&self) -> Result<RefreshOutcome> {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("refresh already in progress, skipping");
            return Ok(RefreshOutcome::AlreadyRunning);
        }

        let result = self.refresh().await;
        self.refreshing.store(false, Ordering::SeqCst);
        result
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposals::decoder::testutil::simple_log;
    use crate::proposals::ProposalState;
    use crate::types::GavelError;

    struct StaticLogs {
        logs: Vec<RawLog>,
        fail: AtomicBool,
    }

    impl StaticLogs {
        fn new(logs: Vec<RawLog>) -> Self {
            Self {
                logs,
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl LogSource for StaticLogs {
        async fn proposal_logs(&self) -> Result<Vec<RawLog>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(GavelError::Response("node unreachable".into()));
            }
            Ok(self.logs.clone())
        }
    }

    /// State source whose first query parks until released, so tests can hold
    /// one cycle in flight while another runs to completion.
    struct GatedStates {
        calls: AtomicU64,
        release: tokio::sync::Notify,
    }

    impl GatedStates {
        fn new() -> Self {
            Self {
                calls: AtomicU64::new(0),
                release: tokio::sync::Notify::new(),
            }
        }
    }

    #[async_trait]
    impl StateSource for GatedStates {
        async fn state(&self, _id: U256) -> Result<u8> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                self.release.notified().await;
                Ok(1) // Active, from the stalled first cycle
            } else {
                Ok(4) // Succeeded, from any later cycle
            }
        }
    }

    struct FixedStates(u8);

    #[async_trait]
    impl StateSource for FixedStates {
        async fn state(&self, _id: U256) -> Result<u8> {
            Ok(self.0)
        }
    }

    async fn wait_for(calls: &AtomicU64, at_least: u64) {
        while calls.load(Ordering::SeqCst) < at_least {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_empty_log_range_is_an_empty_view() {
        let watcher = Watcher::new(
            Arc::new(StaticLogs::new(vec![])),
            Arc::new(FixedStates(1)),
            4,
        );
        match watcher.refresh().await.unwrap() {
            RefreshOutcome::Applied(view) => {
                assert!(view.is_empty());
                assert_eq!(view.selected, None);
            }
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_records_collapse_to_one_entry() {
        // the same event returned twice, as from overlapping range queries
        let log = simple_log(7, "mint one", 12);
        let watcher = Watcher::new(
            Arc::new(StaticLogs::new(vec![log.clone(), log])),
            Arc::new(FixedStates(1)),
            4,
        );
        match watcher.refresh().await.unwrap() {
            RefreshOutcome::Applied(view) => {
                assert_eq!(view.len(), 1);
                assert!(view.conflicts.is_empty());
            }
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undecodable_record_dropped_cycle_continues() {
        let good = simple_log(1, "fine", 3);
        let mut bad = simple_log(2, "broken", 4);
        bad.data.truncate(16);

        let watcher = Watcher::new(
            Arc::new(StaticLogs::new(vec![good, bad])),
            Arc::new(FixedStates(0)),
            4,
        );
        match watcher.refresh().await.unwrap() {
            RefreshOutcome::Applied(view) => {
                assert_eq!(view.len(), 1);
                assert_eq!(view.proposals[0].proposal.id, U256::one());
            }
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_log_failure_keeps_previous_view() {
        let logs = Arc::new(StaticLogs::new(vec![simple_log(1, "kept", 3)]));
        let watcher = Watcher::new(Arc::clone(&logs), Arc::new(FixedStates(1)), 4);

        assert!(matches!(
            watcher.refresh().await.unwrap(),
            RefreshOutcome::Applied(_)
        ));

        logs.fail.store(true, Ordering::SeqCst);
        assert!(watcher.refresh().await.is_err());

        let view = watcher.latest().expect("previous view intact");
        assert_eq!(view.cycle, 1);
        assert_eq!(view.len(), 1);
    }

    #[tokio::test]
    async fn test_superseded_cycle_is_discarded() {
        let states = Arc::new(GatedStates::new());
        let watcher = Arc::new(Watcher::new(
            Arc::new(StaticLogs::new(vec![simple_log(1, "raced", 3)])),
            Arc::clone(&states),
            4,
        ));

        // cycle 1 parks inside its state query
        let first = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.refresh().await })
        };
        wait_for(&states.calls, 1).await;

        // cycle 2 starts and finishes while cycle 1 is still in flight
        match watcher.refresh().await.unwrap() {
            RefreshOutcome::Applied(view) => {
                assert_eq!(view.cycle, 2);
                assert_eq!(view.proposals[0].state, ProposalState::Succeeded);
            }
            other => panic!("expected Applied, got {other:?}"),
        }

        // cycle 1 arrives late and must be discarded
        states.release.notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert!(matches!(outcome, RefreshOutcome::Superseded));

        // the view still reflects cycle 2
        let view = watcher.latest().unwrap();
        assert_eq!(view.cycle, 2);
        assert_eq!(view.proposals[0].state, ProposalState::Succeeded);
    }

    #[tokio::test]
    async fn test_try_refresh_is_single_flight() {
        let states = Arc::new(GatedStates::new());
        let watcher = Arc::new(Watcher::new(
            Arc::new(StaticLogs::new(vec![simple_log(1, "busy", 3)])),
            Arc::clone(&states),
            4,
        ));

        let first = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.try_refresh().await })
        };
        wait_for(&states.calls, 1).await;

        assert!(matches!(
            watcher.try_refresh().await.unwrap(),
            RefreshOutcome::AlreadyRunning
        ));

        states.release.notify_one();
        assert!(matches!(
            first.await.unwrap().unwrap(),
            RefreshOutcome::Applied(_)
        ));
    }

    #[tokio::test]
    async fn test_pin_survives_refresh_until_id_disappears() {
        let logs = vec![simple_log(1, "old", 3), simple_log(2, "new", 9)];
        let watcher = Watcher::new(
            Arc::new(StaticLogs::new(logs)),
            Arc::new(FixedStates(1)),
            4,
        );

        watcher.pin(Some(U256::one()));
        match watcher.refresh().await.unwrap() {
            RefreshOutcome::Applied(view) => assert_eq!(view.selected, Some(U256::one())),
            other => panic!("expected Applied, got {other:?}"),
        }

        // pin an id that never appears: selection falls back to most recent
        watcher.pin(Some(U256::from(404u64)));
        match watcher.refresh().await.unwrap() {
            RefreshOutcome::Applied(view) => assert_eq!(view.selected, Some(U256::from(2u64))),
            other => panic!("expected Applied, got {other:?}"),
        }
    }
}
