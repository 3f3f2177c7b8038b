//! Glue between the policy store, the landscape notifier and the live
//! session controller.
//!
//! Policy changes refresh right away. Landscape signals arm a debouncer and
//! refresh once the burst settles. Changes the controller produced itself
//! (sanitizer saves, or a policy equal to the one it last applied) are
//! skipped. Refreshes are spawned so a newer one can supersede one that is
//! still waiting on the backend; the refresh ticket is taken before spawning,
//! so the most recent request wins regardless of task scheduling.
//!
//! Before a debounced refresh the store re-reads its medium, so edits saved
//! by another process are picked up and published like any other change.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};

use crate::capture::CaptureBackend;
use crate::capture_controller::{LiveSessionController, RefreshOutcome};
use crate::debounce::Debouncer;
use crate::landscape::LandscapeNotifier;
use crate::policy::Policy;
use crate::policy_store::{ChangeOrigin, PolicyChange, PolicyStore};

/// Running refresh loop. Dropping it stops the loop, cancels any pending
/// debounced refresh and aborts refreshes still in flight.
#[derive(Debug)]
pub struct RefreshLoopHandle {
    task: JoinHandle<()>,
}

impl RefreshLoopHandle {
    pub fn shutdown(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RefreshLoopHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Subscribe to `store` and `notifier` and drive `controller` from them.
/// Must be called inside a tokio runtime.
pub fn spawn_refresh_loop<B: CaptureBackend>(
    controller: Arc<LiveSessionController<B>>,
    store: Arc<PolicyStore>,
    notifier: &LandscapeNotifier,
    debounce: Duration,
) -> RefreshLoopHandle {
    let mut policies = store.subscribe();
    let mut landscape = notifier.subscribe();

    let task = tokio::spawn(async move {
        let mut debouncer = Debouncer::new(debounce);
        // Dropped with the loop, which aborts every refresh still running
        let mut inflight: JoinSet<()> = JoinSet::new();
        loop {
            tokio::select! {
                change = policies.recv() => {
                    let Some(change) = change else {
                        tracing::debug!("Policy store closed, refresh loop exiting");
                        break;
                    };
                    if is_self_originated(&controller, &change) {
                        tracing::trace!(origin = ?change.origin, "Skipping self-originated policy change");
                        continue;
                    }
                    // This refresh takes a fresh snapshot as well
                    debouncer.cancel();
                    spawn_refresh(&mut inflight, &controller, change.policy);
                }
                event = landscape.recv() => {
                    tracing::trace!(?event, "Landscape changed, arming refresh");
                    debouncer.arm();
                }
                _ = debouncer.fired() => {
                    match store.reload() {
                        // The published change triggers the refresh
                        Ok(Some(_)) => {}
                        Ok(None) => spawn_refresh(&mut inflight, &controller, store.current()),
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to re-read policy, using last known");
                            spawn_refresh(&mut inflight, &controller, store.current());
                        }
                    }
                }
                Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "Refresh task panicked");
                        }
                    }
                }
            }
        }
    });

    RefreshLoopHandle { task }
}

fn is_self_originated<B: CaptureBackend>(
    controller: &LiveSessionController<B>,
    change: &PolicyChange,
) -> bool {
    if change.origin == ChangeOrigin::Sanitizer {
        return true;
    }
    controller
        .last_applied_policy()
        .map_or(false, |applied| *applied == *change.policy)
}

fn spawn_refresh<B: CaptureBackend>(
    inflight: &mut JoinSet<()>,
    controller: &Arc<LiveSessionController<B>>,
    policy: Arc<Policy>,
) {
    let ticket = match controller.request_refresh() {
        Ok(ticket) => ticket,
        Err(e) => {
            tracing::trace!(error = %e, "Not refreshing");
            return;
        }
    };
    let controller = Arc::clone(controller);
    inflight.spawn(async move {
        match controller.refresh_with(ticket, policy).await {
            Ok(RefreshOutcome::Applied { generation, pruned }) => {
                tracing::debug!(generation, pruned, "Refresh applied");
            }
            Ok(RefreshOutcome::Superseded) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Refresh failed");
            }
        }
    });
}
