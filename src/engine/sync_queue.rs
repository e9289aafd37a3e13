// Edge Engine — Sync Queue Manager
//
// Persisted, priority-ordered list of mutations waiting for the remote sync
// collaborator.
//
// Ordering: ascending (priority, seq). `seq` is the insertion number, so
// equal-priority operations keep their creation order across retries.
//
// Failure policy:
//   • An operation leaves the queue only on acknowledgment or cancel().
//   • Each failure demotes it by one priority step, saturating at
//     `priority_ceiling`. Priorities never decrease while queued.
//   • With `dead_letter_after = Some(n)`, the n-th failure moves it to the
//     persisted dead-letter list. It is never deleted; requeue_dead_letter()
//     puts it back. Disabled by default.
//
// Concurrency: `state` guards the in-memory lists and is held only for
// short, non-awaiting sections. `drain_lock` serializes drain passes so
// two passes never send the same batch. Enqueues proceed during a drain.

use crate::atoms::traits::EdgeBackend;
use crate::atoms::types::{DrainReport, SyncOperation, SyncOperationDraft};
use crate::engine::config::SyncConfig;
use crate::engine::connectivity::ConnectivityMonitor;
use crate::engine::http::bounded;
use crate::engine::store::EdgeStore;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct QueueState {
    ops: Vec<SyncOperation>,
    dead: Vec<SyncOperation>,
    next_seq: u64,
    /// Last persist failed; the next write must rewrite everything.
    dirty: bool,
}

impl QueueState {
    fn sort(&mut self) {
        self.ops.sort_by_key(|op| (op.priority, op.seq));
    }
}

pub struct SyncQueue {
    store: Arc<EdgeStore>,
    backend: Arc<dyn EdgeBackend>,
    connectivity: Arc<ConnectivityMonitor>,
    device_id: String,
    config: SyncConfig,
    request_timeout: Duration,
    state: Mutex<QueueState>,
    drain_lock: tokio::sync::Mutex<()>,
    drain_passes: AtomicU64,
}

impl SyncQueue {
    /// Build the queue and reload whatever a previous run persisted.
    pub fn new(
        store: Arc<EdgeStore>,
        backend: Arc<dyn EdgeBackend>,
        connectivity: Arc<ConnectivityMonitor>,
        device_id: String,
        config: SyncConfig,
        request_timeout: Duration,
    ) -> Self {
        let ops = store.load_queue().unwrap_or_else(|e| {
            warn!("[sync] Could not reload persisted queue, starting empty: {}", e);
            Vec::new()
        });
        let dead = store.load_dead_letters().unwrap_or_else(|e| {
            warn!("[sync] Could not reload dead letters: {}", e);
            Vec::new()
        });
        let next_seq = ops.iter().chain(dead.iter()).map(|op| op.seq + 1).max().unwrap_or(0);
        if !ops.is_empty() {
            info!("[sync] Restored {} queued operation(s)", ops.len());
        }

        let mut state = QueueState { ops, dead, next_seq, dirty: false };
        state.sort();

        SyncQueue {
            store,
            backend,
            connectivity,
            device_id,
            config,
            request_timeout,
            state: Mutex::new(state),
            drain_lock: tokio::sync::Mutex::new(()),
            drain_passes: AtomicU64::new(0),
        }
    }

    /// Queue a mutation. It is persisted before this returns; if online, one
    /// drain pass runs before returning. Returns the operation id.
    pub async fn enqueue(&self, draft: SyncOperationDraft) -> String {
        let id = {
            let mut state = self.state.lock();
            let priority = draft.priority.unwrap_or(self.config.default_priority);
            let op = SyncOperation {
                id: uuid::Uuid::new_v4().to_string(),
                kind: draft.kind,
                entity_type: draft.entity_type,
                entity_id: draft.entity_id,
                payload: draft.payload,
                priority,
                original_priority: priority,
                depends_on: draft.depends_on,
                conflict_strategy: draft.conflict_strategy,
                seq: state.next_seq,
                created_at: chrono::Utc::now(),
                attempts: 0,
                last_error: None,
            };
            state.next_seq += 1;
            let id = op.id.clone();
            debug!(
                "[sync] Enqueued {} {:?} {} (priority {})",
                id, op.kind, op.entity_type, op.priority
            );
            state.ops.push(op);
            state.sort();
            self.persist(&mut state, false);
            id
        };

        if self.connectivity.is_online() {
            self.drain().await;
        }
        id
    }

    /// Process one bounded batch against the remote collaborator. No-op when
    /// offline. Never fails; per-item outcomes are in the report.
    pub async fn drain(&self) -> DrainReport {
        if !self.connectivity.is_online() {
            debug!("[sync] Drain skipped: offline");
            return DrainReport::default();
        }
        let _guard = self.drain_lock.lock().await;
        if !self.connectivity.is_online() {
            return DrainReport::default();
        }
        self.drain_passes.fetch_add(1, Ordering::Relaxed);

        // Operations waiting on a parent that is still queued or dead-lettered
        // are skipped before the batch is cut, so they never crowd it out.
        let (batch, blocked) = {
            let mut state = self.state.lock();
            state.sort();
            let unresolved: HashSet<&str> =
                state.ops.iter().chain(state.dead.iter()).map(|op| op.id.as_str()).collect();
            let (ready, blocked): (Vec<&SyncOperation>, Vec<&SyncOperation>) = state
                .ops
                .iter()
                .partition(|op| op.depends_on.as_deref().map_or(true, |dep| !unresolved.contains(dep)));
            let batch: Vec<SyncOperation> =
                ready.into_iter().take(self.config.batch_size).cloned().collect();
            (batch, blocked.len())
        };

        let mut report = DrainReport { deferred: blocked, ..DrainReport::default() };
        if batch.is_empty() {
            if blocked > 0 {
                debug!("[sync] {} operations waiting on unresolved parents", blocked);
            }
            return report;
        }

        let mut acked: HashSet<String> = HashSet::new();
        let mut failures: Vec<(String, String)> = Vec::new();

        for op in &batch {
            if !self.connectivity.is_online() {
                debug!("[sync] Went offline mid-drain; leaving the rest of the batch queued");
                break;
            }

            report.attempted += 1;
            let result = bounded(
                "sync submit",
                self.request_timeout,
                self.backend.submit_operation(&self.device_id, op),
            )
            .await;

            match result {
                Ok(()) => {
                    acked.insert(op.id.clone());
                    report.succeeded += 1;
                }
                Err(e) if e.is_transient() => {
                    warn!("[sync] {} {} failed, will retry: {}", op.entity_type, op.id, e);
                    failures.push((op.id.clone(), e.to_string()));
                    report.failed += 1;
                }
                Err(e) => {
                    error!("[sync] {} {} rejected: {}", op.entity_type, op.id, e);
                    failures.push((op.id.clone(), e.to_string()));
                    report.failed += 1;
                }
            }
        }

        report.dead_lettered = self.apply_outcomes(&acked, failures);

        if report.attempted > 0 {
            info!(
                "[sync] Drain: {} sent, {} ok, {} failed, {} deferred, {} dead-lettered, {} remaining",
                report.attempted,
                report.succeeded,
                report.failed,
                report.deferred,
                report.dead_lettered,
                self.len()
            );
        }
        report
    }

    /// Remove acknowledged ops, demote failed ones, persist once.
    /// Returns the number moved to dead letters.
    fn apply_outcomes(&self, acked: &HashSet<String>, failures: Vec<(String, String)>) -> usize {
        if acked.is_empty() && failures.is_empty() {
            return 0;
        }
        let mut state = self.state.lock();
        state.ops.retain(|op| !acked.contains(&op.id));

        let mut dead_lettered = 0;
        for (id, error) in failures {
            // Cancelled while the request was in flight.
            let Some(pos) = state.ops.iter().position(|op| op.id == id) else {
                continue;
            };
            let mut op = state.ops.remove(pos);
            op.attempts += 1;
            op.priority = op.priority.saturating_add(1).min(self.config.priority_ceiling.max(op.priority));
            op.last_error = Some(error);

            if self.config.dead_letter_after.is_some_and(|limit| op.attempts >= limit) {
                warn!(
                    "[sync] {} moved to dead letters after {} attempts",
                    op.id, op.attempts
                );
                state.dead.push(op);
                dead_lettered += 1;
            } else {
                state.ops.push(op);
            }
        }
        state.sort();
        self.persist(&mut state, dead_lettered > 0);
        dead_lettered
    }

    /// Persist the live queue (and dead letters when they changed). On
    /// failure the queue keeps working in memory and the next call retries.
    fn persist(&self, state: &mut QueueState, dead_changed: bool) {
        let queue_result = self.store.save_queue(&state.ops);
        let dead_result = if dead_changed || state.dirty {
            self.store.save_dead_letters(&state.dead)
        } else {
            Ok(())
        };
        match queue_result.and(dead_result) {
            Ok(()) => state.dirty = false,
            Err(e) => {
                warn!("[sync] Persisting queue failed, continuing in memory: {}", e);
                state.dirty = true;
            }
        }
    }

    /// Retry a failed persist, if any. Called from the periodic tick.
    pub fn persist_if_dirty(&self) {
        let mut state = self.state.lock();
        if state.dirty {
            self.persist(&mut state, true);
        }
    }

    /// Remove a queued (or dead-lettered) operation. Returns false if unknown.
    pub fn cancel(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        let before = (state.ops.len(), state.dead.len());
        state.ops.retain(|op| op.id != id);
        state.dead.retain(|op| op.id != id);
        let dead_changed = state.dead.len() != before.1;
        let removed = state.ops.len() != before.0 || dead_changed;
        if removed {
            info!("[sync] Cancelled {}", id);
            self.persist(&mut state, dead_changed);
        }
        removed
    }

    /// Move a dead letter back into the live queue at its original priority.
    pub fn requeue_dead_letter(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        let Some(pos) = state.dead.iter().position(|op| op.id == id) else {
            return false;
        };
        let mut op = state.dead.remove(pos);
        op.priority = op.original_priority;
        op.attempts = 0;
        info!("[sync] Requeued dead letter {}", op.id);
        state.ops.push(op);
        state.sort();
        self.persist(&mut state, true);
        true
    }

    /// Snapshot of the live queue in drain order.
    pub fn pending(&self) -> Vec<SyncOperation> {
        self.state.lock().ops.clone()
    }

    /// First `n` operations in drain order.
    pub fn head(&self, n: usize) -> Vec<SyncOperation> {
        self.state.lock().ops.iter().take(n).cloned().collect()
    }

    pub fn dead_letters(&self) -> Vec<SyncOperation> {
        self.state.lock().dead.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dead_letter_count(&self) -> usize {
        self.state.lock().dead.len()
    }

    pub fn drain_passes(&self) -> u64 {
        self.drain_passes.load(Ordering::Relaxed)
    }
}
