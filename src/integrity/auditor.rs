use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use chrono::Utc;
use tracing::{debug, info, warn};
use super::checksum::compute_hash;
use super::schedule::ScheduleSlot;
use super::state::{AuditCandidate, CheckOutcome, IntegrityAuditResult, IntegrityCheck};

pub(super) type Listener = Arc<dyn Fn(&IntegrityAuditResult) + Send + Sync>;

pub(super) struct AuditorState {
    last_result: RwLock<Option<Arc<IntegrityAuditResult>>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
    /// Held while a result is stored and delivered, so runs publish one at a time.
    publish: Mutex<()>,
    pub(super) schedule: Mutex<ScheduleSlot>,
}

impl Drop for AuditorState {
    fn drop(&mut self) {
        let slot = self.schedule.get_mut().unwrap_or_else(PoisonError::into_inner);
        slot.cancel();
    }
}

/// Verifies stored record digests and keeps the most recent audit result.
///
/// Cloning yields another handle to the same auditor. Dropping the last
/// handle cancels any recurring schedule.
#[derive(Clone)]
pub struct IntegrityAuditor {
    pub(super) inner: Arc<AuditorState>,
}

impl IntegrityAuditor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AuditorState {
                last_result: RwLock::new(None),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
                publish: Mutex::new(()),
                schedule: Mutex::new(ScheduleSlot::default()),
            }),
        }
    }

    pub(super) fn from_state(inner: Arc<AuditorState>) -> Self {
        Self { inner }
    }

    pub(super) fn downgrade(&self) -> Weak<AuditorState> {
        Arc::downgrade(&self.inner)
    }

    /// Recomputes the digest of every candidate and compares it with the stored one.
    ///
    /// A candidate that cannot be canonicalized is counted under `errors`
    /// and does not affect the rest of the batch. The result is stored as
    /// the last result and handed to every listener before returning.
    pub fn run_audit<I>(&self, candidates: I) -> Arc<IntegrityAuditResult>
    where
        I: IntoIterator<Item = AuditCandidate>,
    {
        let started_at = Utc::now();
        let checks: Vec<IntegrityCheck> = candidates.into_iter().map(check_candidate).collect();
        let result = Arc::new(IntegrityAuditResult::from_checks(checks, started_at));

        info!(
            run_id = %result.run_id,
            total = result.total_checked,
            valid = result.valid,
            tampered = result.tampered,
            errors = result.errors,
            resilience_index = result.resilience_index,
            "Integrity audit completed"
        );

        self.publish(Arc::clone(&result));
        result
    }

    pub fn last_result(&self) -> Option<Arc<IntegrityAuditResult>> {
        self.inner
            .last_result
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Registers a listener called with every completed audit result.
    ///
    /// Listeners run while the result is being published and must not
    /// start another audit on the same auditor.
    pub fn on_audit<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&IntegrityAuditResult) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));

        Subscription {
            id,
            auditor: self.downgrade(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Stops the recurring schedule and drops every listener.
    pub fn shutdown(&self) {
        self.stop_recurring();
        self.inner.listeners.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn publish(&self, result: Arc<IntegrityAuditResult>) {
        let _publishing = self.inner.publish.lock().unwrap_or_else(PoisonError::into_inner);
        *self.inner.last_result.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&result));

        let listeners: Vec<(u64, Listener)> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&result))).is_err() {
                warn!(listener = id, run_id = %result.run_id, "Audit listener panicked");
            }
        }
    }
}

impl Default for IntegrityAuditor {
    fn default() -> Self {
        Self::new()
    }
}

/// Verifies one record against its stored digest without publishing a run.
pub fn check_candidate(candidate: AuditCandidate) -> IntegrityCheck {
    let checked_at = Utc::now();
    let expected_hash = candidate.baseline().map(str::to_string);

    let hashed = match candidate.rejected {
        Some(reason) => Err(reason),
        None => compute_hash(&candidate.fields).map_err(|e| e.to_string()),
    };

    let (computed_hash, outcome, error) = match hashed {
        Err(e) => {
            warn!(table = %candidate.table, record_id = %candidate.record_id, error = %e, "Record could not be hashed");
            (None, CheckOutcome::Error, Some(e))
        }
        Ok(digest) => {
            let outcome = match expected_hash.as_deref() {
                None => CheckOutcome::Unverified,
                Some(stored) if digest.matches(stored) => CheckOutcome::Valid,
                Some(_) => CheckOutcome::Tampered,
            };
            if outcome == CheckOutcome::Tampered {
                warn!(table = %candidate.table, record_id = %candidate.record_id, "Stored digest does not match record contents");
            } else {
                debug!(table = %candidate.table, record_id = %candidate.record_id, outcome = outcome.as_str(), "Record checked");
            }
            (Some(digest), outcome, None)
        }
    };

    IntegrityCheck {
        table: candidate.table,
        record_id: candidate.record_id,
        expected_hash,
        computed_hash,
        is_valid: matches!(outcome, CheckOutcome::Valid | CheckOutcome::Unverified),
        outcome,
        checked_at,
        fields: candidate.fields,
        error,
    }
}

/// Handle returned by [`IntegrityAuditor::on_audit`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    auditor: Weak<AuditorState>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(state) = self.auditor.upgrade() else {
            return false;
        };
        let mut listeners = state.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        listeners.len() != before
    }
}

impl std::fmt::Debug for AuditorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditorState").finish_non_exhaustive()
    }
}
