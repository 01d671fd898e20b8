use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};
use crate::error::{BrokerGuardError, Result};
use super::auditor::{AuditorState, IntegrityAuditor};
use super::state::AuditCandidate;

/// The auditor's single recurring task. `generation` changes on every
/// start/stop so a superseded task never runs another audit.
#[derive(Default)]
pub(super) struct ScheduleSlot {
    generation: u64,
    task: Option<JoinHandle<()>>,
    interval: Option<Duration>,
}

impl ScheduleSlot {
    pub(super) fn cancel(&mut self) -> bool {
        self.generation = self.generation.wrapping_add(1);
        self.interval = None;
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

impl IntegrityAuditor {
    /// Runs an audit over `source()` now, then every `interval` on the current
    /// tokio runtime. Replaces any schedule already running.
    ///
    /// The immediate run happens on the caller before this returns.
    pub fn start_recurring<F>(&self, interval: Duration, source: F) -> Result<()>
    where
        F: Fn() -> Vec<AuditCandidate> + Send + Sync + 'static,
    {
        if interval.is_zero() {
            return Err(BrokerGuardError::Schedule("interval must be greater than zero".to_string()));
        }
        let runtime = Handle::try_current().map_err(|_| {
            BrokerGuardError::Schedule("recurring audits require a tokio runtime".to_string())
        })?;
        let source = Arc::new(source);

        let generation = {
            let mut slot = self.inner.schedule.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.cancel() {
                debug!("Replacing running audit schedule");
            }
            slot.generation
        };

        self.run_audit(source());

        let mut slot = self.inner.schedule.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.generation != generation {
            debug!("Audit schedule superseded during its initial run");
            return Ok(());
        }
        slot.task = Some(runtime.spawn(scheduled_loop(self.downgrade(), generation, interval, source)));
        slot.interval = Some(interval);

        info!(interval_ms = interval.as_millis() as u64, "Recurring integrity audit started");
        Ok(())
    }

    /// Cancels the schedule. No scheduled run starts after this returns; a run
    /// already in progress completes. Returns false if nothing was scheduled.
    pub fn stop_recurring(&self) -> bool {
        let stopped = self
            .inner
            .schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        if stopped {
            info!("Recurring integrity audit stopped");
        }
        stopped
    }

    pub fn is_recurring(&self) -> bool {
        self.inner
            .schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn recurring_interval(&self) -> Option<Duration> {
        self.inner.schedule.lock().unwrap_or_else(PoisonError::into_inner).interval
    }
}

async fn scheduled_loop<F>(
    state: Weak<AuditorState>,
    generation: u64,
    period: Duration,
    source: Arc<F>,
) where
    F: Fn() -> Vec<AuditCandidate> + Send + Sync + 'static,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(inner) = state.upgrade() else {
            break;
        };
        let current = inner.schedule.lock().unwrap_or_else(PoisonError::into_inner).generation == generation;
        if !current {
            break;
        }
        IntegrityAuditor::from_state(inner).run_audit(source());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::record::Record;

    fn counting_source(counter: &Arc<AtomicUsize>) -> impl Fn() -> Vec<AuditCandidate> + Send + Sync + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            vec![AuditCandidate::new(Record::new("audit_log", "L-1").with_field("action", "login"), None)]
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_stop_runs_once() {
        let auditor = IntegrityAuditor::new();
        let runs = Arc::new(AtomicUsize::new(0));

        auditor.start_recurring(Duration::from_secs(60), counting_source(&runs)).unwrap();
        assert!(auditor.stop_recurring());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!auditor.is_recurring());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recurring_runs_on_interval() {
        let auditor = IntegrityAuditor::new();
        let runs = Arc::new(AtomicUsize::new(0));

        auditor.start_recurring(Duration::from_secs(10), counting_source(&runs)).unwrap();
        assert!(auditor.is_recurring());
        assert_eq!(auditor.recurring_interval(), Some(Duration::from_secs(10)));

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 4);

        auditor.stop_recurring();
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_schedule() {
        let auditor = IntegrityAuditor::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        auditor.start_recurring(Duration::from_secs(10), counting_source(&first)).unwrap();
        auditor.start_recurring(Duration::from_secs(10), counting_source(&second)).unwrap();

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_runs_notify_listeners() {
        let auditor = IntegrityAuditor::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        let _subscription = auditor.on_audit(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        auditor.start_recurring(Duration::from_secs(5), counting_source(&runs)).unwrap();
        tokio::time::sleep(Duration::from_secs(12)).await;

        assert_eq!(notified.load(Ordering::SeqCst), 3);
        assert_eq!(auditor.last_result().unwrap().total_checked, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_auditor_cancels_schedule() {
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let auditor = IntegrityAuditor::new();
            auditor.start_recurring(Duration::from_secs(10), counting_source(&runs)).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let auditor = IntegrityAuditor::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let err = auditor.start_recurring(Duration::ZERO, counting_source(&runs)).unwrap_err();
        assert!(matches!(err, BrokerGuardError::Schedule(_)));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let auditor = IntegrityAuditor::new();
        let runs = Arc::new(AtomicUsize::new(0));
        assert!(auditor.start_recurring(Duration::from_secs(1), counting_source(&runs)).is_err());
        assert!(!auditor.stop_recurring());
    }
}
