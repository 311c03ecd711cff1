use crate::interrupt::{Halt, InterruptHandle};
use chrono::{DateTime, Utc};
use core_types::{Strategy, TraderId, TraderRecord, TraderStatus, UserId};
use events::TraderLogger;
use rhai::{Array, FnPtr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A sub-task queued by a script with `AddTask` and run by `ExecTasks`.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub func: FnPtr,
    pub args: Array,
}

/// The control handle of one trader run.
///
/// It is shared by the lifecycle controller, the registry and the script
/// itself (as `Global`/`G`). The run status is an atomic so the
/// idle -> running transition can be claimed with a compare-and-set.
pub struct TraderControl {
    trader: TraderRecord,
    strategy: Strategy,
    status: AtomicU8,
    last_run_at: Mutex<Option<DateTime<Utc>>>,
    logger: TraderLogger,
    interrupts: InterruptHandle,
    tasks: Mutex<Vec<ScheduledTask>>,
    sleep_slice: Duration,
}

pub type ControlHandle = Arc<TraderControl>;

impl TraderControl {
    pub fn new(
        trader: TraderRecord,
        strategy: Strategy,
        logger: TraderLogger,
        interrupts: InterruptHandle,
        sleep_slice: Duration,
    ) -> Self {
        let last_run_at = trader.last_run_at;
        Self {
            trader,
            strategy,
            status: AtomicU8::new(TraderStatus::Idle.into()),
            last_run_at: Mutex::new(last_run_at),
            logger,
            interrupts,
            tasks: Mutex::new(Vec::new()),
            sleep_slice,
        }
    }

    pub fn id(&self) -> TraderId {
        self.trader.id
    }

    pub fn user_id(&self) -> UserId {
        self.trader.user_id
    }

    pub fn name(&self) -> &str {
        &self.trader.name
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn logger(&self) -> &TraderLogger {
        &self.logger
    }

    pub fn interrupts(&self) -> &InterruptHandle {
        &self.interrupts
    }

    pub fn status(&self) -> TraderStatus {
        TraderStatus::try_from(self.status.load(Ordering::SeqCst)).unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    pub fn set_status(&self, status: TraderStatus) {
        self.status.store(status.into(), Ordering::SeqCst);
    }

    /// Moves the status from idle to running. Returns false when it was
    /// already running.
    pub fn try_claim(&self) -> bool {
        self.status
            .compare_exchange(
                TraderStatus::Idle.into(),
                TraderStatus::Running.into(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.last_run_at.lock().ok().and_then(|t| *t)
    }

    /// Records the start of a run.
    pub fn mark_started(&self) -> DateTime<Utc> {
        let now = Utc::now();
        if let Ok(mut last) = self.last_run_at.lock() {
            *last = Some(now);
        }
        now
    }

    /// The stored record with the live status and last-run time applied.
    pub fn snapshot(&self) -> TraderRecord {
        TraderRecord {
            status: self.status(),
            last_run_at: self.last_run_at(),
            ..self.trader.clone()
        }
    }

    pub fn push_task(&self, task: ScheduledTask) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
    }

    /// Removes and returns every queued task, oldest first.
    pub fn take_tasks(&self) -> Vec<ScheduledTask> {
        self.tasks
            .lock()
            .map(|mut tasks| std::mem::take(&mut *tasks))
            .unwrap_or_default()
    }

    /// Blocks the script thread for `duration`, waking up every sleep slice
    /// to give up early once a halt has been requested.
    pub fn sleep(&self, duration: Duration) -> Result<(), Halt> {
        let deadline = Instant::now() + duration;
        loop {
            if self.interrupts.is_halting() {
                return Err(Halt);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(self.sleep_slice.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt;
    use events::MemorySink;

    fn control(interrupts: InterruptHandle) -> TraderControl {
        let trader = TraderRecord {
            id: 3,
            user_id: 8,
            name: "grid".to_string(),
            strategy_id: 1,
            status: TraderStatus::Idle,
            last_run_at: None,
        };
        let strategy = Strategy {
            id: 1,
            user_id: 8,
            name: "s".to_string(),
            script: String::new(),
        };
        let logger = TraderLogger::global(3, Arc::new(MemorySink::new()));
        TraderControl::new(trader, strategy, logger, interrupts, Duration::from_millis(5))
    }

    #[test]
    fn claim_succeeds_only_once() {
        let (handle, _rx) = interrupt::channel();
        let control = control(handle);
        assert!(control.try_claim());
        assert!(!control.try_claim());
        assert!(control.is_running());

        control.set_status(TraderStatus::Idle);
        assert!(control.try_claim());
    }

    #[test]
    fn snapshot_reflects_live_state() {
        let (handle, _rx) = interrupt::channel();
        let control = control(handle);
        control.try_claim();
        let started = control.mark_started();

        let snapshot = control.snapshot();
        assert_eq!(snapshot.status, TraderStatus::Running);
        assert_eq!(snapshot.last_run_at, Some(started));
        assert_eq!(snapshot.name, "grid");
    }

    #[test]
    fn sleep_gives_up_once_a_halt_is_requested() {
        let (handle, _rx) = interrupt::channel();
        let control = control(handle.clone());
        handle.halt().unwrap();

        let begin = Instant::now();
        assert_eq!(control.sleep(Duration::from_secs(30)), Err(Halt));
        assert!(begin.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn pending_non_halting_interrupt_does_not_cut_sleep_short() {
        let (handle, _rx) = interrupt::channel();
        let control = control(handle.clone());
        handle.post(Box::new(|| Ok(()))).unwrap();

        let begin = Instant::now();
        assert_eq!(control.sleep(Duration::from_millis(40)), Ok(()));
        assert!(begin.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn sleep_without_halt_runs_to_completion() {
        let (handle, _rx) = interrupt::channel();
        let control = control(handle);
        assert_eq!(control.sleep(Duration::from_millis(12)), Ok(()));
    }
}
