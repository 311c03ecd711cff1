use core_types::{TraderId, TraderRecord, TraderStatus, UserId};
use sandbox::{ControlHandle, ExchangeBinding, InterruptError, InterruptHandle};
use tokio::sync::watch;

/// Lifecycle event emitted when a run begins.
pub const RUNNING_MESSAGE: &str = "The Trader is running";
/// Lifecycle event emitted exactly once when a run ends, however it ends.
pub const STOPPED_MESSAGE: &str = "The Trader stop running";

/// The live, in-memory side of one run of one trader.
///
/// Instances stay in the registry after their run ends (with an idle status)
/// until a later start replaces them.
pub struct ExecutionInstance {
    control: ControlHandle,
    exchanges: Vec<ExchangeBinding>,
    interrupts: InterruptHandle,
    done: watch::Sender<bool>,
}

impl ExecutionInstance {
    pub fn new(control: ControlHandle, exchanges: Vec<ExchangeBinding>, interrupts: InterruptHandle) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            control,
            exchanges,
            interrupts,
            done,
        }
    }

    pub fn id(&self) -> TraderId {
        self.control.id()
    }

    pub fn user_id(&self) -> UserId {
        self.control.user_id()
    }

    pub fn control(&self) -> &ControlHandle {
        &self.control
    }

    pub fn exchanges(&self) -> &[ExchangeBinding] {
        &self.exchanges
    }

    pub fn status(&self) -> TraderStatus {
        self.control.status()
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// The trader record with the live status and last-run time.
    pub fn snapshot(&self) -> TraderRecord {
        self.control.snapshot()
    }

    /// True once the run's teardown has completed.
    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    /// Waits until the run's teardown has completed.
    pub async fn wait(&self) {
        let mut done = self.done.subscribe();
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Posts the halt request and marks the instance idle without waiting
    /// for the script to observe it.
    pub(crate) fn halt(&self) {
        match self.interrupts.halt() {
            Ok(()) => tracing::debug!(trader_id = self.id(), "Halt posted."),
            Err(InterruptError::Pending) => tracing::debug!(trader_id = self.id(), "Halt queued behind a pending interrupt."),
            Err(InterruptError::Closed) => tracing::debug!(trader_id = self.id(), "Trader already finished."),
        }
        self.control.set_status(TraderStatus::Idle);
    }

    /// Teardown of a run: idle status, the terminal lifecycle event, and
    /// release of every waiter.
    pub(crate) fn finish(&self) {
        self.control.set_status(TraderStatus::Idle);
        self.control.logger().info(STOPPED_MESSAGE);
        self.done.send_replace(true);
    }
}
