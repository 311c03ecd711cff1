use crate::error::InterruptError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TrySendError};

/// The halt signal raised inside a sandbox to end its script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Halt;

/// A function scheduled onto the sandbox's own execution point. Returning
/// `Err(Halt)` ends the running script.
pub type Interrupt = Box<dyn FnOnce() -> Result<(), Halt> + Send>;

/// Creates the interruption channel of one sandbox. At most one interruption
/// can be pending at a time.
pub fn channel() -> (InterruptHandle, InterruptReceiver) {
    let (tx, rx) = mpsc::channel(1);
    let halting = Arc::new(AtomicBool::new(false));
    (
        InterruptHandle {
            tx,
            halting: Arc::clone(&halting),
        },
        InterruptReceiver {
            rx: Mutex::new(rx),
            halting,
        },
    )
}

/// The sending side, held by the lifecycle controller and by every exchange
/// binding of the sandbox.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: mpsc::Sender<Interrupt>,
    halting: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Schedules `interrupt` to run before the sandbox's next instruction.
    pub fn post(&self, interrupt: Interrupt) -> Result<(), InterruptError> {
        self.tx.try_send(interrupt).map_err(|e| match e {
            TrySendError::Full(_) => InterruptError::Pending,
            TrySendError::Closed(_) => InterruptError::Closed,
        })
    }

    /// Posts an interruption that unconditionally raises the halt signal.
    ///
    /// The halt is remembered even when another interruption is still
    /// pending, so it lands right after that one has run.
    pub fn halt(&self) -> Result<(), InterruptError> {
        if self.tx.is_closed() {
            return Err(InterruptError::Closed);
        }
        self.halting.store(true, Ordering::SeqCst);
        self.post(Box::new(|| Err(Halt)))
    }

    /// True once a halt has been requested for this sandbox.
    pub fn is_halting(&self) -> bool {
        self.halting.load(Ordering::SeqCst)
    }

}

/// The receiving side, polled by the interpreter between instructions.
pub struct InterruptReceiver {
    rx: Mutex<mpsc::Receiver<Interrupt>>,
    halting: Arc<AtomicBool>,
}

impl InterruptReceiver {
    /// Runs the pending interruption, if any.
    pub fn poll(&self) -> Result<(), Halt> {
        let next = match self.rx.lock() {
            Ok(mut rx) => rx.try_recv().ok(),
            Err(_) => None,
        };
        if let Some(interrupt) = next {
            interrupt()?;
        }
        match self.halting.load(Ordering::SeqCst) {
            true => Err(Halt),
            false => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_interrupt_is_rejected_while_one_is_pending() {
        let (handle, receiver) = channel();
        assert!(handle.post(Box::new(|| Err(Halt))).is_ok());
        assert_eq!(handle.post(Box::new(|| Ok(()))), Err(InterruptError::Pending));

        assert_eq!(receiver.poll(), Err(Halt));
        assert_eq!(receiver.poll(), Ok(()));
        assert!(!handle.is_halting());
    }

    #[test]
    fn posting_after_the_sandbox_is_gone_reports_closed() {
        let (handle, receiver) = channel();
        drop(receiver);
        assert_eq!(handle.halt(), Err(InterruptError::Closed));
        assert!(!handle.is_halting());
    }

    #[test]
    fn non_halting_interrupts_let_the_script_continue() {
        let (handle, receiver) = channel();
        handle.post(Box::new(|| Ok(()))).unwrap();
        assert!(!handle.is_halting());
        assert_eq!(receiver.poll(), Ok(()));
        assert_eq!(receiver.poll(), Ok(()));
    }

    #[test]
    fn halt_behind_a_pending_interrupt_still_lands() {
        let (handle, receiver) = channel();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        handle
            .post(Box::new(move || {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();

        assert_eq!(handle.halt(), Err(InterruptError::Pending));
        assert!(handle.is_halting());
        assert_eq!(receiver.poll(), Err(Halt));
        assert!(ran.load(Ordering::SeqCst));
    }
}
