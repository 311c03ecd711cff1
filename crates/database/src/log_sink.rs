use crate::repository::DbRepository;
use events::{EventSink, TraderEvent};
use tokio::runtime::Handle;

/// An `EventSink` that persists every event through the repository.
///
/// Inserts are spawned on the runtime so that logging never blocks a script
/// thread; failures are reported through `tracing` only.
#[derive(Debug, Clone)]
pub struct DbLogSink {
    repo: DbRepository,
    runtime: Handle,
}

impl DbLogSink {
    pub fn new(repo: DbRepository, runtime: Handle) -> Self {
        Self { repo, runtime }
    }
}

impl EventSink for DbLogSink {
    fn log(&self, event: TraderEvent) {
        let repo = self.repo.clone();
        self.runtime.spawn(async move {
            if let Err(e) = repo.save_log(&event).await {
                tracing::warn!(trader_id = event.trader_id, error = %e, "Failed to persist trader event.");
            }
        });
    }
}
