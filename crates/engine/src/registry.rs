use crate::instance::ExecutionInstance;
use core_types::{TraderId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The process-wide table of trader id -> current (or most recent)
/// execution instance. Entries are replaced by later starts and never
/// removed.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Arc<RwLock<HashMap<TraderId, Arc<ExecutionInstance>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: TraderId) -> Option<Arc<ExecutionInstance>> {
        self.entries.read().await.get(&id).cloned()
    }

    pub async fn is_running(&self, id: TraderId) -> bool {
        self.entries
            .read()
            .await
            .get(&id)
            .is_some_and(|instance| instance.is_running())
    }

    /// Makes `instance` the entry for its trader and claims its running
    /// status, unless the current entry is running. The check and the claim
    /// happen under the write lock, so two concurrent registrations for the
    /// same trader cannot both succeed.
    pub(crate) async fn register(&self, instance: Arc<ExecutionInstance>) -> bool {
        let mut entries = self.entries.write().await;
        if entries.get(&instance.id()).is_some_and(|current| current.is_running()) {
            return false;
        }
        if !instance.control().try_claim() {
            return false;
        }
        entries.insert(instance.id(), instance);
        true
    }

    /// Every entry owned by `user_id`, running or not.
    pub async fn owned_by(&self, user_id: UserId) -> Vec<Arc<ExecutionInstance>> {
        self.entries
            .read()
            .await
            .values()
            .filter(|instance| instance.user_id() == user_id)
            .cloned()
            .collect()
    }

    /// Every entry, running or not.
    pub async fn instances(&self) -> Vec<Arc<ExecutionInstance>> {
        self.entries.read().await.values().cloned().collect()
    }

    /// Ids of every trader currently running, in ascending order.
    pub async fn running(&self) -> Vec<TraderId> {
        let mut ids: Vec<TraderId> = self
            .entries
            .read()
            .await
            .values()
            .filter(|instance| instance.is_running())
            .map(|instance| instance.id())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Strategy, TraderRecord, TraderStatus};
    use events::{MemorySink, TraderLogger};
    use sandbox::{interrupt, TraderControl};
    use std::time::Duration;

    fn instance(id: TraderId, user_id: UserId) -> Arc<ExecutionInstance> {
        let (interrupts, _receiver) = interrupt::channel();
        let trader = TraderRecord {
            id,
            user_id,
            name: format!("trader-{}", id),
            strategy_id: 1,
            status: TraderStatus::Idle,
            last_run_at: None,
        };
        let strategy = Strategy {
            id: 1,
            user_id,
            name: "s".to_string(),
            script: String::new(),
        };
        let logger = TraderLogger::global(id, Arc::new(MemorySink::new()));
        let control = Arc::new(TraderControl::new(
            trader,
            strategy,
            logger,
            interrupts.clone(),
            Duration::from_millis(10),
        ));
        Arc::new(ExecutionInstance::new(control, Vec::new(), interrupts))
    }

    #[tokio::test]
    async fn registration_is_refused_while_the_entry_runs() {
        let registry = Registry::new();
        let first = instance(1, 1);
        assert!(registry.register(Arc::clone(&first)).await);
        assert!(registry.is_running(1).await);

        let second = instance(1, 1);
        assert!(!registry.register(Arc::clone(&second)).await);
        assert!(Arc::ptr_eq(&registry.get(1).await.unwrap(), &first));
        assert_eq!(second.status(), TraderStatus::Idle);
    }

    #[tokio::test]
    async fn idle_entries_are_replaced_not_removed() {
        let registry = Registry::new();
        let first = instance(1, 1);
        registry.register(Arc::clone(&first)).await;
        first.halt();
        assert!(!registry.is_running(1).await);
        assert_eq!(registry.len().await, 1);

        let second = instance(1, 1);
        assert!(registry.register(Arc::clone(&second)).await);
        assert!(Arc::ptr_eq(&registry.get(1).await.unwrap(), &second));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn lookups_by_owner_and_status() {
        let registry = Registry::new();
        for (id, user) in [(3, 1), (1, 1), (2, 2)] {
            registry.register(instance(id, user)).await;
        }
        registry.get(3).await.unwrap().halt();

        let mut owned: Vec<TraderId> = registry.owned_by(1).await.iter().map(|i| i.id()).collect();
        owned.sort_unstable();
        assert_eq!(owned, vec![1, 3]);
        assert_eq!(registry.running().await, vec![1, 2]);
        assert!(registry.get(9).await.is_none());
    }
}
