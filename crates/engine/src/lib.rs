//! # Trader Execution Engine
//!
//! The lifecycle controller of trader runs. [`TraderExecutor`] loads a trader
//! from the storage service, builds its sandbox and exchange bindings,
//! registers the run in the [`Registry`] and launches the strategy script as
//! an independent task. Runs are stopped cooperatively through the sandbox's
//! interruption channel.

use configuration::{ExchangesConfig, SandboxConfig};
use core_types::{TraderId, UserId};
use database::TraderStore;
use events::{EventSink, TraderLogger};
use sandbox::{BindingFactory, Sandbox, ScriptError, TraderControl};
use std::sync::Arc;
use std::time::Duration;

pub mod error;
pub mod instance;
pub mod registry;

// --- Public API ---
pub use error::EngineError;
pub use instance::{ExecutionInstance, RUNNING_MESSAGE, STOPPED_MESSAGE};
pub use registry::Registry;

/// Runs the teardown of a run when dropped, so it happens on every exit path
/// of the script thread, unwinding included.
struct Teardown(Arc<ExecutionInstance>);

impl Drop for Teardown {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// The body of a trader's task, executed on the blocking pool.
fn run_script(instance: Arc<ExecutionInstance>, mut sandbox: Sandbox) {
    let _teardown = Teardown(Arc::clone(&instance));
    let control = instance.control();

    control.mark_started();
    control.logger().info(RUNNING_MESSAGE);

    let script = &control.strategy().script;
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sandbox.run(script)))
        .unwrap_or_else(|payload| Err(ScriptError::Runtime(panic_message(payload.as_ref()))));

    match outcome {
        Ok(()) => tracing::info!(trader_id = control.id(), "Strategy script completed."),
        Err(ScriptError::Halted) => tracing::info!(trader_id = control.id(), "Strategy script halted."),
        Err(ScriptError::Runtime(e)) => {
            tracing::warn!(trader_id = control.id(), error = %e, "Strategy script failed.");
            control.logger().error(e);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("Strategy script panicked: {}", detail)
}

/// The lifecycle controller: start, stop and cleanup of trader runs.
#[derive(Clone)]
pub struct TraderExecutor {
    store: Arc<dyn TraderStore>,
    sink: Arc<dyn EventSink>,
    registry: Registry,
    factory: BindingFactory,
    sandbox_config: SandboxConfig,
}

impl TraderExecutor {
    pub fn new(
        store: Arc<dyn TraderStore>,
        sink: Arc<dyn EventSink>,
        sandbox_config: SandboxConfig,
        exchanges_config: ExchangesConfig,
    ) -> Self {
        Self {
            store,
            sink,
            registry: Registry::new(),
            factory: BindingFactory::new(exchanges_config),
            sandbox_config,
        }
    }

    /// The registry of this executor, for read-only introspection.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Starts a run of the trader.
    ///
    /// Returns as soon as the run is launched. Starting a trader that is
    /// already running is a no-op. Every error is raised before anything is
    /// registered or spawned; what happens to the run afterwards is only
    /// visible through the event stream and the registry.
    pub async fn start(&self, id: TraderId) -> Result<(), EngineError> {
        if self.registry.is_running(id).await {
            tracing::debug!(trader_id = id, "Trader is already running.");
            return Ok(());
        }

        let trader = self.store.get_trader(id).await?;
        let user = self.store.get_user(trader.user_id).await?;
        if !trader.has_strategy() {
            return Err(EngineError::Configuration(format!(
                "Trader {} has no strategy selected",
                id
            )));
        }
        let strategy = self.store.get_strategy(trader.strategy_id).await?;
        let configs = self.store.get_exchange_configs(&user, trader.id).await?;

        let logger = TraderLogger::global(trader.id, Arc::clone(&self.sink));
        let mut sandbox = Sandbox::new(&self.sandbox_config);
        let interrupts = sandbox.interrupt_handle();
        let exchanges = self.factory.build(trader.id, &configs, &interrupts, &logger)?;
        if exchanges.is_empty() {
            return Err(EngineError::Configuration(format!(
                "Trader {} has no exchange account",
                id
            )));
        }

        let control = Arc::new(TraderControl::new(
            trader,
            strategy,
            logger,
            interrupts.clone(),
            Duration::from_millis(self.sandbox_config.sleep_slice_ms),
        ));
        sandbox.bind_constants();
        sandbox.bind(&control, &exchanges);

        let instance = Arc::new(ExecutionInstance::new(control, exchanges, interrupts));
        if !self.registry.register(Arc::clone(&instance)).await {
            tracing::debug!(trader_id = id, "Trader was started concurrently.");
            return Ok(());
        }

        tracing::info!(
            trader_id = id,
            user_id = instance.user_id(),
            exchanges = instance.exchanges().len(),
            "Launching trader."
        );
        tokio::spawn(async move {
            let task = tokio::task::spawn_blocking(move || run_script(instance, sandbox));
            if let Err(e) = task.await {
                tracing::error!(trader_id = id, error = %e, "Trader task panicked.");
            }
        });
        Ok(())
    }

    /// Requests a halt of the trader's run and marks it idle.
    ///
    /// Does not wait for the script to observe the halt. Stopping a trader
    /// whose run already ended, or whose halt is still pending, succeeds.
    pub async fn stop(&self, id: TraderId) -> Result<(), EngineError> {
        let instance = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| EngineError::NotFound(format!("Trader {}", id)))?;

        instance.halt();
        tracing::info!(trader_id = id, "Trader stop requested.");
        Ok(())
    }

    /// Stops every registered trader owned by `user_id` and returns how many
    /// were running. Entries whose run already ended are not counted.
    /// Continues past failures and reports the first one.
    pub async fn clean(&self, user_id: UserId) -> Result<usize, EngineError> {
        let mut stopped = 0;
        let mut first_error = None;

        for instance in self.registry.owned_by(user_id).await {
            let was_running = instance.is_running();
            match self.stop(instance.id()).await {
                Ok(()) if was_running => stopped += 1,
                Ok(()) => {}
                Err(e) => {
                    tracing::warn!(trader_id = instance.id(), user_id, error = %e, "Cleanup could not stop trader.");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        tracing::info!(user_id, stopped, "Cleaned up traders.");
        match first_error {
            Some(e) => Err(e),
            None => Ok(stopped),
        }
    }

    /// Stops every trader and waits for all of their runs to end, including
    /// runs already marked idle whose script has not observed its halt yet.
    pub async fn shutdown(&self) {
        let pending: Vec<_> = self
            .registry
            .instances()
            .await
            .into_iter()
            .filter(|instance| !instance.is_finished())
            .collect();
        for instance in &pending {
            instance.halt();
        }

        tracing::info!(count = pending.len(), "Waiting for traders to stop.");
        for instance in pending {
            instance.wait().await;
        }
    }
}
