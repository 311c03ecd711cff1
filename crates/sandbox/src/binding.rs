use crate::error::SandboxError;
use crate::interrupt::InterruptHandle;
use configuration::ExchangesConfig;
use core_types::{Credentials, ExchangeConfig, TraderId};
use events::TraderLogger;
use exchange::{Exchange, ExchangeKind};
use std::sync::Arc;

/// One constructed exchange client as seen by a script.
///
/// It keeps a link to the interruption channel of the sandbox it is bound
/// into, so exchange calls stop issuing requests once a halt is pending.
#[derive(Clone)]
pub struct ExchangeBinding {
    index: usize,
    trader_id: TraderId,
    kind: ExchangeKind,
    credentials: Credentials,
    sandbox: InterruptHandle,
    client: Arc<dyn Exchange>,
    logger: TraderLogger,
}

impl ExchangeBinding {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn trader_id(&self) -> TraderId {
        self.trader_id
    }

    pub fn kind(&self) -> ExchangeKind {
        self.kind
    }

    pub fn access_key(&self) -> &str {
        &self.credentials.access_key
    }

    pub fn client(&self) -> &Arc<dyn Exchange> {
        &self.client
    }

    pub fn logger(&self) -> &TraderLogger {
        &self.logger
    }

    pub fn sandbox(&self) -> &InterruptHandle {
        &self.sandbox
    }
}

impl std::fmt::Debug for ExchangeBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeBinding")
            .field("index", &self.index)
            .field("trader_id", &self.trader_id)
            .field("kind", &self.kind)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// Builds the exchange bindings of a trader from its stored accounts.
#[derive(Debug, Clone, Default)]
pub struct BindingFactory {
    config: ExchangesConfig,
}

impl BindingFactory {
    pub fn new(config: ExchangesConfig) -> Self {
        Self { config }
    }

    /// Constructs one binding per account with a supported type tag.
    ///
    /// Accounts of an unknown type, or whose client cannot be constructed,
    /// are skipped without consuming an index, so the indices of the result
    /// are always `0..len`. Fails when a non-empty list yields no binding.
    pub fn build(
        &self,
        trader_id: TraderId,
        configs: &[ExchangeConfig],
        sandbox: &InterruptHandle,
        logger: &TraderLogger,
    ) -> Result<Vec<ExchangeBinding>, SandboxError> {
        let mut bindings = Vec::with_capacity(configs.len());

        for config in configs {
            let Some(kind) = ExchangeKind::from_tag(&config.kind) else {
                tracing::warn!(trader_id, account = %config.name, kind = %config.kind, "Skipping exchange account of unsupported type.");
                continue;
            };

            let client = match exchange::connect(kind, &config.credentials, &self.config) {
                Ok(client) => client,
                Err(e) => {
                    tracing::warn!(trader_id, account = %config.name, error = %e, "Skipping exchange account that could not be constructed.");
                    continue;
                }
            };

            bindings.push(ExchangeBinding {
                index: bindings.len(),
                trader_id,
                kind,
                credentials: config.credentials.clone(),
                sandbox: sandbox.clone(),
                client,
                logger: logger.for_exchange(kind.tag()),
            });
        }

        if bindings.is_empty() && !configs.is_empty() {
            return Err(SandboxError::Configuration(
                "None of the trader's exchange accounts is of a supported type".to_string(),
            ));
        }
        Ok(bindings)
    }
}
