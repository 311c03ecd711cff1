//! # Exchange Clients
//!
//! The exchange implementations a trader script can be bound to. Every
//! account type is reached through the [`Exchange`] trait; [`ExchangeKind`]
//! maps the stored account type tag to an implementation.

mod auth;
pub mod binance;
pub mod error;
pub mod paper;
pub mod traits;
pub mod types;

use configuration::ExchangesConfig;
use core_types::Credentials;
use std::sync::Arc;

// --- Public API ---
pub use binance::BinanceClient;
pub use error::ExchangeError;
pub use paper::PaperExchange;
pub use traits::Exchange;
pub use types::{Account, Balance, ExchangeKind, Order, OrderStatus, Ticker};

/// Constructs the client for one exchange account.
pub fn connect(
    kind: ExchangeKind,
    credentials: &Credentials,
    config: &ExchangesConfig,
) -> Result<Arc<dyn Exchange>, ExchangeError> {
    Ok(match kind {
        ExchangeKind::Binance => Arc::new(BinanceClient::new(&config.binance, credentials)?),
        ExchangeKind::Paper => Arc::new(PaperExchange::new(&config.paper)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for kind in ExchangeKind::ALL {
            assert_eq!(ExchangeKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ExchangeKind::from_tag("okcoin.cn"), None);
    }
}
