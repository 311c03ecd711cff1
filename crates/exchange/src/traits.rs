use crate::error::ExchangeError;
use crate::types::{Account, ExchangeKind, Order, Ticker};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// The generic, abstract interface for an exchange account.
///
/// Strategy scripts reach an account only through this trait, so the
/// underlying implementation (live or paper) can be swapped out freely.
#[async_trait]
pub trait Exchange: Send + Sync {
    fn kind(&self) -> ExchangeKind;

    /// Fetches the balances of every asset held on the account.
    async fn get_account(&self) -> Result<Account, ExchangeError>;

    /// Fetches the best bid/ask and the last traded price of a symbol.
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;

    /// Places a limit buy order and returns its id.
    async fn buy(&self, symbol: &str, price: Decimal, amount: Decimal) -> Result<String, ExchangeError>;

    /// Places a limit sell order and returns its id.
    async fn sell(&self, symbol: &str, price: Decimal, amount: Decimal) -> Result<String, ExchangeError>;

    async fn get_order(&self, symbol: &str, id: &str) -> Result<Order, ExchangeError>;

    async fn cancel_order(&self, symbol: &str, id: &str) -> Result<(), ExchangeError>;
}
