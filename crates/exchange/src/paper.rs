use crate::error::ExchangeError;
use crate::traits::Exchange;
use crate::types::{Account, Balance, ExchangeKind, Order, OrderStatus, Ticker};
use async_trait::async_trait;
use configuration::PaperConfig;
use core_types::OrderSide;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct PaperState {
    balances: BTreeMap<String, Balance>,
    orders: HashMap<String, Order>,
    prices: HashMap<String, Decimal>,
    next_order_id: u64,
}

impl PaperState {
    fn balance(&mut self, asset: &str) -> &mut Balance {
        self.balances.entry(asset.to_string()).or_default()
    }

    /// Moves `amount` of `asset` from free to frozen.
    fn freeze(&mut self, asset: &str, amount: Decimal) -> Result<(), ExchangeError> {
        let balance = self.balance(asset);
        if balance.free < amount {
            return Err(ExchangeError::InsufficientBalance {
                asset: asset.to_string(),
                required: amount.to_string(),
                available: balance.free.to_string(),
            });
        }
        balance.free -= amount;
        balance.frozen += amount;
        Ok(())
    }

    fn unfreeze(&mut self, asset: &str, amount: Decimal) -> Result<(), ExchangeError> {
        let balance = self.balance(asset);
        balance.free = checked(balance.free.checked_add(amount), asset)?;
        balance.frozen -= amount;
        Ok(())
    }

    /// Adds `amount` to the free balance of `asset`.
    fn credit(&mut self, asset: &str, amount: Decimal) -> Result<(), ExchangeError> {
        let balance = self.balance(asset);
        balance.free = checked(balance.free.checked_add(amount), asset)?;
        Ok(())
    }
}

fn checked(value: Option<Decimal>, what: &str) -> Result<Decimal, ExchangeError> {
    value.ok_or_else(|| ExchangeError::InvalidData(format!("Arithmetic overflow in {}", what)))
}

/// The "virtual exchange": an in-memory account that fills limit orders
/// against prices fed in with [`PaperExchange::set_price`].
///
/// A buy fills immediately when its price is at or above the last known price
/// (or when no price is known yet); a sell fills when its price is at or below
/// it. Other orders rest with their funds frozen until the price crosses or
/// the order is cancelled. Fees are charged in the quote asset.
pub struct PaperExchange {
    quote_asset: String,
    fee_rate: Decimal,
    state: Mutex<PaperState>,
}

impl PaperExchange {
    pub fn new(config: &PaperConfig) -> Self {
        let mut state = PaperState::default();
        state.balance(&config.quote_asset).free = config.initial_quote_balance;
        Self {
            quote_asset: config.quote_asset.clone(),
            fee_rate: config.fee_rate,
            state: Mutex::new(state),
        }
    }

    /// Splits `BTCUSDT` into `BTC` for a `USDT` quoted paper account.
    fn base_asset<'a>(&self, symbol: &'a str) -> Result<&'a str, ExchangeError> {
        symbol
            .strip_suffix(self.quote_asset.as_str())
            .filter(|base| !base.is_empty())
            .ok_or_else(|| {
                ExchangeError::InvalidData(format!(
                    "Symbol {} is not quoted in {}",
                    symbol, self.quote_asset
                ))
            })
    }

    /// Records a market price and fills every resting order it crosses.
    pub async fn set_price(&self, symbol: &str, price: Decimal) -> Result<(), ExchangeError> {
        let base = self.base_asset(symbol)?.to_string();
        let mut state = self.state.lock().await;
        state.prices.insert(symbol.to_string(), price);

        let crossed: Vec<String> = state
            .orders
            .values()
            .filter(|o| o.symbol == symbol && o.status == OrderStatus::Pending)
            .filter(|o| match o.side {
                OrderSide::Buy => o.price >= price,
                OrderSide::Sell => o.price <= price,
            })
            .map(|o| o.id.clone())
            .collect();

        for id in crossed {
            self.fill(&mut state, &id, &base)?;
        }
        Ok(())
    }

    /// The notional value of an order, its fee, and what a buy has to freeze.
    fn totals(&self, price: Decimal, amount: Decimal) -> Result<(Decimal, Decimal, Decimal), ExchangeError> {
        let cost = checked(price.checked_mul(amount), "order cost")?;
        let fee = checked(cost.checked_mul(self.fee_rate), "order fee")?;
        let total = checked(cost.checked_add(fee), "order total")?;
        Ok((cost, fee, total))
    }

    /// Settles a pending order whose funds are already frozen.
    fn fill(&self, state: &mut PaperState, id: &str, base: &str) -> Result<(), ExchangeError> {
        let Some(order) = state.orders.get(id) else {
            return Ok(());
        };
        let (side, price, amount) = (order.side, order.price, order.amount);
        let (cost, fee, total) = self.totals(price, amount)?;

        match side {
            OrderSide::Buy => {
                state.credit(base, amount)?;
                state.balance(&self.quote_asset).frozen -= total;
            }
            OrderSide::Sell => {
                state.credit(&self.quote_asset, checked(cost.checked_sub(fee), "order proceeds")?)?;
                state.balance(base).frozen -= amount;
            }
        }
        if let Some(order) = state.orders.get_mut(id) {
            order.status = OrderStatus::Filled;
            order.filled = order.amount;
        }
        tracing::debug!(order_id = id, ?side, %price, %amount, %fee, "Paper order filled");
        Ok(())
    }

    async fn place(
        &self,
        side: OrderSide,
        symbol: &str,
        price: Decimal,
        amount: Decimal,
    ) -> Result<String, ExchangeError> {
        if price <= Decimal::ZERO || amount <= Decimal::ZERO {
            return Err(ExchangeError::InvalidData(format!(
                "Price and amount must be positive (price {}, amount {})",
                price, amount
            )));
        }
        let base = self.base_asset(symbol)?.to_string();
        let (_, _, total) = self.totals(price, amount)?;
        let mut state = self.state.lock().await;

        match side {
            OrderSide::Buy => state.freeze(&self.quote_asset, total)?,
            OrderSide::Sell => state.freeze(&base, amount)?,
        }

        state.next_order_id += 1;
        let id = state.next_order_id.to_string();
        state.orders.insert(
            id.clone(),
            Order {
                id: id.clone(),
                symbol: symbol.to_string(),
                side,
                price,
                amount,
                filled: Decimal::ZERO,
                status: OrderStatus::Pending,
            },
        );

        let crosses = match state.prices.get(symbol) {
            None => true,
            Some(last) => match side {
                OrderSide::Buy => price >= *last,
                OrderSide::Sell => price <= *last,
            },
        };
        if crosses {
            self.fill(&mut state, &id, &base)?;
        }
        Ok(id)
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Paper
    }

    async fn get_account(&self) -> Result<Account, ExchangeError> {
        let state = self.state.lock().await;
        Ok(Account {
            balances: state.balances.clone(),
        })
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let state = self.state.lock().await;
        let last = state
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::InvalidData(format!("No market price known for {}", symbol)))?;
        Ok(Ticker {
            bid: last,
            ask: last,
            last,
        })
    }

    async fn buy(&self, symbol: &str, price: Decimal, amount: Decimal) -> Result<String, ExchangeError> {
        self.place(OrderSide::Buy, symbol, price, amount).await
    }

    async fn sell(&self, symbol: &str, price: Decimal, amount: Decimal) -> Result<String, ExchangeError> {
        self.place(OrderSide::Sell, symbol, price, amount).await
    }

    async fn get_order(&self, _symbol: &str, id: &str) -> Result<Order, ExchangeError> {
        let state = self.state.lock().await;
        state
            .orders
            .get(id)
            .cloned()
            .ok_or_else(|| ExchangeError::OrderNotFound(id.to_string()))
    }

    async fn cancel_order(&self, symbol: &str, id: &str) -> Result<(), ExchangeError> {
        let base = self.base_asset(symbol)?.to_string();
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get(id)
            .ok_or_else(|| ExchangeError::OrderNotFound(id.to_string()))?;
        if order.status != OrderStatus::Pending {
            return Err(ExchangeError::NotCancellable(id.to_string()));
        }
        let (side, price, amount) = (order.side, order.price, order.amount);

        match side {
            OrderSide::Buy => {
                let (_, _, total) = self.totals(price, amount)?;
                state.unfreeze(&self.quote_asset, total)?;
            }
            OrderSide::Sell => state.unfreeze(&base, amount)?,
        }
        if let Some(order) = state.orders.get_mut(id) {
            order.status = OrderStatus::Cancelled;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn exchange() -> PaperExchange {
        PaperExchange::new(&PaperConfig {
            quote_asset: "USDT".to_string(),
            initial_quote_balance: dec!(1000),
            fee_rate: dec!(0.001),
        })
    }

    #[tokio::test]
    async fn buy_without_known_price_fills_and_charges_fee() {
        let ex = exchange();
        let id = ex.buy("BTCUSDT", dec!(100), dec!(2)).await.unwrap();

        let order = ex.get_order("BTCUSDT", &id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);

        let account = ex.get_account().await.unwrap();
        assert_eq!(account.balances["USDT"].free, dec!(799.8));
        assert_eq!(account.balances["USDT"].frozen, dec!(0.000));
        assert_eq!(account.balances["BTC"].free, dec!(2));
    }

    #[tokio::test]
    async fn resting_order_fills_when_price_crosses() {
        let ex = exchange();
        ex.set_price("BTCUSDT", dec!(100)).await.unwrap();
        let id = ex.buy("BTCUSDT", dec!(90), dec!(1)).await.unwrap();
        assert_eq!(ex.get_order("BTCUSDT", &id).await.unwrap().status, OrderStatus::Pending);
        assert_eq!(ex.get_account().await.unwrap().balances["USDT"].frozen, dec!(90.09));

        ex.set_price("BTCUSDT", dec!(89)).await.unwrap();
        let order = ex.get_order("BTCUSDT", &id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled, dec!(1));
    }

    #[tokio::test]
    async fn cancel_releases_frozen_funds() {
        let ex = exchange();
        ex.set_price("BTCUSDT", dec!(100)).await.unwrap();
        let id = ex.buy("BTCUSDT", dec!(50), dec!(1)).await.unwrap();
        ex.cancel_order("BTCUSDT", &id).await.unwrap();

        let usdt = ex.get_account().await.unwrap().balances["USDT"];
        assert_eq!(usdt.free, dec!(1000));
        assert!(usdt.frozen.is_zero());
        assert!(matches!(
            ex.cancel_order("BTCUSDT", &id).await,
            Err(ExchangeError::NotCancellable(_))
        ));
    }

    #[tokio::test]
    async fn rejects_overspending_and_unknown_symbols() {
        let ex = exchange();
        assert!(matches!(
            ex.buy("BTCUSDT", dec!(1000), dec!(1)).await,
            Err(ExchangeError::InsufficientBalance { .. })
        ));
        assert!(matches!(
            ex.sell("BTCUSDT", dec!(10), dec!(1)).await,
            Err(ExchangeError::InsufficientBalance { .. })
        ));
        assert!(ex.buy("BTCEUR", dec!(1), dec!(1)).await.is_err());
    }

    #[tokio::test]
    async fn oversized_orders_are_rejected_instead_of_overflowing() {
        let ex = exchange();
        let huge = Decimal::MAX;
        assert!(matches!(
            ex.buy("BTCUSDT", huge, dec!(2)).await,
            Err(ExchangeError::InvalidData(_))
        ));
        assert!(matches!(
            ex.sell("BTCUSDT", huge, huge).await,
            Err(ExchangeError::InvalidData(_))
        ));

        let usdt = ex.get_account().await.unwrap().balances["USDT"];
        assert_eq!(usdt.free, dec!(1000));
        assert!(usdt.frozen.is_zero());
    }
}
