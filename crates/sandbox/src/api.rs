//! The functions and properties scripts reach through their bindings.
//!
//! `Global`/`G` is a [`ControlHandle`] registered as type `Trader`; every
//! exchange binding is registered as type `Exchange`.

use crate::binding::ExchangeBinding;
use crate::control::{ControlHandle, ScheduledTask};
use crate::interrupt::Halt;
use core_types::OrderSide;
use events::LogLevel;
use exchange::{Account, ExchangeError, Order, OrderStatus, Ticker};
use rhai::{Array, Dynamic, Engine, EvalAltResult, FnPtr, ImmutableString, Map, NativeCallContext, Position, INT};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

type RhaiResult<T> = Result<T, Box<EvalAltResult>>;

/// The error that carries the halt signal out of the interpreter. Script
/// `try`/`catch` blocks cannot intercept it.
pub(crate) fn halt_error() -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorTerminated(Dynamic::from(Halt), Position::NONE))
}

fn runtime_error(message: impl Into<String>) -> Box<EvalAltResult> {
    let message: String = message.into();
    Box::new(EvalAltResult::ErrorRuntime(Dynamic::from(message), Position::NONE))
}

/// Reads a script number (integer, float or numeric string) as a decimal.
pub(crate) fn to_decimal(value: &Dynamic) -> RhaiResult<Decimal> {
    if let Ok(i) = value.as_int() {
        return Ok(Decimal::from(i));
    }
    if let Ok(f) = value.as_float() {
        return Decimal::from_f64(f).ok_or_else(|| runtime_error(format!("{} is not a valid amount", f)));
    }
    if value.is_string() {
        let text = value.clone().into_immutable_string().map_err(runtime_error)?;
        return Decimal::from_str(text.trim())
            .map_err(|e| runtime_error(format!("'{}' is not a number: {}", text, e)));
    }
    Err(runtime_error(format!("Expected a number, got {}", value.type_name())))
}

fn to_float(value: Decimal) -> Dynamic {
    Dynamic::from_float(value.to_f64().unwrap_or_default())
}

fn account_map(account: Account) -> Map {
    account
        .balances
        .into_iter()
        .map(|(asset, balance)| {
            let mut entry = Map::new();
            entry.insert("free".into(), to_float(balance.free));
            entry.insert("frozen".into(), to_float(balance.frozen));
            (asset.into(), Dynamic::from_map(entry))
        })
        .collect()
}

fn ticker_map(ticker: Ticker) -> Map {
    let mut map = Map::new();
    map.insert("bid".into(), to_float(ticker.bid));
    map.insert("ask".into(), to_float(ticker.ask));
    map.insert("last".into(), to_float(ticker.last));
    map
}

fn order_map(order: Order) -> Map {
    let side = match order.side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    };
    let status = match order.status {
        OrderStatus::Pending => "ORDER_PENDING",
        OrderStatus::Filled => "ORDER_FILLED",
        OrderStatus::Cancelled => "ORDER_CANCELLED",
    };

    let mut map = Map::new();
    map.insert("id".into(), order.id.into());
    map.insert("symbol".into(), order.symbol.into());
    map.insert("side".into(), side.into());
    map.insert("price".into(), to_float(order.price));
    map.insert("amount".into(), to_float(order.amount));
    map.insert("filled".into(), to_float(order.filled));
    map.insert("status".into(), status.into());
    map
}

/// Runs one exchange request on behalf of a script.
///
/// No request is issued once a halt has been requested for the sandbox. A
/// failed request is reported on the exchange's logger and yields `None`.
pub(crate) fn exchange_call<T, F>(binding: &ExchangeBinding, action: &str, request: F) -> RhaiResult<Option<T>>
where
    F: Future<Output = Result<T, ExchangeError>>,
{
    if binding.sandbox().is_halting() {
        return Err(halt_error());
    }
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| runtime_error(format!("{} needs an async runtime: {}", action, e)))?;

    match runtime.block_on(request) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!(trader_id = binding.trader_id(), exchange = %binding.kind(), error = %e, "{} failed", action);
            binding.logger().error(format!("{} failed: {}", action, e));
            Ok(None)
        }
    }
}

fn place_order(
    binding: &ExchangeBinding,
    side: OrderSide,
    symbol: &str,
    price: &Dynamic,
    amount: &Dynamic,
) -> RhaiResult<Dynamic> {
    let price = to_decimal(price)?;
    let amount = to_decimal(amount)?;
    let client = binding.client();

    let (placed, level) = match side {
        OrderSide::Buy => (exchange_call(binding, "Buy", client.buy(symbol, price, amount))?, LogLevel::Buy),
        OrderSide::Sell => (exchange_call(binding, "Sell", client.sell(symbol, price, amount))?, LogLevel::Sell),
    };

    Ok(match placed {
        Some(id) => {
            binding.logger().log(level, price, amount, format!("{} {}", symbol, id));
            Dynamic::from(id)
        }
        None => Dynamic::FALSE,
    })
}

fn register_control(engine: &mut Engine) {
    engine
        .register_type_with_name::<ControlHandle>("Trader")
        .register_get("id", |g: &mut ControlHandle| g.id() as INT)
        .register_get("user_id", |g: &mut ControlHandle| g.user_id() as INT)
        .register_get("name", |g: &mut ControlHandle| g.name().to_string())
        .register_get("status", |g: &mut ControlHandle| g.status().as_i16() as INT)
        .register_get("last_run_at", |g: &mut ControlHandle| {
            g.last_run_at().map_or(0, |t| t.timestamp()) as INT
        })
        .register_fn("Log", |g: &mut ControlHandle, message: Dynamic| {
            g.logger().info(message.to_string());
        })
        .register_fn("LogProfit", |g: &mut ControlHandle, profit: Dynamic| -> RhaiResult<()> {
            let profit = to_decimal(&profit)?;
            g.logger().log(LogLevel::Profit, profit, Decimal::ZERO, format!("profit {}", profit));
            Ok(())
        })
        .register_fn("Sleep", |g: &mut ControlHandle, millis: INT| -> RhaiResult<()> {
            let millis = u64::try_from(millis).unwrap_or(0);
            g.sleep(Duration::from_millis(millis)).map_err(|Halt| halt_error())
        })
        .register_fn("AddTask", |g: &mut ControlHandle, func: FnPtr, args: Array| {
            g.push_task(ScheduledTask { func, args });
        })
        .register_fn("AddTask", |g: &mut ControlHandle, func: FnPtr| {
            g.push_task(ScheduledTask { func, args: Array::new() });
        })
        .register_fn(
            "ExecTasks",
            |context: NativeCallContext, g: &mut ControlHandle| -> RhaiResult<Array> {
                let mut results = Array::new();
                for task in g.take_tasks() {
                    results.push(task.func.call_within_context::<Dynamic>(&context, task.args)?);
                }
                Ok(results)
            },
        );
}

fn register_exchange(engine: &mut Engine) {
    engine
        .register_type_with_name::<ExchangeBinding>("Exchange")
        .register_get("index", |e: &mut ExchangeBinding| e.index() as INT)
        .register_get("kind", |e: &mut ExchangeBinding| e.kind().tag().to_string())
        .register_fn("GetType", |e: &mut ExchangeBinding| e.kind().tag().to_string())
        .register_fn("GetAccount", |e: &mut ExchangeBinding| -> RhaiResult<Dynamic> {
            let binding = &*e;
            let account = exchange_call(binding, "GetAccount", binding.client().get_account())?;
            Ok(account.map_or(Dynamic::FALSE, |a| Dynamic::from_map(account_map(a))))
        })
        .register_fn("GetTicker", |e: &mut ExchangeBinding, symbol: ImmutableString| -> RhaiResult<Dynamic> {
            let binding = &*e;
            let ticker = exchange_call(binding, "GetTicker", binding.client().get_ticker(&symbol))?;
            Ok(ticker.map_or(Dynamic::FALSE, |t| Dynamic::from_map(ticker_map(t))))
        })
        .register_fn(
            "Buy",
            |e: &mut ExchangeBinding, symbol: ImmutableString, price: Dynamic, amount: Dynamic| {
                place_order(e, OrderSide::Buy, &symbol, &price, &amount)
            },
        )
        .register_fn(
            "Sell",
            |e: &mut ExchangeBinding, symbol: ImmutableString, price: Dynamic, amount: Dynamic| {
                place_order(e, OrderSide::Sell, &symbol, &price, &amount)
            },
        )
        .register_fn(
            "GetOrder",
            |e: &mut ExchangeBinding, symbol: ImmutableString, id: ImmutableString| -> RhaiResult<Dynamic> {
                let binding = &*e;
                let order = exchange_call(binding, "GetOrder", binding.client().get_order(&symbol, &id))?;
                Ok(order.map_or(Dynamic::FALSE, |o| Dynamic::from_map(order_map(o))))
            },
        )
        .register_fn(
            "CancelOrder",
            |e: &mut ExchangeBinding, symbol: ImmutableString, id: ImmutableString| -> RhaiResult<bool> {
                let binding = &*e;
                let cancelled = exchange_call(binding, "CancelOrder", binding.client().cancel_order(&symbol, &id))?;
                if cancelled.is_some() {
                    binding
                        .logger()
                        .log(LogLevel::Cancel, Decimal::ZERO, Decimal::ZERO, format!("{} {}", symbol, id));
                }
                Ok(cancelled.is_some())
            },
        );
}

/// Registers the whole script-facing API on `engine`.
pub(crate) fn register(engine: &mut Engine) {
    register_control(engine);
    register_exchange(engine);
}
