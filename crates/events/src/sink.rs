use crate::messages::{LogLevel, TraderEvent, GLOBAL_EXCHANGE_TYPE};
use chrono::Utc;
use core_types::TraderId;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Receiver of trader events.
///
/// Logging is fire-and-forget: implementations must not block the caller for
/// long and have no way to report failure back to it. Calls may come from a
/// script thread outside of any async context.
pub trait EventSink: Send + Sync {
    fn log(&self, event: TraderEvent);
}

/// The per-trader logger handed to the lifecycle controller and every
/// exchange binding. It stamps events with the trader id and exchange type.
#[derive(Clone)]
pub struct TraderLogger {
    trader_id: TraderId,
    exchange_type: String,
    sink: Arc<dyn EventSink>,
}

impl TraderLogger {
    pub fn new(trader_id: TraderId, exchange_type: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            trader_id,
            exchange_type: exchange_type.into(),
            sink,
        }
    }

    /// A logger for trader-level events (exchange type `"global"`).
    pub fn global(trader_id: TraderId, sink: Arc<dyn EventSink>) -> Self {
        Self::new(trader_id, GLOBAL_EXCHANGE_TYPE, sink)
    }

    /// A logger for the same trader and sink but another exchange type.
    pub fn for_exchange(&self, exchange_type: impl Into<String>) -> Self {
        Self::new(self.trader_id, exchange_type, Arc::clone(&self.sink))
    }

    pub fn trader_id(&self) -> TraderId {
        self.trader_id
    }

    pub fn exchange_type(&self) -> &str {
        &self.exchange_type
    }

    pub fn log(&self, level: LogLevel, price: Decimal, amount: Decimal, message: impl Into<String>) {
        self.sink.log(TraderEvent {
            timestamp: Utc::now(),
            trader_id: self.trader_id,
            exchange_type: self.exchange_type.clone(),
            level,
            price,
            amount,
            message: message.into(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, Decimal::ZERO, Decimal::ZERO, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, Decimal::ZERO, Decimal::ZERO, message);
    }
}

/// Mirrors trader events into the diagnostic `tracing` output.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn log(&self, event: TraderEvent) {
        match event.level {
            LogLevel::Error => tracing::error!(
                trader_id = event.trader_id,
                exchange = %event.exchange_type,
                "{}",
                event.message
            ),
            level => tracing::info!(
                trader_id = event.trader_id,
                exchange = %event.exchange_type,
                level = %level,
                price = %event.price,
                amount = %event.amount,
                "{}",
                event.message
            ),
        }
    }
}

/// Publishes trader events on a broadcast channel. Events sent while nobody
/// is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<TraderEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TraderEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn log(&self, event: TraderEvent) {
        let _ = self.tx.send(event);
    }
}

/// Keeps every event in memory. Useful for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TraderEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraderEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// All events logged for one trader, oldest first.
    pub fn events_for(&self, trader_id: TraderId) -> Vec<TraderEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.trader_id == trader_id)
            .collect()
    }
}

impl EventSink for MemorySink {
    fn log(&self, event: TraderEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Forwards every event to each of the wrapped sinks in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn log(&self, event: TraderEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.log(event.clone());
            }
            last.log(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn logger_tags_events_with_trader_and_exchange() {
        let sink = Arc::new(MemorySink::new());
        let logger = TraderLogger::global(42, sink.clone());
        logger.info("The Trader is running");
        logger
            .for_exchange("paper")
            .log(LogLevel::Buy, dec!(100.5), dec!(2), "buy");

        let events = sink.events_for(42);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].exchange_type, "global");
        assert_eq!(events[0].level, LogLevel::Info);
        assert_eq!(events[0].price, Decimal::ZERO);
        assert_eq!(events[1].exchange_type, "paper");
        assert_eq!(events[1].amount, dec!(2));
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(MemorySink::new());
        let b = Arc::new(MemorySink::new());
        let fanout = FanoutSink::new().with(a.clone()).with(b.clone());
        TraderLogger::global(1, Arc::new(fanout)).error("boom");

        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events()[0].level, LogLevel::Error);
    }

    #[tokio::test]
    async fn broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();
        TraderLogger::global(9, Arc::new(sink.clone())).info("hello");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.trader_id, 9);
        assert_eq!(event.message, "hello");
        assert!(event.to_json().unwrap().contains("\"INFO\""));
    }
}
