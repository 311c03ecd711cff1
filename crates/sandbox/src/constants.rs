/// The global constant set of every sandbox. Each name is bound to a string
/// with the same value, so scripts can write `E.Buy(...)` and compare
/// `order.side == BUY`.
pub const CONSTANTS: &[&str] = &[
    // order sides and position directions
    "BUY",
    "SELL",
    "LONG",
    "SHORT",
    "CLOSE_LONG",
    "CLOSE_SHORT",
    // order states
    "ORDER_PENDING",
    "ORDER_FILLED",
    "ORDER_CANCELLED",
    // record periods
    "M",
    "M5",
    "M15",
    "M30",
    "H",
    "D",
    "W",
    // exchange type tags
    "binance",
    "paper",
];
