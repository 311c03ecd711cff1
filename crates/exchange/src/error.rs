use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Failed to send the HTTP request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Exchange returned error {code}: {msg}")]
    Api { code: i64, msg: String },

    #[error("Failed to deserialize the API response: {0}")]
    Deserialization(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Insufficient {asset} balance. Required: {required}, Available: {available}")]
    InsufficientBalance {
        asset: String,
        required: String,
        available: String,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Order {0} can no longer be cancelled")]
    NotCancellable(String),
}
