use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    ApiError {
        status: u16,
        message: String,
    },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Contract call failed: {0}")]
    ContractError(String),

    #[error("Transaction failed on-chain. Tx hash: {0}")]
    TransactionFailed(String),

    #[error("Invalid salt: {0}")]
    InvalidSalt(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Commit record incomplete: {0}")]
    MissingRecord(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<alloy::transports::TransportError> for AgentError {
    fn from(err: alloy::transports::TransportError) -> Self {
        AgentError::RpcError(err.to_string())
    }
}

impl From<alloy::contract::Error> for AgentError {
    fn from(err: alloy::contract::Error) -> Self {
        AgentError::ContractError(err.to_string())
    }
}

impl From<alloy::providers::PendingTransactionError> for AgentError {
    fn from(err: alloy::providers::PendingTransactionError) -> Self {
        AgentError::RpcError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
