//! Agent client for the AGI Jobs marketplace.
//!
//! The crate can be used in two ways:
//! 1. Through the gateway - register, receive jobs over a WebSocket, acknowledge
//!    them and submit results over HTTP ([`GatewayClient`])
//! 2. Directly on-chain - sign and broadcast job registry and validation module
//!    calls with a private key ([`ChainClient`], [`Validator`], [`JobWatcher`])

pub mod chain;
pub mod cli;
mod config;
mod error;
mod gateway;
pub mod store;
mod types;
mod validation;
pub mod watch;

pub use chain::ChainClient;
pub use config::{signer_from_key, ChainConfig, GatewayConfig};
pub use error::{AgentError, Result};
pub use gateway::{to_websocket_url, GatewayClient, GatewaySocket, JobHandler, StaticResult};
pub use types::*;
pub use validation::{resolve_reveal, Validator};
pub use watch::{ApplyPolicy, JobWatcher};
