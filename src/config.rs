use crate::error::{AgentError, Result};
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:3000";
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";
pub const DEFAULT_AGENT_ID: &str = "agent-1";
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_STORAGE_DIR: &str = "storage/validation";

/// Settings for talking to the job gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub gateway_url: String,
    /// Socket endpoint; derived from `gateway_url` when unset.
    pub ws_url: Option<String>,
    pub agent_id: String,
    pub wallet: String,
    pub request_timeout: Duration,
    /// How many times a timed-out HTTP request is re-sent.
    pub timeout_retries: u32,
}

impl GatewayConfig {
    pub fn new(
        gateway_url: impl Into<String>,
        agent_id: impl Into<String>,
        wallet: impl Into<String>,
    ) -> Self {
        Self {
            gateway_url: gateway_url.into().trim_end_matches('/').to_string(),
            ws_url: None,
            agent_id: agent_id.into(),
            wallet: wallet.into(),
            request_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            timeout_retries: 1,
        }
    }

    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = Some(ws_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_timeout_retries(mut self, retries: u32) -> Self {
        self.timeout_retries = retries;
        self
    }

    /// Load from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gateway_url = get("GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());
        let agent_id = get("AGENT_ID").unwrap_or_else(|| DEFAULT_AGENT_ID.to_string());

        let wallet = match get("AGENT_WALLET") {
            Some(wallet) => wallet,
            None => {
                let key = get("PRIVATE_KEY").ok_or_else(|| {
                    AgentError::ConfigError(
                        "Set AGENT_WALLET or PRIVATE_KEY to identify the agent wallet".to_string(),
                    )
                })?;
                signer_from_key(&key)?.address().to_checksum(None)
            }
        };

        let timeout_ms = match get("FETCH_TIMEOUT_MS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                AgentError::ConfigError(format!("FETCH_TIMEOUT_MS: {}", e))
            })?,
            None => DEFAULT_FETCH_TIMEOUT_MS,
        };

        let mut config = Self::new(gateway_url, agent_id, wallet)
            .with_timeout(Duration::from_millis(timeout_ms));
        if let Some(ws_url) = get("GATEWAY_WS_URL") {
            config = config.with_ws_url(ws_url);
        }
        Ok(config)
    }
}

/// Settings for signing and broadcasting contract calls.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub private_key: String,
    pub job_registry: Option<Address>,
    pub validation_module: Option<Address>,
    pub stake_manager: Option<Address>,
    pub storage_dir: PathBuf,
}

impl ChainConfig {
    pub fn new(rpc_url: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            private_key: private_key.into(),
            job_registry: None,
            validation_module: None,
            stake_manager: None,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
        }
    }

    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let private_key = get("PRIVATE_KEY")
            .ok_or_else(|| AgentError::ConfigError("Set PRIVATE_KEY environment variable".to_string()))?;
        let rpc_url = get("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string());

        let mut config = Self::new(rpc_url, private_key);
        config.job_registry = optional_address(&get, "JOB_REGISTRY")?;
        config.validation_module = optional_address(&get, "VALIDATION_MODULE")?;
        config.stake_manager = optional_address(&get, "STAKE_MANAGER")?;
        if let Some(dir) = get("VALIDATION_STORAGE") {
            config.storage_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    pub fn job_registry(&self) -> Result<Address> {
        self.job_registry
            .ok_or_else(|| AgentError::ConfigError("Set JOB_REGISTRY environment variable".to_string()))
    }

    pub fn validation_module(&self) -> Result<Address> {
        self.validation_module.ok_or_else(|| {
            AgentError::ConfigError("Set VALIDATION_MODULE environment variable".to_string())
        })
    }

    pub fn stake_manager(&self) -> Result<Address> {
        self.stake_manager
            .ok_or_else(|| AgentError::ConfigError("Set STAKE_MANAGER environment variable".to_string()))
    }
}

/// Parse a hex private key, with or without `0x`.
pub fn signer_from_key(private_key: &str) -> Result<PrivateKeySigner> {
    PrivateKeySigner::from_str(private_key.trim())
        .map_err(|e| AgentError::ConfigError(format!("Invalid PRIVATE_KEY: {}", e)))
}

fn optional_address<F>(get: &F, var: &str) -> Result<Option<Address>>
where
    F: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(raw) if !raw.trim().is_empty() => Address::from_str(raw.trim())
            .map(Some)
            .map_err(|e| AgentError::ConfigError(format!("{} must be a valid address: {}", var, e))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    // Anvil's first dev account.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn gateway_defaults() {
        let config = GatewayConfig::from_vars(vars(&[("AGENT_WALLET", "0xabc")])).unwrap();
        assert_eq!(config.gateway_url, DEFAULT_GATEWAY_URL);
        assert_eq!(config.agent_id, DEFAULT_AGENT_ID);
        assert_eq!(config.wallet, "0xabc");
        assert_eq!(config.request_timeout, Duration::from_millis(5000));
        assert_eq!(config.timeout_retries, 1);
        assert!(config.ws_url.is_none());
    }

    #[test]
    fn gateway_wallet_falls_back_to_signer_address() {
        let config = GatewayConfig::from_vars(vars(&[("PRIVATE_KEY", DEV_KEY)])).unwrap();
        assert_eq!(config.wallet, DEV_ADDRESS);
    }

    #[test]
    fn gateway_requires_some_wallet() {
        let err = GatewayConfig::from_vars(vars(&[])).unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(_)));
    }

    #[test]
    fn gateway_url_trailing_slash_is_trimmed() {
        let config = GatewayConfig::from_vars(vars(&[
            ("AGENT_WALLET", "0xabc"),
            ("GATEWAY_URL", "https://gw.example/"),
            ("FETCH_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.gateway_url, "https://gw.example");
        assert_eq!(config.request_timeout, Duration::from_millis(250));
    }

    #[test]
    fn chain_rejects_bad_addresses() {
        let err = ChainConfig::from_vars(vars(&[
            ("PRIVATE_KEY", DEV_KEY),
            ("JOB_REGISTRY", "0xnot-an-address"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("JOB_REGISTRY"));
    }

    #[test]
    fn chain_missing_contract_is_reported_on_use() {
        let config = ChainConfig::from_vars(vars(&[("PRIVATE_KEY", DEV_KEY)])).unwrap();
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
        assert!(config.job_registry().is_err());
        assert!(config.validation_module().is_err());
    }
}
