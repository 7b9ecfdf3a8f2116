use alloy::network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy::primitives::utils::parse_units;
use alloy::primitives::{keccak256, Address, TxHash, B256, U256};
use alloy::providers::{PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::{SolCall, SolEvent};
use chrono::Utc;
use tracing::{debug, info, warn};

use super::contracts::{IJobRegistry, IStakeManager, IValidationModule};
use crate::config::{signer_from_key, ChainConfig};
use crate::error::{AgentError, Result};

/// Token amounts are expressed with 18 decimals.
pub const TOKEN_DECIMALS: u8 = 18;
/// Seconds between job creation and its deadline.
pub const DEFAULT_JOB_TTL_SECS: u64 = 3600;

pub const AGENT_ROLE: u8 = 0;
pub const VALIDATOR_ROLE: u8 = 1;

/// A decoded `JobCreated` log.
#[derive(Debug, Clone)]
pub struct JobCreatedEvent {
    pub job_id: U256,
    pub employer: Address,
    pub agent: Address,
    pub reward: U256,
    pub stake: U256,
    pub fee: U256,
    pub spec_hash: B256,
    pub uri: String,
    pub block_number: Option<u64>,
}

/// Signs contract calls with the configured key and broadcasts them.
pub struct ChainClient {
    config: ChainConfig,
    signer: PrivateKeySigner,
}

impl ChainClient {
    pub fn new(config: ChainConfig) -> Result<Self> {
        let signer = signer_from_key(&config.private_key)?;
        Ok(Self { config, signer })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Sender address derived from the private key.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    fn provider(&self) -> Result<impl Provider> {
        let url = self
            .config
            .rpc_url
            .parse()
            .map_err(|e| AgentError::ConfigError(format!("Invalid RPC_URL: {}", e)))?;
        let wallet = EthereumWallet::from(self.signer.clone());
        Ok(ProviderBuilder::new().wallet(wallet).connect_http(url))
    }

    /// The sender's current transaction count.
    pub async fn transaction_count(&self) -> Result<u64> {
        let provider = self.provider()?;
        Ok(provider.get_transaction_count(self.address()).await?)
    }

    /// Builds the transaction for `call`, using the transaction count at call
    /// time as its nonce.
    pub async fn prepare<C: SolCall>(&self, to: Address, call: &C) -> Result<TransactionRequest> {
        let nonce = self.transaction_count().await?;
        Ok(build_transaction(self.address(), to, call, nonce))
    }

    /// Signs and sends `call` without waiting for it to be mined. Chain id,
    /// gas price and gas limit are fixed here so the provider's fillers leave
    /// the prepared nonce alone.
    pub async fn broadcast<C: SolCall>(
        &self,
        to: Address,
        call: &C,
    ) -> Result<PendingTransactionBuilder<Ethereum>> {
        let tx = self.prepare(to, call).await?;
        let provider = self.provider()?;

        let chain_id = provider.get_chain_id().await?;
        let gas_price = provider.get_gas_price().await?;
        let tx = tx.with_chain_id(chain_id).with_gas_price(gas_price);
        let gas_limit = provider.estimate_gas(tx.clone()).await?;
        let tx = tx.with_gas_limit(gas_limit);

        debug!(to = %to, nonce = ?tx.nonce, gas = gas_limit, "broadcasting {}", C::SIGNATURE);
        Ok(provider.send_transaction(tx).await?)
    }

    async fn send_call<C: SolCall>(&self, to: Address, call: C) -> Result<TxHash> {
        let pending_tx = self.broadcast(to, &call).await?;
        let tx_hash = *pending_tx.tx_hash();

        let receipt = pending_tx.get_receipt().await?;
        if !receipt.status() {
            return Err(AgentError::TransactionFailed(format!("{:?}", tx_hash)));
        }

        info!(tx = ?tx_hash, "{} confirmed", C::SIGNATURE);
        Ok(tx_hash)
    }

    /// Creates a job paying `amount` whole tokens, due in an hour.
    pub async fn post_job(&self, amount: &str, spec: &str, uri: &str) -> Result<TxHash> {
        let call = IJobRegistry::createJobCall {
            reward: token_amount(amount)?,
            deadline: Utc::now().timestamp() as u64 + DEFAULT_JOB_TTL_SECS,
            specHash: keccak256(spec.as_bytes()),
            uri: uri.to_string(),
        };
        self.send_call(self.config.job_registry()?, call).await
    }

    /// Applies for a job with an ENS `subdomain` label such as `alice`
    /// for `alice.agent.agi.eth`.
    pub async fn apply_for_job(&self, job_id: U256, subdomain: &str, proof: Vec<B256>) -> Result<TxHash> {
        let call = IJobRegistry::applyForJobCall {
            jobId: job_id,
            subdomain: subdomain.to_string(),
            proof,
        };
        self.send_call(self.config.job_registry()?, call).await
    }

    pub async fn submit(
        &self,
        job_id: U256,
        result_uri: &str,
        subdomain: &str,
        proof: Vec<B256>,
    ) -> Result<TxHash> {
        let call = IJobRegistry::submitCall {
            jobId: job_id,
            resultHash: keccak256(result_uri.as_bytes()),
            resultURI: result_uri.to_string(),
            subdomain: subdomain.to_string(),
            proof,
        };
        self.send_call(self.config.job_registry()?, call).await
    }

    pub async fn finalize(&self, job_id: U256) -> Result<TxHash> {
        self.send_call(self.config.job_registry()?, IJobRegistry::finalizeCall { jobId: job_id })
            .await
    }

    pub async fn commit_validation(
        &self,
        job_id: U256,
        commit_hash: B256,
        subdomain: &str,
        proof: Vec<B256>,
    ) -> Result<TxHash> {
        let call = IValidationModule::commitValidationCall {
            jobId: job_id,
            commitHash: commit_hash,
            subdomain: subdomain.to_string(),
            proof,
        };
        self.send_call(self.config.validation_module()?, call).await
    }

    pub async fn reveal_validation(
        &self,
        job_id: U256,
        approve: bool,
        salt: B256,
        subdomain: &str,
        proof: Vec<B256>,
    ) -> Result<TxHash> {
        let call = IValidationModule::revealValidationCall {
            jobId: job_id,
            approve,
            salt,
            subdomain: subdomain.to_string(),
            proof,
        };
        self.send_call(self.config.validation_module()?, call).await
    }

    /// Commit followed directly by the matching reveal.
    pub async fn commit_and_reveal(
        &self,
        job_id: U256,
        commit_hash: B256,
        subdomain: &str,
        proof: Vec<B256>,
        approve: bool,
        salt: B256,
    ) -> Result<(TxHash, TxHash)> {
        let commit = self
            .commit_validation(job_id, commit_hash, subdomain, proof.clone())
            .await?;
        let reveal = self
            .reveal_validation(job_id, approve, salt, subdomain, proof)
            .await?;
        Ok((commit, reveal))
    }

    pub async fn deposit_stake(&self, role: u8, amount: U256) -> Result<TxHash> {
        let call = IStakeManager::depositStakeCall { role, amount };
        self.send_call(self.config.stake_manager()?, call).await
    }

    pub async fn job_nonce(&self, job_id: U256) -> Result<U256> {
        let provider = self.provider()?;
        let module = IValidationModule::new(self.config.validation_module()?, &provider);
        Ok(module.jobNonce(job_id).call().await?)
    }

    pub async fn stake_of(&self, role: u8) -> Result<U256> {
        let provider = self.provider()?;
        let stake_manager = IStakeManager::new(self.config.stake_manager()?, &provider);
        Ok(stake_manager.stakeOf(self.address(), role).call().await?)
    }

    pub async fn block_number(&self) -> Result<u64> {
        let provider = self.provider()?;
        Ok(provider.get_block_number().await?)
    }

    /// `JobCreated` events emitted in `from_block..=to_block`.
    pub async fn job_created_events(&self, from_block: u64, to_block: u64) -> Result<Vec<JobCreatedEvent>> {
        let provider = self.provider()?;
        let filter = Filter::new()
            .address(self.config.job_registry()?)
            .event_signature(IJobRegistry::JobCreated::SIGNATURE_HASH)
            .from_block(BlockNumberOrTag::Number(from_block))
            .to_block(BlockNumberOrTag::Number(to_block));

        let logs = provider.get_logs(&filter).await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            let block_number = log.block_number;
            match log.log_decode::<IJobRegistry::JobCreated>() {
                Ok(decoded) => {
                    let IJobRegistry::JobCreated {
                        jobId,
                        employer,
                        agent,
                        reward,
                        stake,
                        fee,
                        specHash,
                        uri,
                    } = decoded.inner.data;
                    events.push(JobCreatedEvent {
                        job_id: jobId,
                        employer,
                        agent,
                        reward,
                        stake,
                        fee,
                        spec_hash: specHash,
                        uri,
                        block_number,
                    });
                }
                Err(e) => warn!("Failed to decode JobCreated event: {}", e),
            }
        }
        Ok(events)
    }
}

/// Transaction carrying `call` from `from` to `to` with an explicit nonce.
pub fn build_transaction<C: SolCall>(from: Address, to: Address, call: &C, nonce: u64) -> TransactionRequest {
    TransactionRequest::default()
        .with_from(from)
        .with_to(to)
        .with_input(call.abi_encode())
        .with_nonce(nonce)
}

/// Whole-token amount (e.g. `"1.5"`) scaled to 18 decimals. Negative amounts
/// are rejected.
pub fn token_amount(amount: &str) -> Result<U256> {
    let units = parse_units(amount.trim(), TOKEN_DECIMALS)
        .map_err(|e| AgentError::ConfigError(format!("Invalid token amount {}: {}", amount, e)))?;
    if units.is_negative() {
        return Err(AgentError::ConfigError(format!("Negative token amount {}", amount)));
    }
    Ok(units.get_absolute())
}

/// Comma separated list of 32-byte hex values; empty input is an empty proof.
pub fn parse_proof(raw: &str) -> Result<Vec<B256>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty() && *entry != "0x")
        .map(|entry| {
            entry
                .parse::<B256>()
                .map_err(|e| AgentError::ConfigError(format!("Invalid proof entry {}: {}", entry, e)))
        })
        .collect()
}
