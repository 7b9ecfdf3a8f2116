use alloy::primitives::U256;
use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::chain::{is_hex_salt, normalise_salt, parse_proof, token_amount, AGENT_ROLE, VALIDATOR_ROLE};
use crate::store::CommitStore;
use crate::watch::{ens_label, ApplyPolicy, JobWatcher};
use crate::{ChainClient, ChainConfig, GatewayClient, GatewayConfig, StaticResult, Validator};

#[derive(Parser)]
#[command(name = "agijobs-agent")]
#[command(about = "AGI Jobs agent: gateway worker and on-chain job client", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register with the gateway and answer jobs pushed over its socket
    Gateway {
        /// Result payload submitted for every job
        #[arg(long, default_value = "result data")]
        result: String,
    },

    /// Create a job on the registry
    PostJob {
        /// Reward in whole tokens
        #[arg(long, default_value = "1")]
        amount: String,

        /// Text hashed into the job's spec hash
        #[arg(long, default_value = "spec")]
        spec: String,

        #[arg(long, default_value = "ipfs://job")]
        uri: String,
    },

    /// Apply for a job
    Apply {
        job_id: String,

        /// ENS label, e.g. `alice` for alice.agent.agi.eth
        #[arg(long, env = "AGENT_ENS", default_value = "")]
        subdomain: String,

        /// Comma separated bytes32 Merkle proof
        #[arg(long, default_value = "")]
        proof: String,
    },

    /// Commit a validation vote and store its salt locally
    Commit {
        job_id: String,

        #[arg(action = ArgAction::Set)]
        approve: bool,

        /// Optional `[salt] [subdomain]`; a 32-byte hex value is taken as the salt
        #[arg(num_args = 0..=2)]
        extra: Vec<String>,

        /// 32-byte hex salt; random when omitted
        #[arg(long)]
        salt: Option<String>,

        #[arg(long, env = "VALIDATOR_ENS", default_value = "")]
        subdomain: String,

        #[arg(long, default_value = "")]
        proof: String,
    },

    /// Reveal a committed vote, reading missing values from the stored commit
    Reveal {
        job_id: String,

        /// Optional `[salt] [subdomain]`; a 32-byte hex value is taken as the salt
        #[arg(num_args = 0..=2)]
        extra: Vec<String>,

        #[arg(long)]
        approve: Option<bool>,

        #[arg(long)]
        salt: Option<String>,

        #[arg(long, env = "VALIDATOR_ENS", default_value = "")]
        subdomain: String,

        #[arg(long, default_value = "")]
        proof: String,
    },

    /// Submit a job result on-chain
    Submit {
        job_id: String,

        result_uri: String,

        #[arg(long, env = "AGENT_ENS", default_value = "")]
        subdomain: String,

        #[arg(long, default_value = "")]
        proof: String,
    },

    /// Finalize a job
    Finalize { job_id: String },

    /// Deposit stake as an agent, or as a validator with `--validator`
    Stake {
        /// Amount in whole tokens
        amount: String,

        #[arg(long)]
        validator: bool,
    },

    /// Watch for unassigned jobs and apply automatically
    Watch {
        #[arg(long, env = "AGENT_ENS", default_value = "")]
        subdomain: String,

        /// Minimum reward in whole tokens
        #[arg(long, default_value = "0")]
        min_reward: String,

        /// Maximum required stake in whole tokens (0 = no cap)
        #[arg(long, default_value = "0")]
        max_stake: String,

        #[arg(long, default_value_t = 12)]
        poll_secs: u64,
    },
}

pub async fn execute(command: Commands) -> Result<()> {
    match command {
        Commands::Gateway { result } => {
            let client = GatewayClient::new(GatewayConfig::from_env()?)?;
            info!(
                gateway = %client.config().gateway_url,
                socket = %client.websocket_url(),
                agent = %client.config().agent_id,
                "starting gateway agent"
            );
            client
                .run(&StaticResult(serde_json::Value::String(result)))
                .await?;
        }
        Commands::PostJob { amount, spec, uri } => {
            let tx = chain_client()?.post_job(&amount, &spec, &uri).await?;
            info!("createJob confirmed: {:?}", tx);
        }
        Commands::Apply {
            job_id,
            subdomain,
            proof,
        } => {
            let tx = chain_client()?
                .apply_for_job(parse_job_id(&job_id)?, &ens_label(&subdomain), parse_proof(&proof)?)
                .await?;
            info!("applyForJob confirmed: {:?}", tx);
        }
        Commands::Commit {
            job_id,
            approve,
            extra,
            salt,
            subdomain,
            proof,
        } => {
            let (extra_salt, extra_subdomain) = salt_and_subdomain(&extra);
            let salt = salt.as_deref().or(extra_salt).map(normalise_salt).transpose()?;
            let subdomain = ens_label(extra_subdomain.unwrap_or(&subdomain));
            let record = validator()?
                .commit(parse_job_id(&job_id)?, approve, salt, &subdomain, parse_proof(&proof)?)
                .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Reveal {
            job_id,
            extra,
            approve,
            salt,
            subdomain,
            proof,
        } => {
            let (extra_salt, extra_subdomain) = salt_and_subdomain(&extra);
            let salt = salt.as_deref().or(extra_salt).map(normalise_salt).transpose()?;
            let subdomain = ens_label(extra_subdomain.unwrap_or(&subdomain));
            let record = validator()?
                .reveal(parse_job_id(&job_id)?, approve, salt, &subdomain, parse_proof(&proof)?)
                .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Submit {
            job_id,
            result_uri,
            subdomain,
            proof,
        } => {
            let tx = chain_client()?
                .submit(parse_job_id(&job_id)?, &result_uri, &ens_label(&subdomain), parse_proof(&proof)?)
                .await?;
            info!("submit confirmed: {:?}", tx);
        }
        Commands::Finalize { job_id } => {
            let tx = chain_client()?.finalize(parse_job_id(&job_id)?).await?;
            info!("finalize confirmed: {:?}", tx);
        }
        Commands::Stake { amount, validator } => {
            let role = if validator { VALIDATOR_ROLE } else { AGENT_ROLE };
            let tx = chain_client()?.deposit_stake(role, token_amount(&amount)?).await?;
            info!("depositStake confirmed: {:?}", tx);
        }
        Commands::Watch {
            subdomain,
            min_reward,
            max_stake,
            poll_secs,
        } => {
            let policy = ApplyPolicy {
                min_reward: token_amount(&min_reward)?,
                max_stake: token_amount(&max_stake)?,
            };
            JobWatcher::new(chain_client()?, policy, ens_label(&subdomain))
                .with_poll_interval(Duration::from_secs(poll_secs))
                .run()
                .await?;
        }
    }
    Ok(())
}

fn chain_client() -> Result<ChainClient> {
    Ok(ChainClient::new(ChainConfig::from_env()?)?)
}

fn validator() -> Result<Validator> {
    let client = chain_client()?;
    let store = CommitStore::new(client.config().storage_dir.clone());
    Ok(Validator::new(client, store))
}

/// Splits trailing `[salt] [subdomain]` arguments. A first value that looks
/// like a 32-byte hex salt is the salt and the next one the subdomain;
/// otherwise the first value is the subdomain.
pub fn salt_and_subdomain(extra: &[String]) -> (Option<&str>, Option<&str>) {
    match extra {
        [] => (None, None),
        [first, rest @ ..] if is_hex_salt(first) => (Some(first.as_str()), rest.first().map(String::as_str)),
        [first, ..] => (None, Some(first.as_str())),
    }
}

/// Decimal or `0x`-prefixed job id.
pub fn parse_job_id(raw: &str) -> Result<U256> {
    U256::from_str(raw.trim()).map_err(|e| anyhow!("Invalid job id {}: {}", raw, e))
}
