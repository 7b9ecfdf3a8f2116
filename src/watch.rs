//! Polls the job registry for newly created, unassigned jobs and applies for
//! the ones the policy accepts.

use alloy::primitives::{Address, TxHash, U256};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::chain::{ChainClient, JobCreatedEvent, AGENT_ROLE};
use crate::error::{AgentError, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(12);

/// Limits on which jobs are worth applying for. Zero disables `max_stake`.
#[derive(Debug, Clone, Default)]
pub struct ApplyPolicy {
    pub min_reward: U256,
    pub max_stake: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Apply,
    Skip(&'static str),
}

impl ApplyPolicy {
    pub fn decide(&self, event: &JobCreatedEvent) -> Decision {
        if event.agent != Address::ZERO {
            return Decision::Skip("already assigned");
        }
        if event.reward < self.min_reward {
            return Decision::Skip("reward below minimum");
        }
        if !self.max_stake.is_zero() && event.stake > self.max_stake {
            return Decision::Skip("stake above maximum");
        }
        Decision::Apply
    }

    /// Deposit needed to bring `current` up to `required`, if any. A top-up
    /// larger than `max_stake` is refused.
    pub fn stake_top_up(&self, current: U256, required: U256) -> Result<Option<U256>> {
        if current >= required {
            return Ok(None);
        }
        let delta = required - current;
        if !self.max_stake.is_zero() && delta > self.max_stake {
            return Err(AgentError::PolicyViolation(format!(
                "Stake delta {} exceeds policy cap {}",
                delta, self.max_stake
            )));
        }
        Ok(Some(delta))
    }
}

/// First label of an ENS name: `alice.agent.agi.eth` -> `alice`.
pub fn ens_label(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split('.')
        .next()
        .unwrap_or_default()
        .to_string()
}

pub struct JobWatcher {
    client: ChainClient,
    policy: ApplyPolicy,
    subdomain: String,
    poll_interval: Duration,
}

impl JobWatcher {
    pub fn new(client: ChainClient, policy: ApplyPolicy, subdomain: impl Into<String>) -> Self {
        Self {
            client,
            policy,
            subdomain: subdomain.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs until the starting block cannot be read. After that RPC and apply
    /// failures are logged and polling continues.
    pub async fn run(&self) -> Result<()> {
        let mut last_block = self.client.block_number().await?;
        info!(
            wallet = %self.client.address(),
            subdomain = %self.subdomain,
            "Listening for unassigned jobs from block {}",
            last_block
        );

        loop {
            tokio::time::sleep(self.poll_interval).await;
            last_block = self.poll_once(last_block).await;
        }
    }

    /// Handles the `JobCreated` events after `last_block` and returns the new
    /// cursor. The cursor stays put when the head or the logs cannot be read.
    pub async fn poll_once(&self, last_block: u64) -> u64 {
        let head = match self.client.block_number().await {
            Ok(head) => head,
            Err(e) => {
                error!("Failed to fetch block number: {}", e);
                return last_block;
            }
        };
        if head <= last_block {
            return last_block;
        }

        match self.client.job_created_events(last_block + 1, head).await {
            Ok(events) => {
                debug!("{} JobCreated event(s) in blocks {}..={}", events.len(), last_block + 1, head);
                for event in events {
                    self.handle(&event).await;
                }
                head
            }
            Err(e) => {
                error!("Failed to fetch JobCreated logs: {}", e);
                last_block
            }
        }
    }

    async fn handle(&self, event: &JobCreatedEvent) {
        match self.policy.decide(event) {
            Decision::Skip(reason) => {
                debug!(job_id = %event.job_id, "skipping job: {}", reason);
            }
            Decision::Apply => {
                info!(
                    job_id = %event.job_id,
                    employer = %event.employer,
                    reward = %event.reward,
                    stake = %event.stake,
                    "Unassigned job created, applying"
                );
                if let Err(e) = self.ensure_stake(event.stake).await {
                    error!(job_id = %event.job_id, "stake top-up failed, not applying: {}", e);
                    return;
                }
                match self.client.apply_for_job(event.job_id, &self.subdomain, vec![]).await {
                    Ok(tx) => info!(job_id = %event.job_id, tx = ?tx, "Application confirmed"),
                    Err(e) => error!(job_id = %event.job_id, "applyForJob failed: {}", e),
                }
            }
        }
    }

    /// Tops up the agent stake so it covers `required`. Returns the deposit
    /// transaction when one was sent.
    pub async fn ensure_stake(&self, required: U256) -> Result<Option<TxHash>> {
        if required.is_zero() {
            return Ok(None);
        }
        if self.client.config().stake_manager.is_none() {
            debug!("STAKE_MANAGER not set, applying without a stake check");
            return Ok(None);
        }

        let current = self.client.stake_of(AGENT_ROLE).await?;
        let delta = match self.policy.stake_top_up(current, required)? {
            Some(delta) => delta,
            None => return Ok(None),
        };

        info!(current = %current, required = %required, "depositing {} stake", delta);
        let tx = self.client.deposit_stake(AGENT_ROLE, delta).await?;
        Ok(Some(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use alloy::primitives::B256;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    async fn rpc_mock(server: &mut ServerGuard, method: &str, result: &str) -> mockito::Mock {
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"method": method})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"jsonrpc":"2.0","id":0,"result":{}}}"#, result))
            .create_async()
            .await
    }

    fn watcher(rpc_url: String, configure: impl FnOnce(&mut ChainConfig)) -> JobWatcher {
        let mut config = ChainConfig::new(rpc_url, DEV_KEY);
        configure(&mut config);
        JobWatcher::new(ChainClient::new(config).unwrap(), ApplyPolicy::default(), "alice")
    }

    fn event(agent: Address, reward: u64, stake: u64) -> JobCreatedEvent {
        JobCreatedEvent {
            job_id: U256::from(1u64),
            employer: Address::repeat_byte(0x01),
            agent,
            reward: U256::from(reward),
            stake: U256::from(stake),
            fee: U256::ZERO,
            spec_hash: B256::ZERO,
            uri: "ipfs://job".to_string(),
            block_number: Some(10),
        }
    }

    #[test]
    fn assigned_jobs_are_skipped() {
        let policy = ApplyPolicy::default();
        assert_eq!(
            policy.decide(&event(Address::repeat_byte(0x02), 100, 0)),
            Decision::Skip("already assigned")
        );
        assert_eq!(policy.decide(&event(Address::ZERO, 100, 0)), Decision::Apply);
    }

    #[test]
    fn reward_floor_is_inclusive() {
        let policy = ApplyPolicy {
            min_reward: U256::from(100u64),
            max_stake: U256::ZERO,
        };
        assert_eq!(policy.decide(&event(Address::ZERO, 100, 5)), Decision::Apply);
        assert_eq!(
            policy.decide(&event(Address::ZERO, 99, 5)),
            Decision::Skip("reward below minimum")
        );
    }

    #[test]
    fn stake_cap_applies_only_when_set() {
        let capped = ApplyPolicy {
            min_reward: U256::ZERO,
            max_stake: U256::from(50u64),
        };
        assert_eq!(capped.decide(&event(Address::ZERO, 1, 50)), Decision::Apply);
        assert_eq!(
            capped.decide(&event(Address::ZERO, 1, 51)),
            Decision::Skip("stake above maximum")
        );
        assert_eq!(
            ApplyPolicy::default().decide(&event(Address::ZERO, 1, 1_000_000)),
            Decision::Apply
        );
    }

    #[test]
    fn stake_top_up_covers_the_shortfall() {
        let policy = ApplyPolicy::default();
        assert_eq!(policy.stake_top_up(U256::from(100u64), U256::from(100u64)).unwrap(), None);
        assert_eq!(policy.stake_top_up(U256::from(150u64), U256::from(100u64)).unwrap(), None);
        assert_eq!(
            policy.stake_top_up(U256::from(40u64), U256::from(100u64)).unwrap(),
            Some(U256::from(60u64))
        );
    }

    #[test]
    fn stake_top_up_respects_the_cap() {
        let policy = ApplyPolicy {
            min_reward: U256::ZERO,
            max_stake: U256::from(50u64),
        };
        assert_eq!(
            policy.stake_top_up(U256::from(60u64), U256::from(100u64)).unwrap(),
            Some(U256::from(40u64))
        );
        assert!(matches!(
            policy.stake_top_up(U256::ZERO, U256::from(100u64)),
            Err(AgentError::PolicyViolation(_))
        ));
    }

    #[test]
    fn ens_label_takes_first_component() {
        assert_eq!(ens_label("Alice.agent.agi.eth"), "alice");
        assert_eq!(ens_label("bob"), "bob");
        assert_eq!(ens_label(""), "");
    }

    #[tokio::test]
    async fn head_fetch_failure_keeps_the_cursor() {
        let mut server = Server::new_async().await;
        let head = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"method": "eth_blockNumber"})))
            .with_status(500)
            .with_body("upstream down")
            .create_async()
            .await;

        let watcher = watcher(server.url(), |c| c.job_registry = Some(Address::repeat_byte(0x11)));
        assert_eq!(watcher.poll_once(7).await, 7);
        head.assert_async().await;
    }

    #[tokio::test]
    async fn cursor_advances_to_the_head() {
        let mut server = Server::new_async().await;
        let _head = rpc_mock(&mut server, "eth_blockNumber", r#""0x9""#).await;
        let logs = rpc_mock(&mut server, "eth_getLogs", "[]").await;

        let watcher = watcher(server.url(), |c| c.job_registry = Some(Address::repeat_byte(0x11)));
        assert_eq!(watcher.poll_once(7).await, 9);
        assert_eq!(watcher.poll_once(9).await, 9);
        logs.assert_async().await;
    }

    #[tokio::test]
    async fn log_fetch_failure_keeps_the_cursor() {
        let mut server = Server::new_async().await;
        let _head = rpc_mock(&mut server, "eth_blockNumber", r#""0x9""#).await;

        // No JOB_REGISTRY: the log query fails before any request is made.
        let watcher = watcher(server.url(), |_| {});
        assert_eq!(watcher.poll_once(7).await, 7);
    }

    #[tokio::test]
    async fn sufficient_stake_needs_no_deposit() {
        let mut server = Server::new_async().await;
        let stake = rpc_mock(&mut server, "eth_call", &format!(r#""0x{:064x}""#, 100)).await;

        let watcher = watcher(server.url(), |c| c.stake_manager = Some(Address::repeat_byte(0x33)));
        assert_eq!(watcher.ensure_stake(U256::from(100u64)).await.unwrap(), None);
        assert_eq!(watcher.ensure_stake(U256::ZERO).await.unwrap(), None);
        stake.assert_async().await;
    }

    #[tokio::test]
    async fn stake_check_is_skipped_without_a_stake_manager() {
        let watcher = watcher("http://127.0.0.1:1".to_string(), |_| {});
        assert_eq!(watcher.ensure_stake(U256::from(100u64)).await.unwrap(), None);
    }
}
