use alloy::primitives::{B256, U256};
use chrono::Utc;
use tracing::info;

use crate::chain::{commit_hash, normalise_salt, random_salt, ChainClient};
use crate::error::{AgentError, Result};
use crate::store::{CommitRecord, CommitStore};

/// Commit/reveal voting that remembers each commit's salt on disk.
pub struct Validator {
    client: ChainClient,
    store: CommitStore,
}

impl Validator {
    pub fn new(client: ChainClient, store: CommitStore) -> Self {
        Self { client, store }
    }

    pub fn store(&self) -> &CommitStore {
        &self.store
    }

    /// Commits a vote. A random salt is drawn when none is given.
    pub async fn commit(
        &self,
        job_id: U256,
        approve: bool,
        salt: Option<B256>,
        subdomain: &str,
        proof: Vec<B256>,
    ) -> Result<CommitRecord> {
        let nonce = self.client.job_nonce(job_id).await?;
        let salt = salt.unwrap_or_else(random_salt);
        let hash = commit_hash(job_id, nonce, approve, salt);

        let tx = self
            .client
            .commit_validation(job_id, hash, subdomain, proof)
            .await?;

        let key = job_id.to_string();
        let record = self.store.save(
            &key,
            self.client.address(),
            CommitRecord {
                job_id: Some(key.clone()),
                validator: Some(self.client.address().to_string()),
                approve: Some(approve),
                salt: Some(hex_string(&salt)),
                commit_hash: Some(hex_string(&hash)),
                commit_tx: Some(format!("{:?}", tx)),
                committed_at: Some(Utc::now()),
                ..Default::default()
            },
        )?;
        info!(
            job_id = %job_id,
            path = %self.store.path_for(&key, self.client.address()).display(),
            "Committed validation, salt stored"
        );
        Ok(record)
    }

    /// Reveals a vote, taking approve/salt from the stored commit when omitted.
    pub async fn reveal(
        &self,
        job_id: U256,
        approve: Option<bool>,
        salt: Option<B256>,
        subdomain: &str,
        proof: Vec<B256>,
    ) -> Result<CommitRecord> {
        let key = job_id.to_string();
        let stored = self.store.load(&key, self.client.address());
        let (approve, salt) = resolve_reveal(&stored, approve, salt)?;

        let tx = self
            .client
            .reveal_validation(job_id, approve, salt, subdomain, proof)
            .await?;

        let record = self.store.save(
            &key,
            self.client.address(),
            CommitRecord {
                approve: Some(approve),
                salt: Some(hex_string(&salt)),
                reveal_tx: Some(format!("{:?}", tx)),
                revealed_at: Some(Utc::now()),
                ..Default::default()
            },
        )?;
        info!(job_id = %job_id, "Revealed validation");
        Ok(record)
    }
}

fn hex_string(value: &B256) -> String {
    format!("0x{}", hex::encode(value.as_slice()))
}

/// Explicit arguments win over the stored commit; both missing is an error.
pub fn resolve_reveal(stored: &CommitRecord, approve: Option<bool>, salt: Option<B256>) -> Result<(bool, B256)> {
    let approve = approve.or(stored.approve).ok_or_else(|| {
        AgentError::MissingRecord("Approve flag missing. Provide it or commit first.".to_string())
    })?;
    let salt = match salt {
        Some(salt) => salt,
        None => {
            let stored_salt = stored.salt.as_deref().ok_or_else(|| {
                AgentError::MissingRecord(
                    "Salt missing. Provide it or ensure commit record exists.".to_string(),
                )
            })?;
            normalise_salt(stored_salt)?
        }
    };
    Ok((approve, salt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reveal_falls_back_to_stored_commit() {
        let salt = B256::repeat_byte(0x42);
        let stored = CommitRecord {
            approve: Some(false),
            salt: Some(hex_string(&salt)),
            ..Default::default()
        };
        assert_eq!(resolve_reveal(&stored, None, None).unwrap(), (false, salt));
    }

    #[test]
    fn explicit_arguments_override_stored_values() {
        let stored = CommitRecord {
            approve: Some(false),
            salt: Some(hex_string(&B256::repeat_byte(0x01))),
            ..Default::default()
        };
        let salt = B256::repeat_byte(0x02);
        assert_eq!(resolve_reveal(&stored, Some(true), Some(salt)).unwrap(), (true, salt));
    }

    #[test]
    fn reveal_without_any_source_fails() {
        let empty = CommitRecord::default();
        assert!(matches!(
            resolve_reveal(&empty, None, Some(B256::ZERO)),
            Err(AgentError::MissingRecord(_))
        ));
        assert!(matches!(
            resolve_reveal(&empty, Some(true), None),
            Err(AgentError::MissingRecord(_))
        ));
    }
}
