//! Local persistence for validation commits.
//!
//! A reveal needs the exact salt and vote that went into the commit hash, so
//! both are written to disk as soon as the commit is confirmed.

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approve: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_tx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reveal_tx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revealed_at: Option<DateTime<Utc>>,
}

impl CommitRecord {
    /// Fields set in `update` win; unset ones keep their current value.
    pub fn merge(self, update: CommitRecord) -> CommitRecord {
        CommitRecord {
            job_id: update.job_id.or(self.job_id),
            validator: update.validator.or(self.validator),
            approve: update.approve.or(self.approve),
            salt: update.salt.or(self.salt),
            commit_hash: update.commit_hash.or(self.commit_hash),
            commit_tx: update.commit_tx.or(self.commit_tx),
            committed_at: update.committed_at.or(self.committed_at),
            reveal_tx: update.reveal_tx.or(self.reveal_tx),
            revealed_at: update.revealed_at.or(self.revealed_at),
        }
    }
}

/// One JSON file per (job, validator) under a root directory.
#[derive(Debug, Clone)]
pub struct CommitStore {
    root: PathBuf,
}

impl CommitStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, job_id: &str, validator: Address) -> PathBuf {
        let suffix = format!("0x{}", hex::encode(validator.as_slice()));
        self.root.join(format!("{}-{}.json", job_id, suffix))
    }

    /// The stored record, or an empty one when nothing usable is on disk.
    pub fn load(&self, job_id: &str, validator: Address) -> CommitRecord {
        let path = self.path_for(job_id, validator);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return CommitRecord::default(),
            Err(e) => {
                warn!("Failed to read commit record {}: {}", path.display(), e);
                return CommitRecord::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Failed to parse commit record {}: {}", path.display(), e);
            CommitRecord::default()
        })
    }

    /// Merges `update` into the stored record and writes it back owner-only.
    pub fn save(&self, job_id: &str, validator: Address, update: CommitRecord) -> Result<CommitRecord> {
        self.ensure_root()?;
        let record = self.load(job_id, validator).merge(update);
        let path = self.path_for(job_id, validator);

        let mut file = open_private(&path)?;
        file.write_all(serde_json::to_string_pretty(&record)?.as_bytes())?;
        restrict_permissions(&path);
        Ok(record)
    }

    fn ensure_root(&self) -> Result<()> {
        if self.root.exists() {
            return Ok(());
        }
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&self.root)?;
        Ok(())
    }
}

fn open_private(path: &Path) -> std::io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

// A pre-existing file keeps its old mode through `open`, so tighten it again.
fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!("chmod failed for commit record {}: {}", path.display(), e);
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> Address {
        "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap()
    }

    #[test]
    fn missing_record_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::new(dir.path().join("validation"));
        assert_eq!(store.load("1", validator()), CommitRecord::default());
    }

    #[test]
    fn path_uses_lowercase_address() {
        let store = CommitStore::new("/tmp/x");
        assert_eq!(
            store.path_for("12", validator()),
            PathBuf::from("/tmp/x/12-0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266.json")
        );
    }

    #[test]
    fn save_merges_reveal_into_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::new(dir.path().join("validation"));

        store
            .save(
                "5",
                validator(),
                CommitRecord {
                    job_id: Some("5".to_string()),
                    approve: Some(true),
                    salt: Some("0x01".to_string()),
                    commit_tx: Some("0xc0".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let merged = store
            .save(
                "5",
                validator(),
                CommitRecord {
                    reveal_tx: Some("0xre".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(merged.approve, Some(true));
        assert_eq!(merged.salt.as_deref(), Some("0x01"));
        assert_eq!(merged.commit_tx.as_deref(), Some("0xc0"));
        assert_eq!(merged.reveal_tx.as_deref(), Some("0xre"));
        assert_eq!(store.load("5", validator()), merged);
    }

    #[test]
    fn record_uses_camel_case_keys() {
        let record = CommitRecord {
            job_id: Some("1".to_string()),
            commit_hash: Some("0xab".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, serde_json::json!({"jobId": "1", "commitHash": "0xab"}));
    }

    #[test]
    fn timestamps_survive_a_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::new(dir.path().join("validation"));
        let committed_at: DateTime<Utc> = "2026-10-17T08:30:00Z".parse().unwrap();

        store
            .save(
                "3",
                validator(),
                CommitRecord {
                    committed_at: Some(committed_at),
                    ..Default::default()
                },
            )
            .unwrap();

        let raw = fs::read_to_string(store.path_for("3", validator())).unwrap();
        assert!(raw.contains("\"committedAt\": \"2026-10-17T08:30:00Z\""));
        assert_eq!(store.load("3", validator()).committed_at, Some(committed_at));
    }

    #[cfg(unix)]
    #[test]
    fn records_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = CommitStore::new(dir.path().join("validation"));
        store.save("9", validator(), CommitRecord::default()).unwrap();

        let mode = fs::metadata(store.path_for("9", validator()))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
