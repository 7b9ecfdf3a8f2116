use alloy::primitives::{keccak256, B256, U256};
use alloy::sol_types::SolValue;
use rand::RngCore;

use crate::error::{AgentError, Result};

/// Hash a validator commits to before revealing its vote:
/// `keccak256(abi.encodePacked(jobId, nonce, approve, salt))`.
pub fn commit_hash(job_id: U256, nonce: U256, approve: bool, salt: B256) -> B256 {
    keccak256((job_id, nonce, approve, salt).abi_encode_packed())
}

pub fn random_salt() -> B256 {
    let mut salt = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut salt);
    B256::from(salt)
}

/// True when `value` looks like a 32-byte hex salt (optionally `0x`-prefixed).
pub fn is_hex_salt(value: &str) -> bool {
    let digits = strip_hex_prefix(value.trim());
    digits.len() == 64 && digits.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn normalise_salt(value: &str) -> Result<B256> {
    let bytes = hex::decode(strip_hex_prefix(value.trim()))
        .map_err(|e| AgentError::InvalidSalt(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(AgentError::InvalidSalt(format!(
            "salt must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_hash_matches_packed_layout() {
        let salt = B256::repeat_byte(0xab);
        let mut packed = Vec::new();
        packed.extend_from_slice(&U256::from(12u64).to_be_bytes::<32>());
        packed.extend_from_slice(&U256::from(3u64).to_be_bytes::<32>());
        packed.push(1);
        packed.extend_from_slice(salt.as_slice());
        assert_eq!(packed.len(), 97);

        assert_eq!(
            commit_hash(U256::from(12u64), U256::from(3u64), true, salt),
            keccak256(&packed)
        );
    }

    #[test]
    fn vote_changes_the_hash() {
        let salt = random_salt();
        let job = U256::from(1u64);
        assert_ne!(
            commit_hash(job, U256::ZERO, true, salt),
            commit_hash(job, U256::ZERO, false, salt)
        );
    }

    #[test]
    fn salts_with_and_without_prefix_agree() {
        let hex = "11".repeat(32);
        let with_prefix = normalise_salt(&format!("0x{}", hex)).unwrap();
        let without = normalise_salt(&hex).unwrap();
        assert_eq!(with_prefix, without);
        assert_eq!(with_prefix, B256::repeat_byte(0x11));
        assert!(is_hex_salt(&hex));
        assert!(is_hex_salt(&format!("0x{}", hex)));
    }

    #[test]
    fn short_or_non_hex_salts_are_rejected() {
        assert!(matches!(normalise_salt("0x1234"), Err(AgentError::InvalidSalt(_))));
        assert!(normalise_salt("zz").is_err());
        assert!(!is_hex_salt("alice"));
        assert!(!is_hex_salt(&"g".repeat(64)));
    }

    #[test]
    fn random_salts_differ() {
        assert_ne!(random_salt(), random_salt());
    }
}
