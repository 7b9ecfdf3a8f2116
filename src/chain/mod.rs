//! Signed contract calls against the job registry, validation module and
//! stake manager.

mod client;
pub mod commit;
pub mod contracts;

pub use client::{
    build_transaction, parse_proof, token_amount, ChainClient, JobCreatedEvent, AGENT_ROLE,
    DEFAULT_JOB_TTL_SECS, TOKEN_DECIMALS, VALIDATOR_ROLE,
};
pub use commit::{commit_hash, is_hex_salt, normalise_salt, random_salt};
