use serde::{Deserialize, Serialize};
use std::fmt;

/// Job identifier as sent by the gateway.
///
/// The gateway may encode ids as JSON numbers or strings; the original form is
/// kept so acknowledgements echo exactly what was received. Any JSON number is
/// accepted, including negative and fractional ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobId {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobId::Number(n) => write!(f, "{}", n),
            JobId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        JobId::Number(id.into())
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        JobId::Text(id.to_string())
    }
}

/// A job pushed by the gateway. Everything besides `jobId` is opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Body of `POST /agents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub id: String,
    pub wallet: String,
}

/// Body of `POST /jobs/{jobId}/submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub address: String,
    pub result: serde_json::Value,
}

/// Frames the agent sends over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Register {
        id: String,
        wallet: String,
    },
    Ack {
        id: String,
        #[serde(rename = "jobId")]
        job_id: JobId,
    },
}

/// Frames the gateway pushes to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Job { job: Job },
    #[serde(other)]
    Other,
}
