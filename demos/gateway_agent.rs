use agijobs_agent::{GatewayClient, GatewayConfig, Job, JobHandler, Result};
use async_trait::async_trait;
use std::error::Error;

/// Echoes each job's URI back as its result.
struct EchoUri;

#[async_trait]
impl JobHandler for EchoUri {
    async fn handle(&self, job: &Job) -> Result<serde_json::Value> {
        println!("📨 Working on job {}", job.job_id);
        Ok(serde_json::json!({
            "jobId": job.job_id,
            "echo": job.details.get("uri").cloned().unwrap_or_default(),
        }))
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::new(
        std::env::var("GATEWAY_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
        "example-agent",
        std::env::var("AGENT_WALLET").unwrap_or_else(|_| "0xYourWalletAddress".to_string()),
    );
    let client = GatewayClient::new(config)?;

    println!("🚀 Connecting to {}", client.websocket_url());
    client.run(&EchoUri).await?;
    println!("👋 Gateway closed the connection");

    Ok(())
}
