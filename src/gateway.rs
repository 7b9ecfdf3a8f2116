use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::{RequestBuilder, Response};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::error::{AgentError, Result};
use crate::types::{ClientMessage, Job, JobId, Registration, ServerMessage, Submission};

pub type GatewaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Produces the result payload submitted for a job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<serde_json::Value>;
}

/// Answers every job with the same payload.
#[derive(Debug, Clone)]
pub struct StaticResult(pub serde_json::Value);

impl Default for StaticResult {
    fn default() -> Self {
        StaticResult(serde_json::Value::String("result data".to_string()))
    }
}

#[async_trait]
impl JobHandler for StaticResult {
    async fn handle(&self, _job: &Job) -> Result<serde_json::Value> {
        Ok(self.0.clone())
    }
}

/// Client for the job gateway: HTTP for registration and submissions, a
/// WebSocket for job delivery.
#[derive(Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Socket endpoint: the configured override, or the gateway URL with its
    /// `http` scheme swapped for `ws`.
    pub fn websocket_url(&self) -> String {
        match &self.config.ws_url {
            Some(url) => url.clone(),
            None => to_websocket_url(&self.config.gateway_url),
        }
    }

    /// Announces the agent over HTTP. An already registered agent (409) is fine.
    pub async fn register_agent(&self) -> Result<()> {
        let url = format!("{}/agents", self.config.gateway_url);
        let body = Registration {
            id: self.config.agent_id.clone(),
            wallet: self.config.wallet.clone(),
        };
        let response = self.send_json(&url, &body).await?;

        if !response.status().is_success() && response.status() != reqwest::StatusCode::CONFLICT {
            return Err(AgentError::ApiError {
                status: response.status().as_u16(),
                message: response.text().await?,
            });
        }

        info!(agent = %self.config.agent_id, wallet = %self.config.wallet, "agent registered");
        Ok(())
    }

    /// Posts a job result on behalf of the agent wallet.
    pub async fn submit_result(&self, job_id: &JobId, result: serde_json::Value) -> Result<()> {
        let url = self.submit_url(job_id)?;
        let body = Submission {
            address: self.config.wallet.clone(),
            result,
        };
        let response = self.send_json(url.as_str(), &body).await?;

        if !response.status().is_success() {
            return Err(AgentError::ApiError {
                status: response.status().as_u16(),
                message: response.text().await?,
            });
        }

        info!(job_id = %job_id, "result submitted");
        Ok(())
    }

    /// `{gateway}/jobs/{jobId}/submit`, with the id percent-encoded as a
    /// single path segment.
    pub fn submit_url(&self, job_id: &JobId) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.config.gateway_url)
            .map_err(|e| AgentError::ConfigError(format!("invalid gateway url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AgentError::ConfigError("gateway url cannot take a path".to_string()))?
            .pop_if_empty()
            .push("jobs")
            .push(&job_id.to_string())
            .push("submit");
        Ok(url)
    }

    /// Opens the socket and announces the agent on it.
    pub async fn connect(&self) -> Result<GatewaySocket> {
        let url = self.websocket_url();
        debug!(url = %url, "connecting to gateway socket");
        let (mut socket, _) = connect_async(url.as_str()).await?;

        let register = ClientMessage::Register {
            id: self.config.agent_id.clone(),
            wallet: self.config.wallet.clone(),
        };
        socket.send(Message::text(serde_json::to_string(&register)?)).await?;
        Ok(socket)
    }

    /// Registers, connects and serves jobs until the gateway closes the socket.
    pub async fn run<H: JobHandler>(&self, handler: &H) -> Result<()> {
        self.register_agent().await?;
        let mut socket = self.connect().await?;
        info!("waiting for jobs");
        self.serve(&mut socket, handler).await
    }

    /// Receive loop over an already registered socket.
    pub async fn serve<H: JobHandler>(&self, socket: &mut GatewaySocket, handler: &H) -> Result<()> {
        while let Some(frame) = socket.next().await {
            let frame = frame?;
            if frame.is_close() {
                info!("gateway closed the socket");
                break;
            }
            if !frame.is_text() {
                continue;
            }

            let message = match serde_json::from_str::<ServerMessage>(frame.to_text()?) {
                Ok(message) => message,
                Err(e) => {
                    warn!("ignoring malformed gateway frame: {}", e);
                    continue;
                }
            };

            match message {
                ServerMessage::Job { job } => self.process_job(socket, handler, job).await?,
                ServerMessage::Other => debug!("ignoring non-job frame"),
            }
        }
        Ok(())
    }

    /// The acknowledgement for `job`; it always carries the job's own id.
    pub fn acknowledge(&self, job: &Job) -> ClientMessage {
        ClientMessage::Ack {
            id: self.config.agent_id.clone(),
            job_id: job.job_id.clone(),
        }
    }

    async fn process_job<H: JobHandler>(
        &self,
        socket: &mut GatewaySocket,
        handler: &H,
        job: Job,
    ) -> Result<()> {
        info!(job_id = %job.job_id, details = ?job.details, "job received");

        let ack = self.acknowledge(&job);
        socket.send(Message::text(serde_json::to_string(&ack)?)).await?;

        let result = match handler.handle(&job).await {
            Ok(result) => result,
            Err(e) => {
                error!(job_id = %job.job_id, "job handler failed: {}", e);
                return Ok(());
            }
        };

        if let Err(e) = self.submit_result(&job.job_id, result).await {
            error!(job_id = %job.job_id, "result submission failed: {}", e);
        }
        Ok(())
    }

    async fn send_json<B: Serialize>(&self, url: &str, body: &B) -> Result<Response> {
        self.send_with_retry(url, || self.client.post(url).json(body)).await
    }

    /// Sends the request, re-sending it when it times out while retries remain.
    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = self.config.timeout_retries;
        loop {
            match build().send().await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_timeout() && retries > 0 => {
                    warn!("Request to {} timed out, retrying...", url);
                    retries -= 1;
                }
                Err(e) if e.is_timeout() => return Err(AgentError::Timeout(url.to_string())),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// `http://` becomes `ws://`, `https://` becomes `wss://`.
pub fn to_websocket_url(gateway_url: &str) -> String {
    match gateway_url.strip_prefix("http") {
        Some(rest) => format!("ws{}", rest),
        None => gateway_url.to_string(),
    }
}
