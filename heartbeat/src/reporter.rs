//! Heartbeat reporter
//!
//! Posts liveness plus static system info to
//! `{backend}/nodes/{node_id}/heartbeat` on a fixed interval. Failures are
//! logged and swallowed; the next tick is the only retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("{0} must not be empty")]
    MissingSetting(&'static str),
    #[error("Heartbeat request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Controller returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Invalid controller response: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterState {
    Idle,
    Running,
}

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub platform: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatPayload {
    pub agent_token: String,
    pub status: String,
    pub system_info: SystemInfo,
}

pub struct HeartbeatReporter {
    client: reqwest::Client,
    backend_url: String,
    node_id: String,
    token: String,
    interval: Duration,
    running: AtomicBool,
}

impl HeartbeatReporter {
    /// Build a reporter. `node_id` is required up front so no heartbeat is
    /// ever posted to an unresolved URL.
    pub fn new(
        backend_url: &str,
        token: &str,
        node_id: &str,
        interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<Self, HeartbeatError> {
        let backend_url = backend_url.trim().trim_end_matches('/');
        if backend_url.is_empty() {
            return Err(HeartbeatError::MissingSetting("backend url"));
        }
        if token.trim().is_empty() {
            return Err(HeartbeatError::MissingSetting("token"));
        }
        if node_id.trim().is_empty() {
            return Err(HeartbeatError::MissingSetting("node id"));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            backend_url: backend_url.to_string(),
            node_id: node_id.trim().to_string(),
            token: token.to_string(),
            interval,
            running: AtomicBool::new(false),
        })
    }

    pub fn heartbeat_url(&self) -> String {
        format!("{}/nodes/{}/heartbeat", self.backend_url, self.node_id)
    }

    pub fn state(&self) -> ReporterState {
        if self.running.load(Ordering::SeqCst) {
            ReporterState::Running
        } else {
            ReporterState::Idle
        }
    }

    fn payload(&self) -> HeartbeatPayload {
        HeartbeatPayload {
            agent_token: self.token.clone(),
            status: "online".to_string(),
            system_info: SystemInfo {
                platform: std::env::consts::OS.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Post one heartbeat and return the controller's JSON body
    pub async fn try_send(&self) -> Result<serde_json::Value, HeartbeatError> {
        let response = self
            .client
            .post(self.heartbeat_url())
            .bearer_auth(&self.token)
            .json(&self.payload())
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(HeartbeatError::Status { status, body });
        }

        response.json().await.map_err(HeartbeatError::Decode)
    }

    /// Post one heartbeat; failures are logged and yield `None`
    pub async fn send_heartbeat(&self) -> Option<serde_json::Value> {
        match self.try_send().await {
            Ok(body) => {
                info!("Heartbeat sent at {}", chrono::Utc::now().to_rfc3339());
                Some(body)
            }
            Err(e) => {
                warn!("Error sending heartbeat: {e}");
                None
            }
        }
    }

    /// Send immediately, then every `interval`, until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        self.running.store(true, Ordering::SeqCst);
        info!(
            "Starting heartbeat loop for node {} (every {}s)",
            self.node_id,
            self.interval.as_secs_f64()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.send_heartbeat() => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    debug!("Heartbeat interval elapsed");
                }
            }
        }

        info!("Heartbeat loop stopped");
    }
}
