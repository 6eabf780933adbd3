// src/health/prober.rs
use crate::config::EmulatorConfig;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Failed to build health-check client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Emulator at {url} not healthy after {attempts} attempts ({elapsed:?})")]
    DeadlineExceeded {
        url: String,
        attempts: u32,
        elapsed: Duration,
    },
}

#[derive(Debug)]
pub struct ProbeResult {
    pub healthy: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

/// Polls `GET <base>/health` until it answers 200.
pub struct HealthProber {
    url: String,
    client: Client,
    interval: Duration,
}

impl HealthProber {
    pub fn new(
        url: impl Into<String>,
        probe_timeout: Duration,
        interval: Duration,
    ) -> Result<Self, HealthError> {
        // The client timeout bounds each attempt.
        let client = Client::builder().timeout(probe_timeout).build()?;

        Ok(Self {
            url: url.into(),
            client,
            interval,
        })
    }

    pub fn from_config(config: &EmulatorConfig) -> Result<Self, HealthError> {
        Self::new(config.health_url(), config.probe_timeout, config.probe_interval)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One GET against the health endpoint. Never fails; problems are reported
    /// in the result.
    pub async fn probe(&self) -> ProbeResult {
        let start = Instant::now();

        let result = self.client.get(&self.url).send().await;

        let response_time_ms = start.elapsed().as_millis() as u64;

        let (healthy, error) = match result {
            Ok(response) => {
                let status = response.status();
                if status == StatusCode::OK {
                    (true, None)
                } else {
                    (false, Some(format!("HTTP {}", status)))
                }
            }
            Err(e) if e.is_timeout() => (false, Some("Request timeout".to_string())),
            Err(e) => (false, Some(e.to_string())),
        };

        ProbeResult {
            healthy,
            response_time_ms,
            error,
        }
    }

    /// Block until the emulator reports healthy. There is no retry limit: the
    /// future only completes on the first 200, so bound it with
    /// [`Self::wait_until_healthy_within`] or by dropping it.
    ///
    /// Returns the number of requests made.
    pub async fn wait_until_healthy(&self) -> u32 {
        info!("Waiting for Service Bus Emulator to be healthy...");
        self.poll(&AtomicU32::new(0)).await
    }

    pub async fn wait_until_healthy_within(&self, deadline: Duration) -> Result<u32, HealthError> {
        info!(
            "Waiting up to {:?} for Service Bus Emulator to be healthy...",
            deadline
        );
        let start = Instant::now();
        let attempts = AtomicU32::new(0);

        timeout(deadline, self.poll(&attempts))
            .await
            .map_err(|_| HealthError::DeadlineExceeded {
                url: self.url.clone(),
                attempts: attempts.load(Ordering::Relaxed),
                elapsed: start.elapsed(),
            })
    }

    async fn poll(&self, attempts: &AtomicU32) -> u32 {
        loop {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            let result = self.probe().await;

            if result.healthy {
                info!(
                    attempts = attempt,
                    response_time_ms = result.response_time_ms,
                    "Service Bus Emulator is healthy."
                );
                return attempt;
            }

            warn!(
                health_url = %self.url,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Service Bus Emulator is not healthy yet. Continuing to wait..."
            );
            debug!("Retrying health check in {:?}", self.interval);
            sleep(self.interval).await;
        }
    }
}
