use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::models::processing::ProcessingSnapshot;
use crate::utils::retry::{retry_async_when, RetryConfig};

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Resource session {0} not found")]
    NotFound(String),

    #[error("Resource session {id} is still {status}")]
    NotTerminal { id: String, status: &'static str },

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Reads job status from the document-processing service.
#[derive(Clone)]
pub struct ProcessingClient {
    http: Client,
    base_url: String,
    poll: RetryConfig,
}

impl ProcessingClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build processing HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll: RetryConfig::processing_poll(),
        })
    }

    pub fn with_poll(mut self, poll: RetryConfig) -> Self {
        self.poll = poll;
        self
    }

    pub async fn fetch_status(&self, session_id: &str) -> Result<ProcessingSnapshot, ProcessingError> {
        let url = format!("{}/resource-sessions/{}", self.base_url, session_id);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to call processing service")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProcessingError::NotFound(session_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(anyhow!("Processing service returned status: {}", response.status()).into());
        }

        let snapshot: ProcessingSnapshot = response
            .json()
            .await
            .context("Invalid processing status payload")?;

        tracing::debug!(
            "Processing status: session={}, status={}",
            session_id,
            snapshot.status.as_str()
        );
        Ok(snapshot)
    }

    /// Polls until the job reaches `completed` or `failed`. Transport errors
    /// and non-terminal statuses are retried with backoff; a missing session
    /// is returned immediately.
    pub async fn wait_until_terminal(
        &self,
        session_id: &str,
    ) -> Result<ProcessingSnapshot, ProcessingError> {
        let snapshot = retry_async_when(
            self.poll.clone(),
            || async {
                let snapshot = self.fetch_status(session_id).await?;
                if snapshot.status.is_terminal() {
                    Ok(snapshot)
                } else {
                    Err(ProcessingError::NotTerminal {
                        id: snapshot.id,
                        status: snapshot.status.as_str(),
                    })
                }
            },
            |err| !matches!(err, ProcessingError::NotFound(_)),
        )
        .await?;

        tracing::info!(
            "Processing finished: session={}, status={}",
            session_id,
            snapshot.status.as_str()
        );
        Ok(snapshot)
    }
}
