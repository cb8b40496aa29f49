//! HTTP client for the execution engine

use crate::echoer::sse::SseDecoder;
use crate::echoer::{EngineError, ExecutionEngine, FlowRun, FlowRunReport, ReportStream};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const REPORT_BUFFER: usize = 256;

/// Client for the engine's submission endpoint and result stream
#[derive(Debug, Clone)]
pub struct EchoerClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl EchoerClient {
    /// Create a new engine client
    ///
    /// # Arguments
    /// * `base_url` - Engine address, e.g. `http://echoer:8080`
    /// * `request_timeout` - Timeout applied to submissions only; the result
    ///   stream stays open indefinitely
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn submit_url(&self) -> String {
        format!("{}/flowrun", self.base_url)
    }

    fn watch_url(&self, since: i64) -> String {
        format!("{}/watch?resource=flowrun&version={}", self.base_url, since)
    }
}

#[async_trait]
impl ExecutionEngine for EchoerClient {
    async fn submit(&self, request: &FlowRun) -> Result<(), EngineError> {
        let body = json!({ "data": request.generate() });
        debug!("[echoer] submitting flow run {}", request.name);

        let response = self
            .client
            .post(self.submit_url())
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
            return Err(EngineError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn watch_reports(&self, since: i64) -> Result<ReportStream, EngineError> {
        let url = self.watch_url(since);
        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Status {
                status: status.as_u16(),
                body,
            });
        }
        info!("[echoer] watching flow runs from {}", url);

        let (tx, rx) = mpsc::channel(REPORT_BUFFER);
        let mut chunks = Box::pin(response.bytes_stream());
        tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            while let Some(chunk) = chunks.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!("[echoer] result stream interrupted: {}", e);
                        let _ = tx.send(Err(EngineError::Transport(e))).await;
                        return;
                    }
                };
                for event in decoder.push(&chunk) {
                    let report = serde_json::from_str::<FlowRunReport>(&event.data)
                        .map_err(EngineError::from);
                    if tx.send(report).await.is_err() {
                        debug!("[echoer] report receiver dropped, stopping stream");
                        return;
                    }
                }
            }
            debug!("[echoer] result stream ended");
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = EchoerClient::new("http://echoer:8080/", Duration::from_secs(5));
        assert_eq!(client.base_url(), "http://echoer:8080");
        assert_eq!(client.submit_url(), "http://echoer:8080/flowrun");
        assert_eq!(
            client.watch_url(1700000000),
            "http://echoer:8080/watch?resource=flowrun&version=1700000000"
        );
    }
}
