use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::traits::{ByteStream, PipelineBackend};
use crate::config::TestPilotConfig;
use crate::error::{TestPilotError, TestPilotResult};
use crate::models::RunHandle;

#[derive(Debug, Serialize)]
struct StartRunRequest<'a> {
    urls: &'a [String],
}

#[derive(Debug, Deserialize)]
struct StartRunResponse {
    run_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

/// [`PipelineBackend`] speaking the pipeline service's HTTP API.
pub struct HttpPipelineBackend {
    client: Client,
    config: TestPilotConfig,
}

impl HttpPipelineBackend {
    pub fn new(config: &TestPilotConfig) -> TestPilotResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.server.connect_timeout_secs))
            .build()
            .map_err(|e| TestPilotError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.server.base_url
    }

    fn transport_error(&self, err: reqwest::Error) -> TestPilotError {
        if err.is_timeout() {
            TestPilotError::RequestTimeout(self.config.server.request_timeout_secs)
        } else {
            err.into()
        }
    }
}

async fn error_message(response: Response) -> String {
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.detail,
        Err(_) => text,
    }
}

#[async_trait]
impl PipelineBackend for HttpPipelineBackend {
    fn backend_name(&self) -> &str {
        "http"
    }

    async fn start_run(&self, identifiers: &[String]) -> TestPilotResult<RunHandle> {
        let url = self.config.start_url();
        debug!(%url, count = identifiers.len(), "Submitting pipeline run");

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.config.server.request_timeout_secs))
            .json(&StartRunRequest { urls: identifiers })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            return Err(TestPilotError::ValidationError(error_message(response).await));
        }
        if !status.is_success() {
            return Err(TestPilotError::UnexpectedStatus {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        let body: StartRunResponse = response
            .json()
            .await
            .map_err(|e| TestPilotError::ApiParseError(e.to_string()))?;

        if body.run_id.trim().is_empty() {
            return Err(TestPilotError::ApiParseError(
                "Empty run_id in acknowledgement".to_string(),
            ));
        }

        info!(run_id = %body.run_id, "Pipeline run accepted");
        Ok(RunHandle::new(body.run_id))
    }

    async fn open_stream(&self, handle: &RunHandle) -> TestPilotResult<ByteStream> {
        let url = self.config.stream_url(handle.as_str());
        debug!(%url, "Opening event stream");

        let response = self
            .client
            .get(&url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TestPilotError::RunNotFound(handle.to_string()));
        }
        if !status.is_success() {
            return Err(TestPilotError::UnexpectedStatus {
                status: status.as_u16(),
                message: error_message(response).await,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TestPilotError::StreamInterrupted(e.to_string())))
            .boxed())
    }
}
