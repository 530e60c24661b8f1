//! HTTP translation model client
//!
//! Talks to a JSON model gateway exposing `/v1/translate` and
//! `/v1/select-best`. Request timeouts are finite and short relative to job
//! lifetime expectations: a hung call is bounded by the client timeout, not
//! by the cancellation poll.

use crate::error::{EngineError, EngineResult};
use crate::services::translator::{
    SelectBestRequest, SelectBestResponse, TranslateRequest, TranslateResponse,
    TranslationModelService,
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Reqwest-backed model service client
pub struct HttpTranslator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTranslator {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - Gateway base URL, no trailing slash
    /// * `api_key` - Optional bearer token
    /// * `timeout_secs` - Total request timeout (model calls are slow;
    ///   default configuration uses 300s)
    pub fn new(base_url: String, api_key: Option<String>, timeout_secs: u64) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EngineError::Model(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    async fn post_json<Req, Resp>(&self, path: &str, request: &Req) -> EngineResult<Resp>
    where
        Req: serde::Serialize,
        Resp: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);

        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EngineError::Model(format!("Model service request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Model(format!(
                "Model service returned {}: {}",
                status, body
            )));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| EngineError::Model(format!("Failed to decode model response: {}", e)))
    }
}

#[async_trait]
impl TranslationModelService for HttpTranslator {
    async fn translate(&self, request: TranslateRequest) -> EngineResult<TranslateResponse> {
        tracing::debug!(
            segments = request.items.len(),
            model = %request.model,
            stage = request.stage.as_deref().unwrap_or("-"),
            "Model translate call"
        );
        self.post_json("/v1/translate", &request).await
    }

    async fn select_best(&self, request: SelectBestRequest) -> EngineResult<SelectBestResponse> {
        tracing::debug!(groups = request.groups.len(), "Model select-best call");
        self.post_json("/v1/select-best", &request).await
    }
}
