//! HTTP client for the recipe backend

#[cfg(feature = "history")]
use crate::models::ChatHistory;
use crate::{
    config::RecipeStreamConfig,
    error::{Error, Result},
    models::{ChatRequest, RecipeRequest, ThreadId},
};
use futures::stream::{BoxStream, StreamExt};
use reqwest::{header::ACCEPT, Client as HttpClient, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Stream of decoded text chunks from one response body
pub type ChunkStream = BoxStream<'static, Result<String>>;

/// Client for the recipe extraction and chat endpoints
#[derive(Clone)]
pub struct RecipeClient {
    config: Arc<RecipeStreamConfig>,
    http_client: HttpClient,
}

impl RecipeClient {
    /// Create a new client with the given configuration
    pub fn new(config: RecipeStreamConfig) -> Result<Self> {
        let http_client = Self::build_http_client(&config)?;

        Ok(Self {
            config: Arc::new(config),
            http_client,
        })
    }

    /// Create a new client from environment variables
    pub fn from_env() -> Result<Self> {
        let config = RecipeStreamConfig::from_env()?;
        Self::new(config)
    }

    /// Get a builder for creating a customized client
    pub fn builder() -> RecipeClientBuilder {
        RecipeClientBuilder::default()
    }

    /// Start a recipe extraction and stream the envelope text
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn stream_recipe(&self, request: &RecipeRequest) -> Result<ChunkStream> {
        if request.url.trim().is_empty() {
            return Err(Error::Config("Recipe URL is required".to_string()));
        }

        let endpoint = self.config.endpoint("recipe");
        debug!("Requesting recipe extraction from {}", endpoint);

        let response = self
            .http_client
            .post(&endpoint)
            .header(ACCEPT, "application/json")
            .json(request)
            .send()
            .await?;

        self.open_stream(response).await
    }

    /// Send a chat message on an existing thread and stream the reply
    #[instrument(skip(self, thread_id, message), fields(thread_id = %thread_id))]
    pub async fn stream_chat(&self, thread_id: &ThreadId, message: &str) -> Result<ChunkStream> {
        if message.trim().is_empty() {
            return Err(Error::Config("Chat message is required".to_string()));
        }

        let endpoint = self.config.endpoint(&format!("chat/{}", thread_id));
        debug!("Sending chat message to {}", endpoint);

        let request = ChatRequest {
            message: message.to_string(),
        };

        let response = self
            .http_client
            .post(&endpoint)
            .header(ACCEPT, "application/json")
            .json(&request)
            .send()
            .await?;

        self.open_stream(response).await
    }

    /// Fetch the stored conversation for a thread
    #[cfg(feature = "history")]
    #[cfg_attr(docsrs, doc(cfg(feature = "history")))]
    #[instrument(skip(self, thread_id), fields(thread_id = %thread_id))]
    pub async fn chat_history(&self, thread_id: &ThreadId) -> Result<ChatHistory> {
        let endpoint = self.config.endpoint(&format!("chat_history/{}", thread_id));

        let response = self.http_client.get(&endpoint).send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(self.handle_api_error(status, error_body));
        }

        response.json::<ChatHistory>().await.map_err(Error::from)
    }

    /// Get the configuration
    pub fn config(&self) -> &RecipeStreamConfig {
        &self.config
    }

    /// Get the HTTP client
    pub fn http_client(&self) -> &HttpClient {
        &self.http_client
    }

    /// Check the status and hand the body over as a chunk stream
    async fn open_stream(&self, response: Response) -> Result<ChunkStream> {
        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(self.handle_api_error(status, error_body));
        }

        debug!(status = status.as_u16(), "Response stream opened");
        Ok(crate::streaming::parse_stream(response).boxed())
    }

    /// Build the HTTP client with configuration
    fn build_http_client(config: &RecipeStreamConfig) -> Result<HttpClient> {
        let mut builder = HttpClient::builder()
            .timeout(config.http_config.timeout)
            .connect_timeout(config.http_config.connect_timeout);

        if config.http_config.pool_connections {
            builder = builder
                .pool_idle_timeout(Duration::from_secs(90))
                .pool_max_idle_per_host(config.http_config.pool_max_idle_per_host);
        } else {
            builder = builder.pool_max_idle_per_host(0);
        }

        builder.build().map_err(Error::from)
    }

    /// Handle API errors
    fn handle_api_error(&self, status: StatusCode, body: String) -> Error {
        let details = serde_json::from_str::<Value>(&body).ok();

        let message = details
            .as_ref()
            .and_then(|d| {
                d.get("detail")
                    .and_then(Value::as_str)
                    .or_else(|| d.get("error").and_then(|e| e.get("message")).and_then(Value::as_str))
            })
            .map(str::to_string)
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    body.clone()
                }
            });

        Error::Api {
            status: status.as_u16(),
            message,
            details,
        }
    }
}

/// Builder for creating a customized RecipeClient
#[derive(Default)]
pub struct RecipeClientBuilder {
    config: Option<RecipeStreamConfig>,
}

impl RecipeClientBuilder {
    /// Start from an existing configuration
    pub fn config(mut self, config: RecipeStreamConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        let mut config = self.config.unwrap_or_default();
        config.base_url = url.into();
        self.config = Some(config);
        self
    }

    /// Set annotations sent with every extraction
    pub fn standard_annotations(mut self, annotations: impl Into<String>) -> Self {
        let mut config = self.config.unwrap_or_default();
        config.standard_annotations = annotations.into();
        self.config = Some(config);
        self
    }

    /// Set request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let mut config = self.config.unwrap_or_default();
        config.http_config.timeout = timeout;
        self.config = Some(config);
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        let mut config = self.config.unwrap_or_default();
        config.http_config.connect_timeout = timeout;
        self.config = Some(config);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<RecipeClient> {
        let config = self.config.unwrap_or_default();

        if config.base_url.trim().is_empty() {
            return Err(Error::Config("Base URL is required".to_string()));
        }

        RecipeClient::new(config)
    }
}
