//! Remote capability provider over HTTP
//!
//! The command is POSTed as `{"command": "<text>"}`; the JSON response body is
//! the payload. A body carrying `"status": "error"` counts as a failed
//! invocation even when the HTTP status is 2xx.

use crate::agent::Agent;
use crate::error::{Error, Result};
use crate::types::Command;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Configuration for an [`HttpAgent`]
#[derive(Clone)]
pub struct HttpAgentConfig {
    /// Endpoint receiving the POST
    pub endpoint: Url,
    /// Optional bearer token
    pub token: Option<SecretString>,
    /// Request timeout
    pub timeout: Duration,
}

impl HttpAgentConfig {
    /// Create a configuration for an endpoint URL
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::config(format!("Invalid agent endpoint '{}': {}", endpoint, e)))?;
        Ok(Self {
            endpoint,
            token: None,
            timeout: Duration::from_secs(30),
        })
    }

    /// Set the bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::from(token.into()));
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Agent that delegates to a remote service
pub struct HttpAgent {
    client: Client,
    config: HttpAgentConfig,
}

impl HttpAgent {
    /// Create an agent with the given configuration
    pub fn new(config: HttpAgentConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Get the configuration
    pub fn config(&self) -> &HttpAgentConfig {
        &self.config
    }
}

#[async_trait]
impl Agent for HttpAgent {
    async fn invoke(&self, command: &Command) -> Result<Value> {
        let mut request = self
            .client
            .post(self.config.endpoint.clone())
            .json(&json!({ "command": command.text() }));
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::agent_invocation(
                self.config.endpoint.as_str(),
                format!("Request failed with status {}: {}", status, error_text),
            ));
        }

        let payload: Value = response.json().await?;
        if payload.get("status").and_then(Value::as_str) == Some("error") {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("remote agent reported an error");
            return Err(Error::agent_invocation(self.config.endpoint.as_str(), message));
        }

        Ok(payload)
    }
}
