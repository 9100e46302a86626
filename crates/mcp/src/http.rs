//! HTTP exchanges with URL-backed MCP servers.

use indexmap::IndexMap;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use utcp_types::{Auth, UtcpError};
use utcp_util::{redact_header_value, redact_sensitive};

use crate::oauth::{OAuthTokenCache, authorize_request};

const EVENT_STREAM: &str = "text/event-stream";
const ERROR_BODY_PREVIEW: usize = 512;

/// Shared pieces every request to one server needs.
pub(crate) struct ServerRequest<'a> {
    pub client: &'a Client,
    pub tokens: &'a OAuthTokenCache,
    pub auth: Option<&'a Auth>,
    pub server_name: &'a str,
    pub url: &'a str,
    pub headers: &'a IndexMap<String, String>,
}

impl ServerRequest<'_> {
    async fn prepare(&self, request: RequestBuilder, cancel: &CancellationToken) -> Result<RequestBuilder, UtcpError> {
        let mut request = request;
        for (name, value) in self.headers {
            debug!(target: "utcp_mcp", server = %self.server_name, header = %name, value = %redact_header_value(name, value), "MCP request header");
            request = request.header(name.as_str(), value.as_str());
        }
        authorize_request(request, self.auth, self.client, self.tokens, cancel).await
    }

    /// `GET`s the server's tool listing.
    pub async fn fetch_listing(&self, cancel: &CancellationToken) -> Result<String, UtcpError> {
        let request = self.prepare(self.client.get(self.url), cancel).await?;
        let response = self.send(request).await?;
        self.read_success_body(response).await
    }

    /// `POST`s a call envelope and returns the raw response body.
    pub async fn post_call(&self, envelope: &Value, cancel: &CancellationToken) -> Result<String, UtcpError> {
        let request = self.prepare(self.client.post(self.url).json(envelope), cancel).await?;
        let response = self.send(request).await?;
        self.read_success_body(response).await
    }

    /// `POST`s a call envelope asking for a server-sent-events response.
    pub async fn open_event_stream(&self, envelope: &Value, cancel: &CancellationToken) -> Result<Response, UtcpError> {
        let request = self
            .prepare(self.client.post(self.url).header(ACCEPT, EVENT_STREAM).json(envelope), cancel)
            .await?;
        let response = self.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UtcpError::transport(format!(
                "MCP server '{}' rejected the stream request with HTTP {status}",
                self.server_name
            )));
        }
        Ok(response)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, UtcpError> {
        request
            .send()
            .await
            .map_err(|error| UtcpError::transport(format!("MCP server '{}' request failed: {error}", self.server_name)))
    }

    async fn read_success_body(&self, response: Response) -> Result<String, UtcpError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| UtcpError::transport(format!("failed to read response from MCP server '{}': {error}", self.server_name)))?;
        if !status.is_success() {
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(UtcpError::transport(format!(
                "MCP server '{}' returned HTTP {status}: {}",
                self.server_name,
                redact_sensitive(&preview)
            )));
        }
        Ok(body)
    }
}

/// Whether the response announces a server-sent-events body.
pub(crate) fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().starts_with(EVENT_STREAM))
}
