//! OAuth2 client-credentials token cache and request authorization.
//!
//! Tokens are cached per `(token_url, client_id)` for the lifetime of the
//! cache and never refreshed. Two concurrent first uses may both fetch a
//! token; the later insert simply replaces the earlier one.

use std::collections::HashMap;

use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use utcp_types::{ApiKeyLocation, Auth, OAuth2Auth, UtcpError};
use utcp_util::cancellable;

type TokenKey = (String, String);

/// Bearer tokens obtained through the client-credentials grant.
#[derive(Debug, Default)]
pub struct OAuthTokenCache {
    tokens: RwLock<HashMap<TokenKey, String>>,
}

impl OAuthTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached token for `auth`, fetching it on first use.
    pub async fn bearer_token(&self, client: &Client, auth: &OAuth2Auth, cancel: &CancellationToken) -> Result<String, UtcpError> {
        let client_id = auth
            .client_id
            .as_deref()
            .filter(|client_id| !client_id.trim().is_empty())
            .ok_or_else(|| UtcpError::invalid_configuration("OAuth2 client_id is required"))?;
        let key = (auth.token_url.clone(), client_id.to_string());

        if let Some(token) = self.tokens.read().await.get(&key) {
            return Ok(token.clone());
        }

        let token = cancellable(cancel, "OAuth2 token request", fetch_token(client, auth, client_id)).await?;
        self.tokens.write().await.insert(key, token.clone());
        debug!(target: "utcp_mcp", token_url = %auth.token_url, "cached OAuth2 token");
        Ok(token)
    }

    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.tokens.write().await.clear();
    }
}

async fn fetch_token(client: &Client, auth: &OAuth2Auth, client_id: &str) -> Result<String, UtcpError> {
    let scope = auth.scopes.join(" ");

    let mut form: Vec<(&str, &str)> = vec![("grant_type", "client_credentials"), ("client_id", client_id)];
    if let Some(secret) = auth.client_secret.as_deref() {
        form.push(("client_secret", secret));
    }
    if !scope.is_empty() {
        form.push(("scope", scope.as_str()));
    }

    let response = match client.post(&auth.token_url).form(&form).send().await {
        Ok(response) if response.status().is_success() => response,
        first_attempt => {
            match &first_attempt {
                Ok(response) => warn!(target: "utcp_mcp", status = %response.status(), "OAuth2 body credentials rejected, retrying with basic auth"),
                Err(error) => warn!(target: "utcp_mcp", error = %error, "OAuth2 token request failed, retrying with basic auth"),
            }
            let mut retry_form: Vec<(&str, &str)> = vec![("grant_type", "client_credentials")];
            if !scope.is_empty() {
                retry_form.push(("scope", scope.as_str()));
            }
            client
                .post(&auth.token_url)
                .basic_auth(client_id, auth.client_secret.as_deref())
                .form(&retry_form)
                .send()
                .await
                .map_err(|error| UtcpError::transport(format!("OAuth2 token request failed: {error}")))?
        }
    };

    read_access_token(response).await
}

async fn read_access_token(response: Response) -> Result<String, UtcpError> {
    let status = response.status();
    if !status.is_success() {
        return Err(UtcpError::transport(format!("OAuth2 token request failed with status {status}")));
    }
    let body: Value = response
        .json()
        .await
        .map_err(|error| UtcpError::transport(format!("OAuth2 token response is not JSON: {error}")))?;
    body.get("access_token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| UtcpError::invalid_configuration("OAuth2 token response missing access_token"))
}

/// Attaches `auth` to an outgoing request.
///
/// API keys go to their configured location, basic auth becomes an
/// `Authorization: Basic` header and OAuth2 a cached bearer token. Custom
/// schemes are left for the host to apply.
pub async fn authorize_request(
    request: RequestBuilder,
    auth: Option<&Auth>,
    client: &Client,
    tokens: &OAuthTokenCache,
    cancel: &CancellationToken,
) -> Result<RequestBuilder, UtcpError> {
    let Some(auth) = auth else {
        return Ok(request);
    };
    Ok(match auth {
        Auth::ApiKey(api_key) => match api_key.location {
            ApiKeyLocation::Header => request.header(api_key.key_name.as_str(), api_key.api_key.as_str()),
            ApiKeyLocation::Query => request.query(&[(api_key.key_name.as_str(), api_key.api_key.as_str())]),
            ApiKeyLocation::Cookie => request.header(reqwest::header::COOKIE, format!("{}={}", api_key.key_name, api_key.api_key)),
        },
        Auth::Basic(basic) => request.basic_auth(&basic.username, Some(&basic.password)),
        Auth::OAuth2(oauth) => request.bearer_auth(tokens.bearer_token(client, oauth, cancel).await?),
        Auth::Custom(custom) => {
            debug!(target: "utcp_mcp", auth_type = %custom.auth_type, "custom auth is not applied to outgoing requests");
            request
        }
    })
}
