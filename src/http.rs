//! HTTP/JSON request client. Modeled closely on the teacher's
//! `OAuth2Client` (`enterprise::auth::oauth2`): a lazily-refreshed bearer
//! token behind a lock, per-call options merged onto client defaults, and
//! a client-issued request id on every call. Trimmed to the
//! client-credentials grant only — authorization-code, PKCE, and OIDC
//! discovery are out of scope for a cache-consistency core that only
//! needs a bearer token to attach to outgoing requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::{RequestOptions, ResponseDecoder};
use crate::error::{AuthzError, AuthzResult};

/// Wire shape of a paginated server response (spec §6).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PagePayload<T> {
    pub data: Vec<T>,
    pub has_next: bool,
    pub has_prev: bool,
    pub next: Option<String>,
    pub prev: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    issued_at: SystemTime,
    expires_in: Duration,
}

impl CachedToken {
    fn is_expired(&self) -> bool {
        // Refresh a little early so a token does not expire mid-flight.
        let margin = Duration::from_secs(10);
        SystemTime::now()
            .duration_since(self.issued_at)
            .map(|elapsed| elapsed + margin >= self.expires_in)
            .unwrap_or(true)
    }
}

/// A source of bearer tokens via the client-credentials grant, modeled on
/// `OAuth2Client::refresh_token`.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> AuthzResult<(String, Duration)>;
}

/// Client-credentials token source backed by a standard OAuth2 token
/// endpoint.
pub struct ClientCredentialsSource {
    http: Client,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    scope: Option<String>,
}

impl ClientCredentialsSource {
    pub fn new(
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: Option<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope,
        }
    }
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[async_trait]
impl TokenSource for ClientCredentialsSource {
    async fn fetch_token(&self) -> AuthzResult<(String, Duration)> {
        let mut params = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
        ];
        if let Some(scope) = &self.scope {
            params.push(("scope", scope.clone()));
        }

        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("token refresh failed: {body}");
            return Err(AuthzError::TokenRefresh(body));
        }

        let token: TokenResponse = response.json().await?;
        let ttl = Duration::from_secs(token.expires_in.unwrap_or(3600));
        Ok((token.access_token, ttl))
    }
}

/// HTTP/JSON client wrapping `reqwest`, attaching bearer auth and a
/// per-request id to every call.
pub struct RequestClient {
    http: Client,
    base_url: String,
    token_source: Option<Arc<dyn TokenSource>>,
    cached_token: RwLock<Option<CachedToken>>,
    default_headers: HashMap<String, String>,
    network_retries: u32,
    decoder: Option<ResponseDecoder>,
}

impl RequestClient {
    pub fn new(
        base_url: impl Into<String>,
        token_source: Option<Arc<dyn TokenSource>>,
        default_headers: HashMap<String, String>,
        network_retries: u32,
        decoder: Option<ResponseDecoder>,
    ) -> Self {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            base_url,
            token_source,
            cached_token: RwLock::new(None),
            default_headers,
            network_retries,
            decoder,
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Resolve the bearer token to attach for this call: the caller's
    /// passthrough token if supplied, otherwise the cached token source
    /// result, refreshing it first if missing or expired. Exposed `pub`
    /// so the refresh-caching behavior is directly testable.
    pub async fn bearer_for(&self, options: &RequestOptions) -> AuthzResult<Option<String>> {
        if let Some(token) = &options.passthrough_authorization {
            return Ok(Some(token.clone()));
        }

        let Some(source) = &self.token_source else {
            return Ok(None);
        };

        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if !token.is_expired() {
                    return Ok(Some(token.access_token.clone()));
                }
            }
        }

        let mut cached = self.cached_token.write().await;
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(Some(token.access_token.clone()));
            }
        }

        let (access_token, expires_in) = source.fetch_token().await?;
        *cached = Some(CachedToken {
            access_token: access_token.clone(),
            issued_at: SystemTime::now(),
            expires_in,
        });
        Ok(Some(access_token))
    }

    /// Send a JSON request and decode the response body as `R`.
    pub async fn request<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: &RequestOptions,
    ) -> AuthzResult<R> {
        let bearer = self.bearer_for(options).await?;
        let request_id = Uuid::new_v4().to_string();

        let mut attempt = 0;
        loop {
            let mut builder = self
                .http
                .request(method.clone(), self.url_for(path))
                .header("X-Request-Id", &request_id);

            for (key, value) in &self.default_headers {
                builder = builder.header(key, value);
            }
            for (key, value) in &options.headers {
                builder = builder.header(key, value);
            }
            if let Some(token) = &bearer {
                builder = builder.header("Authorization", format!("Bearer {token}"));
            }
            if let Some(org_id) = &options.organization_id {
                builder = builder.header("X-Organization-Id", org_id.to_string());
            }
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let result = builder.send().await;

            let response = match result {
                Ok(response) => response,
                Err(err) if attempt < self.network_retries => {
                    attempt += 1;
                    tracing::warn!(
                        request_id = %request_id,
                        attempt,
                        max = self.network_retries,
                        "request failed, retrying: {err}"
                    );
                    continue;
                }
                Err(err) => {
                    tracing::error!(request_id = %request_id, "request failed after {attempt} attempt(s): {err}");
                    return Err(AuthzError::from(err));
                }
            };

            return self.decode(response).await;
        }
    }

    async fn decode<R: DeserializeOwned>(&self, response: reqwest::Response) -> AuthzResult<R> {
        let status = response.status();
        let bytes = response.bytes().await?;

        if let Some(decoder) = &self.decoder {
            let value = decoder(status, &bytes)?;
            return Ok(serde_json::from_value(value)?);
        }

        if status == StatusCode::NOT_FOUND {
            return Err(AuthzError::NotFound(String::from_utf8_lossy(&bytes).into_owned()));
        }
        if status == StatusCode::CONFLICT {
            return Err(AuthzError::Conflict {
                message: String::from_utf8_lossy(&bytes).into_owned(),
                existing_id: None,
            });
        }
        if !status.is_success() {
            return Err(AuthzError::Transport(format!(
                "status {status}: {}",
                String::from_utf8_lossy(&bytes)
            )));
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticToken(String);

    #[async_trait]
    impl TokenSource for StaticToken {
        async fn fetch_token(&self) -> AuthzResult<(String, Duration)> {
            Ok((self.0.clone(), Duration::from_secs(3600)))
        }
    }

    #[test]
    fn base_url_strips_trailing_slash() {
        let client = RequestClient::new(
            "https://authz.example.com/",
            None,
            HashMap::new(),
            0,
            None,
        );
        assert_eq!(
            client.url_for("/object-types"),
            "https://authz.example.com/object-types"
        );
    }

    #[tokio::test]
    async fn passthrough_auth_bypasses_token_source() {
        let client = RequestClient::new(
            "https://authz.example.com",
            Some(Arc::new(StaticToken("from-source".into()))),
            HashMap::new(),
            0,
            None,
        );
        let mut options = RequestOptions::default();
        options.passthrough_authorization = Some("caller-token".into());
        let token = client.bearer_for(&options).await.unwrap();
        assert_eq!(token, Some("caller-token".into()));
    }

    #[tokio::test]
    async fn token_source_is_consulted_and_cached() {
        let client = RequestClient::new(
            "https://authz.example.com",
            Some(Arc::new(StaticToken("from-source".into()))),
            HashMap::new(),
            0,
            None,
        );
        let options = RequestOptions::default();
        let token = client.bearer_for(&options).await.unwrap();
        assert_eq!(token, Some("from-source".into()));
    }
}
