//! Client- and cache-level configuration, following the teacher's
//! `XxxConfig` + `Default` idiom (`LockConfig`, `StrategyConfig`,
//! `EnterpriseConfig`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;

use crate::cache::provider::CacheProvider;
use crate::error::AuthzResult;
use crate::http::TokenSource;

/// A caller-supplied override for decoding HTTP response bodies, consulted
/// before the client's built-in status-code table (spec §6, §4.7).
pub type ResponseDecoder = Arc<dyn Fn(StatusCode, &[u8]) -> AuthzResult<serde_json::Value> + Send + Sync>;

/// Per-entity-kind TTLs, matching spec §3/§9 defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Identifies the tenant this cache is scoped to; becomes part of
    /// every key this client's `KeyNameProvider` builds, and the prefix a
    /// bulk `flush` is scoped to (spec §4.2, §4.3).
    pub tenant: String,
    pub object_type_ttl: Duration,
    pub edge_type_ttl: Duration,
    pub organization_ttl: Duration,
    pub object_ttl: Duration,
    pub edge_ttl: Duration,
    pub sentinel_ttl: Duration,
    pub tombstone_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tenant: "default".to_string(),
            object_type_ttl: Duration::from_secs(600),
            edge_type_ttl: Duration::from_secs(600),
            organization_ttl: Duration::from_secs(600),
            object_ttl: Duration::from_secs(300),
            edge_ttl: Duration::from_secs(30),
            sentinel_ttl: Duration::from_secs(65),
            tombstone_ttl: Duration::from_secs(5),
        }
    }
}

/// Per-call options merged onto `ClientConfig`'s defaults (spec §6).
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Return the existing entity on a conflicting create instead of an
    /// error.
    pub if_not_exists: bool,
    /// Skip the cache entirely on reads: no lookup, no read sentinel.
    pub bypass_cache: bool,
    /// Scopes the call to one organization.
    pub organization_id: Option<uuid::Uuid>,
    /// Extra headers merged onto the client's defaults for this call.
    pub headers: HashMap<String, String>,
    /// Forward the caller's own bearer token for this call instead of the
    /// client's token source; skips the startup bearer check.
    pub passthrough_authorization: Option<String>,
    /// Upper bound on wall-clock time for this call, enforced via
    /// `tokio::time::timeout` around the whole (lock, cache, HTTP, save,
    /// release) sequence.
    pub deadline: Option<Duration>,
}

/// Top-level client configuration.
pub struct ClientConfig {
    pub base_url: String,
    pub cache: CacheConfig,
    pub provider: Arc<dyn CacheProvider>,
    pub token_source: Option<Arc<dyn TokenSource>>,
    /// Headers attached to every call unless overridden per-request.
    pub default_headers: HashMap<String, String>,
    /// Network-error retry count for the request client (spec §4.7(f)).
    pub network_retries: u32,
    /// Overrides how HTTP response bodies are decoded into JSON, in place
    /// of the client's built-in status-code table (spec §6, §4.7).
    pub decoder: Option<ResponseDecoder>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, provider: Arc<dyn CacheProvider>) -> Self {
        Self {
            base_url: base_url.into(),
            cache: CacheConfig::default(),
            provider,
            token_source: None,
            default_headers: HashMap::new(),
            network_retries: 2,
            decoder: None,
        }
    }
}
