use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::AdapterError;

/// Builds a `reqwest::Client` with connection keep-alive disabled.
///
/// Mirrors the upstream's `CreateHttpClientWithoutKeepAlive` helper, used
/// for SDK clients that fan out many short-lived cross-account requests
/// (STS role assumption in particular) where a pooled idle connection buys
/// nothing and keeping one alive just wastes a file descriptor.
pub fn client_without_keepalive() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .expect("static reqwest client config is always valid")
}

#[derive(Debug, Clone, Deserialize, Default)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// OAuth2 client-credentials token cache.
///
/// A single in-flight refresh is serialized by the mutex: if several
/// callers observe an expired token at once, only the first actually hits
/// the token endpoint, and the rest reuse whatever it produced.
pub struct TokenCache {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: Option<String>,
    env_override: Option<String>,
    cached: Mutex<Option<CachedToken>>,
}

/// Subtracted from the server-reported expiry so that a token is never
/// handed out with only a few seconds of life left on it.
const EXPIRY_SKEW: Duration = Duration::from_secs(30);

impl TokenCache {
    /// `env_override_var` names the env var that, when set, installs a
    /// pre-acquired bearer token and bypasses the client-credentials flow
    /// entirely (`AAS_AZURE_TOKEN` for the directory adapter,
    /// `AAS_CAPSVC_TOKEN` for the capability-service adapter).
    pub fn new(
        client: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: Option<String>,
        env_override_var: &str,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope,
            env_override: std::env::var(env_override_var).ok(),
            cached: Mutex::new(None),
        })
    }

    /// Returns a currently-valid bearer token, refreshing via the
    /// client-credentials grant if the cached one is absent or expired.
    pub async fn token(&self) -> Result<String, AdapterError> {
        if let Some(token) = &self.env_override {
            return Ok(token.clone());
        }

        let mut guard = self.cached.lock().await;
        if let Some(cached) = guard.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.access_token.clone());
            }
        }

        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.as_str()));
        }

        let res = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(AdapterError::Auth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = res
            .json()
            .await
            .map_err(|e| AdapterError::Auth(format!("failed to parse token response: {e}")))?;

        if token.access_token.is_empty() {
            return Err(AdapterError::Auth("empty access_token in response".into()));
        }

        let ttl = Duration::from_secs(token.expires_in.unwrap_or(3600));
        let expires_at = Instant::now() + ttl.saturating_sub(EXPIRY_SKEW);

        *guard = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });

        Ok(token.access_token)
    }
}

/// A page of results plus an optional link to the next page, as returned
/// by Microsoft Graph's `@odata.nextLink` convention.
pub trait Page<Item> {
    fn next_link(&self) -> Option<&str>;
    fn into_items(self) -> Vec<Item>;
}

/// Follows `@odata.nextLink` until exhausted, flattening every page's
/// items into a single ordered vector. Order of first appearance across
/// pages is preserved.
pub async fn paginate<T, P, F, Fut>(mut fetch: F, mut url: String) -> Result<Vec<T>, AdapterError>
where
    P: Page<T>,
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = Result<P, AdapterError>>,
{
    let mut items = Vec::new();
    loop {
        let page = fetch(url).await?;
        let next = page.next_link().map(|s| s.to_string());
        items.extend(page.into_items());
        match next {
            Some(link) => url = link,
            None => break,
        }
    }
    Ok(items)
}
