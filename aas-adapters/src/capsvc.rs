use std::sync::Arc;

use aas_common::error::AdapterError;
use aas_common::http::TokenCache;

use crate::models::Capability;

const USER_AGENT: &str = "aad-aws-sync - github.com/dfds/aad-aws-sync";

pub struct CapSvcClient {
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
    host: String,
}

impl CapSvcClient {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenCache>, host: String) -> Self {
        Self { http, tokens, host }
    }

    /// Fetches the full capability set this system is scoped to manage.
    pub async fn capabilities(&self) -> Result<Vec<Capability>, AdapterError> {
        let token = self.tokens.token().await?;
        let url = format!("{}/system/legacy/aad-aws-sync", self.host);
        let res = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(AdapterError::Api {
                status: res.status().as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }

        res.json()
            .await
            .map_err(|e| AdapterError::Other(anyhow::anyhow!("failed to parse capabilities response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn capabilities_parses_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/system/legacy/aad-aws-sync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "1", "name": "acme", "rootId": "acme", "members": [{"email": "a@internal"}], "contexts": []}
            ])))
            .mount(&server)
            .await;

        unsafe {
            std::env::set_var("AAS_CAPSVC_TOKEN", "test-token");
        }
        let tokens = TokenCache::new(
            reqwest::Client::new(),
            format!("{}/token", server.uri()),
            "client",
            "secret",
            None,
            "AAS_CAPSVC_TOKEN",
        );
        let client = CapSvcClient::new(reqwest::Client::new(), tokens, server.uri());
        let caps = client.capabilities().await.unwrap();
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].root_id, "acme");
    }
}
