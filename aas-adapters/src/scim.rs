use aas_common::error::AdapterError;
use serde::Deserialize;

const USER_AGENT: &str = "aad-aws-sync - github.com/dfds/aad-aws-sync";

/// Thin client over the cloud identity store's SCIM bridge. Used only by
/// the event-driven fast path to push a membership change directly into
/// the cloud side when both the user and the group have already been
/// provisioned there; the scheduled reconcilers never touch this, since
/// SCIM provisioning itself is the directory's job.
pub struct ScimClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScimUser {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScimGroup {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ScimListResponse<T> {
    #[serde(rename = "Resources", default)]
    resources: Vec<T>,
}

impl ScimClient {
    pub fn new(http: reqwest::Client, endpoint: String, token: String) -> Self {
        Self { http, endpoint, token }
    }

    /// Looks up a SCIM user by the directory's external id (the AAD object
    /// id). Returns `None` when the user has not yet been provisioned to
    /// the cloud side.
    pub async fn user_via_external_id(&self, external_id: &str) -> Result<Option<ScimUser>, AdapterError> {
        let url = format!("{}/Users?filter=externalId eq \"{external_id}\"", self.endpoint);
        let res = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(AdapterError::Api {
                status: res.status().as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }

        let page: ScimListResponse<ScimUser> = res
            .json()
            .await
            .map_err(|e| AdapterError::Other(anyhow::anyhow!("failed to parse SCIM user lookup: {e}")))?;
        Ok(page.resources.into_iter().next())
    }

    pub async fn group_via_display_name(&self, display_name: &str) -> Result<Option<ScimGroup>, AdapterError> {
        let url = format!("{}/Groups?filter=displayName eq \"{display_name}\"", self.endpoint);
        let res = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(AdapterError::Api {
                status: res.status().as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }

        let page: ScimListResponse<ScimGroup> = res
            .json()
            .await
            .map_err(|e| AdapterError::Other(anyhow::anyhow!("failed to parse SCIM group lookup: {e}")))?;
        Ok(page.resources.into_iter().next())
    }

    /// PATCHes `group_id`'s membership with an `add` operation for `user_id`.
    pub async fn patch_add_member_to_group(&self, group_id: &str, user_id: &str) -> Result<(), AdapterError> {
        let url = format!("{}/Groups/{group_id}", self.endpoint);
        let body = serde_json::json!({
            "schemas": ["urn:ietf:params:scim:api:messages:2.0:PatchOp"],
            "Operations": [{
                "op": "add",
                "path": "members",
                "value": [{"value": user_id}],
            }],
        });
        let res = self
            .http
            .patch(&url)
            .bearer_auth(&self.token)
            .header("User-Agent", USER_AGENT)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(AdapterError::Api {
                status: res.status().as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}
