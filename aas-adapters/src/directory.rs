use std::sync::Arc;

use aas_common::error::AdapterError;
use aas_common::http::{Page, TokenCache, paginate};
use serde::Deserialize;

use crate::models::DirectoryUser;

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
const USER_AGENT: &str = "aad-aws-sync - github.com/dfds/aad-aws-sync";

pub struct DirectoryClient {
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
    internal_domain_suffix: String,
    base: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GroupsPage {
    value: Vec<GraphGroup>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

impl Page<GraphGroup> for GroupsPage {
    fn next_link(&self) -> Option<&str> {
        self.next_link.as_deref()
    }
    fn into_items(self) -> Vec<GraphGroup> {
        self.value
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GraphGroup {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "mailNickname", default)]
    pub mail_nickname: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GraphUser {
    id: String,
    #[serde(rename = "userPrincipalName")]
    user_principal_name: String,
    #[serde(default)]
    mail: Option<String>,
    #[serde(rename = "displayName", default)]
    display_name: String,
}

impl From<GraphUser> for DirectoryUser {
    fn from(u: GraphUser) -> Self {
        DirectoryUser {
            id: u.id,
            mail: u.mail.unwrap_or_default(),
            user_principal_name: u.user_principal_name,
            display_name: u.display_name,
        }
    }
}

impl DirectoryClient {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenCache>, internal_domain_suffix: String) -> Self {
        Self {
            http,
            tokens,
            internal_domain_suffix,
            base: GRAPH_BASE.to_string(),
        }
    }

    /// Builds a client pointed at an arbitrary base URL instead of Graph's
    /// production endpoint. Exists for wiring a fake/mock backend in tests,
    /// including tests in other workspace crates that exercise a reconciler
    /// end to end against this adapter.
    pub fn with_base(http: reqwest::Client, tokens: Arc<TokenCache>, internal_domain_suffix: String, base: String) -> Self {
        Self {
            http,
            tokens,
            internal_domain_suffix,
            base,
        }
    }

    async fn bearer(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, AdapterError> {
        let token = self.tokens.token().await?;
        Ok(builder.bearer_auth(token).header("User-Agent", USER_AGENT))
    }

    /// True when `upn` belongs to an external tenant (guest) account, by
    /// the configured internal domain suffix.
    pub fn is_external(&self, upn: &str) -> bool {
        !upn.ends_with(&self.internal_domain_suffix)
    }

    /// Returns every group whose display name starts with `prefix`,
    /// following `@odata.nextLink` until exhausted.
    pub async fn groups_by_prefix(&self, prefix: &str) -> Result<Vec<GraphGroup>, AdapterError> {
        let base = &self.base;
        let url = format!(
            "{base}/groups?$filter=startswith(displayName,'{prefix}')",
        );
        paginate(
            |url| async move {
                let req = self.bearer(self.http.get(&url)).await?;
                fetch_groups_page(req).await
            },
            url,
        )
        .await
    }

    pub async fn administrative_units(&self, display_name_filter: &str) -> Result<Vec<GraphGroup>, AdapterError> {
        let base = &self.base;
        let url = format!(
            "{base}/directory/administrativeUnits?$filter=startswith(displayName,'{display_name_filter}')",
        );
        let req = self.bearer(self.http.get(&url)).await?;
        let page = fetch_groups_page(req).await?;
        Ok(page.value)
    }

    /// Creates a group as a member of the given administrative unit,
    /// binding its lifecycle to that AU.
    pub async fn create_administrative_unit_group(
        &self,
        au_id: &str,
        display_name: &str,
        mail_nickname: &str,
    ) -> Result<GraphGroup, AdapterError> {
        let base = &self.base;
        let url = format!("{base}/directory/administrativeUnits/{au_id}/members");
        let body = serde_json::json!({
            "@odata.type": "#Microsoft.Graph.Group",
            "description": "[Automated] - aad-aws-sync",
            "displayName": display_name,
            "mailNickname": mail_nickname,
            "groupTypes": [],
            "mailEnabled": false,
            "securityEnabled": true,
        });
        let req = self.bearer(self.http.post(&url).json(&body)).await?;
        let res = req.send().await?;

        if res.status() != reqwest::StatusCode::CREATED {
            return Err(AdapterError::Api {
                status: res.status().as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }

        res.json().await.map_err(|e| {
            AdapterError::Other(anyhow::anyhow!("failed to parse created group: {e}"))
        })
    }

    pub async fn group_members(&self, group_id: &str) -> Result<Vec<DirectoryUser>, AdapterError> {
        let base = &self.base;
        let url = format!("{base}/groups/{group_id}/members");
        let req = self.bearer(self.http.get(&url)).await?;
        let res = req.send().await?;
        if !res.status().is_success() {
            return Err(AdapterError::Api {
                status: res.status().as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }
        #[derive(Deserialize)]
        struct MembersPage {
            value: Vec<GraphUser>,
        }
        let page: MembersPage = res
            .json()
            .await
            .map_err(|e| AdapterError::Other(anyhow::anyhow!("failed to parse group members: {e}")))?;
        Ok(page.value.into_iter().map(Into::into).collect())
    }

    /// Looks up a directory user by email (mail or UPN), needed to
    /// translate an external member's capability-service email into the
    /// guest UPN the directory actually uses.
    pub async fn user_by_email(&self, email: &str) -> Result<Option<DirectoryUser>, AdapterError> {
        let base = &self.base;
        let url = format!("{base}/users?$filter=mail eq '{email}' or userPrincipalName eq '{email}'");
        let req = self.bearer(self.http.get(&url)).await?;
        let res = req.send().await?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            return Err(AdapterError::Api {
                status: res.status().as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }
        #[derive(Deserialize)]
        struct UsersPage {
            value: Vec<GraphUser>,
        }
        let page: UsersPage = res
            .json()
            .await
            .map_err(|e| AdapterError::Other(anyhow::anyhow!("failed to parse user lookup: {e}")))?;
        Ok(page.value.into_iter().next().map(Into::into))
    }

    /// Adds `upn` to `group_id` by reference. Swallows `404` (user not
    /// found) and `403` (forbidden) per the documented error taxonomy;
    /// every other non-success status bubbles.
    pub async fn add_group_member(&self, group_id: &str, upn: &str) -> Result<(), AdapterError> {
        let base = &self.base;
        let url = format!("{base}/groups/{group_id}/members/$ref");
        let body = serde_json::json!({
            "@odata.id": format!("https://graph.microsoft.com/v1.0/users/{upn}"),
        });
        let req = self.bearer(self.http.post(&url).json(&body)).await?;
        let res = req.send().await?;

        match res.status() {
            reqwest::StatusCode::NO_CONTENT => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Err(AdapterError::UserNotFound(upn.to_string())),
            reqwest::StatusCode::FORBIDDEN => Err(AdapterError::Forbidden(upn.to_string())),
            status => Err(AdapterError::Api {
                status: status.as_u16(),
                body: res.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Removes `user_id` from `group_id`. Same swallow contract as add.
    pub async fn remove_group_member(&self, group_id: &str, user_id: &str) -> Result<(), AdapterError> {
        let base = &self.base;
        let url = format!("{base}/groups/{group_id}/members/{user_id}/$ref");
        let req = self.bearer(self.http.delete(&url)).await?;
        let res = req.send().await?;

        match res.status() {
            reqwest::StatusCode::NO_CONTENT => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Err(AdapterError::UserNotFound(user_id.to_string())),
            reqwest::StatusCode::FORBIDDEN => Err(AdapterError::Forbidden(user_id.to_string())),
            status => Err(AdapterError::Api {
                status: status.as_u16(),
                body: res.text().await.unwrap_or_default(),
            }),
        }
    }

    pub async fn application_roles(&self, app_id: &str) -> Result<Vec<ApplicationRole>, AdapterError> {
        let base = &self.base;
        let url = format!("{base}/applications/{app_id}/appRoles");
        let req = self.bearer(self.http.get(&url)).await?;
        let res = req.send().await?;
        if !res.status().is_success() {
            return Err(AdapterError::Api {
                status: res.status().as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }
        #[derive(Deserialize)]
        struct RolesPage {
            value: Vec<ApplicationRole>,
        }
        let page: RolesPage = res
            .json()
            .await
            .map_err(|e| AdapterError::Other(anyhow::anyhow!("failed to parse app roles: {e}")))?;
        Ok(page.value)
    }

    pub async fn assignments_for_application(&self, app_object_id: &str) -> Result<Vec<AppRoleAssignment>, AdapterError> {
        let base = &self.base;
        let url = format!("{base}/servicePrincipals/{app_object_id}/appRoleAssignedTo");
        let req = self.bearer(self.http.get(&url)).await?;
        let res = req.send().await?;
        if !res.status().is_success() {
            return Err(AdapterError::Api {
                status: res.status().as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }
        #[derive(Deserialize)]
        struct AssignmentsPage {
            value: Vec<AppRoleAssignment>,
        }
        let page: AssignmentsPage = res
            .json()
            .await
            .map_err(|e| AdapterError::Other(anyhow::anyhow!("failed to parse assignments: {e}")))?;
        Ok(page.value)
    }

    /// Assigns `group_id` the app role `role_id` on `app_object_id`.
    pub async fn assign_group_to_application(
        &self,
        app_object_id: &str,
        group_id: &str,
        role_id: &str,
    ) -> Result<(), AdapterError> {
        let base = &self.base;
        let url = format!("{base}/servicePrincipals/{app_object_id}/appRoleAssignedTo");
        let body = serde_json::json!({
            "principalId": group_id,
            "resourceId": app_object_id,
            "appRoleId": role_id,
        });
        let req = self.bearer(self.http.post(&url).json(&body)).await?;
        let res = req.send().await?;
        if !res.status().is_success() {
            return Err(AdapterError::Api {
                status: res.status().as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationRole {
    pub id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppRoleAssignment {
    pub id: String,
    #[serde(rename = "principalId")]
    pub principal_id: String,
    #[serde(rename = "principalDisplayName", default)]
    pub principal_display_name: String,
}

async fn fetch_groups_page(builder: reqwest::RequestBuilder) -> Result<GroupsPage, AdapterError> {
    let res = builder.send().await?;
    if !res.status().is_success() {
        return Err(AdapterError::Api {
            status: res.status().as_u16(),
            body: res.text().await.unwrap_or_default(),
        });
    }
    res.json()
        .await
        .map_err(|e| AdapterError::Other(anyhow::anyhow!("failed to parse groups page: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> DirectoryClient {
        unsafe {
            std::env::set_var("AAS_AZURE_TOKEN_DIRECTORY_TEST", "test-token");
        }
        let tokens = TokenCache::new(
            reqwest::Client::new(),
            format!("{}/token", server.uri()),
            "client",
            "secret",
            None,
            "AAS_AZURE_TOKEN_DIRECTORY_TEST",
        );
        DirectoryClient::with_base(
            reqwest::Client::new(),
            tokens,
            "internal.example.com".to_string(),
            server.uri(),
        )
    }

    #[tokio::test]
    async fn groups_by_prefix_follows_next_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/groups"))
            .and(query_param("$filter", "startswith(displayName,'CI_SSU_Cap -')"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"id": "g1", "displayName": "CI_SSU_Cap - acme", "mailNickname": "ci-ssu_cap_acme"}],
                "@odata.nextLink": format!("{}/groups/page2", server.uri()),
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/groups/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"id": "g2", "displayName": "CI_SSU_Cap - contoso", "mailNickname": "ci-ssu_cap_contoso"}],
            })))
            .mount(&server)
            .await;

        let directory = client(&server).await;
        let groups = directory.groups_by_prefix("CI_SSU_Cap -").await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].id, "g1");
        assert_eq!(groups[1].id, "g2");
    }

    #[tokio::test]
    async fn add_group_member_swallows_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/groups/g1/members/$ref"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let directory = client(&server).await;
        let err = directory.add_group_member("g1", "user@internal.example.com").await.unwrap_err();
        assert!(matches!(err, AdapterError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn user_by_email_returns_none_on_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let directory = client(&server).await;
        let found = directory.user_by_email("nobody@example.com").await.unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn is_external_checks_domain_suffix() {
        let directory = DirectoryClient::new(reqwest::Client::new(), TokenCache::new(
            reqwest::Client::new(),
            "https://example.com/token".to_string(),
            "id",
            "secret",
            None,
            "AAS_AZURE_TOKEN_UNUSED_VAR",
        ), "internal.example.com".to_string());
        assert!(!directory.is_external("user@internal.example.com"));
        assert!(directory.is_external("guest@external.example.com"));
    }
}
