use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use aas_adapters::directory::DirectoryClient;
use aas_adapters::models::{group_display_name, group_mail_nickname};
use aas_common::error::AdapterError;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{Deps, ReconcileConfig, fan_out_semaphore};

pub const JOB_NAME: &str = "capSvcToAad";
const FAN_OUT_PERMITS: usize = 50;

/// Reconciles capability membership into directory groups: creates a
/// group per capability if missing, adds members present in the
/// capability but absent from the group, and removes group members no
/// longer present in the capability.
///
/// The internal/external dichotomy is the one subtle invariant here: an
/// internal member's email *is* its UPN, but an external (guest) member's
/// UPN must be resolved from the directory, and on the removal side the
/// translation runs in reverse (UPN -> mail) so the comparison is always
/// done on the capability-service's email identity.
pub async fn run(deps: &Deps, cfg: &ReconcileConfig, cancel: &CancellationToken) -> Result<(), AdapterError> {
    let capabilities = deps.capsvc.capabilities().await?;
    let au = deps
        .directory
        .administrative_units(&cfg.au_name)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AdapterError::Other(anyhow::anyhow!("administrative unit {} not found", cfg.au_name)))?;

    let groups = deps.directory.groups_by_prefix(aas_adapters::models::CAP_PREFIX).await?;
    let mut groups_by_display_name: HashMap<String, aas_adapters::directory::GraphGroup> = HashMap::new();
    for g in groups {
        groups_by_display_name.entry(g.display_name.clone()).or_insert(g);
    }

    let mut seen_root_ids: HashSet<String> = HashSet::new();

    for capability in &capabilities {
        if cancel.is_cancelled() {
            info!(job_name = JOB_NAME, "job cancelled");
            return Ok(());
        }

        if !seen_root_ids.insert(capability.root_id.clone()) {
            warn!(
                job_name = JOB_NAME,
                capability_root_id = %capability.root_id,
                "duplicate capability rootId, first one wins, skipping"
            );
            continue;
        }

        let display_name = group_display_name(&capability.root_id);

        let group = match groups_by_display_name.get(&display_name) {
            Some(g) => g.clone(),
            None => {
                let created = deps
                    .directory
                    .create_administrative_unit_group(
                        &au.id,
                        &display_name,
                        &group_mail_nickname(&capability.root_id),
                    )
                    .await?;
                info!(
                    job_name = JOB_NAME,
                    capability_root_id = %capability.root_id,
                    group_id = %created.id,
                    "created directory group for capability"
                );
                created
            }
        };

        let existing_members = deps.directory.group_members(&group.id).await?;
        let existing_by_upn: HashMap<String, _> = existing_members
            .iter()
            .map(|m| (m.user_principal_name.clone(), m.clone()))
            .collect();

        let mut wanted_upns: HashSet<String> = HashSet::new();
        let mut additions = Vec::new();
        for member in &capability.members {
            let upn = resolve_upn(&deps.directory, &member.email).await?;
            wanted_upns.insert(upn.clone());
            if !existing_by_upn.contains_key(&upn) {
                additions.push(upn);
            }
        }

        apply_additions(&deps.directory, &group.id, additions, cancel).await;

        let mut removals = Vec::new();
        for member in &existing_members {
            let email = resolve_email(&deps.directory, member).await?;
            let still_wanted = capability
                .members
                .iter()
                .any(|m| m.email.eq_ignore_ascii_case(&email));
            if !still_wanted {
                removals.push(member.id.clone());
            }
        }
        let _ = wanted_upns;

        apply_removals(&deps.directory, &group.id, removals, cancel).await;
    }

    Ok(())
}

async fn resolve_upn(directory: &DirectoryClient, email: &str) -> Result<String, AdapterError> {
    if directory.is_external(email) {
        match directory.user_by_email(email).await? {
            Some(user) => Ok(user.user_principal_name),
            None => Err(AdapterError::UserNotFound(email.to_string())),
        }
    } else {
        Ok(email.to_string())
    }
}

async fn resolve_email(
    directory: &DirectoryClient,
    member: &aas_adapters::models::DirectoryUser,
) -> Result<String, AdapterError> {
    if directory.is_external(&member.user_principal_name) {
        match directory.user_by_email(&member.user_principal_name).await? {
            Some(user) => Ok(user.mail),
            None => Ok(member.mail.clone()),
        }
    } else {
        Ok(member.user_principal_name.clone())
    }
}

async fn apply_additions(directory: &Arc<DirectoryClient>, group_id: &str, upns: Vec<String>, cancel: &CancellationToken) {
    let semaphore = fan_out_semaphore(FAN_OUT_PERMITS);
    let mut tasks = FuturesUnordered::new();

    for upn in upns {
        if cancel.is_cancelled() {
            break;
        }
        let semaphore = semaphore.clone();
        let group_id = group_id.to_string();
        let directory = directory.clone();
        tasks.push(async move {
            let _permit = semaphore.acquire_owned().await;
            (upn.clone(), directory.add_group_member(&group_id, &upn).await)
        });
    }

    while let Some((upn, result)) = tasks.next().await {
        match result {
            Ok(()) => {}
            Err(AdapterError::UserNotFound(_)) => {
                warn!(job_name = JOB_NAME, %upn, "member not found while adding, swallowed");
            }
            Err(AdapterError::Forbidden(_)) => {
                warn!(job_name = JOB_NAME, %upn, "forbidden while adding member, swallowed");
            }
            Err(e) => {
                warn!(job_name = JOB_NAME, %upn, error = %e, "failed to add member");
            }
        }
    }
}

async fn apply_removals(directory: &Arc<DirectoryClient>, group_id: &str, user_ids: Vec<String>, cancel: &CancellationToken) {
    let semaphore = fan_out_semaphore(FAN_OUT_PERMITS);
    let mut tasks = FuturesUnordered::new();

    for user_id in user_ids {
        if cancel.is_cancelled() {
            break;
        }
        let semaphore = semaphore.clone();
        let group_id = group_id.to_string();
        let directory = directory.clone();
        tasks.push(async move {
            let _permit = semaphore.acquire_owned().await;
            (user_id.clone(), directory.remove_group_member(&group_id, &user_id).await)
        });
    }

    while let Some((user_id, result)) = tasks.next().await {
        match result {
            Ok(()) => {}
            Err(AdapterError::UserNotFound(_)) => {
                warn!(job_name = JOB_NAME, %user_id, "member already gone while removing, swallowed");
            }
            Err(AdapterError::Forbidden(_)) => {
                warn!(job_name = JOB_NAME, %user_id, "forbidden while removing member, swallowed");
            }
            Err(e) => {
                warn!(job_name = JOB_NAME, %user_id, error = %e, "failed to remove member");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aas_adapters::models::DirectoryUser;
    use aas_common::http::TokenCache;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn directory(server: &MockServer) -> Arc<DirectoryClient> {
        unsafe {
            std::env::set_var("AAS_CAPSVC_TO_DIRECTORY_TEST_TOKEN", "test-token");
        }
        let tokens = TokenCache::new(
            reqwest::Client::new(),
            format!("{}/token", server.uri()),
            "client",
            "secret",
            None,
            "AAS_CAPSVC_TO_DIRECTORY_TEST_TOKEN",
        );
        Arc::new(DirectoryClient::with_base(
            reqwest::Client::new(),
            tokens,
            "internal.example.com".to_string(),
            server.uri(),
        ))
    }

    fn user(upn: &str, mail: &str) -> DirectoryUser {
        DirectoryUser {
            id: upn.to_string(),
            user_principal_name: upn.to_string(),
            mail: mail.to_string(),
            display_name: String::new(),
        }
    }

    #[tokio::test]
    async fn resolve_upn_passes_internal_email_through_unchanged() {
        let server = MockServer::start().await;
        let directory = directory(&server).await;
        let upn = resolve_upn(&directory, "alice@internal.example.com").await.unwrap();
        assert_eq!(upn, "alice@internal.example.com");
    }

    #[tokio::test]
    async fn resolve_upn_looks_up_guest_upn_for_external_email() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"id": "u1", "userPrincipalName": "bob_contoso.com#EXT#@tenant.onmicrosoft.com", "mail": "bob@contoso.com"}]
            })))
            .mount(&server)
            .await;

        let directory = directory(&server).await;
        let upn = resolve_upn(&directory, "bob@contoso.com").await.unwrap();
        assert_eq!(upn, "bob_contoso.com#EXT#@tenant.onmicrosoft.com");
    }

    #[tokio::test]
    async fn resolve_upn_errors_when_external_email_unresolvable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": []})))
            .mount(&server)
            .await;

        let directory = directory(&server).await;
        let err = resolve_upn(&directory, "ghost@contoso.com").await.unwrap_err();
        assert!(matches!(err, AdapterError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn resolve_email_passes_internal_upn_through_unchanged() {
        let server = MockServer::start().await;
        let directory = directory(&server).await;
        let member = user("alice@internal.example.com", "alice@internal.example.com");
        let email = resolve_email(&directory, &member).await.unwrap();
        assert_eq!(email, "alice@internal.example.com");
    }

    #[tokio::test]
    async fn resolve_email_reverse_translates_guest_upn_to_mail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"id": "u1", "userPrincipalName": "bob_contoso.com#EXT#@tenant.onmicrosoft.com", "mail": "bob@contoso.com"}]
            })))
            .mount(&server)
            .await;

        let directory = directory(&server).await;
        let member = user("bob_contoso.com#EXT#@tenant.onmicrosoft.com", "stale@contoso.com");
        let email = resolve_email(&directory, &member).await.unwrap();
        assert_eq!(email, "bob@contoso.com");
    }

    #[tokio::test]
    async fn apply_additions_swallows_not_found_and_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/groups/g1/members/$ref"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let directory = directory(&server).await;
        let cancel = CancellationToken::new();
        apply_additions(&directory, "g1", vec!["gone@internal.example.com".to_string()], &cancel).await;
    }

    #[tokio::test]
    async fn apply_removals_swallows_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/groups/g1/members/u1/$ref"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let directory = directory(&server).await;
        let cancel = CancellationToken::new();
        apply_removals(&directory, "g1", vec!["u1".to_string()], &cancel).await;
    }
}
