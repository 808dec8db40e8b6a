use std::sync::Arc;

use aas_adapters::capsvc::CapSvcClient;
use aas_adapters::directory::DirectoryClient;
use aas_adapters::models::{group_display_name, group_mail_nickname};
use aas_adapters::scim::ScimClient;
use aas_common::error::AdapterError;
use tracing::{info, warn};

use crate::messages::{
    AzureAdGroupCreatedBody, CapabilityCreatedMessage, MemberJoinedMessage, MemberLeftMessage,
};

/// Deps a handler needs. Threaded explicitly rather than carried on the
/// message's context value, per the orchestrator-wide replacement of
/// context-carried adapters with an explicit struct.
pub struct HandlerDeps {
    pub directory: Arc<DirectoryClient>,
    pub capsvc: Arc<CapSvcClient>,
    pub scim: Arc<ScimClient>,
    pub au_name: String,
}

/// Result of a successfully-handled `capability_created` event: the
/// caller (the router) is responsible for producing this on the result
/// topic before committing the source offset.
pub struct CapabilityCreatedOutcome {
    pub group_id: String,
    pub body: AzureAdGroupCreatedBody,
}

/// Creates the AU-scoped directory group for a newly-created capability.
/// Mail nickname is deterministic from the capability id, so a retried
/// delivery of the same event converges rather than duplicating groups
/// (best-effort: Graph itself is not asked to dedupe on nickname here).
pub async fn capability_created(
    deps: &HandlerDeps,
    msg: &CapabilityCreatedMessage,
) -> Result<CapabilityCreatedOutcome, AdapterError> {
    let root_id = &msg.payload.capability_id;
    let au = deps
        .directory
        .administrative_units(&deps.au_name)
        .await?
        .into_iter()
        .find(|au| au.display_name == deps.au_name)
        .ok_or_else(|| AdapterError::Other(anyhow::anyhow!("administrative unit {} not found", deps.au_name)))?;

    let group = deps
        .directory
        .create_administrative_unit_group(
            &au.id,
            &group_display_name(root_id),
            &group_mail_nickname(root_id),
        )
        .await?;

    info!(capability_id = %root_id, group_id = %group.id, "created directory group for capability");

    Ok(CapabilityCreatedOutcome {
        group_id: group.id.clone(),
        body: AzureAdGroupCreatedBody {
            capability_name: msg.payload.capability_name.clone(),
            azure_ad_group_id: group.id,
        },
    })
}

/// Adds the joining member's UPN to the capability's managed directory
/// group, then best-effort pushes the membership straight into the cloud
/// identity store via SCIM if both sides are already provisioned there.
pub async fn member_joined_capability(
    deps: &HandlerDeps,
    msg: &MemberJoinedMessage,
) -> Result<(), AdapterError> {
    let capability_id = &msg.payload.capability_id;
    let user_upn = &msg.payload.user_id;

    let capability = deps
        .capsvc
        .capabilities()
        .await?
        .into_iter()
        .find(|c| &c.id == capability_id)
        .ok_or_else(|| AdapterError::Other(anyhow::anyhow!("capability from event not found in capability service")))?;

    let group_name = group_display_name(&capability.root_id);
    let group = find_managed_group(deps, &group_name).await?;

    deps.directory.add_group_member(&group.id, user_upn).await?;
    info!(capability_root_id = %capability.root_id, user = %user_upn, "added member to directory group");

    let Some(aad_user) = deps.directory.user_by_email(user_upn).await? else {
        info!(user = %user_upn, "user not found in directory after add, skipping direct cloud provisioning");
        return Ok(());
    };

    let Some(scim_user) = deps.scim.user_via_external_id(&aad_user.id).await? else {
        info!(user = %user_upn, "user not yet provisioned to cloud, letting directory provisioning catch up");
        return Ok(());
    };

    let Some(scim_group) = deps.scim.group_via_display_name(&group_name).await? else {
        info!(group = %group_name, "group not yet provisioned to cloud, letting directory provisioning catch up");
        return Ok(());
    };

    deps.scim.patch_add_member_to_group(&scim_group.id, &scim_user.id).await?;
    info!(capability_root_id = %capability.root_id, user = %user_upn, "pushed membership directly to cloud via SCIM");
    Ok(())
}

/// Resolves the capability, locates its managed group, resolves the
/// leaving member's UPN to a directory id, and removes it.
pub async fn member_left_capability(
    deps: &HandlerDeps,
    msg: &MemberLeftMessage,
) -> Result<(), AdapterError> {
    let capability_id = &msg.payload.capability_id;
    let member_email = &msg.payload.member_email;

    let capability = deps
        .capsvc
        .capabilities()
        .await?
        .into_iter()
        .find(|c| &c.id == capability_id)
        .ok_or_else(|| AdapterError::Other(anyhow::anyhow!("capability from event not found in capability service")))?;

    let group_name = group_display_name(&capability.root_id);
    let group = find_managed_group(deps, &group_name).await?;

    let Some(aad_user) = deps.directory.user_by_email(member_email).await? else {
        warn!(user = %member_email, "user not found in directory, nothing to remove");
        return Ok(());
    };

    deps.directory.remove_group_member(&group.id, &aad_user.id).await?;
    info!(capability_root_id = %capability.root_id, user = %member_email, "removed member from directory group");
    Ok(())
}

/// Locates the capability's directory group among the administrative
/// unit's member groups by display name. The AU holds every
/// managed capability group as a member, mirroring the upstream's
/// `GetAdministrativeUnitMembers` + in-memory name index.
async fn find_managed_group(
    deps: &HandlerDeps,
    group_name: &str,
) -> Result<aas_adapters::directory::GraphGroup, AdapterError> {
    deps.directory
        .groups_by_prefix(aas_adapters::models::CAP_PREFIX)
        .await?
        .into_iter()
        .find(|g| g.display_name == group_name)
        .ok_or_else(|| {
            AdapterError::Other(anyhow::anyhow!("capability group {group_name} does not exist, unable to update membership"))
        })
}
