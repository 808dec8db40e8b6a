use std::collections::HashSet;

use aas_adapters::directory::GraphGroup;
use aas_adapters::models::{CAP_PREFIX, Capability, group_display_name};
use aas_common::error::AdapterError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{Deps, ReconcileConfig};

pub const JOB_NAME: &str = "aadToAws";

/// Assigns every capability-backed directory group to the enterprise
/// application's "User" role, so the SCIM bridge provisions it into the
/// cloud identity store. Never removes an assignment.
///
/// Groups whose capability has no context are filtered out: this is the
/// safer of two readings that coexisted upstream, and is the one this
/// system implements.
pub async fn run(deps: &Deps, cfg: &ReconcileConfig, cancel: &CancellationToken) -> Result<(), AdapterError> {
    let capabilities = deps.capsvc.capabilities().await?;
    let groups = deps.directory.groups_by_prefix(CAP_PREFIX).await?;

    let roles = deps.directory.application_roles(&cfg.application_id).await?;
    let user_role = roles
        .iter()
        .find(|r| r.display_name.eq_ignore_ascii_case("User"))
        .ok_or_else(|| AdapterError::Other(anyhow::anyhow!("no 'User' app role on application")))?;

    let already_assigned: HashSet<String> = deps
        .directory
        .assignments_for_application(&cfg.application_object_id)
        .await?
        .into_iter()
        .map(|a| a.principal_id)
        .collect();

    let pending = capabilities_needing_assignment(&capabilities, &groups, &already_assigned);

    for (capability, group) in &pending {
        if cancel.is_cancelled() {
            info!(job_name = JOB_NAME, "job cancelled");
            return Ok(());
        }

        deps.directory
            .assign_group_to_application(&cfg.application_object_id, &group.id, &user_role.id)
            .await?;
        info!(
            job_name = JOB_NAME,
            capability_root_id = %capability.root_id,
            group_id = %group.id,
            "assigned capability group to application"
        );
    }

    let with_context = capabilities.iter().filter(|c| c.primary_context().is_some()).count();
    let skipped_no_context = capabilities.len() - with_context;
    if skipped_no_context > 0 {
        warn!(
            job_name = JOB_NAME,
            count = skipped_no_context,
            "capabilities with no context were filtered out of this pass"
        );
    }

    Ok(())
}

/// Capabilities that have a primary context (are scoped to an AWS account),
/// have a matching directory group already provisioned by SCIM, and aren't
/// yet assigned the application's "User" role.
fn capabilities_needing_assignment<'a>(
    capabilities: &'a [Capability],
    groups: &'a [GraphGroup],
    already_assigned: &HashSet<String>,
) -> Vec<(&'a Capability, &'a GraphGroup)> {
    capabilities
        .iter()
        .filter(|c| c.primary_context().is_some())
        .filter_map(|capability| {
            let display_name = group_display_name(&capability.root_id);
            // SCIM hasn't created the directory group's counterpart yet, or
            // 4.C.1 hasn't run. Nothing to assign.
            let group = groups.iter().find(|g| g.display_name == display_name)?;
            if already_assigned.contains(&group.id) {
                None
            } else {
                Some((capability, group))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aas_adapters::models::CapabilityContext;

    fn capability(root_id: &str, has_context: bool) -> Capability {
        Capability {
            id: root_id.to_string(),
            name: root_id.to_string(),
            root_id: root_id.to_string(),
            description: String::new(),
            members: vec![],
            contexts: if has_context {
                vec![CapabilityContext {
                    id: "ctx1".to_string(),
                    name: "prod".to_string(),
                    aws_account_id: "111111111111".to_string(),
                    aws_role_arn: String::new(),
                    aws_role_email: String::new(),
                }]
            } else {
                vec![]
            },
        }
    }

    fn group(root_id: &str, id: &str) -> GraphGroup {
        GraphGroup {
            id: id.to_string(),
            display_name: group_display_name(root_id),
            mail_nickname: String::new(),
        }
    }

    #[test]
    fn skips_capabilities_without_a_context() {
        let capabilities = vec![capability("acme", false)];
        let groups = vec![group("acme", "g1")];
        let pending = capabilities_needing_assignment(&capabilities, &groups, &HashSet::new());
        assert!(pending.is_empty());
    }

    #[test]
    fn skips_capabilities_with_no_matching_group_yet() {
        let capabilities = vec![capability("acme", true)];
        let pending = capabilities_needing_assignment(&capabilities, &[], &HashSet::new());
        assert!(pending.is_empty());
    }

    #[test]
    fn skips_groups_already_assigned() {
        let capabilities = vec![capability("acme", true)];
        let groups = vec![group("acme", "g1")];
        let already_assigned: HashSet<String> = ["g1".to_string()].into_iter().collect();
        let pending = capabilities_needing_assignment(&capabilities, &groups, &already_assigned);
        assert!(pending.is_empty());
    }

    #[test]
    fn includes_contextual_capability_with_unassigned_group() {
        let capabilities = vec![capability("acme", true), capability("contoso", false)];
        let groups = vec![group("acme", "g1"), group("contoso", "g2")];
        let pending = capabilities_needing_assignment(&capabilities, &groups, &HashSet::new());
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0.root_id, "acme");
        assert_eq!(pending[0].1.id, "g1");
    }
}
