use std::collections::{HashMap, HashSet};

use aas_adapters::models::{CAP_PREFIX, CloudAccount, CloudSsoGroup, group_display_name};
use aas_common::error::AdapterError;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{Deps, ReconcileConfig};

pub const JOB_NAME: &str = "awsMapping";

/// Assigns capability groups to their cloud account's SSO permission set,
/// and to the shared logs account's permission set.
pub async fn run(deps: &Deps, cfg: &ReconcileConfig, cancel: &CancellationToken) -> Result<(), AdapterError> {
    let accounts = deps.cloud.accounts().await?;
    let groups = deps.cloud.sso_groups().await?;
    let groups_by_display_name: HashMap<String, &CloudSsoGroup> =
        groups.iter().map(|g| (g.display_name.clone(), g)).collect();

    let provisioned: HashSet<String> = deps
        .cloud
        .accounts_with_permission_set(&cfg.capability_permission_set_arn)
        .await?
        .into_iter()
        .collect();

    let needs_capability_assignment =
        accounts_needing_assignment(&accounts, &groups_by_display_name, &provisioned, &cfg.account_name_prefix);

    for (account, root_id, group) in &needs_capability_assignment {
        if cancel.is_cancelled() {
            info!(job_name = JOB_NAME, "job cancelled");
            return Ok(());
        }

        deps.cloud
            .create_account_assignment(&account.id, &cfg.capability_permission_set_arn, &group.id)
            .await?;
        info!(
            job_name = JOB_NAME,
            capability_root_id = %root_id,
            account_id = %account.id,
            "assigned capability permission set"
        );
    }

    // Shared logs account: every capability group gets the logs permission
    // set too, regardless of whether its own account already has the
    // capability permission set.
    let Some(logs_account) = accounts
        .iter()
        .find(|a| a.name == cfg.capability_logs_aws_account_alias)
    else {
        return Err(AdapterError::Other(anyhow::anyhow!(
            "logs account alias {} not found",
            cfg.capability_logs_aws_account_alias
        )));
    };

    let logs_assigned_groups: HashSet<String> = deps
        .cloud
        .groups_assigned_to_account_with_permission_set(&logs_account.id, &cfg.capability_logs_permission_set_arn)
        .await?
        .into_iter()
        .collect();

    for group in groups_needing_logs_assignment(&groups, &logs_assigned_groups) {
        if cancel.is_cancelled() {
            info!(job_name = JOB_NAME, "job cancelled");
            return Ok(());
        }

        deps.cloud
            .create_account_assignment(&logs_account.id, &cfg.capability_logs_permission_set_arn, &group.id)
            .await?;
        info!(
            job_name = JOB_NAME,
            group_id = %group.id,
            "assigned capability group to logs account permission set"
        );
    }

    Ok(())
}

/// Accounts not yet carrying the capability permission set, paired with
/// the root id and cloud SSO group their capability maps to. Accounts
/// whose group SCIM hasn't propagated yet are left out.
fn accounts_needing_assignment<'a>(
    accounts: &'a [CloudAccount],
    groups_by_display_name: &HashMap<String, &'a CloudSsoGroup>,
    provisioned: &HashSet<String>,
    account_name_prefix: &str,
) -> Vec<(&'a CloudAccount, String, &'a CloudSsoGroup)> {
    accounts
        .iter()
        .filter(|account| !provisioned.contains(&account.id))
        .filter_map(|account| {
            let root_id = account.root_id(account_name_prefix);
            let group = *groups_by_display_name.get(&group_display_name(&root_id))?;
            Some((account, root_id, group))
        })
        .collect()
}

/// Capability-prefixed cloud SSO groups not yet assigned the logs
/// account's permission set.
fn groups_needing_logs_assignment<'a>(
    groups: &'a [CloudSsoGroup],
    logs_assigned_groups: &HashSet<String>,
) -> Vec<&'a CloudSsoGroup> {
    groups
        .iter()
        .filter(|g| g.display_name.starts_with(CAP_PREFIX))
        .filter(|g| !logs_assigned_groups.contains(&g.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str, name: &str) -> CloudAccount {
        CloudAccount {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    fn group(id: &str, display_name: &str) -> CloudSsoGroup {
        CloudSsoGroup {
            id: id.to_string(),
            display_name: display_name.to_string(),
        }
    }

    #[test]
    fn accounts_needing_assignment_skips_already_provisioned() {
        let accounts = vec![account("1", "aws-acme")];
        let groups = vec![group("g1", &group_display_name("acme"))];
        let by_name: HashMap<String, &CloudSsoGroup> = groups.iter().map(|g| (g.display_name.clone(), g)).collect();
        let provisioned: HashSet<String> = ["1".to_string()].into_iter().collect();

        let pending = accounts_needing_assignment(&accounts, &by_name, &provisioned, "aws-");
        assert!(pending.is_empty());
    }

    #[test]
    fn accounts_needing_assignment_skips_accounts_with_no_propagated_group() {
        let accounts = vec![account("1", "aws-acme")];
        let by_name: HashMap<String, &CloudSsoGroup> = HashMap::new();

        let pending = accounts_needing_assignment(&accounts, &by_name, &HashSet::new(), "aws-");
        assert!(pending.is_empty());
    }

    #[test]
    fn accounts_needing_assignment_includes_unprovisioned_account_with_group() {
        let accounts = vec![account("1", "aws-acme"), account("2", "aws-contoso")];
        let groups = vec![group("g1", &group_display_name("acme"))];
        let by_name: HashMap<String, &CloudSsoGroup> = groups.iter().map(|g| (g.display_name.clone(), g)).collect();

        let pending = accounts_needing_assignment(&accounts, &by_name, &HashSet::new(), "aws-");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0.id, "1");
        assert_eq!(pending[0].1, "acme");
        assert_eq!(pending[0].2.id, "g1");
    }

    #[test]
    fn groups_needing_logs_assignment_filters_by_prefix_and_existing_assignment() {
        let groups = vec![
            group("g1", &group_display_name("acme")),
            group("g2", "Some Other Group"),
            group("g3", &group_display_name("contoso")),
        ];
        let already: HashSet<String> = ["g3".to_string()].into_iter().collect();

        let pending = groups_needing_logs_assignment(&groups, &already);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "g1");
    }
}
