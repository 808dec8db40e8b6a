use std::collections::HashMap;

use aas_adapters::cloud::SsoRoleFinder;
use aas_adapters::models::{CLUSTER_READONLY_GROUP, MANAGED_BY, ClusterRoleMapping, cluster_username};
use aas_common::error::AdapterError;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{Deps, ReconcileConfig};

pub const JOB_NAME: &str = "awsToK8s";

/// Target role mapping the SSO layer expects for one account.
struct Target {
    account_id: String,
    role_arn: String,
    root_id: String,
}

/// Reconciles the cluster's `aws-auth` ConfigMap against the current
/// SSO-materialised capability-access roles: prunes owned mappings with
/// no corresponding live role, then upserts a mapping for every live
/// role, correcting drifted `username`/`groups` fields.
pub async fn run(
    deps: &Deps,
    cfg: &ReconcileConfig,
    role_finder: &SsoRoleFinder,
    assumable_role_per_account: impl Fn(&str) -> Option<String>,
    job_name: &str,
    cancel: &CancellationToken,
) -> Result<(), AdapterError> {
    let accounts = deps.cloud.accounts().await?;

    let mut targets = Vec::new();
    for account in &accounts {
        if cancel.is_cancelled() {
            info!(job_name = JOB_NAME, "job cancelled");
            return Ok(());
        }

        let Some(assume_arn) = assumable_role_per_account(&account.id) else {
            continue;
        };

        match role_finder.find_capability_role(&account.id, &assume_arn, job_name).await {
            Ok(Some(role)) => targets.push(Target {
                account_id: role.account_id,
                role_arn: role.role_arn,
                root_id: account.root_id(&cfg.account_name_prefix),
            }),
            Ok(None) => {}
            Err(e) => {
                warn!(job_name = JOB_NAME, account_id = %account.id, error = %e, "account unassumable, skipped");
            }
        }
    }

    let (cm, mut mappings) = deps.cluster.load_map_roles().await?;

    let live_arns: std::collections::HashSet<String> =
        targets.iter().map(|t| normalize_arn(&t.role_arn)).collect();

    // Prune: iterate backwards so removing an element never shifts the
    // index of an element still to be visited.
    let mut i = mappings.len();
    while i > 0 {
        i -= 1;
        let owned = mappings[i].managed_by_this();
        if owned && !live_arns.contains(&normalize_arn(&mappings[i].rolearn)) {
            let removed = mappings.remove(i);
            info!(job_name = JOB_NAME, role_arn = %removed.rolearn, "pruned stale owned mapping");
        }
    }

    let by_arn: HashMap<String, usize> = mappings
        .iter()
        .enumerate()
        .map(|(idx, m)| (normalize_arn(&m.rolearn), idx))
        .collect();

    let now = Utc::now().to_rfc3339();

    for target in &targets {
        if cancel.is_cancelled() {
            info!(job_name = JOB_NAME, "job cancelled");
            break;
        }

        let wanted_username = cluster_username(&target.root_id);
        let wanted_groups = vec![CLUSTER_READONLY_GROUP.to_string(), target.root_id.clone()];

        let normalized_arn = normalize_arn(&target.role_arn);
        match by_arn.get(&normalized_arn) {
            None => {
                mappings.push(ClusterRoleMapping {
                    rolearn: normalized_arn,
                    managedby: MANAGED_BY.to_string(),
                    createdat: now.clone(),
                    lastupdated: now.clone(),
                    username: wanted_username,
                    groups: wanted_groups,
                });
                info!(job_name = JOB_NAME, account_id = %target.account_id, "created cluster mapping");
            }
            Some(&idx) => {
                let mapping = &mut mappings[idx];
                let drifted = mapping.username != wanted_username
                    || !mapping.contains_group(CLUSTER_READONLY_GROUP)
                    || !mapping.contains_group(&target.root_id);
                if drifted {
                    mapping.username = wanted_username;
                    mapping.groups = wanted_groups;
                    mapping.lastupdated = now.clone();
                    info!(job_name = JOB_NAME, account_id = %target.account_id, "corrected drifted cluster mapping");
                }
            }
        }
    }

    deps.cluster.update_map_roles(cm, &mappings).await?;
    Ok(())
}

/// Strips any path segments between `role/` and the leaf role name, so
/// the comparator is `arn:aws:iam::N:role/{leafName}` regardless of the
/// `/aws-reserved/...` path the SSO service actually uses.
fn normalize_arn(arn: &str) -> String {
    match arn.rfind('/') {
        Some(pos) => {
            let leaf = &arn[pos + 1..];
            match arn.find(":role/") {
                Some(role_pos) => format!("{}:role/{}", &arn[..role_pos], leaf),
                None => arn.to_string(),
            }
        }
        None => arn.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_arn_strips_path_segments() {
        assert_eq!(
            normalize_arn("arn:aws:iam::111:role/aws-reserved/sso.amazonaws.com/eu-west-1/AWSReservedSSO_CapabilityAccess_abc"),
            "arn:aws:iam::111:role/AWSReservedSSO_CapabilityAccess_abc"
        );
    }

    #[test]
    fn prune_removes_only_stale_owned_mappings_backwards() {
        let mut mappings = vec![
            ClusterRoleMapping {
                rolearn: "arn:aws:iam::1:role/a1".into(),
                managedby: MANAGED_BY.into(),
                lastupdated: String::new(),
                createdat: String::new(),
                username: "a1:sso-{{SessionName}}".into(),
                groups: vec![],
            },
            ClusterRoleMapping {
                rolearn: "arn:aws:iam::1:role/a2".into(),
                managedby: MANAGED_BY.into(),
                lastupdated: String::new(),
                createdat: String::new(),
                username: "a2:sso-{{SessionName}}".into(),
                groups: vec![],
            },
            ClusterRoleMapping {
                rolearn: "arn:aws:iam::1:role/a3".into(),
                managedby: "someone-else".into(),
                lastupdated: String::new(),
                createdat: String::new(),
                username: "manual".into(),
                groups: vec![],
            },
        ];

        let live: std::collections::HashSet<String> =
            ["arn:aws:iam::1:role/a1".to_string()].into_iter().collect();

        let mut i = mappings.len();
        while i > 0 {
            i -= 1;
            let owned = mappings[i].managed_by_this();
            if owned && !live.contains(&normalize_arn(&mappings[i].rolearn)) {
                mappings.remove(i);
            }
        }

        assert_eq!(mappings.len(), 2);
        assert!(mappings.iter().any(|m| m.rolearn.ends_with("a1")));
        assert!(mappings.iter().any(|m| m.rolearn.ends_with("a3")));
    }
}
