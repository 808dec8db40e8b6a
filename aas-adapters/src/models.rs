use serde::{Deserialize, Serialize};

/// Canonical prefix for capability-backed directory groups: `"CI_SSU_Cap - {rootId}"`.
pub const CAP_PREFIX: &str = "CI_SSU_Cap -";
/// Canonical mail-nickname prefix: `"ci-ssu_cap_{rootId}"`.
pub const MAIL_PREFIX: &str = "ci-ssu_cap_";
/// SSO role-name substring identifying capability-access roles.
pub const SSO_ROLE_SUBSTRING: &str = "AWSReservedSSO_CapabilityAccess";
/// IAM role path prefix for SSO-materialised roles.
pub const IAM_ROLE_PATH_PREFIX: &str = "/aws-reserved";
/// STS session-name prefix used for every cross-account role assumption.
pub const STS_SESSION_NAME: &str = "aad-aws-sync";
/// Name of the administrative unit that scopes capability-group creation.
pub const ADMIN_UNIT_NAME: &str = "Team - Cloud Engineering - Self service";
/// Literal cluster group every managed mapping carries.
pub const CLUSTER_READONLY_GROUP: &str = "DFDS-ReadOnly";
/// Value stamped into `managedby` for every mapping this system owns.
pub const MANAGED_BY: &str = "aad-aws-sync";

pub fn group_display_name(root_id: &str) -> String {
    format!("{CAP_PREFIX} {root_id}")
}

pub fn group_mail_nickname(root_id: &str) -> String {
    format!("{MAIL_PREFIX}{root_id}")
}

pub fn cluster_username(root_id: &str) -> String {
    format!("{root_id}:sso-{{{{SessionName}}}}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityMember {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityContext {
    pub id: String,
    pub name: String,
    #[serde(rename = "awsAccountId")]
    pub aws_account_id: String,
    #[serde(rename = "awsRoleArn", default)]
    pub aws_role_arn: String,
    #[serde(rename = "awsRoleEmail", default)]
    pub aws_role_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub id: String,
    pub name: String,
    #[serde(rename = "rootId")]
    pub root_id: String,
    #[serde(default)]
    pub description: String,
    pub members: Vec<CapabilityMember>,
    #[serde(default)]
    pub contexts: Vec<CapabilityContext>,
}

impl Capability {
    /// The capability's primary context, if any. Reconcilers that require
    /// a concrete cloud account skip capabilities with no context.
    pub fn primary_context(&self) -> Option<&CapabilityContext> {
        self.contexts.first()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    #[serde(rename = "userPrincipalName")]
    pub user_principal_name: String,
    pub mail: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DirectoryGroup {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "mailNickname")]
    pub mail_nickname: String,
    #[serde(default)]
    pub members: Vec<DirectoryUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudAccount {
    pub id: String,
    pub name: String,
}

impl CloudAccount {
    pub fn root_id(&self, account_prefix: &str) -> String {
        self.name
            .strip_prefix(account_prefix)
            .unwrap_or(&self.name)
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSsoGroup {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionSetAssignment {
    pub principal_id: String,
    pub target_id: String,
    pub permission_set_arn: String,
}

/// One entry in the cluster's `aws-auth` ConfigMap `mapRoles` list.
///
/// Field names are lowercase to match the YAML shape the in-cluster
/// `aws-auth-operator`/`aws-iam-authenticator` convention expects, and to
/// round-trip byte-for-byte with mappings written by other tooling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterRoleMapping {
    pub rolearn: String,
    #[serde(default)]
    pub managedby: String,
    #[serde(default)]
    pub lastupdated: String,
    #[serde(default)]
    pub createdat: String,
    pub username: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl ClusterRoleMapping {
    pub fn managed_by_this(&self) -> bool {
        self.managedby == MANAGED_BY
    }

    pub fn contains_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_display_name_prefixes_root_id() {
        assert_eq!(group_display_name("acme"), "CI_SSU_Cap - acme");
    }

    #[test]
    fn group_mail_nickname_prefixes_root_id() {
        assert_eq!(group_mail_nickname("acme"), "ci-ssu_cap_acme");
    }

    #[test]
    fn cluster_username_embeds_session_name_placeholder() {
        assert_eq!(cluster_username("acme"), "acme:sso-{{SessionName}}");
    }

    #[test]
    fn capability_primary_context_is_first_or_none() {
        let no_context = Capability {
            id: "1".into(),
            name: "acme".into(),
            root_id: "acme".into(),
            description: String::new(),
            members: vec![],
            contexts: vec![],
        };
        assert!(no_context.primary_context().is_none());

        let with_context = Capability {
            contexts: vec![CapabilityContext {
                id: "ctx1".into(),
                name: "prod".into(),
                aws_account_id: "111111111111".into(),
                aws_role_arn: String::new(),
                aws_role_email: String::new(),
            }],
            ..no_context
        };
        assert_eq!(with_context.primary_context().unwrap().aws_account_id, "111111111111");
    }

    #[test]
    fn cloud_account_root_id_strips_prefix() {
        let account = CloudAccount { id: "1".into(), name: "capability-acme".into() };
        assert_eq!(account.root_id("capability-"), "acme");

        let no_prefix = CloudAccount { id: "2".into(), name: "unrelated".into() };
        assert_eq!(no_prefix.root_id("capability-"), "unrelated");
    }

    #[test]
    fn cluster_role_mapping_contains_group() {
        let mapping = ClusterRoleMapping {
            rolearn: "arn:aws:iam::1:role/x".into(),
            managedby: MANAGED_BY.into(),
            lastupdated: String::new(),
            createdat: String::new(),
            username: "x:sso-{{SessionName}}".into(),
            groups: vec![CLUSTER_READONLY_GROUP.to_string(), "acme".into()],
        };
        assert!(mapping.contains_group(CLUSTER_READONLY_GROUP));
        assert!(!mapping.contains_group("missing"));
    }
}
