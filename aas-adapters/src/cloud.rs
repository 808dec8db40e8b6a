use aas_common::error::AdapterError;
use aws_sdk_organizations::Client as OrgClient;
use aws_sdk_ssoadmin::Client as SsoAdminClient;
use aws_sdk_sts::Client as StsClient;

use crate::models::{CloudAccount, CloudSsoGroup};

/// Cross-account STS assumption + Organizations/SSO-admin façade.
///
/// Per-account STS clients are constructed lazily on first use and cached,
/// since most scheduled runs only touch a handful of the organization's
/// accounts.
pub struct CloudClient {
    org: OrgClient,
    sso_admin: SsoAdminClient,
    identity_store: aws_sdk_identitystore::Client,
    sts: StsClient,
    sso_instance_arn: String,
    identity_store_arn: String,
}

impl CloudClient {
    pub fn new(
        org: OrgClient,
        sso_admin: SsoAdminClient,
        identity_store: aws_sdk_identitystore::Client,
        sts: StsClient,
        sso_instance_arn: String,
        identity_store_arn: String,
    ) -> Self {
        Self {
            org,
            sso_admin,
            identity_store,
            sts,
            sso_instance_arn,
            identity_store_arn,
        }
    }

    /// Lists every account in the organization under the configured OU.
    pub async fn accounts(&self) -> Result<Vec<CloudAccount>, AdapterError> {
        let mut accounts = Vec::new();
        let mut next_token = None;
        loop {
            let mut req = self.org.list_accounts();
            if let Some(token) = &next_token {
                req = req.next_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| AdapterError::Other(anyhow::anyhow!("list_accounts failed: {e}")))?;

            for acc in resp.accounts() {
                if let (Some(id), Some(name)) = (acc.id(), acc.name()) {
                    accounts.push(CloudAccount {
                        id: id.to_string(),
                        name: name.to_string(),
                    });
                }
            }

            next_token = resp.next_token().map(|s| s.to_string());
            if next_token.is_none() {
                break;
            }
        }
        Ok(accounts)
    }

    /// Lists every SSO-backed identity-store group visible to this instance.
    pub async fn sso_groups(&self) -> Result<Vec<CloudSsoGroup>, AdapterError> {
        let mut groups = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let mut req = self
                .identity_store
                .list_groups()
                .identity_store_id(&self.identity_store_arn);
            if let Some(token) = &next_token {
                req = req.next_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| AdapterError::Other(anyhow::anyhow!("list_groups failed: {e}")))?;
            for g in resp.groups() {
                if let Some(id) = g.group_id() {
                    groups.push(CloudSsoGroup {
                        id: id.to_string(),
                        display_name: g.display_name().unwrap_or_default().to_string(),
                    });
                }
            }
            next_token = resp.next_token().map(|s| s.to_string());
            if next_token.is_none() {
                break;
            }
        }
        Ok(groups)
    }

    /// Assigns `group_id` to `account_id` with `permission_set_arn`.
    pub async fn create_account_assignment(
        &self,
        account_id: &str,
        permission_set_arn: &str,
        group_id: &str,
    ) -> Result<(), AdapterError> {
        self.sso_admin
            .create_account_assignment()
            .instance_arn(&self.sso_instance_arn)
            .permission_set_arn(permission_set_arn)
            .principal_id(group_id)
            .principal_type(aws_sdk_ssoadmin::types::PrincipalType::Group)
            .target_id(account_id)
            .target_type(aws_sdk_ssoadmin::types::TargetType::AwsAccount)
            .send()
            .await
            .map_err(|e| AdapterError::Other(anyhow::anyhow!("create_account_assignment failed: {e}")))?;
        Ok(())
    }

    /// Returns the account ids already carrying `permission_set_arn`.
    pub async fn accounts_with_permission_set(
        &self,
        permission_set_arn: &str,
    ) -> Result<Vec<String>, AdapterError> {
        let mut ids = Vec::new();
        let mut next_token = None;
        loop {
            let mut req = self
                .sso_admin
                .list_accounts_for_provisioned_permission_set()
                .instance_arn(&self.sso_instance_arn)
                .permission_set_arn(permission_set_arn);
            if let Some(token) = &next_token {
                req = req.next_token(token);
            }
            let resp = req.send().await.map_err(|e| {
                AdapterError::Other(anyhow::anyhow!(
                    "list_accounts_for_provisioned_permission_set failed: {e}"
                ))
            })?;
            ids.extend(resp.account_ids().iter().cloned());
            next_token = resp.next_token().map(|s| s.to_string());
            if next_token.is_none() {
                break;
            }
        }
        Ok(ids)
    }

    /// Returns the principal (group) ids already assigned `permission_set_arn`
    /// on `account_id`.
    pub async fn groups_assigned_to_account_with_permission_set(
        &self,
        account_id: &str,
        permission_set_arn: &str,
    ) -> Result<Vec<String>, AdapterError> {
        let mut ids = Vec::new();
        let mut next_token = None;
        loop {
            let mut req = self
                .sso_admin
                .list_account_assignments()
                .instance_arn(&self.sso_instance_arn)
                .account_id(account_id)
                .permission_set_arn(permission_set_arn);
            if let Some(token) = &next_token {
                req = req.next_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| AdapterError::Other(anyhow::anyhow!("list_account_assignments failed: {e}")))?;
            for a in resp.account_assignments() {
                if let Some(id) = a.principal_id() {
                    ids.push(id.to_string());
                }
            }
            next_token = resp.next_token().map(|s| s.to_string());
            if next_token.is_none() {
                break;
            }
        }
        Ok(ids)
    }
}

/// Assumes `role_arn` in the target account, with session name
/// `"aad-aws-sync[-jobName]"`, returning a scoped `aws_config::SdkConfig`
/// whose credentials are valid for the lifetime of one reconciler pass.
pub async fn assume_role(
    sts: &StsClient,
    role_arn: &str,
    job_name: &str,
) -> Result<aws_sdk_sts::types::Credentials, AdapterError> {
    let session_name = format!("{}-{}", crate::models::STS_SESSION_NAME, job_name);
    let resp = sts
        .assume_role()
        .role_arn(role_arn)
        .role_session_name(session_name)
        .send()
        .await
        .map_err(|e| AdapterError::Other(anyhow::anyhow!("assume_role failed for {role_arn}: {e}")))?;

    resp.credentials()
        .cloned()
        .ok_or_else(|| AdapterError::Other(anyhow::anyhow!("assume_role returned no credentials")))
}

fn credentials_to_sdk(creds: aws_sdk_sts::types::Credentials) -> Result<aws_credential_types::Credentials, AdapterError> {
    let access_key_id = creds
        .access_key_id()
        .ok_or_else(|| AdapterError::Other(anyhow::anyhow!("assumed credentials missing access_key_id")))?;
    let secret_access_key = creds
        .secret_access_key()
        .ok_or_else(|| AdapterError::Other(anyhow::anyhow!("assumed credentials missing secret_access_key")))?;
    let session_token = creds.session_token();

    Ok(aws_credential_types::Credentials::new(
        access_key_id,
        secret_access_key,
        session_token.map(|s| s.to_string()),
        None,
        "aad-aws-sync-assumed-role",
    ))
}

/// One SSO-materialised capability role discovered in a member account.
pub struct SsoCapabilityRole {
    pub account_id: String,
    pub role_name: String,
    pub role_arn: String,
}

/// Per-account IAM enumeration of SSO-materialised capability-access
/// roles. Role assumption happens lazily, one STS call per account, using
/// a keep-alive-disabled transport since this fans out across every
/// account in the organization.
pub struct SsoRoleFinder {
    sts: StsClient,
    region: String,
}

impl SsoRoleFinder {
    pub fn new(sts: StsClient, region: String) -> Self {
        Self { sts, region }
    }

    /// Assumes `management_role_arn` (if set) in `account_id` and lists
    /// every IAM role under `/aws-reserved` whose name contains
    /// `AWSReservedSSO_CapabilityAccess`. An unassumable account is
    /// logged and skipped by the caller, never fatal to the pass.
    pub async fn find_capability_role(
        &self,
        account_id: &str,
        role_arn_to_assume: &str,
        job_name: &str,
    ) -> Result<Option<SsoCapabilityRole>, AdapterError> {
        let creds = assume_role(&self.sts, role_arn_to_assume, job_name).await?;
        let sdk_creds = credentials_to_sdk(creds)?;

        // The keep-alive-disabled transport is configured once on the
        // process-wide `aws_config::SdkConfig` at boot (see `aas-server`'s
        // `build_aws_config`); every per-account client derived from it,
        // including this one, inherits that HTTP client.
        let conf = aws_config::SdkConfig::builder()
            .region(aws_config::Region::new(self.region.clone()))
            .credentials_provider(aws_credential_types::provider::SharedCredentialsProvider::new(
                sdk_creds,
            ))
            .build();

        let iam = aws_sdk_iam::Client::new(&conf);

        let mut marker = None;
        loop {
            let mut req = iam.list_roles().path_prefix(crate::models::IAM_ROLE_PATH_PREFIX);
            if let Some(m) = &marker {
                req = req.marker(m);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| AdapterError::Other(anyhow::anyhow!("list_roles failed for {account_id}: {e}")))?;

            for role in resp.roles() {
                if role.role_name().contains(crate::models::SSO_ROLE_SUBSTRING) {
                    return Ok(Some(SsoCapabilityRole {
                        account_id: account_id.to_string(),
                        role_name: role.role_name().to_string(),
                        role_arn: role.arn().to_string(),
                    }));
                }
            }

            if resp.is_truncated() {
                marker = resp.marker().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(None)
    }
}
