use aas_common::error::AdapterError;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::Api;
use kube::api::{Patch, PatchParams};

use crate::models::ClusterRoleMapping;

const MAP_ROLES_KEY: &str = "mapRoles";

pub struct ClusterClient {
    configmaps: Api<ConfigMap>,
    name: String,
}

impl ClusterClient {
    pub fn new(client: kube::Client, namespace: &str, name: &str) -> Self {
        Self {
            configmaps: Api::namespaced(client, namespace),
            name: name.to_string(),
        }
    }

    /// Reads and decodes the current `mapRoles` entries from the cluster's
    /// auth ConfigMap. Returns the decoded mappings alongside the
    /// ConfigMap itself, since the write-back needs the latter's other
    /// keys (`mapUsers`, `mapAccounts`) left untouched.
    pub async fn load_map_roles(&self) -> Result<(ConfigMap, Vec<ClusterRoleMapping>), AdapterError> {
        let cm = self
            .configmaps
            .get(&self.name)
            .await
            .map_err(|e| AdapterError::Other(anyhow::anyhow!("failed to fetch {}: {e}", self.name)))?;

        let mappings = match cm.data.as_ref().and_then(|d| d.get(MAP_ROLES_KEY)) {
            Some(raw) if !raw.trim().is_empty() => serde_yaml::from_str(raw)
                .map_err(|e| AdapterError::Other(anyhow::anyhow!("failed to parse mapRoles yaml: {e}")))?,
            _ => Vec::new(),
        };

        Ok((cm, mappings))
    }

    /// Re-serialises `mappings` into the `mapRoles` key and patches the
    /// ConfigMap. There is no optimistic-concurrency check: the single
    /// scheduled `aws2K8s` job is the only writer, so a read-modify-write
    /// race is not expected in practice.
    pub async fn update_map_roles(
        &self,
        mut cm: ConfigMap,
        mappings: &[ClusterRoleMapping],
    ) -> Result<(), AdapterError> {
        let payload = serde_yaml::to_string(mappings)
            .map_err(|e| AdapterError::Other(anyhow::anyhow!("failed to serialise mapRoles: {e}")))?;

        cm.data
            .get_or_insert_with(Default::default)
            .insert(MAP_ROLES_KEY.to_string(), payload);

        self.configmaps
            .patch(
                &self.name,
                &PatchParams::apply("aad-aws-sync"),
                &Patch::Apply(&cm),
            )
            .await
            .map_err(|e| AdapterError::Other(anyhow::anyhow!("failed to patch {}: {e}", self.name)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn managed_by_this_matches_exact_owner_string() {
        let owned = ClusterRoleMapping {
            rolearn: "arn:aws:iam::1:role/x".into(),
            managedby: "aad-aws-sync".into(),
            lastupdated: String::new(),
            createdat: String::new(),
            username: "x:sso-{{SessionName}}".into(),
            groups: vec!["DFDS-ReadOnly".into(), "x".into()],
        };
        assert!(owned.managed_by_this());

        let foreign = ClusterRoleMapping {
            managedby: "someone-else".into(),
            ..owned.clone()
        };
        assert!(!foreign.managed_by_this());
    }
}
