pub mod capsvc_to_directory;
pub mod cloud_to_cluster;
pub mod cloudgroups_to_cloudaccounts;
pub mod directory_to_cloudapp;

use std::sync::Arc;

use aas_adapters::capsvc::CapSvcClient;
use aas_adapters::cloud::CloudClient;
use aas_adapters::cluster::ClusterClient;
use aas_adapters::directory::DirectoryClient;
use tokio::sync::Semaphore;

/// Explicit dependency bundle threaded into every reconciler, replacing
/// the context-value-carries-adapters pattern: cancellation/deadlines
/// still travel on the `CancellationToken` each reconciler takes
/// separately, everything else is an explicit argument.
pub struct Deps {
    pub directory: Arc<DirectoryClient>,
    pub capsvc: Arc<CapSvcClient>,
    pub cloud: Arc<CloudClient>,
    pub cluster: Arc<ClusterClient>,
}

/// Config values shared across reconcilers. Field names mirror
/// `SPEC_FULL.md`'s configuration surface.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub au_name: String,
    pub application_id: String,
    pub application_object_id: String,
    pub account_name_prefix: String,
    pub capability_permission_set_arn: String,
    pub capability_logs_permission_set_arn: String,
    pub capability_logs_aws_account_alias: String,
}

/// Bounds concurrent remote operations within one reconciler pass.
/// 30-50 depending on flow, per the component design.
pub fn fan_out_semaphore(permits: usize) -> Arc<Semaphore> {
    Arc::new(Semaphore::new(permits))
}
