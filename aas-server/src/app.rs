use std::sync::Arc;

use aas_adapters::capsvc::CapSvcClient;
use aas_adapters::cloud::{CloudClient, SsoRoleFinder};
use aas_adapters::cluster::ClusterClient;
use aas_adapters::directory::DirectoryClient;
use aas_adapters::scim::ScimClient;
use aas_common::config::Cli;
use aas_common::http::TokenCache;
use aas_events::handlers::HandlerDeps;
use aas_orchestrator::Orchestrator;
use aas_reconcile::{Deps, ReconcileConfig};
use aws_config::BehaviorVersion;
use tokio_util::sync::CancellationToken;

/// Everything the admin HTTP surface and the scheduled/event-driven jobs
/// share: the reconciler dependency bundle, its static config, the
/// event-handler dependency bundle, and the orchestrator that runs jobs.
pub struct App {
    pub deps: Arc<Deps>,
    pub reconcile_cfg: ReconcileConfig,
    pub handler_deps: Arc<HandlerDeps>,
    pub orchestrator: Arc<Orchestrator>,
}

impl App {
    pub async fn build(cli: &Cli, cancel: CancellationToken) -> anyhow::Result<Self> {
        let http = aas_common::http::client_without_keepalive();

        let azure_token_url = format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            cli.azure.tenant_id
        );
        let azure_tokens = TokenCache::new(
            http.clone(),
            azure_token_url.clone(),
            cli.azure.client_id.clone(),
            cli.azure.client_secret.clone(),
            Some("https://graph.microsoft.com/.default".to_string()),
            "AAS_AZURE_TOKEN",
        );
        let directory = Arc::new(DirectoryClient::new(
            http.clone(),
            azure_tokens,
            cli.azure.internal_domain_suffix.clone(),
        ));

        let capsvc_tokens = TokenCache::new(
            http.clone(),
            azure_token_url,
            cli.capsvc.client_id.clone(),
            cli.capsvc.client_secret.clone(),
            Some(cli.capsvc.token_scope.clone()),
            "AAS_CAPSVC_TOKEN",
        );
        let capsvc = Arc::new(CapSvcClient::new(http.clone(), capsvc_tokens, cli.capsvc.host.clone()));

        let aws_conf = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(cli.aws.sso_region.clone()))
            .load()
            .await;

        let org = aws_sdk_organizations::Client::new(&aws_conf);
        let sso_admin = aws_sdk_ssoadmin::Client::new(&aws_conf);
        let identity_store = aws_sdk_identitystore::Client::new(&aws_conf);
        let sts = aws_sdk_sts::Client::new(&aws_conf);

        let cloud = Arc::new(CloudClient::new(
            org,
            sso_admin,
            identity_store,
            sts.clone(),
            cli.aws.sso_instance_arn.clone(),
            cli.aws.identity_store_arn.clone(),
        ));
        let role_finder = Arc::new(SsoRoleFinder::new(sts, cli.aws.sso_region.clone()));

        let kube_client = kube::Client::try_default()
            .await
            .map_err(|e| anyhow::anyhow!("failed to build in-cluster kube client: {e}"))?;
        let cluster = Arc::new(ClusterClient::new(
            kube_client,
            &cli.cluster.aws_auth_namespace,
            &cli.cluster.aws_auth_name,
        ));

        let scim = Arc::new(ScimClient::new(
            reqwest::Client::new(),
            cli.aws.scim_endpoint.clone(),
            cli.aws.scim_token.clone(),
        ));

        let deps = Arc::new(Deps {
            directory: directory.clone(),
            capsvc: capsvc.clone(),
            cloud: cloud.clone(),
            cluster: cluster.clone(),
        });

        let reconcile_cfg = ReconcileConfig {
            au_name: aas_adapters::models::ADMIN_UNIT_NAME.to_string(),
            application_id: cli.azure.application_id.clone(),
            application_object_id: cli.azure.application_object_id.clone(),
            account_name_prefix: cli.aws.account_name_prefix.clone(),
            capability_permission_set_arn: cli.aws.capability_permission_set_arn.clone(),
            capability_logs_permission_set_arn: cli.aws.capability_logs_permission_set_arn.clone(),
            capability_logs_aws_account_alias: cli.aws.capability_logs_aws_account_alias.clone(),
        };

        let handler_deps = Arc::new(HandlerDeps {
            directory,
            capsvc,
            scim,
            au_name: reconcile_cfg.au_name.clone(),
        });

        let orchestrator = Arc::new(build_orchestrator(deps.clone(), reconcile_cfg.clone(), cli, role_finder, cancel));

        Ok(Self {
            deps,
            reconcile_cfg,
            handler_deps,
            orchestrator,
        })
    }
}

fn build_orchestrator(
    deps: Arc<Deps>,
    cfg: ReconcileConfig,
    cli: &Cli,
    role_finder: Arc<SsoRoleFinder>,
    cancel: CancellationToken,
) -> Orchestrator {
    let mut orchestrator = Orchestrator::new(cancel);
    let scheduler = &cli.scheduler;

    {
        let deps = deps.clone();
        let cfg = cfg.clone();
        orchestrator.register(aas_reconcile::capsvc_to_directory::JOB_NAME, scheduler.enable_capsvc2_azure, move |cancel| {
            let deps = deps.clone();
            let cfg = cfg.clone();
            async move { Ok(aas_reconcile::capsvc_to_directory::run(&deps, &cfg, &cancel).await?) }
        });
    }

    {
        let deps = deps.clone();
        let cfg = cfg.clone();
        orchestrator.register(aas_reconcile::directory_to_cloudapp::JOB_NAME, scheduler.enable_azure2_aws, move |cancel| {
            let deps = deps.clone();
            let cfg = cfg.clone();
            async move { Ok(aas_reconcile::directory_to_cloudapp::run(&deps, &cfg, &cancel).await?) }
        });
    }

    {
        let deps = deps.clone();
        let cfg = cfg.clone();
        orchestrator.register(
            aas_reconcile::cloudgroups_to_cloudaccounts::JOB_NAME,
            scheduler.enable_aws_mapping,
            move |cancel| {
                let deps = deps.clone();
                let cfg = cfg.clone();
                async move { Ok(aas_reconcile::cloudgroups_to_cloudaccounts::run(&deps, &cfg, &cancel).await?) }
            },
        );
    }

    {
        let deps = deps.clone();
        let cfg = cfg.clone();
        let role_finder = role_finder.clone();
        let role_name = cli.aws.capability_account_role_name.clone();
        let job_name = aas_reconcile::cloud_to_cluster::JOB_NAME;
        orchestrator.register(job_name, scheduler.enable_aws2_k8s, move |cancel| {
            let deps = deps.clone();
            let cfg = cfg.clone();
            let role_finder = role_finder.clone();
            let role_name = role_name.clone();
            async move {
                let assumable_role_per_account = |account_id: &str| {
                    role_name
                        .as_ref()
                        .map(|name| format!("arn:aws:iam::{account_id}:role/{name}"))
                };
                Ok(aas_reconcile::cloud_to_cluster::run(
                    &deps,
                    &cfg,
                    &role_finder,
                    assumable_role_per_account,
                    job_name,
                    &cancel,
                )
                .await?)
            }
        });
    }

    {
        let enabled = scheduler.enable_capability_email_alias;
        orchestrator.register("capabilityEmailAlias", enabled, move |_cancel| async move {
            if !enabled {
                return Ok(());
            }
            anyhow::bail!(
                "capability email-alias pipeline is enabled but no exchange backend is configured; see aas_adapters::exchange"
            )
        });
    }

    orchestrator
}
