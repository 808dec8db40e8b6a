use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct AwsArgs {
    #[arg(long, env = "AWS_IDENTITY_STORE_ARN", required = true)]
    pub identity_store_arn: String,

    #[arg(long, env = "AWS_SSO_INSTANCE_ARN", required = true)]
    pub sso_instance_arn: String,

    #[arg(long, env = "AWS_CAPABILITY_PERMISSION_SET_ARN", required = true)]
    pub capability_permission_set_arn: String,

    #[arg(long, env = "AWS_CAPABILITY_LOGS_PERMISSION_SET_ARN", required = true)]
    pub capability_logs_permission_set_arn: String,

    #[arg(long, env = "AWS_CAPABILITY_LOGS_ACCOUNT_ALIAS", required = true)]
    pub capability_logs_aws_account_alias: String,

    #[arg(long, env = "AWS_ACCOUNT_NAME_PREFIX", default_value = "")]
    pub account_name_prefix: String,

    #[arg(long, env = "AWS_SSO_REGION", default_value = "eu-west-1")]
    pub sso_region: String,

    #[arg(long, env = "AWS_ASSUMABLE_SSO_MANAGEMENT_ARN")]
    pub sso_management_arn: Option<String>,

    #[arg(long, env = "AWS_ASSUMABLE_CAPABILITY_ACCOUNT_ROLE_NAME")]
    pub capability_account_role_name: Option<String>,

    #[arg(long, env = "AWS_SCIM_ENDPOINT", required = true)]
    pub scim_endpoint: String,

    #[arg(long, env = "AWS_SCIM_TOKEN", required = true)]
    pub scim_token: String,

    #[arg(long, env = "AWS_ORGANIZATIONS_PARENT_ID", required = true)]
    pub organizations_parent_id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct AzureArgs {
    #[arg(long, env = "AZURE_TENANT_ID", required = true)]
    pub tenant_id: String,

    #[arg(long, env = "AZURE_CLIENT_ID", required = true)]
    pub client_id: String,

    #[arg(long, env = "AZURE_CLIENT_SECRET", required = true)]
    pub client_secret: String,

    #[arg(long, env = "AZURE_APPLICATION_ID", required = true)]
    pub application_id: String,

    #[arg(long, env = "AZURE_APPLICATION_OBJECT_ID", required = true)]
    pub application_object_id: String,

    #[arg(long, env = "AZURE_INTERNAL_DOMAIN_SUFFIX", required = true)]
    pub internal_domain_suffix: String,
}

#[derive(Parser, Debug, Clone)]
pub struct CapSvcArgs {
    #[arg(long, env = "CAPSVC_HOST", required = true)]
    pub host: String,

    #[arg(long, env = "CAPSVC_TOKEN_SCOPE", required = true)]
    pub token_scope: String,

    #[arg(long, env = "CAPSVC_CLIENT_ID", required = true)]
    pub client_id: String,

    #[arg(long, env = "CAPSVC_CLIENT_SECRET", required = true)]
    pub client_secret: String,
}

#[derive(Parser, Debug, Clone)]
pub struct SchedulerArgs {
    #[arg(long, env = "SCHEDULER_FREQUENCY", default_value = "30m")]
    pub frequency: String,

    #[arg(long, env = "SCHEDULER_ENABLE_CAPSVC2AZURE", default_value_t = true)]
    pub enable_capsvc2_azure: bool,

    #[arg(long, env = "SCHEDULER_ENABLE_AZURE2AWS", default_value_t = true)]
    pub enable_azure2_aws: bool,

    #[arg(long, env = "SCHEDULER_ENABLE_AWSMAPPING", default_value_t = true)]
    pub enable_aws_mapping: bool,

    #[arg(long, env = "SCHEDULER_ENABLE_AWS2K8S", default_value_t = true)]
    pub enable_aws2_k8s: bool,

    #[arg(long, env = "SCHEDULER_ENABLE_CAPABILITY_EMAIL_ALIAS", default_value_t = false)]
    pub enable_capability_email_alias: bool,
}

impl SchedulerArgs {
    /// Parses `frequency` ("30m", "1h", "45s") into a `Duration`.
    pub fn frequency_duration(&self) -> anyhow::Result<std::time::Duration> {
        parse_human_duration(&self.frequency)
    }
}

fn parse_human_duration(s: &str) -> anyhow::Result<std::time::Duration> {
    let s = s.trim();
    let (num, unit) = s.split_at(s.len() - 1);
    let n: u64 = num
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid duration literal: {s}"))?;
    let secs = match unit {
        "s" => n,
        "m" => n * 60,
        "h" => n * 3600,
        "d" => n * 86400,
        other => anyhow::bail!("unsupported duration unit: {other}"),
    };
    Ok(std::time::Duration::from_secs(secs))
}

#[derive(Parser, Debug, Clone)]
pub struct SaslPlainArgs {
    #[arg(long, env = "KAFKA_SASL_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "KAFKA_SASL_PASSWORD")]
    pub password: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct KafkaArgs {
    #[arg(long, env = "KAFKA_BROKERS", required = true)]
    pub brokers: String,

    #[arg(long, env = "KAFKA_GROUP_ID", default_value = "aad-aws-sync")]
    pub group_id: String,

    #[arg(long, env = "KAFKA_TOPIC", required = true)]
    pub topic: String,

    #[arg(long, env = "KAFKA_PRODUCER_TOPIC", required = true)]
    pub producer_topic: String,

    #[arg(long, env = "KAFKA_ERROR_PRODUCER_TOPIC", required = true)]
    pub error_producer_topic: String,

    #[clap(flatten)]
    pub sasl_plain: SaslPlainArgs,

    #[arg(long, env = "KAFKA_TLS", default_value_t = false)]
    pub tls: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct HttpArgs {
    #[arg(long, env = "ADMIN_HTTP_ADDR", default_value = "0.0.0.0:8080")]
    pub admin_addr: String,

    #[arg(long, env = "METRICS_HTTP_ADDR", default_value = "0.0.0.0:9090")]
    pub metrics_addr: String,
}

#[derive(Parser, Debug, Clone)]
pub struct ClusterArgs {
    #[arg(long, env = "CLUSTER_AWS_AUTH_NAMESPACE", default_value = "kube-system")]
    pub aws_auth_namespace: String,

    #[arg(long, env = "CLUSTER_AWS_AUTH_NAME", default_value = "aws-auth")]
    pub aws_auth_name: String,
}

/// Top-level CLI surface for the `aas-server` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "aad-aws-sync")]
pub struct Cli {
    #[clap(flatten)]
    pub aws: AwsArgs,

    #[clap(flatten)]
    pub azure: AzureArgs,

    #[clap(flatten)]
    pub capsvc: CapSvcArgs,

    #[clap(flatten)]
    pub scheduler: SchedulerArgs,

    #[clap(flatten)]
    pub kafka: KafkaArgs,

    #[clap(flatten)]
    pub http: HttpArgs,

    #[clap(flatten)]
    pub cluster: ClusterArgs,
}
