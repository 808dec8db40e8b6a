use clap::{Parser, Subcommand};

/// Top-level CLI surface for the `aad-aws-sync` binary.
#[derive(Parser, Debug)]
#[command(name = "aad-aws-sync")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Runs the scheduler, the Kafka event consumer, and the admin HTTP
    /// server until shutdown.
    Serve(aas_common::config::Cli),
    /// One-shot teardown: unassigns every capability-backed directory
    /// group from the enterprise application, then deletes every such
    /// group that still has a corresponding capability. Does not touch
    /// AWS or the cluster.
    Clean(CleanArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct CleanArgs {
    #[clap(flatten)]
    pub azure: aas_common::config::AzureArgs,

    #[clap(flatten)]
    pub capsvc: aas_common::config::CapSvcArgs,
}
