mod app;
mod args;
mod clean;
mod server;

use std::sync::Arc;

use app::App;
use clap::Parser;
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    aas_common::init();
    let cli = args::Cli::parse();

    match cli.command {
        args::Command::Clean(clean_args) => clean::run(&clean_args, aas_adapters::models::ADMIN_UNIT_NAME).await,
        args::Command::Serve(server_cli) => run_server(server_cli).await,
    }
}

async fn run_server(cli: aas_common::config::Cli) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let shutdown_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            aas_common::shutdown::shutdown_signal().await;
            cancel.cancel();
        })
    };

    let app = Arc::new(App::build(&cli, cancel.clone()).await?);

    let frequency = cli.scheduler.frequency_duration()?;
    app.orchestrator.start_scheduler(frequency);

    let consumer = aas_events::router::build_consumer(&cli.kafka)?;
    let producer = aas_events::router::build_producer(&cli.kafka)?;

    let admin_task = {
        let cancel = cancel.clone();
        let app = app.clone();
        let addr = cli.http.admin_addr.clone();
        tokio::spawn(async move { server::run(cancel, addr, app).await })
    };

    let metrics_task = {
        let cancel = cancel.clone();
        let addr = cli.http.metrics_addr.clone();
        tokio::spawn(async move { server::run_metrics(cancel, addr).await })
    };

    let events_task = {
        let cancel = cancel.clone();
        let handler_deps = app.handler_deps.clone();
        let kafka = cli.kafka.clone();
        tokio::spawn(async move {
            aas_events::router::consume_messages(
                &consumer,
                &producer,
                &kafka.topic,
                &kafka.producer_topic,
                &kafka.error_producer_topic,
                &handler_deps,
                &cancel,
            )
            .await
        })
    };

    tokio::select! {
        res = admin_task => { cancel.cancel(); res??; }
        res = metrics_task => { cancel.cancel(); res??; }
        res = events_task => { cancel.cancel(); res??; }
        _ = cancel.cancelled() => {}
    }

    shutdown_task.abort();
    app.orchestrator.drain().await;

    println!("{}", "aad-aws-sync stopped gracefully".green());
    Ok(())
}
