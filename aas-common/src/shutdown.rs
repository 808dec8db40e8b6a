/// Resolves once the process receives SIGINT or SIGTERM (or Ctrl-C on
/// non-unix targets). Intended to be raced against the rest of the
/// process via `tokio::select!`, with the loser cancelling a shared
/// `CancellationToken`.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => tracing::warn!("received SIGINT"),
            _ = sigterm.recv() => tracing::warn!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
        tracing::warn!("received Ctrl-C");
    }
}
