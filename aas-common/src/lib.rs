pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod response;
pub mod shutdown;
pub mod wait;

/// One-time process init: installs the tracing subscriber and the rustls
/// crypto provider used transitively by `reqwest`/`kube`/`rdkafka`'s TLS
/// transports. Call once from each binary's `main`.
pub fn init() {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    if std::env::var("DISABLE_COLORS").is_ok() {
        owo_colors::set_override(false);
    }

    install_rustls_provider();
}

pub fn install_rustls_provider() {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("install aws-lc-rs provider");
}
