use aas_common::error::AdapterError;

/// Contract for the capability email-alias pipeline.
///
/// The upstream project never finished this integration — its cloud-side
/// contract drifted between a PowerShell wrapper and an unofficial O365
/// admin API, and collision behaviour against legacy aliases was never
/// clarified. This trait captures only the shape the orchestrator needs;
/// no implementation ships, and the one provided here always reports the
/// data path as unconfigured so the job fails loudly instead of silently
/// doing nothing when an operator enables it.
#[async_trait::async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn ensure_alias(&self, root_id: &str, alias: &str) -> Result<(), AdapterError>;
}

pub struct UnconfiguredExchangeClient;

#[async_trait::async_trait]
impl ExchangeClient for UnconfiguredExchangeClient {
    async fn ensure_alias(&self, _root_id: &str, _alias: &str) -> Result<(), AdapterError> {
        Err(AdapterError::DataPathNotConfigured(
            "exchange alias backend (PowerShell wrapper or O365 admin API) is not wired up".into(),
        ))
    }
}
