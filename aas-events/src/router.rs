use std::time::Duration;

use aas_common::config::KafkaArgs;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::handlers::{self, HandlerDeps};
use crate::messages::{
    CapabilityCreatedMessage, EVENT_NAME_AZURE_AD_GROUP_CREATED, EVENT_NAME_CAPABILITY_CREATED,
    EVENT_NAME_MEMBER_JOINED, EVENT_NAME_MEMBER_LEFT, EventMetadata, HEADER_KEY_ERROR,
    HEADER_KEY_EVENT_NAME, HEADER_KEY_VERSION, MemberJoinedMessage, MemberLeftMessage, VERSION_1,
    resolve_metadata,
};
use crate::retry::{RetryOutcome, retry_until_permanent};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_consumer(kafka: &KafkaArgs) -> anyhow::Result<StreamConsumer> {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", &kafka.brokers)
        .set("group.id", &kafka.group_id)
        .set("enable.auto.commit", "false")
        .set("session.timeout.ms", "10000");

    apply_security(&mut config, kafka);

    Ok(config.create()?)
}

pub fn build_producer(kafka: &KafkaArgs) -> anyhow::Result<FutureProducer> {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", &kafka.brokers)
        .set("message.timeout.ms", "10000");
    apply_security(&mut config, kafka);
    Ok(config.create()?)
}

fn apply_security(config: &mut ClientConfig, kafka: &KafkaArgs) {
    if let (Some(username), Some(password)) = (&kafka.sasl_plain.username, &kafka.sasl_plain.password) {
        config
            .set("sasl.mechanism", "PLAIN")
            .set("sasl.username", username)
            .set("sasl.password", password);
        config.set(
            "security.protocol",
            if kafka.tls { "SASL_SSL" } else { "SASL_PLAINTEXT" },
        );
    } else if kafka.tls {
        config.set("security.protocol", "SSL");
    }
}

/// Outer consume loop: fetch, extract metadata, dispatch, commit.
///
/// Mirrors the upstream's `ConsumeMessages`: a hard fetch error or
/// cancellation exits the loop; an undeterminable event name goes
/// straight to the permanent-error/DLQ path; a determined-but-unrecognised
/// name is skipped silently; offsets are committed only after the
/// dispatch path (success, skip, or DLQ write) completes.
pub async fn consume_messages(
    consumer: &StreamConsumer,
    producer: &FutureProducer,
    topic: &str,
    producer_topic: &str,
    error_producer_topic: &str,
    deps: &HandlerDeps,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    consumer.subscribe(&[topic])?;
    info!("begin consuming messages");

    loop {
        if cancel.is_cancelled() {
            info!("processing cancelled");
            break;
        }

        let msg = tokio::select! {
            _ = cancel.cancelled() => {
                info!("processing cancelled");
                break;
            }
            result = consumer.recv() => result,
        };

        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                error!(error = %e, "error fetching message");
                break;
            }
        };

        let key = msg.key().unwrap_or_default().to_vec();
        let payload = msg.payload().unwrap_or_default().to_vec();
        let headers = extract_header_metadata(&msg);

        debug!(topic = msg.topic(), partition = msg.partition(), offset = msg.offset(), "message fetched");

        let metadata = resolve_metadata(&headers, &payload);

        if metadata.name.is_empty() {
            dead_letter(
                producer,
                error_producer_topic,
                &key,
                &payload,
                &headers,
                "unable to determine an event name",
            )
            .await?;
            consumer.commit_message(&msg, CommitMode::Sync)?;
            continue;
        }

        let event_log_name = metadata.name.clone();
        info!(name = %event_log_name, version = %metadata.version, "event detected");

        let dispatch_result = dispatch(
            &metadata,
            &payload,
            deps,
            producer,
            producer_topic,
            cancel,
        )
        .await;

        match dispatch_result {
            DispatchOutcome::Skipped => {
                info!(name = %event_log_name, "skip processing unhandled event");
            }
            DispatchOutcome::Handled => {}
            DispatchOutcome::Permanent(reason) => {
                dead_letter(producer, error_producer_topic, &key, &payload, &headers, &reason).await?;
            }
            DispatchOutcome::Cancelled => {
                info!(name = %event_log_name, "job cancelled, stopping before commit");
                break;
            }
        }

        consumer.commit_message(&msg, CommitMode::Sync)?;
    }

    info!("stopped consuming messages");
    Ok(())
}

enum DispatchOutcome {
    Handled,
    Skipped,
    Permanent(String),
    Cancelled,
}

async fn dispatch(
    metadata: &EventMetadata,
    payload: &[u8],
    deps: &HandlerDeps,
    producer: &FutureProducer,
    producer_topic: &str,
    cancel: &CancellationToken,
) -> DispatchOutcome {
    match metadata.name.as_str() {
        EVENT_NAME_CAPABILITY_CREATED => match metadata.version.as_str() {
            VERSION_1 => {
                let decoded: CapabilityCreatedMessage = match serde_json::from_slice(payload) {
                    Ok(m) => m,
                    Err(e) => return DispatchOutcome::Permanent(format!("json decode failure: {e}")),
                };
                match retry_until_permanent(cancel, || handlers::capability_created(deps, &decoded)).await {
                    RetryOutcome::Done(outcome) => {
                        if let Err(e) = publish_azure_ad_group_created(producer, producer_topic, &outcome).await {
                            return DispatchOutcome::Permanent(format!("result publish failed: {e}"));
                        }
                        DispatchOutcome::Handled
                    }
                    RetryOutcome::Cancelled => DispatchOutcome::Cancelled,
                    RetryOutcome::Permanent(e) => DispatchOutcome::Permanent(e.to_string()),
                }
            }
            other => DispatchOutcome::Permanent(format!("unsupported version of capability_created: {other}")),
        },
        EVENT_NAME_MEMBER_JOINED => match metadata.version.as_str() {
            VERSION_1 => {
                let decoded: MemberJoinedMessage = match serde_json::from_slice(payload) {
                    Ok(m) => m,
                    Err(e) => return DispatchOutcome::Permanent(format!("json decode failure: {e}")),
                };
                match retry_until_permanent(cancel, || handlers::member_joined_capability(deps, &decoded)).await {
                    RetryOutcome::Done(()) => DispatchOutcome::Handled,
                    RetryOutcome::Cancelled => DispatchOutcome::Cancelled,
                    RetryOutcome::Permanent(e) => DispatchOutcome::Permanent(e.to_string()),
                }
            }
            other => DispatchOutcome::Permanent(format!("unsupported version of member_joined_capability: {other}")),
        },
        EVENT_NAME_MEMBER_LEFT => match metadata.version.as_str() {
            VERSION_1 => {
                let decoded: MemberLeftMessage = match serde_json::from_slice(payload) {
                    Ok(m) => m,
                    Err(e) => return DispatchOutcome::Permanent(format!("json decode failure: {e}")),
                };
                match retry_until_permanent(cancel, || handlers::member_left_capability(deps, &decoded)).await {
                    RetryOutcome::Done(()) => DispatchOutcome::Handled,
                    RetryOutcome::Cancelled => DispatchOutcome::Cancelled,
                    RetryOutcome::Permanent(e) => DispatchOutcome::Permanent(e.to_string()),
                }
            }
            other => DispatchOutcome::Permanent(format!("unsupported version of member_left_capability: {other}")),
        },
        _ => DispatchOutcome::Skipped,
    }
}

async fn publish_azure_ad_group_created(
    producer: &FutureProducer,
    topic: &str,
    outcome: &handlers::CapabilityCreatedOutcome,
) -> anyhow::Result<()> {
    let body = serde_json::to_vec(&outcome.body)?;
    let headers = OwnedHeaders::new()
        .insert(Header { key: HEADER_KEY_VERSION, value: Some(VERSION_1) })
        .insert(Header {
            key: HEADER_KEY_EVENT_NAME,
            value: Some(EVENT_NAME_AZURE_AD_GROUP_CREATED),
        });

    let record = FutureRecord::to(topic)
        .key(&outcome.group_id)
        .payload(&body)
        .headers(headers);

    producer
        .send(record, REQUEST_TIMEOUT)
        .await
        .map_err(|(e, _)| anyhow::anyhow!("producer send failed: {e}"))?;
    Ok(())
}

/// Writes the original message (key, value, headers) plus an `Error`
/// header to the DLQ. A failed DLQ write is treated as fatal by the
/// caller: no further progress is safe without risking message loss.
async fn dead_letter(
    producer: &FutureProducer,
    topic: &str,
    key: &[u8],
    payload: &[u8],
    original_headers: &EventMetadata,
    reason: &str,
) -> anyhow::Result<()> {
    let headers = OwnedHeaders::new()
        .insert(Header { key: HEADER_KEY_VERSION, value: Some(original_headers.version.as_str()) })
        .insert(Header { key: HEADER_KEY_EVENT_NAME, value: Some(original_headers.name.as_str()) })
        .insert(Header { key: HEADER_KEY_ERROR, value: Some(reason) });

    let record = FutureRecord::to(topic).key(key).payload(payload).headers(headers);

    match producer.send(record, REQUEST_TIMEOUT).await {
        Ok(_) => {
            error!(reason, "permanent error while handling message, written to dead letter queue");
            Ok(())
        }
        Err((e, _)) => {
            error!(error = %e, "error writing message to dead letter queue, this is fatal");
            Err(anyhow::anyhow!("dead letter queue write failed: {e}"))
        }
    }
}

fn extract_header_metadata(msg: &rdkafka::message::BorrowedMessage<'_>) -> EventMetadata {
    let mut metadata = EventMetadata::default();
    let Some(headers) = msg.headers() else {
        return metadata;
    };

    for i in 0..headers.count() {
        let header = headers.get(i);
        let value = header.value.map(|v| String::from_utf8_lossy(v).into_owned()).unwrap_or_default();
        match header.key {
            HEADER_KEY_EVENT_NAME => metadata.name = value,
            HEADER_KEY_VERSION => metadata.version = value,
            _ => {}
        }
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use aas_adapters::capsvc::CapSvcClient;
    use aas_adapters::directory::DirectoryClient;
    use aas_adapters::scim::ScimClient;
    use aas_common::http::TokenCache;

    fn test_deps() -> HandlerDeps {
        let http = reqwest::Client::new();
        let tokens = TokenCache::new(
            http.clone(),
            "https://example.com/token".to_string(),
            "id",
            "secret",
            None,
            "AAS_ROUTER_TEST_TOKEN_UNUSED",
        );
        HandlerDeps {
            directory: std::sync::Arc::new(DirectoryClient::new(http.clone(), tokens.clone(), "internal.example.com".to_string())),
            capsvc: std::sync::Arc::new(CapSvcClient::new(http.clone(), tokens, "https://capsvc.example.com".to_string())),
            scim: std::sync::Arc::new(ScimClient::new(http, "https://scim.example.com".to_string(), "token".to_string())),
            au_name: "Team - Cloud Engineering - Self service".to_string(),
        }
    }

    fn producer() -> FutureProducer {
        ClientConfig::new()
            .set("bootstrap.servers", "localhost:9092")
            .create()
            .expect("producer handle construction performs no I/O")
    }

    #[tokio::test]
    async fn dispatch_skips_unrecognized_event_name() {
        let deps = test_deps();
        let producer = producer();
        let cancel = CancellationToken::new();
        let metadata = EventMetadata { name: "some_future_event".into(), version: VERSION_1.to_string() };

        let outcome = dispatch(&metadata, b"{}", &deps, &producer, "result-topic", &cancel).await;
        assert!(matches!(outcome, DispatchOutcome::Skipped));
    }

    #[tokio::test]
    async fn dispatch_treats_unsupported_version_as_permanent() {
        let deps = test_deps();
        let producer = producer();
        let cancel = CancellationToken::new();
        let metadata = EventMetadata { name: EVENT_NAME_CAPABILITY_CREATED.to_string(), version: "99".to_string() };

        let outcome = dispatch(&metadata, b"{}", &deps, &producer, "result-topic", &cancel).await;
        assert!(matches!(outcome, DispatchOutcome::Permanent(_)));
    }

    #[tokio::test]
    async fn dispatch_treats_malformed_body_as_permanent() {
        let deps = test_deps();
        let producer = producer();
        let cancel = CancellationToken::new();
        let metadata = EventMetadata { name: EVENT_NAME_MEMBER_JOINED.to_string(), version: VERSION_1.to_string() };

        let outcome = dispatch(&metadata, b"not json", &deps, &producer, "result-topic", &cancel).await;
        assert!(matches!(outcome, DispatchOutcome::Permanent(_)));
    }
}
