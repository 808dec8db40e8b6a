use serde::{Deserialize, Serialize};

pub const HEADER_KEY_VERSION: &str = "Version";
pub const HEADER_KEY_EVENT_NAME: &str = "Event Name";
pub const HEADER_KEY_ERROR: &str = "Error";

pub const EVENT_NAME_CAPABILITY_CREATED: &str = "capability_created";
pub const EVENT_NAME_MEMBER_JOINED: &str = "member_joined_capability";
pub const EVENT_NAME_MEMBER_LEFT: &str = "member_left_capability";
pub const EVENT_NAME_AZURE_AD_GROUP_CREATED: &str = "azure_ad_group_created";
pub const VERSION_1: &str = "1";

/// Name/version resolved from a raw Kafka message. Header values are the
/// initial guess; non-empty body-embedded `eventName`/`version` fields
/// override them, matching the precedence the upstream's message decoder
/// actually implements (not a plain "headers, else body" fallback: a
/// present-and-non-empty body field always wins).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMetadata {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct BodyMetadata {
    #[serde(default, rename = "eventName")]
    event_name: String,
    #[serde(default)]
    version: String,
}

pub fn resolve_metadata(headers: &EventMetadata, body: &[u8]) -> EventMetadata {
    let mut metadata = headers.clone();

    if let Ok(parsed) = serde_json::from_slice::<BodyMetadata>(body) {
        if !parsed.event_name.is_empty() {
            metadata.name = parsed.event_name;
        }
        if !parsed.version.is_empty() {
            metadata.version = parsed.version;
        }
    }

    metadata
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityCreatedPayload {
    #[serde(rename = "capabilityId")]
    pub capability_id: String,
    #[serde(rename = "capabilityName")]
    pub capability_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityCreatedMessage {
    #[serde(default)]
    pub version: String,
    #[serde(rename = "eventName", default)]
    pub event_name: String,
    #[serde(rename = "x-correlationId", default)]
    pub x_correlation_id: String,
    #[serde(rename = "x-sender", default)]
    pub x_sender: String,
    pub payload: CapabilityCreatedPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberJoinedPayload {
    #[serde(rename = "capabilityId")]
    pub capability_id: String,
    #[serde(rename = "membershipId")]
    pub membership_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberJoinedMessage {
    pub payload: MemberJoinedPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberLeftPayload {
    #[serde(rename = "capabilityId")]
    pub capability_id: String,
    #[serde(rename = "memberEmail")]
    pub member_email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberLeftMessage {
    pub payload: MemberLeftPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct AzureAdGroupCreatedBody {
    #[serde(rename = "capabilityName")]
    pub capability_name: String,
    #[serde(rename = "azureAdGroupId")]
    pub azure_ad_group_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_fields_override_header_values_when_present() {
        let headers = EventMetadata {
            name: "unknown".into(),
            version: "0".into(),
        };
        let body = br#"{"eventName":"capability_created","version":"1"}"#;
        let resolved = resolve_metadata(&headers, body);
        assert_eq!(resolved.name, "capability_created");
        assert_eq!(resolved.version, "1");
    }

    #[test]
    fn header_values_survive_when_body_fields_are_empty_or_absent() {
        let headers = EventMetadata {
            name: "capability_created".into(),
            version: "1".into(),
        };
        let body = br#"{"payload":{}}"#;
        let resolved = resolve_metadata(&headers, body);
        assert_eq!(resolved, headers);
    }
}
