//! Alert data models
//!
//! OneView alert payloads are loosely shaped: the same information shows up
//! under different keys depending on the alert type and appliance version.
//! Raw alerts are therefore kept as JSON documents, and [`Alert::from_raw`]
//! derives the canonical fields with ordered fallbacks.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// A raw alert document as returned by OneView or posted to the webhook
pub type RawAlert = Map<String, Value>;

/// Identity used when an alert carries neither `uri` nor `resourceId`
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Resource name used when no resource field resolves
pub const UNKNOWN_RESOURCE: &str = "Unknown Resource";

/// Resource category used when the alert has no associated resource
pub const DEFAULT_CATEGORY: &str = "OneView";

/// Lifecycle state of an alert on the appliance
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AlertState {
    /// Alert is currently active
    #[default]
    Active,
    /// Condition has cleared
    Cleared,
    /// An operator acknowledged the alert
    Acknowledged,
    /// Any other state string, kept verbatim
    Other(String),
}

impl AlertState {
    /// Parse an `alertState` value, ignoring case
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "active" => Self::Active,
            "cleared" => Self::Cleared,
            "acknowledged" => Self::Acknowledged,
            _ => Self::Other(value.to_string()),
        }
    }

    /// String form of the state
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "Active",
            Self::Cleared => "Cleared",
            Self::Acknowledged => "Acknowledged",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AlertState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Canonical alert, derived from a raw payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// Dedup key: `uri`, else `resourceId`, else "Unknown"
    pub identity: String,

    /// Human-readable description
    pub description: String,

    /// Severity as reported (e.g. "Critical")
    pub severity: String,

    /// Current state
    pub state: AlertState,

    /// Creation timestamp as reported
    pub created_at: Option<String>,

    /// Last modification timestamp as reported
    pub modified_at: Option<String>,

    /// `alertTypeID`
    pub alert_type: Option<String>,

    /// `healthCategory`
    pub health_category: Option<String>,

    /// `urgency`
    pub urgency: Option<String>,

    /// `resourceUri` of the affected resource, or "OneView"
    pub source: String,

    /// Resolved resource name
    pub resource_name: String,

    /// Resolved resource category
    pub resource_category: String,

    /// The original payload
    #[serde(skip)]
    pub raw: RawAlert,
}

impl Alert {
    /// Build a canonical alert from a raw payload
    pub fn from_raw(raw: RawAlert) -> Self {
        let identity = string_field(&raw, "uri")
            .or_else(|| string_field(&raw, "resourceId"))
            .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string());

        let state = string_field(&raw, "alertState")
            .map(|s| AlertState::parse(&s))
            .unwrap_or_default();

        let (resource_name, resource_category) = resolve_resource(&raw);

        Self {
            identity,
            description: string_field(&raw, "description")
                .unwrap_or_else(|| "No description".to_string()),
            severity: string_field(&raw, "severity").unwrap_or_else(|| "critical".to_string()),
            state,
            created_at: string_field(&raw, "created"),
            modified_at: string_field(&raw, "modified"),
            alert_type: string_field(&raw, "alertTypeID"),
            health_category: string_field(&raw, "healthCategory"),
            urgency: string_field(&raw, "urgency"),
            source: string_field(&raw, "resourceUri").unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            resource_name,
            resource_category,
            raw,
        }
    }

    /// Build a canonical alert from an arbitrary JSON value; only objects qualify
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self::from_raw(map)),
            _ => None,
        }
    }

    /// Look up a field of the original payload
    pub fn raw_field(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }
}

/// Resolve (name, category) of the affected resource.
///
/// Name: `associatedResource.resourceName`, then `resourceName`, then
/// `physicalResourceType`. Category comes only from the associated resource.
fn resolve_resource(raw: &RawAlert) -> (String, String) {
    let associated = raw.get("associatedResource").and_then(Value::as_object);

    let name = associated
        .and_then(|r| string_field(r, "resourceName"))
        .or_else(|| string_field(raw, "resourceName"))
        .or_else(|| string_field(raw, "physicalResourceType"))
        .unwrap_or_else(|| UNKNOWN_RESOURCE.to_string());

    let category = associated
        .and_then(|r| string_field(r, "resourceCategory"))
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    (name, category)
}

/// A non-empty string (or number) field
fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alert(value: Value) -> Alert {
        Alert::from_value(value).unwrap()
    }

    #[test]
    fn test_resource_name_from_associated_resource() {
        let a = alert(json!({
            "uri": "/rest/alerts/1",
            "associatedResource": {
                "resourceName": "Blade-7",
                "resourceCategory": "server-hardware"
            }
        }));

        assert_eq!(a.resource_name, "Blade-7");
        assert_eq!(a.resource_category, "server-hardware");
    }

    #[test]
    fn test_resource_name_from_flat_field() {
        let a = alert(json!({ "uri": "/rest/alerts/2", "resourceName": "Enc-2" }));

        assert_eq!(a.resource_name, "Enc-2");
        assert_eq!(a.resource_category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_resource_name_from_physical_type() {
        let a = alert(json!({
            "uri": "/rest/alerts/3",
            "associatedResource": {},
            "physicalResourceType": "enclosures"
        }));

        assert_eq!(a.resource_name, "enclosures");
    }

    #[test]
    fn test_resource_name_unknown() {
        let a = alert(json!({ "uri": "/rest/alerts/4", "associatedResource": null }));

        assert_eq!(a.resource_name, UNKNOWN_RESOURCE);
        assert_eq!(a.resource_category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_identity_fallbacks() {
        assert_eq!(alert(json!({ "uri": "/rest/alerts/9", "resourceId": "x" })).identity, "/rest/alerts/9");
        assert_eq!(alert(json!({ "resourceId": "abc-123" })).identity, "abc-123");
        assert_eq!(alert(json!({ "description": "no id" })).identity, UNKNOWN_IDENTITY);
    }

    #[test]
    fn test_defaults_and_raw_preserved() {
        let a = alert(json!({ "uri": "/rest/alerts/5", "correctiveAction": "Reseat the blade" }));

        assert_eq!(a.description, "No description");
        assert_eq!(a.severity, "critical");
        assert_eq!(a.state, AlertState::Active);
        assert_eq!(a.source, "OneView");
        assert_eq!(
            a.raw_field("correctiveAction"),
            Some(&json!("Reseat the blade"))
        );
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!(AlertState::parse("ACTIVE"), AlertState::Active);
        assert_eq!(AlertState::parse("cleared"), AlertState::Cleared);
        assert_eq!(AlertState::parse("Acknowledged"), AlertState::Acknowledged);
        assert_eq!(
            AlertState::parse("Informational"),
            AlertState::Other("Informational".to_string())
        );
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(Alert::from_value(json!([1, 2, 3])).is_none());
        assert!(Alert::from_value(Value::Null).is_none());
    }
}
