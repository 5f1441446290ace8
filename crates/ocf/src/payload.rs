use bitflags::bitflags;

use indexmap::IndexMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

bitflags! {
    /// Resource property bitmap.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ResourceProperties: u8 {
        /// The resource is active.
        const ACTIVE = 1;
        /// The resource is discoverable.
        const DISCOVERABLE = 1 << 1;
        /// The resource is observable.
        const OBSERVABLE = 1 << 2;
        /// The resource is slow to respond.
        const SLOW = 1 << 3;
        /// The resource is secure.
        const SECURE = 1 << 4;
    }
}

/// A logical payload handed over by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Resource representation.
    Representation(RepPayload),
    /// Device information.
    Device(DevicePayload),
    /// Platform information.
    Platform(PlatformPayload),
    /// Multicast discovery announcement.
    Discovery(DiscoveryPayload),
}

/// A resource representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepPayload {
    /// Resource URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Resource types.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    /// Resource interfaces.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    /// Representation values.
    pub values: IndexMap<String, RepValue>,
}

impl RepPayload {
    /// Creates an empty [`RepPayload`].
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value, returning the [`RepPayload`].
    #[must_use]
    #[inline]
    pub fn with(mut self, key: impl Into<String>, value: RepValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Returns a value.
    #[must_use]
    #[inline]
    pub fn get(&self, key: &str) -> Option<&RepValue> {
        self.values.get(key)
    }
}

/// A representation value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RepValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Double(f64),
    /// String value.
    String(String),
    /// Array passed through unchanged.
    Array(Vec<Value>),
    /// Nested representation.
    Object(RepPayload),
    /// Array of nested representations.
    ObjectArray(Vec<RepPayload>),
}

impl From<&str> for RepValue {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl From<String> for RepValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for RepValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for RepValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<RepPayload> for RepValue {
    fn from(value: RepPayload) -> Self {
        Self::Object(value)
    }
}

/// Device information payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicePayload {
    /// Server instance identifier.
    pub sid: Option<String>,
    /// Device name.
    pub device_name: Option<String>,
    /// Core specification version.
    pub spec_version: Option<String>,
    /// Data model versions.
    pub data_model_versions: Vec<String>,
}

/// Platform information payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformPayload {
    /// Platform information, absent when malformed.
    pub info: Option<PlatformInfoPayload>,
}

/// Platform information fields as carried on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformInfoPayload {
    /// Platform identifier.
    pub platform_id: Option<String>,
    /// Manufacturer name.
    pub manufacturer_name: Option<String>,
    /// Manufacturer URL.
    pub manufacturer_url: Option<String>,
    /// Model number.
    pub model_number: Option<String>,
    /// Manufacture date.
    pub date_of_manufacture: Option<String>,
    /// Platform version.
    pub platform_version: Option<String>,
    /// Operating system version.
    pub operating_system_version: Option<String>,
    /// Hardware version.
    pub hardware_version: Option<String>,
    /// Firmware version.
    pub firmware_version: Option<String>,
    /// Support URL.
    pub support_url: Option<String>,
}

/// Multicast discovery announcement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryPayload {
    /// Announcing server instance identifier.
    pub sid: Option<String>,
    /// Announced resources.
    pub resources: Vec<DiscoveredResource>,
}

/// A resource entry of a [`DiscoveryPayload`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveredResource {
    /// Resource URI.
    pub uri: Option<String>,
    /// Resource types.
    pub types: Vec<String>,
    /// Resource interfaces.
    pub interfaces: Vec<String>,
    /// Property bitmap.
    pub bitmap: Option<u8>,
    /// Security flag.
    pub secure: Option<bool>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Payload, RepPayload, RepValue, ResourceProperties};

    #[test]
    fn tagged_payload() {
        let payload: Payload = serde_json::from_value(json!({
            "type": "representation",
            "uri": "/light",
            "values": {
                "power": { "kind": "string", "value": "on" },
                "level": { "kind": "integer", "value": 7 },
            }
        }))
        .unwrap();

        assert_eq!(
            payload,
            Payload::Representation(RepPayload {
                uri: Some("/light".into()),
                ..RepPayload::new()
                    .with("power", "on".into())
                    .with("level", RepValue::Integer(7))
            })
        );

        let device: Payload = serde_json::from_value(json!({
            "type": "device",
            "sid": "urn:dev:1",
        }))
        .unwrap();
        assert!(matches!(device, Payload::Device(info) if info.sid.as_deref() == Some("urn:dev:1")));
    }

    #[test]
    fn property_bitmap() {
        let properties = ResourceProperties::DISCOVERABLE | ResourceProperties::OBSERVABLE;

        assert_eq!(properties.bits(), 6);
        assert!(!properties.contains(ResourceProperties::SLOW));
        assert_eq!(
            ResourceProperties::from_bits_truncate(31),
            ResourceProperties::all()
        );
    }
}
