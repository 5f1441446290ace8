use chrono::{DateTime, NaiveDate};

use hashbrown::HashSet;

use indexmap::IndexMap;

use crate::address::{Address, DeviceId};
use crate::error::{Error, ErrorKind, Result};
use crate::info::{DeviceInfo, PlatformInfo};
use crate::payload::{
    DevicePayload, DiscoveredResource, Payload, PlatformInfoPayload, RepPayload, RepValue,
    ResourceProperties,
};
use crate::resource::{ResourceDescriptor, ResourceId};
use crate::value::{Object, Value};

// Manufacture date format used on the wire.
const DATE_FORMAT: &str = "%Y-%m-%d";

type Visited = HashSet<*const IndexMap<String, Value>>;

const fn payload_kind(payload: &Payload) -> &'static str {
    match payload {
        Payload::Representation(_) => "representation",
        Payload::Device(_) => "device",
        Payload::Platform(_) => "platform",
        Payload::Discovery(_) => "discovery",
    }
}

fn invalid_payload(description: impl Into<std::borrow::Cow<'static, str>>) -> Error {
    Error::new(ErrorKind::InvalidPayload, description)
}

/// Converts a plain object into a representation.
///
/// Nested objects are converted recursively, arrays are passed through
/// unchanged.
///
/// # Errors
///
/// Returns an [`ErrorKind::CircularReference`] error when the same nested
/// object is reachable through two property paths.
pub fn encode_representation(object: &Object) -> Result<RepPayload> {
    let mut visited = Visited::new();
    encode_object(object, &mut visited)
}

fn encode_object(object: &Object, visited: &mut Visited) -> Result<RepPayload> {
    let mut payload = RepPayload::new();

    for (key, value) in object {
        let value = match value {
            Value::Null => RepValue::Null,
            Value::Bool(value) => RepValue::Bool(*value),
            Value::Integer(value) => RepValue::Integer(*value),
            Value::Double(value) => RepValue::Double(*value),
            Value::String(value) => RepValue::String(value.clone()),
            Value::Array(values) => RepValue::Array(values.clone()),
            Value::Object(child) => {
                if !visited.insert(child.identity()) {
                    return Err(Error::new(
                        ErrorKind::CircularReference,
                        format!("Circular object reference in property `{key}`"),
                    ));
                }
                RepValue::Object(encode_object(child, visited)?)
            }
        };
        payload.values.insert(key.clone(), value);
    }

    Ok(payload)
}

/// Converts a representation payload into a plain object.
///
/// # Errors
///
/// Returns an [`ErrorKind::InvalidPayload`] error when the payload is not a
/// representation.
pub fn decode_representation(payload: &Payload) -> Result<Object> {
    match payload {
        Payload::Representation(representation) => Ok(decode_object(representation)),
        other => Err(invalid_payload(format!(
            "Invalid representation payload: found a {} payload",
            payload_kind(other)
        ))),
    }
}

fn decode_object(representation: &RepPayload) -> Object {
    representation
        .values
        .iter()
        .map(|(key, value)| (key.clone(), decode_value(value)))
        .collect()
}

fn decode_value(value: &RepValue) -> Value {
    match value {
        RepValue::Null => Value::Null,
        RepValue::Bool(value) => Value::Bool(*value),
        RepValue::Integer(value) => Value::Integer(*value),
        RepValue::Double(value) => Value::Double(*value),
        RepValue::String(value) => Value::String(value.clone()),
        RepValue::Array(values) => Value::Array(values.clone()),
        RepValue::Object(child) => Value::Object(decode_object(child)),
        RepValue::ObjectArray(children) => Value::Array(
            children
                .iter()
                .map(|child| Value::Object(decode_object(child)))
                .collect(),
        ),
    }
}

/// Extracts the [`DeviceInfo`] of a device-information payload.
///
/// # Errors
///
/// Returns an [`ErrorKind::InvalidPayload`] error when the payload is not a
/// device-information payload or lacks the device identifier.
pub fn parse_device_info(payload: &Payload, address: &Address) -> Result<DeviceInfo> {
    let Payload::Device(device) = payload else {
        return Err(invalid_payload(format!(
            "Invalid device information payload: found a {} payload",
            payload_kind(payload)
        )));
    };

    let Some(sid) = device.sid.as_ref() else {
        return Err(invalid_payload(
            "Invalid device information payload: missing device identifier",
        ));
    };

    Ok(DeviceInfo {
        uuid: DeviceId::new(sid.clone()),
        url: address.url(),
        name: device.device_name.clone(),
        data_models: device.data_model_versions.clone(),
        core_spec_version: device.spec_version.clone(),
    })
}

/// Builds the device-information payload announced for a [`DeviceInfo`].
#[must_use]
pub fn device_payload(info: &DeviceInfo) -> DevicePayload {
    DevicePayload {
        sid: Some(info.uuid.as_str().into()),
        device_name: info.name.clone(),
        spec_version: info.core_spec_version.clone(),
        data_model_versions: info.data_models.clone(),
    }
}

/// Extracts the [`PlatformInfo`] of a platform-information payload.
///
/// # Errors
///
/// Returns an [`ErrorKind::InvalidPayload`] error when the payload is not a
/// platform-information payload, lacks its information record, or carries an
/// unparsable manufacture date.
pub fn parse_platform_info(payload: &Payload) -> Result<PlatformInfo> {
    let Payload::Platform(platform) = payload else {
        return Err(invalid_payload(format!(
            "Invalid platform information payload: found a {} payload",
            payload_kind(payload)
        )));
    };

    let Some(info) = platform.info.as_ref() else {
        return Err(invalid_payload(
            "Invalid platform information payload: missing information",
        ));
    };

    let manufacture_date = info
        .date_of_manufacture
        .as_deref()
        .map(parse_date)
        .transpose()?;

    Ok(PlatformInfo {
        id: info.platform_id.clone(),
        os_version: info.operating_system_version.clone(),
        model: info.model_number.clone(),
        manufacturer_name: info.manufacturer_name.clone(),
        manufacturer_url: info.manufacturer_url.clone(),
        manufacture_date,
        platform_version: info.platform_version.clone(),
        firmware_version: info.firmware_version.clone(),
        support_url: info.support_url.clone(),
    })
}

/// Builds the platform-information payload announced for a [`PlatformInfo`].
#[must_use]
pub fn platform_payload(info: &PlatformInfo) -> PlatformInfoPayload {
    PlatformInfoPayload {
        platform_id: info.id.clone(),
        manufacturer_name: info.manufacturer_name.clone(),
        manufacturer_url: info.manufacturer_url.clone(),
        model_number: info.model.clone(),
        date_of_manufacture: info
            .manufacture_date
            .map(|date| date.format(DATE_FORMAT).to_string()),
        platform_version: info.platform_version.clone(),
        operating_system_version: info.os_version.clone(),
        hardware_version: None,
        firmware_version: info.firmware_version.clone(),
        support_url: info.support_url.clone(),
    }
}

fn parse_date(date: &str) -> Result<NaiveDate> {
    DateTime::parse_from_rfc3339(date)
        .map(|date_time| date_time.date_naive())
        .or_else(|_| NaiveDate::parse_from_str(date, DATE_FORMAT))
        .map_err(|e| invalid_payload(format!("Invalid manufacture date `{date}`: {e}")))
}

/// Extracts a [`ResourceDescriptor`] from a resource link representation.
///
/// # Errors
///
/// Returns an [`ErrorKind::InvalidPayload`] error when the payload is not a
/// representation, or lacks a non-empty path, a non-empty type list, a
/// non-empty interface list, or a property object containing both the
/// security flag and the bitmap.
pub fn parse_resource_link(payload: &Payload, device_id: &DeviceId) -> Result<ResourceDescriptor> {
    let link = decode_representation(payload)?;
    descriptor_from_link(&link, device_id)
}

/// Extracts the [`ResourceDescriptor`]s of a resource-directory
/// representation.
///
/// # Errors
///
/// Returns an [`ErrorKind::InvalidPayload`] error when the payload is not a
/// representation, lacks the device identifier or a non-empty `links` array,
/// or when any link is malformed.
pub fn parse_resource_batch(payload: &Payload) -> Result<Vec<ResourceDescriptor>> {
    let Payload::Representation(representation) = payload else {
        return Err(invalid_payload(format!(
            "Unexpected resource directory payload: found a {} payload",
            payload_kind(payload)
        )));
    };

    let Some(RepValue::String(device_id)) = representation.get("di") else {
        return Err(invalid_payload(
            "Unexpected resource directory payload: missing device identifier",
        ));
    };
    let device_id = DeviceId::new(device_id.clone());

    let links = match representation.get("links") {
        Some(RepValue::ObjectArray(links)) => links.iter().map(decode_object).collect(),
        Some(RepValue::Array(links)) => links
            .iter()
            .map(|link| {
                link.as_object().cloned().ok_or_else(|| {
                    invalid_payload("Unexpected resource directory payload: malformed link")
                })
            })
            .collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };

    if links.is_empty() {
        return Err(invalid_payload(
            "Unexpected resource directory payload: no links",
        ));
    }

    links
        .iter()
        .map(|link| descriptor_from_link(link, &device_id))
        .collect()
}

/// Extracts the [`ResourceDescriptor`]s of a multicast discovery
/// announcement.
///
/// # Errors
///
/// Returns an [`ErrorKind::InvalidPayload`] error when the payload is not a
/// discovery announcement, lacks the announcing identifier, contains no
/// resources, or contains a malformed resource.
pub fn parse_discovery_batch(payload: &Payload) -> Result<Vec<ResourceDescriptor>> {
    let Payload::Discovery(discovery) = payload else {
        return Err(invalid_payload(format!(
            "Invalid discovery payload: found a {} payload",
            payload_kind(payload)
        )));
    };

    let Some(sid) = discovery.sid.as_ref() else {
        return Err(invalid_payload(
            "Invalid discovery payload: missing device identifier",
        ));
    };

    if discovery.resources.is_empty() {
        return Err(invalid_payload("Invalid discovery payload: no resources"));
    }

    let device_id = DeviceId::new(sid.clone());

    discovery
        .resources
        .iter()
        .map(|resource| {
            let (Some(uri), Some(bitmap), Some(secure)) =
                (resource.uri.as_ref(), resource.bitmap, resource.secure)
            else {
                return Err(invalid_payload(
                    "Invalid discovery payload: invalid resource in payload",
                ));
            };

            if uri.is_empty() || resource.types.is_empty() || resource.interfaces.is_empty() {
                return Err(invalid_payload(format!(
                    "Invalid discovery payload: invalid resource `{uri}` in payload"
                )));
            }

            Ok(ResourceDescriptor::from_bitmap(
                ResourceId::new(device_id.clone(), uri.clone()),
                resource.types.clone(),
                resource.interfaces.clone(),
                secure,
                ResourceProperties::from_bits_truncate(bitmap),
            ))
        })
        .collect()
}

/// Builds the link representation announcing a resource.
#[must_use]
pub fn resource_link(descriptor: &ResourceDescriptor) -> RepPayload {
    let strings = |values: &[String]| {
        RepValue::Array(values.iter().map(|value| Value::from(value.as_str())).collect())
    };

    RepPayload::new()
        .with("href", descriptor.resource_path.as_str().into())
        .with("rt", strings(&descriptor.resource_types))
        .with("if", strings(&descriptor.interfaces))
        .with(
            "p",
            RepPayload::new()
                .with("bm", i64::from(descriptor.bitmap().bits()).into())
                .with("sec", descriptor.secure.into())
                .into(),
        )
}

/// Builds the discovery entry announcing a resource.
#[must_use]
pub fn discovered_resource(descriptor: &ResourceDescriptor) -> DiscoveredResource {
    DiscoveredResource {
        uri: Some(descriptor.resource_path.clone()),
        types: descriptor.resource_types.clone(),
        interfaces: descriptor.interfaces.clone(),
        bitmap: Some(descriptor.bitmap().bits()),
        secure: Some(descriptor.secure),
    }
}

fn descriptor_from_link(link: &Object, device_id: &DeviceId) -> Result<ResourceDescriptor> {
    let invalid = || {
        invalid_payload(format!(
            "Invalid resource representation from device `{device_id}`"
        ))
    };

    let resource_path = link
        .get("href")
        .and_then(Value::as_str)
        .filter(|href| !href.is_empty())
        .ok_or_else(invalid)?;

    let resource_types = link.get("rt").and_then(string_list).ok_or_else(invalid)?;
    let interfaces = link.get("if").and_then(string_list).ok_or_else(invalid)?;

    let properties = link.get("p").and_then(Value::as_object).ok_or_else(invalid)?;
    let secure = properties
        .get("sec")
        .and_then(Value::as_bool)
        .ok_or_else(invalid)?;
    let bitmap = properties
        .get("bm")
        .and_then(Value::as_i64)
        // Only the low byte carries properties.
        .and_then(|bitmap| u8::try_from(bitmap & 0xff).ok())
        .ok_or_else(invalid)?;

    Ok(ResourceDescriptor::from_bitmap(
        ResourceId::new(device_id.clone(), resource_path),
        resource_types,
        interfaces,
        secure,
        ResourceProperties::from_bits_truncate(bitmap),
    ))
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    let values = value.as_array()?;
    if values.is_empty() {
        return None;
    }
    values
        .iter()
        .map(|value| value.as_str().map(String::from))
        .collect()
}
