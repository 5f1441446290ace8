use chrono::NaiveDate;

use serde::{Deserialize, Serialize};

use crate::address::DeviceId;

/// Information about a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device identifier.
    pub uuid: DeviceId,
    /// Device URL, empty for the local device.
    pub url: String,
    /// Device name.
    pub name: Option<String>,
    /// Data model versions.
    pub data_models: Vec<String>,
    /// Core specification version.
    pub core_spec_version: Option<String>,
}

impl DeviceInfo {
    /// Merges the given [`DeviceInfo`] into this one.
    ///
    /// The identifier and URL are kept. Present names and versions, and a
    /// non-empty data model list, overwrite the current ones.
    pub fn merge(&mut self, other: &Self) {
        if other.name.is_some() {
            self.name.clone_from(&other.name);
        }
        if other.core_spec_version.is_some() {
            self.core_spec_version.clone_from(&other.core_spec_version);
        }
        if !other.data_models.is_empty() {
            self.data_models.clone_from(&other.data_models);
        }
    }
}

/// Information about a platform.
///
/// Absent fields are omitted, never defaulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformInfo {
    /// Platform identifier.
    pub id: Option<String>,
    /// Operating system version.
    pub os_version: Option<String>,
    /// Model number.
    pub model: Option<String>,
    /// Manufacturer name.
    pub manufacturer_name: Option<String>,
    /// Manufacturer URL.
    pub manufacturer_url: Option<String>,
    /// Manufacture date.
    pub manufacture_date: Option<NaiveDate>,
    /// Platform version.
    pub platform_version: Option<String>,
    /// Firmware version.
    pub firmware_version: Option<String>,
    /// Support URL.
    pub support_url: Option<String>,
}

impl PlatformInfo {
    /// Merges the given [`PlatformInfo`] into this one.
    ///
    /// Fields present in `other` overwrite the current ones.
    pub fn merge(&mut self, other: &Self) {
        fn merge_field<T: Clone>(field: &mut Option<T>, other: &Option<T>) {
            if other.is_some() {
                field.clone_from(other);
            }
        }

        merge_field(&mut self.id, &other.id);
        merge_field(&mut self.os_version, &other.os_version);
        merge_field(&mut self.model, &other.model);
        merge_field(&mut self.manufacturer_name, &other.manufacturer_name);
        merge_field(&mut self.manufacturer_url, &other.manufacturer_url);
        merge_field(&mut self.manufacture_date, &other.manufacture_date);
        merge_field(&mut self.platform_version, &other.platform_version);
        merge_field(&mut self.firmware_version, &other.firmware_version);
        merge_field(&mut self.support_url, &other.support_url);
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::address::DeviceId;

    use super::{DeviceInfo, PlatformInfo};

    #[test]
    fn device_merge() {
        let mut info = DeviceInfo {
            uuid: DeviceId::new("urn:dev:1"),
            url: String::new(),
            name: Some("default".into()),
            data_models: vec!["res.1.0.0".into()],
            core_spec_version: Some("1.0.0".into()),
        };

        info.merge(&DeviceInfo {
            uuid: DeviceId::new("urn:dev:2"),
            url: "coap://10.0.0.2".into(),
            name: Some("lamp".into()),
            data_models: Vec::new(),
            core_spec_version: None,
        });

        assert_eq!(info.uuid, DeviceId::new("urn:dev:1"));
        assert!(info.url.is_empty());
        assert_eq!(info.name.as_deref(), Some("lamp"));
        assert_eq!(info.data_models, ["res.1.0.0"]);
        assert_eq!(info.core_spec_version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn platform_merge() {
        let mut info = PlatformInfo {
            id: Some("urn:dev:1".into()),
            manufacturer_name: Some("default".into()),
            ..PlatformInfo::default()
        };

        info.merge(&PlatformInfo {
            manufacturer_name: Some("Acme".into()),
            manufacture_date: NaiveDate::from_ymd_opt(2016, 3, 1),
            ..PlatformInfo::default()
        });

        assert_eq!(info.id.as_deref(), Some("urn:dev:1"));
        assert_eq!(info.manufacturer_name.as_deref(), Some("Acme"));
        assert_eq!(info.manufacture_date, NaiveDate::from_ymd_opt(2016, 3, 1));
        assert!(info.model.is_none());
    }
}
