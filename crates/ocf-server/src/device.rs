use tracing::info;

use ocf::address::DeviceId;
use ocf::codec::{device_payload, platform_payload};
use ocf::error::{Error, ErrorKind, Result};
use ocf::info::{DeviceInfo, PlatformInfo};
use ocf::{MAX_MANUFACTURER_NAME_LENGTH, MAX_MANUFACTURER_URL_LENGTH};

use crate::server::Server;

// Default device name.
const DEFAULT_NAME: &str = "default";

// Default core specification version.
const DEFAULT_CORE_SPEC_VERSION: &str = "1.0.0";

// Default data model version.
const DEFAULT_DATA_MODEL: &str = "res.1.0.0";

// Default manufacturer name.
const DEFAULT_MANUFACTURER_NAME: &str = "default";

pub(crate) fn default_device(uuid: DeviceId) -> DeviceInfo {
    DeviceInfo {
        uuid,
        url: String::new(),
        name: Some(DEFAULT_NAME.into()),
        data_models: vec![DEFAULT_DATA_MODEL.into()],
        core_spec_version: Some(DEFAULT_CORE_SPEC_VERSION.into()),
    }
}

pub(crate) fn default_platform() -> PlatformInfo {
    PlatformInfo {
        manufacturer_name: Some(DEFAULT_MANUFACTURER_NAME.into()),
        ..PlatformInfo::default()
    }
}

fn invalid_info(description: String) -> Error {
    Error::new(ErrorKind::InvalidInfo, description)
}

fn validate_platform(info: &PlatformInfo) -> Result<()> {
    match info.manufacturer_name.as_deref() {
        None | Some("") => {
            return Err(invalid_info(
                "manufacturer name must be a non-empty string".into(),
            ));
        }
        Some(name) if name.chars().count() > MAX_MANUFACTURER_NAME_LENGTH => {
            return Err(invalid_info(format!(
                "manufacturer name length must not exceed {MAX_MANUFACTURER_NAME_LENGTH} characters"
            )));
        }
        Some(_) => {}
    }

    if info
        .manufacturer_url
        .as_deref()
        .is_some_and(|url| url.chars().count() > MAX_MANUFACTURER_URL_LENGTH)
    {
        return Err(invalid_info(format!(
            "manufacturer URL length must not exceed {MAX_MANUFACTURER_URL_LENGTH} characters"
        )));
    }

    Ok(())
}

impl Server {
    /// Returns the information of the local device.
    ///
    /// The identifier is the server instance identifier of the transport.
    #[must_use]
    pub fn device_info(&self) -> DeviceInfo {
        let mut info = self.shared.device.lock().clone();
        info.uuid = self.shared.transport.server_instance_id();
        info
    }

    /// Returns the information of the local platform.
    ///
    /// The platform identifier is the server instance identifier of the
    /// transport.
    #[must_use]
    pub fn platform_info(&self) -> PlatformInfo {
        let mut info = self.shared.platform.lock().clone();
        info.id = Some(self.shared.transport.server_instance_id().as_str().into());
        info
    }

    /// Publishes the information of the local device.
    ///
    /// The given information is merged into the current one, which is
    /// updated only once the transport accepts the result.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::TransportFailure`] error when the transport
    /// refuses the information.
    pub fn set_device_info(&self, info: &DeviceInfo) -> Result<()> {
        let mut merged = self.device_info();
        merged.merge(info);

        let result = self
            .shared
            .transport
            .set_device_info(device_payload(&merged));
        if !result.is_ok() {
            return Err(
                Error::new(ErrorKind::TransportFailure, "Set device info failed")
                    .with_result(result),
            );
        }

        info!("Device information updated");
        *self.shared.device.lock() = merged;
        Ok(())
    }

    /// Publishes the information of the local platform.
    ///
    /// The given information is merged into the current one, which is
    /// updated only once the transport accepts the result.
    ///
    /// Validation applies to the merged record: an omitted field keeps its
    /// stored value, so leaving out the manufacturer name keeps the current
    /// one rather than failing.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::InvalidInfo`] error when the merged
    /// manufacturer name is empty or too long, or when the manufacturer URL
    /// is too long. Returns an [`ErrorKind::TransportFailure`] error when the
    /// transport refuses the information.
    pub fn set_platform_info(&self, info: &PlatformInfo) -> Result<()> {
        let mut merged = self.platform_info();
        merged.merge(info);
        validate_platform(&merged)?;

        let result = self
            .shared
            .transport
            .set_platform_info(platform_payload(&merged));
        if !result.is_ok() {
            return Err(
                Error::new(ErrorKind::TransportFailure, "Set platform info failed")
                    .with_result(result),
            );
        }

        info!("Platform information updated");
        *self.shared.platform.lock() = merged;
        Ok(())
    }
}
