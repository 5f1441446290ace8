use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::address::DeviceId;
use crate::error::{Error, ErrorKind, Result};
use crate::payload::ResourceProperties;
use crate::value::Object;

/// Identifier of a resource hosted by a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    /// Hosting device.
    pub device_id: DeviceId,
    /// Resource path.
    pub resource_path: String,
}

impl ResourceId {
    /// Creates a [`ResourceId`].
    #[must_use]
    #[inline]
    pub fn new(device_id: DeviceId, resource_path: impl Into<String>) -> Self {
        Self {
            device_id,
            resource_path: resource_path.into(),
        }
    }
}

/// Description of a resource as announced by its device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Hosting device.
    pub device_id: DeviceId,
    /// Resource path.
    pub resource_path: String,
    /// Resource types, never empty.
    pub resource_types: Vec<String>,
    /// Resource interfaces, never empty.
    pub interfaces: Vec<String>,
    /// Whether the resource is secure.
    pub secure: bool,
    /// Whether the resource is discoverable.
    pub discoverable: bool,
    /// Whether the resource is observable.
    pub observable: bool,
    /// Whether the resource is slow to respond.
    pub slow: bool,
    /// Whether the resource is active.
    pub active: bool,
}

impl ResourceDescriptor {
    /// Creates a [`ResourceDescriptor`] deriving the flags from a property
    /// bitmap.
    #[must_use]
    pub fn from_bitmap(
        id: ResourceId,
        resource_types: Vec<String>,
        interfaces: Vec<String>,
        secure: bool,
        bitmap: ResourceProperties,
    ) -> Self {
        Self {
            device_id: id.device_id,
            resource_path: id.resource_path,
            resource_types,
            interfaces,
            secure,
            discoverable: bitmap.contains(ResourceProperties::DISCOVERABLE),
            observable: bitmap.contains(ResourceProperties::OBSERVABLE),
            slow: bitmap.contains(ResourceProperties::SLOW),
            active: bitmap.contains(ResourceProperties::ACTIVE),
        }
    }

    /// Returns the [`ResourceId`].
    #[must_use]
    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.device_id.clone(), self.resource_path.clone())
    }

    /// Returns the property bitmap, security flag excluded.
    #[must_use]
    pub fn bitmap(&self) -> ResourceProperties {
        flags_to_bitmap(self.discoverable, self.observable, false, self.slow, self.active)
    }
}

/// Registration request for a local resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInit {
    pub(crate) resource_path: Cow<'static, str>,
    pub(crate) resource_types: Vec<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) discoverable: bool,
    pub(crate) observable: bool,
    pub(crate) secure: bool,
    pub(crate) slow: bool,
    pub(crate) active: bool,
    pub(crate) properties: Object,
}

impl ResourceInit {
    /// Creates a [`ResourceInit`] for the given path.
    #[must_use]
    #[inline]
    pub fn new(resource_path: impl Into<Cow<'static, str>>) -> Self {
        Self {
            resource_path: resource_path.into(),
            resource_types: Vec::new(),
            interfaces: Vec::new(),
            discoverable: false,
            observable: false,
            secure: false,
            slow: false,
            active: false,
            properties: Object::new(),
        }
    }

    /// Adds a resource type.
    #[must_use]
    #[inline]
    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_types.push(resource_type.into());
        self
    }

    /// Adds an interface.
    #[must_use]
    #[inline]
    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    /// Makes the resource discoverable.
    #[must_use]
    pub const fn discoverable(mut self) -> Self {
        self.discoverable = true;
        self
    }

    /// Makes the resource observable.
    #[must_use]
    pub const fn observable(mut self) -> Self {
        self.observable = true;
        self
    }

    /// Makes the resource secure.
    #[must_use]
    pub const fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    /// Marks the resource as slow.
    #[must_use]
    pub const fn slow(mut self) -> Self {
        self.slow = true;
        self
    }

    /// Marks the resource as active.
    #[must_use]
    pub const fn active(mut self) -> Self {
        self.active = true;
        self
    }

    /// Sets the initial properties.
    #[must_use]
    #[inline]
    pub fn properties(mut self, properties: Object) -> Self {
        self.properties = properties;
        self
    }

    /// Returns the resource path.
    #[must_use]
    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    /// Returns the resource types.
    #[must_use]
    pub fn resource_types(&self) -> &[String] {
        &self.resource_types
    }

    /// Returns the interfaces.
    #[must_use]
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Returns the initial properties.
    #[must_use]
    pub const fn initial_properties(&self) -> &Object {
        &self.properties
    }

    /// Returns the property bitmap.
    #[must_use]
    pub fn bitmap(&self) -> ResourceProperties {
        flags_to_bitmap(
            self.discoverable,
            self.observable,
            self.secure,
            self.slow,
            self.active,
        )
    }

    /// Checks that the path is present and that types and interfaces are
    /// non-empty sequences of non-empty strings.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::InvalidResourceInit`] error otherwise.
    pub fn validate(&self) -> Result<()> {
        if self.resource_path.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidResourceInit,
                "Invalid ResourceInit: missing resource path",
            ));
        }

        if !is_non_empty_string_list(&self.resource_types) {
            return Err(Error::new(
                ErrorKind::InvalidResourceInit,
                format!(
                    "Invalid ResourceInit: `{}` has no valid resource types",
                    self.resource_path
                ),
            ));
        }

        if !is_non_empty_string_list(&self.interfaces) {
            return Err(Error::new(
                ErrorKind::InvalidResourceInit,
                format!(
                    "Invalid ResourceInit: `{}` has no valid interfaces",
                    self.resource_path
                ),
            ));
        }

        Ok(())
    }
}

fn is_non_empty_string_list(values: &[String]) -> bool {
    !values.is_empty() && values.iter().all(|value| !value.is_empty())
}

fn flags_to_bitmap(
    discoverable: bool,
    observable: bool,
    secure: bool,
    slow: bool,
    active: bool,
) -> ResourceProperties {
    let mut bitmap = ResourceProperties::empty();
    bitmap.set(ResourceProperties::DISCOVERABLE, discoverable);
    bitmap.set(ResourceProperties::OBSERVABLE, observable);
    bitmap.set(ResourceProperties::SECURE, secure);
    bitmap.set(ResourceProperties::SLOW, slow);
    bitmap.set(ResourceProperties::ACTIVE, active);
    bitmap
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::payload::ResourceProperties;

    use super::ResourceInit;

    #[test]
    fn init_bitmap() {
        let init = ResourceInit::new("/light")
            .resource_type("oic.r.light")
            .interface("oic.if.baseline")
            .discoverable()
            .observable()
            .slow();

        assert_eq!(
            init.bitmap(),
            ResourceProperties::DISCOVERABLE | ResourceProperties::OBSERVABLE | ResourceProperties::SLOW
        );
        assert!(init.validate().is_ok());
    }

    #[test]
    fn invalid_init() {
        let missing_path = ResourceInit::new("")
            .resource_type("oic.r.light")
            .interface("oic.if.baseline");
        let missing_types = ResourceInit::new("/light").interface("oic.if.baseline");
        let empty_interface = ResourceInit::new("/light")
            .resource_type("oic.r.light")
            .interface("");

        for init in [missing_path, missing_types, empty_interface] {
            assert_eq!(
                init.validate().unwrap_err().kind(),
                ErrorKind::InvalidResourceInit
            );
        }
    }
}
