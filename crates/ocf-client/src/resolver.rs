use hashbrown::HashMap;

use parking_lot::Mutex;

use tracing::debug;

use ocf::address::{Address, DeviceId};
use ocf::error::{Error, ErrorKind, Result};

/// Device addresses learned from traffic.
///
/// Every response associating a device with an address overwrites the
/// previous association. Entries are never evicted.
#[derive(Debug, Default)]
pub struct Resolver {
    addresses: Mutex<HashMap<DeviceId, Address>>,
}

impl Resolver {
    /// Creates an empty [`Resolver`].
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates a device with an address.
    pub fn add(&self, device_id: DeviceId, address: Address) {
        debug!("Device `{device_id}` is reachable at {address}");
        self.addresses.lock().insert(device_id, address);
    }

    /// Returns the last known address of a device.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::UnresolvedDevice`] error when the device has
    /// never been seen.
    pub fn get(&self, device_id: &DeviceId) -> Result<Address> {
        self.addresses.lock().get(device_id).cloned().ok_or_else(|| {
            Error::new(
                ErrorKind::UnresolvedDevice,
                format!("Unknown address for device `{device_id}`"),
            )
        })
    }

    /// Returns the number of known devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.addresses.lock().len()
    }

    /// Checks whether no device is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addresses.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use ocf::address::{Address, DeviceId};
    use ocf::error::ErrorKind;

    use super::Resolver;

    #[test]
    fn last_write_wins() {
        let resolver = Resolver::new();
        let device = DeviceId::new("urn:dev:1");

        assert_eq!(
            resolver.get(&device).unwrap_err().kind(),
            ErrorKind::UnresolvedDevice
        );

        resolver.add(device.clone(), Address::new("10.0.0.1"));
        resolver.add(device.clone(), Address::new("10.0.0.2").port(5683));

        assert_eq!(resolver.get(&device).unwrap(), Address::new("10.0.0.2").port(5683));
        assert_eq!(resolver.len(), 1);
    }
}
