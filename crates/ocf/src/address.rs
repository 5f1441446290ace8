use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Unique device identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Cow<'static, str>);

impl DeviceId {
    /// Creates a [`DeviceId`].
    #[must_use]
    #[inline]
    pub fn new(id: impl Into<Cow<'static, str>>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&'static str> for DeviceId {
    fn from(id: &'static str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Transport-level locator of a device.
///
/// Addresses are learned from traffic and are not guaranteed to stay valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Host name or IP address.
    pub host: String,
    /// Port, if known.
    pub port: Option<u16>,
    /// Whether the host is an `IPv6` address.
    pub ipv6: bool,
}

impl Address {
    /// Creates an [`Address`] for an `IPv4` or named host.
    #[must_use]
    #[inline]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            ipv6: false,
        }
    }

    /// Creates an [`Address`] for an `IPv6` host.
    #[must_use]
    #[inline]
    pub fn ipv6(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            ipv6: true,
        }
    }

    /// Sets the address port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Returns the device URL.
    ///
    /// `IPv6` hosts are bracket-wrapped, and a zero port counts as absent.
    #[must_use]
    pub fn url(&self) -> String {
        let host = if self.ipv6 {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        match self.port {
            Some(port) if port != 0 => format!("{host}:{port}"),
            _ => host,
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.url().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::Address;

    #[test]
    fn address_url() {
        assert_eq!(Address::new("192.168.1.7").url(), "192.168.1.7");
        assert_eq!(Address::new("192.168.1.7").port(5683).url(), "192.168.1.7:5683");
        assert_eq!(Address::ipv6("fe80::1").port(5683).url(), "[fe80::1]:5683");
        assert_eq!(Address::ipv6("fe80::1").url(), "[fe80::1]");
        // A zero port is treated as absent.
        assert_eq!(Address::new("10.0.0.1").port(0).url(), "10.0.0.1");
    }
}
