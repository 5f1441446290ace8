//! Shared types for interfacing OCF clients and servers.
//!
//! This crate defines the plain object graph exchanged with applications,
//! the logical wire payloads handed over by a transport, the codec converting
//! between the two, and the transport seams a client and a server are
//! built upon.
//!
//! With the `loopback` feature enabled, an in-process transport serving
//! locally registered resources to local clients is available.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Device addresses and identifiers.
pub mod address;
/// Conversions between payloads and plain objects.
pub mod codec;
/// Event listeners registry.
pub mod emitter;
/// Error handling.
pub mod error;
/// Device and platform information.
pub mod info;
/// Logical wire payloads.
pub mod payload;
/// Query strings.
pub mod query;
/// Resource descriptions.
pub mod resource;
/// Transport seams.
pub mod transport;
/// Plain object graph.
pub mod value;

#[cfg(feature = "loopback")]
#[cfg_attr(docsrs, doc(cfg(feature = "loopback")))]
pub mod loopback;

/// Device information URI.
pub const DEVICE_URI: &str = "/oic/d";

/// Platform information URI.
pub const PLATFORM_URI: &str = "/oic/p";

/// Resource discovery URI.
pub const DISCOVERY_URI: &str = "/oic/res";

/// Maximum length of a platform manufacturer name.
pub const MAX_MANUFACTURER_NAME_LENGTH: usize = 16;

/// Maximum length of a platform manufacturer URL.
pub const MAX_MANUFACTURER_URL_LENGTH: usize = 32;
