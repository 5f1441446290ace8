//! `ocf-client` is a library for finding and interacting with OCF resources
//! hosted by devices across a network.
//!
//! A [`Client`] discovers devices, platforms and resources, either by
//! multicast or by asking a known device directly. Every answer associating
//! a device with a network address is remembered by a [`Resolver`], so that
//! later requests can be directed to the device.
//!
//! Found resources are represented by [`Resource`] values carrying their
//! descriptor and a property bag. Their properties can be retrieved,
//! updated and observed: attaching the first update listener to a resource
//! starts observing it, detaching the last one stops the observation.
//!
//! The network is reached through a [`ClientTransport`](ocf::transport::ClientTransport)
//! implementation supplied by the application.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod client;
mod discovery;
mod handles;
mod request;
mod resolver;
mod resource;

pub use client::{Client, ClientConfig, Target};
pub use discovery::FindResources;
pub use handles::Handles;
pub use resolver::Resolver;
pub use resource::Resource;
