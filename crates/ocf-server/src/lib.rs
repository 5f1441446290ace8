//! `ocf-server` is a library for hosting OCF resources on a device.
//!
//! A [`Server`] registers resources with a
//! [`ServerTransport`](ocf::transport::ServerTransport) and turns the
//! requests addressed to them into events, one [`Emitter`](ocf::emitter::Emitter)
//! per [`RequestKind`]. The application answers each [`ServerRequest`]
//! through the server.
//!
//! Remote observers of a resource are grouped by the query they registered
//! with. Notifying a resource sends its current properties to every group,
//! optionally shaped per query by a transform given at registration.
//!
//! The server also publishes the information describing the local device
//! and platform.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod device;
mod request;
mod resource;
mod server;

pub use request::{RequestKind, ServerRequest};
pub use resource::{ServerResource, Transform};
pub use server::{Server, ServerConfig};
