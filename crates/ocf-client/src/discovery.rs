use std::sync::Arc;

use tracing::debug;

use ocf::codec::{parse_device_info, parse_discovery_batch, parse_platform_info};
use ocf::error::{Error, ErrorKind, Result};
use ocf::query::Query;
use ocf::resource::ResourceDescriptor;
use ocf::transport::{Method, ReplaceMode, RequestDescriptor, Response, ResponseListener};
use ocf::{DEVICE_URI, DISCOVERY_URI, PLATFORM_URI};

use crate::client::Client;
use crate::request::payload;

/// Resource discovery filter.
///
/// The resource type is sent along with the discovery request, the path
/// is matched against the answers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindResources {
    resource_path: Option<String>,
    resource_type: Option<String>,
}

impl FindResources {
    /// Creates a [`FindResources`] matching every resource.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            resource_path: None,
            resource_type: None,
        }
    }

    /// Matches only the resource at the given path.
    #[must_use]
    pub fn resource_path(mut self, resource_path: impl Into<String>) -> Self {
        self.resource_path = Some(resource_path.into());
        self
    }

    /// Matches only resources of the given type.
    #[must_use]
    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub(crate) fn query(&self) -> Query {
        self.resource_type
            .as_ref()
            .map_or_else(Query::new, |resource_type| {
                Query::new().with("rt", resource_type.as_str())
            })
    }

    pub(crate) fn matches(&self, descriptor: &ResourceDescriptor) -> bool {
        self.resource_path
            .as_ref()
            .is_none_or(|path| *path == descriptor.resource_path)
            && self
                .resource_type
                .as_ref()
                .is_none_or(|rt| descriptor.resource_types.contains(rt))
    }
}

impl Client {
    /// Starts looking for devices.
    ///
    /// Every answering device is reported to the [`Client::device_found`]
    /// listeners and its address is remembered. Malformed answers are
    /// reported to the [`Client::errors`] listeners.
    ///
    /// # Errors
    ///
    /// Fails when the discovery request cannot be issued.
    pub fn find_devices(&self) -> Result<()> {
        self.discover("find_devices", DEVICE_URI, None, |client, response| {
            let info = parse_device_info(payload("find_devices", response)?, &response.address)?;
            client
                .shared
                .resolver
                .add(info.uuid.clone(), response.address.clone());
            client.shared.device_found.emit(&info);
            Ok(())
        })
    }

    /// Starts looking for platforms.
    ///
    /// Every answering platform is reported to the
    /// [`Client::platform_found`] listeners. Malformed answers are reported
    /// to the [`Client::errors`] listeners.
    ///
    /// # Errors
    ///
    /// Fails when the discovery request cannot be issued.
    pub fn find_platforms(&self) -> Result<()> {
        self.discover("find_platforms", PLATFORM_URI, None, |client, response| {
            let info = parse_platform_info(payload("find_platforms", response)?)?;
            client.shared.platform_found.emit(&info);
            Ok(())
        })
    }

    /// Starts looking for resources on every reachable device.
    ///
    /// Every matching resource is reported to the
    /// [`Client::resource_found`] listeners and the address of its device
    /// is remembered. Malformed answers are reported to the
    /// [`Client::errors`] listeners.
    ///
    /// # Errors
    ///
    /// Fails when the discovery request cannot be issued.
    pub fn discover_resources(&self, filter: &FindResources) -> Result<()> {
        let query = filter.query();
        let filter = filter.clone();
        self.discover(
            "discover_resources",
            DISCOVERY_URI,
            Some(query),
            move |client, response| {
                let descriptors = parse_discovery_batch(payload("discover_resources", response)?)?;
                for descriptor in descriptors {
                    client
                        .shared
                        .resolver
                        .add(descriptor.device_id.clone(), response.address.clone());
                    if filter.matches(&descriptor) {
                        let resource = client.resource_from(descriptor);
                        client.shared.resource_found.emit(&resource);
                    }
                }
                Ok(())
            },
        )
    }

    // Issues a standing multicast request. A new discovery towards the same
    // URI and query replaces the previous listener.
    fn discover<F>(
        &self,
        name: &'static str,
        uri: &'static str,
        query: Option<Query>,
        on_response: F,
    ) -> Result<()>
    where
        F: Fn(&Client, &Response) -> Result<()> + Send + Sync + 'static,
    {
        let shared = Arc::downgrade(&self.shared);
        let listener: ResponseListener = Arc::new(move |response: &Response| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let client = Client { shared };

            let outcome = if response.result.is_ok() {
                on_response(&client, response)
            } else {
                Err(Error::new(
                    ErrorKind::TransportFailure,
                    format!("{name}: unexpected response"),
                )
                .with_result(response.result))
            };

            if let Err(e) = outcome {
                client.shared.errors.emit(&e);
            }
        });

        let mut descriptor = RequestDescriptor::new(Method::Discover, uri);
        if let Some(query) = query {
            descriptor = descriptor.query(query);
        }

        debug!("{name}: discovering `{uri}`");
        self.shared
            .handles
            .replace(&descriptor, &listener, ReplaceMode::Replace)
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use ocf::address::DeviceId;
    use ocf::payload::ResourceProperties;
    use ocf::resource::{ResourceDescriptor, ResourceId};

    use super::FindResources;

    fn descriptor(path: &str, resource_type: &str) -> ResourceDescriptor {
        ResourceDescriptor::from_bitmap(
            ResourceId::new(DeviceId::new("urn:dev:1"), path),
            vec![resource_type.into()],
            vec!["oic.if.baseline".into()],
            false,
            ResourceProperties::DISCOVERABLE,
        )
    }

    #[test]
    fn filter() {
        let light = descriptor("/light", "oic.r.light");
        let fan = descriptor("/fan", "oic.r.fan");

        let any = FindResources::new();
        assert!(any.query().is_empty());
        assert!(any.matches(&light) && any.matches(&fan));

        let by_path = FindResources::new().resource_path("/light");
        assert!(by_path.matches(&light));
        assert!(!by_path.matches(&fan));

        let by_type = FindResources::new().resource_type("oic.r.fan");
        assert_eq!(by_type.query().to_query_string(), "rt=oic.r.fan");
        assert!(!by_type.matches(&light));
        assert!(by_type.matches(&fan));
    }
}
