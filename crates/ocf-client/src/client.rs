use std::sync::Arc;

use tokio::sync::oneshot;

use tracing::{debug, info};

use ocf::address::DeviceId;
use ocf::codec::{
    decode_representation, encode_representation, parse_device_info, parse_platform_info,
    parse_resource_batch, parse_resource_link,
};
use ocf::emitter::{Emitter, ListenerId};
use ocf::error::{Error, ErrorKind, Result};
use ocf::info::{DeviceInfo, PlatformInfo};
use ocf::payload::Payload;
use ocf::query::Query;
use ocf::resource::{ResourceDescriptor, ResourceId, ResourceInit};
use ocf::transport::{
    ClientTransport, HandleRegistry, Method, OutboundRequest, QualityOfService, StackResult,
};
use ocf::{DEVICE_URI, DISCOVERY_URI, PLATFORM_URI};

use crate::discovery::FindResources;
use crate::handles::Handles;
use crate::request::{OK, OneShot, payload};
use crate::resolver::Resolver;
use crate::resource::{Observation, Resource};

const CREATED: &[StackResult] = &[StackResult::OK, StackResult::RESOURCE_CREATED];
const CHANGED: &[StackResult] = &[StackResult::OK, StackResult::RESOURCE_CHANGED];
const DELETED: &[StackResult] = &[StackResult::OK, StackResult::RESOURCE_DELETED];

/// A [`Client`] configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    qos: QualityOfService,
    resolver: Option<Arc<Resolver>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfig {
    /// Creates a [`ClientConfig`].
    ///
    /// Requests are sent with [`QualityOfService::High`] and device
    /// addresses are stored in a fresh [`Resolver`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            qos: QualityOfService::High,
            resolver: None,
        }
    }

    /// Sets the quality of service of every request.
    #[must_use]
    pub const fn quality_of_service(mut self, qos: QualityOfService) -> Self {
        self.qos = qos;
        self
    }

    /// Shares an existing [`Resolver`].
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

/// The resource a retrieval is aimed at.
#[derive(Debug, Clone)]
pub enum Target {
    /// A known resource.
    Resource(Resource),
    /// A resource to be found on its device first.
    Id(ResourceId),
}

impl From<Resource> for Target {
    fn from(resource: Resource) -> Self {
        Self::Resource(resource)
    }
}

impl From<&Resource> for Target {
    fn from(resource: &Resource) -> Self {
        Self::Resource(resource.clone())
    }
}

impl From<ResourceId> for Target {
    fn from(id: ResourceId) -> Self {
        Self::Id(id)
    }
}

impl From<&ResourceId> for Target {
    fn from(id: &ResourceId) -> Self {
        Self::Id(id.clone())
    }
}

pub(crate) struct Shared {
    pub(crate) transport: Arc<dyn ClientTransport>,
    pub(crate) handles: Arc<dyn HandleRegistry>,
    pub(crate) resolver: Arc<Resolver>,
    pub(crate) qos: QualityOfService,
    pub(crate) device_found: Emitter<DeviceInfo>,
    pub(crate) platform_found: Emitter<PlatformInfo>,
    pub(crate) resource_found: Emitter<Resource>,
    pub(crate) errors: Emitter<Error>,
}

/// An OCF client.
///
/// A [`Client`] is a cheap handle: clones share the same transport,
/// resolver and listeners.
#[derive(Clone)]
pub struct Client {
    pub(crate) shared: Arc<Shared>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("qos", &self.shared.qos)
            .field("known_devices", &self.shared.resolver.len())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a [`Client`] with the default configuration.
    #[must_use]
    pub fn new(transport: Arc<dyn ClientTransport>) -> Self {
        Self::with_config(transport, ClientConfig::new())
    }

    /// Creates a [`Client`] with the given [`ClientConfig`].
    ///
    /// Subscriptions are tracked by a [`Handles`] registry.
    #[must_use]
    pub fn with_config(transport: Arc<dyn ClientTransport>, config: ClientConfig) -> Self {
        let resolver = config.resolver.clone().unwrap_or_default();
        let handles = Arc::new(Handles::new(
            Arc::clone(&transport),
            Arc::clone(&resolver),
            config.qos,
        ));
        Self::with_handles(transport, config.resolver(resolver), handles)
    }

    /// Creates a [`Client`] tracking subscriptions with the given
    /// [`HandleRegistry`].
    #[must_use]
    pub fn with_handles(
        transport: Arc<dyn ClientTransport>,
        config: ClientConfig,
        handles: Arc<dyn HandleRegistry>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                handles,
                resolver: config.resolver.unwrap_or_default(),
                qos: config.qos,
                device_found: Emitter::new(),
                platform_found: Emitter::new(),
                resource_found: Emitter::new(),
                errors: Emitter::new(),
            }),
        }
    }

    /// Returns the [`Resolver`].
    #[must_use]
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.shared.resolver
    }

    /// Returns the listeners of found devices.
    #[must_use]
    pub fn device_found(&self) -> &Emitter<DeviceInfo> {
        &self.shared.device_found
    }

    /// Returns the listeners of found platforms.
    #[must_use]
    pub fn platform_found(&self) -> &Emitter<PlatformInfo> {
        &self.shared.platform_found
    }

    /// Returns the listeners of found resources.
    #[must_use]
    pub fn resource_found(&self) -> &Emitter<Resource> {
        &self.shared.resource_found
    }

    /// Returns the error listeners.
    ///
    /// Failures of standing discoveries are reported here.
    #[must_use]
    pub fn errors(&self) -> &Emitter<Error> {
        &self.shared.errors
    }

    /// Creates a [`Resource`] from a descriptor.
    ///
    /// The resource starts with an empty property bag.
    #[must_use]
    pub fn resource_from(&self, descriptor: ResourceDescriptor) -> Resource {
        Resource::new(descriptor, Arc::clone(&self.shared.handles))
    }

    /// Retrieves the information of a device.
    ///
    /// # Errors
    ///
    /// Fails when the device address is unknown, when the request fails or
    /// when the answer is malformed.
    pub async fn get_device_info(&self, device_id: &DeviceId) -> Result<DeviceInfo> {
        let request = self.request(Method::Get, DEVICE_URI, device_id)?;
        let response = OneShot::new("device_info", request, OK)
            .send(&*self.shared.transport)
            .await?;

        let info = parse_device_info(payload("device_info", &response)?, &response.address)?;
        self.shared
            .resolver
            .add(info.uuid.clone(), response.address.clone());
        Ok(info)
    }

    /// Retrieves the information of the platform hosting a device.
    ///
    /// # Errors
    ///
    /// Fails when the device address is unknown, when the request fails or
    /// when the answer is malformed.
    pub async fn get_platform_info(&self, device_id: &DeviceId) -> Result<PlatformInfo> {
        let request = self.request(Method::Get, PLATFORM_URI, device_id)?;
        let response = OneShot::new("platform_info", request, OK)
            .send(&*self.shared.transport)
            .await?;

        parse_platform_info(payload("platform_info", &response)?)
    }

    /// Finds the resources of a device.
    ///
    /// Every match is also reported to the [`Client::resource_found`]
    /// listeners.
    ///
    /// # Errors
    ///
    /// Fails when the device address is unknown, when the request fails or
    /// when the resource directory is malformed.
    pub async fn find_resources(
        &self,
        device_id: &DeviceId,
        filter: &FindResources,
    ) -> Result<Vec<Resource>> {
        let mut request = self.request(Method::Get, DISCOVERY_URI, device_id)?;
        let query = filter.query();
        if !query.is_empty() {
            request = request.query(query.to_query_string());
        }

        let response = OneShot::new("find_resources", request, OK)
            .send(&*self.shared.transport)
            .await?;

        let descriptors = parse_resource_batch(payload("find_resources", &response)?)?;
        if let Some(descriptor) = descriptors.first() {
            self.shared
                .resolver
                .add(descriptor.device_id.clone(), response.address.clone());
        }

        let resources = descriptors
            .into_iter()
            .filter(|descriptor| filter.matches(descriptor))
            .map(|descriptor| self.resource_from(descriptor))
            .collect::<Vec<_>>();

        for resource in &resources {
            self.shared.resource_found.emit(resource);
        }

        Ok(resources)
    }

    /// Finds a single resource of a device.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::ResourceNotFound`] error when the device does
    /// not host the resource, or fails like [`Client::find_resources`].
    pub async fn resolve_resource(&self, id: &ResourceId) -> Result<Resource> {
        let filter = FindResources::new().resource_path(id.resource_path.clone());
        self.find_resources(&id.device_id, &filter)
            .await?
            .pop()
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::ResourceNotFound,
                    format!(
                        "Resource `{}` not found on device `{}`",
                        id.resource_path, id.device_id
                    ),
                )
            })
    }

    /// Asks a resource to create a new resource.
    ///
    /// # Errors
    ///
    /// Fails when the initial properties cannot be encoded, before anything
    /// is sent. Otherwise fails when the request fails or when the created
    /// resource is malformed.
    pub async fn create(&self, target: &ResourceId, init: &ResourceInit) -> Result<Resource> {
        let mut representation = encode_representation(init.initial_properties())?;
        representation.uri = Some(init.resource_path().into());
        representation.types = init.resource_types().to_vec();
        representation.interfaces = init.interfaces().to_vec();

        let request = self
            .request(Method::Post, target.resource_path.clone(), &target.device_id)?
            .payload(Payload::Representation(representation));
        let response = OneShot::new("create", request, CREATED)
            .send(&*self.shared.transport)
            .await?;

        let descriptor = parse_resource_link(payload("create", &response)?, &target.device_id)?;
        info!(
            "Created `{}` on device `{}`",
            descriptor.resource_path, descriptor.device_id
        );

        let resource = self.resource_from(descriptor);
        resource.set_properties(init.initial_properties().clone());
        Ok(resource)
    }

    /// Retrieves the properties of a resource.
    ///
    /// A [`Target::Id`] is first resolved on its device. A resource bound to
    /// another query is copied and the copy is returned.
    ///
    /// # Errors
    ///
    /// Fails when the resource cannot be found, when the request fails or
    /// when the answer is malformed.
    pub async fn retrieve(
        &self,
        target: impl Into<Target>,
        query: Option<Query>,
    ) -> Result<Resource> {
        let resource = self.materialize(target.into(), query).await?;
        self.get(resource).await
    }

    /// Retrieves the properties of a resource and observes it.
    ///
    /// The listener is attached to the returned resource. When the
    /// retrieval starts the observation, the first notification answers it.
    /// When the resource is already observed, the properties are fetched
    /// with a plain retrieval.
    ///
    /// # Errors
    ///
    /// Fails like [`Client::retrieve`], or when the observation fails before
    /// its first notification. The listener is detached on failure.
    pub async fn retrieve_and_observe(
        &self,
        target: impl Into<Target>,
        query: Option<Query>,
        listener: impl Fn(&Resource) + Send + Sync + 'static,
    ) -> Result<(Resource, ListenerId)> {
        let resource = self.materialize(target.into(), query).await?;
        let id = resource.subscribe_update(listener);

        let (sender, receiver) = oneshot::channel();
        if let Observation::Started = resource.observe(Some(sender)) {
            match receiver.await {
                Ok(Ok(resource)) => return Ok((resource, id)),
                Ok(Err(e)) => {
                    resource.remove_update_listener(id);
                    return Err(e);
                }
                // The observation ended before its first notification.
                Err(_) => debug!("Observation of `{}` ended early", resource.resource_path()),
            }
        }

        match self.get(resource.clone()).await {
            Ok(resource) => Ok((resource, id)),
            Err(e) => {
                resource.remove_update_listener(id);
                Err(e)
            }
        }
    }

    /// Sends the properties of a resource to its device.
    ///
    /// The answer is merged into the properties.
    ///
    /// # Errors
    ///
    /// Fails when the properties cannot be encoded, when the request fails
    /// or when the answer is malformed.
    pub async fn update(&self, resource: &Resource) -> Result<Resource> {
        let representation = encode_representation(&resource.properties())?;

        let mut request = self
            .request(Method::Put, resource.resource_path(), resource.device_id())?
            .payload(Payload::Representation(representation));
        let query = resource.query();
        if !query.is_empty() {
            request = request.query(query.to_query_string());
        }

        let response = OneShot::new("update", request, CHANGED)
            .send(&*self.shared.transport)
            .await?;

        if let Some(payload) = response.payload.as_ref() {
            resource.merge_properties(&decode_representation(payload)?);
        }
        Ok(resource.clone())
    }

    /// Deletes a resource.
    ///
    /// # Errors
    ///
    /// Fails when the device address is unknown or when the request fails.
    pub async fn delete(&self, id: &ResourceId) -> Result<()> {
        let request = self.request(Method::Delete, id.resource_path.clone(), &id.device_id)?;
        OneShot::new("delete", request, DELETED)
            .send(&*self.shared.transport)
            .await?;
        info!("Deleted `{}` on device `{}`", id.resource_path, id.device_id);
        Ok(())
    }

    fn request(
        &self,
        method: Method,
        uri: impl Into<String>,
        device_id: &DeviceId,
    ) -> Result<OutboundRequest> {
        Ok(OutboundRequest::new(method, uri)
            .destination(self.shared.resolver.get(device_id)?)
            .qos(self.shared.qos))
    }

    async fn materialize(&self, target: Target, query: Option<Query>) -> Result<Resource> {
        let query = query.unwrap_or_default();
        match target {
            Target::Resource(resource) if resource.query() == query => Ok(resource),
            Target::Resource(resource) => Ok(resource.copy_with_query(query)),
            Target::Id(id) => {
                let resource = self.resolve_resource(&id).await?;
                if query.is_empty() {
                    Ok(resource)
                } else {
                    Ok(resource.copy_with_query(query))
                }
            }
        }
    }

    async fn get(&self, resource: Resource) -> Result<Resource> {
        let mut request =
            self.request(Method::Get, resource.resource_path(), resource.device_id())?;
        let query = resource.query();
        if !query.is_empty() {
            request = request.query(query.to_query_string());
        }

        let response = OneShot::new("retrieve", request, OK)
            .send(&*self.shared.transport)
            .await?;

        if let Some(payload) = response.payload.as_ref() {
            resource.merge_properties(&decode_representation(payload)?);
        }
        Ok(resource)
    }
}
