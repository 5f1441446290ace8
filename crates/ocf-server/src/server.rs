use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use tracing::{info, warn};

use ocf::codec::{decode_representation, encode_representation};
use ocf::emitter::Emitter;
use ocf::error::{Error, ErrorKind, Result};
use ocf::info::{DeviceInfo, PlatformInfo};
use ocf::query::Query;
use ocf::resource::ResourceInit;
use ocf::transport::{
    EntityHandler, EntityHandlerFlag, EntityHandlerResult, EntityResponse, InboundRequest,
    QualityOfService, ResourceHandle, ServerTransport, StackResult,
};
use ocf::value::Object;

use crate::request::{RequestKind, ServerRequest};
use crate::resource::{ServerResource, Transform};

/// A [`Server`] configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    qos: QualityOfService,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// Creates a [`ServerConfig`].
    ///
    /// Notifications are sent with [`QualityOfService::High`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            qos: QualityOfService::High,
        }
    }

    /// Sets the quality of service of notifications.
    #[must_use]
    pub const fn quality_of_service(mut self, qos: QualityOfService) -> Self {
        self.qos = qos;
        self
    }
}

pub(crate) struct Shared {
    pub(crate) transport: Arc<dyn ServerTransport>,
    qos: QualityOfService,
    retrieve: Emitter<ServerRequest>,
    update: Emitter<ServerRequest>,
    create: Emitter<ServerRequest>,
    delete: Emitter<ServerRequest>,
    errors: Emitter<Error>,
    pub(crate) device: Mutex<DeviceInfo>,
    pub(crate) platform: Mutex<PlatformInfo>,
}

/// An OCF server hosting resources on a device.
///
/// Requests addressed to hosted resources are reported to the listeners of
/// their [`RequestKind`], which answer them through the server.
///
/// A [`Server`] is a cheap handle: clones share the same transport and
/// listeners.
#[derive(Clone)]
pub struct Server {
    pub(crate) shared: Arc<Shared>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("qos", &self.shared.qos)
            .field("device", &*self.shared.device.lock())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates a [`Server`] with the default configuration.
    #[must_use]
    pub fn new(transport: Arc<dyn ServerTransport>) -> Self {
        Self::with_config(transport, ServerConfig::new())
    }

    /// Creates a [`Server`] with the given [`ServerConfig`].
    #[must_use]
    pub fn with_config(transport: Arc<dyn ServerTransport>, config: ServerConfig) -> Self {
        let device = crate::device::default_device(transport.server_instance_id());
        Self {
            shared: Arc::new(Shared {
                transport,
                qos: config.qos,
                retrieve: Emitter::new(),
                update: Emitter::new(),
                create: Emitter::new(),
                delete: Emitter::new(),
                errors: Emitter::new(),
                device: Mutex::new(device),
                platform: Mutex::new(crate::device::default_platform()),
            }),
        }
    }

    /// Returns the listeners of a [`RequestKind`].
    #[must_use]
    pub fn events(&self, kind: RequestKind) -> &Emitter<ServerRequest> {
        match kind {
            RequestKind::Retrieve => &self.shared.retrieve,
            RequestKind::Update => &self.shared.update,
            RequestKind::Create => &self.shared.create,
            RequestKind::Delete => &self.shared.delete,
        }
    }

    /// Returns the error listeners.
    ///
    /// Requests which cannot be dispatched are reported here.
    #[must_use]
    pub fn errors(&self) -> &Emitter<Error> {
        &self.shared.errors
    }

    /// Registers a resource.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::InvalidResourceInit`] error when the
    /// resource description is invalid, or an [`ErrorKind::TransportFailure`]
    /// error when the transport refuses the resource or one of its types or
    /// interfaces. A partially bound resource is deleted.
    pub fn register(&self, init: &ResourceInit) -> Result<ServerResource> {
        self.register_resource(init, None)
    }

    /// Registers a resource whose notifications are shaped per query by the
    /// given transform.
    ///
    /// # Errors
    ///
    /// Fails like [`Server::register`].
    pub fn register_with_transform(
        &self,
        init: &ResourceInit,
        transform: impl Fn(&Object, &Query) -> Object + Send + Sync + 'static,
    ) -> Result<ServerResource> {
        self.register_resource(init, Some(Arc::new(transform)))
    }

    fn register_resource(
        &self,
        init: &ResourceInit,
        transform: Option<Transform>,
    ) -> Result<ServerResource> {
        init.validate()?;

        let transport = &self.shared.transport;
        let resource = ServerResource::new(init, Arc::clone(transport), transform);

        let (resource_types, interfaces) = (init.resource_types(), init.interfaces());
        let handle = transport
            .create_resource(
                init.resource_path(),
                &resource_types[0],
                &interfaces[0],
                init.bitmap(),
                entity_handler(Arc::downgrade(&self.shared), resource.clone()),
            )
            .map_err(|result| {
                Error::new(
                    ErrorKind::TransportFailure,
                    format!("register: creating `{}` failed", init.resource_path()),
                )
                .with_result(result)
            })?;

        for resource_type in &resource_types[1..] {
            let result = transport.bind_resource_type(handle, resource_type);
            self.rollback_on_failure(handle, result, "resource type", resource_type)?;
        }
        for interface in &interfaces[1..] {
            let result = transport.bind_interface(handle, interface);
            self.rollback_on_failure(handle, result, "interface", interface)?;
        }

        resource.set_handle(Some(handle));
        info!("Registered `{}` as resource {handle}", init.resource_path());

        Ok(resource)
    }

    fn rollback_on_failure(
        &self,
        handle: ResourceHandle,
        result: StackResult,
        what: &str,
        value: &str,
    ) -> Result<()> {
        if result.is_ok() {
            return Ok(());
        }

        let deletion = self.shared.transport.delete_resource(handle);
        if !deletion.is_ok() {
            warn!("Unable to delete partially bound resource {handle}: {deletion}");
        }

        Err(Error::new(
            ErrorKind::TransportFailure,
            format!("register: binding {what} `{value}` failed"),
        )
        .with_result(result))
    }

    /// Unregisters a resource.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::InvalidResource`] error when the resource is
    /// not registered, or an [`ErrorKind::TransportFailure`] error when the
    /// transport refuses to delete it.
    pub fn unregister(&self, resource: &ServerResource) -> Result<()> {
        let handle = valid_handle(resource)?;

        let result = self.shared.transport.delete_resource(handle);
        if !result.is_ok() {
            return Err(Error::new(
                ErrorKind::TransportFailure,
                format!("Failed to delete resource `{}`", resource.resource_path()),
            )
            .with_result(result));
        }

        info!("Unregistered resource {handle}");
        resource.set_handle(None);
        resource.clear_observers();

        Ok(())
    }

    /// Notifies the observers of a resource with its current properties.
    ///
    /// Observers are notified per query. When the resource has a transform,
    /// the properties are shaped by it for each query.
    ///
    /// # Errors
    ///
    /// Returns every failure, one per query which could not be notified.
    /// The remaining queries are notified anyway.
    pub fn notify(&self, resource: &ServerResource) -> std::result::Result<(), Vec<Error>> {
        let handle = valid_handle(resource).map_err(|e| vec![e])?;
        let properties = resource.properties();

        let mut errors = Vec::new();
        for (query, observers) in resource.observer_buckets() {
            let representation = match resource.transform() {
                Some(transform) => encode_representation(&transform(
                    &properties,
                    &Query::parse(&query),
                )),
                None => encode_representation(&properties),
            };

            let representation = match representation {
                Ok(representation) => representation,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            let result = self.shared.transport.notify_list_of_observers(
                handle,
                &observers,
                representation,
                self.shared.qos,
            );
            if !result.is_ok() {
                errors.push(
                    Error::new(
                        ErrorKind::TransportFailure,
                        format!("Failed to notify the observers of query `{query}`"),
                    )
                    .with_result(result),
                );
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Answers a request successfully.
    ///
    /// # Errors
    ///
    /// Returns the encoding failure of the data, in which case an error is
    /// answered without any data, or an [`ErrorKind::TransportFailure`]
    /// error when the transport refuses the response.
    pub fn respond(&self, request: &ServerRequest, data: Option<&Object>) -> Result<()> {
        self.send_response(request, EntityHandlerResult::Ok, data)
    }

    /// Answers a request with an error.
    ///
    /// # Errors
    ///
    /// Fails like [`Server::respond`].
    pub fn respond_with_error(&self, request: &ServerRequest, data: Option<&Object>) -> Result<()> {
        self.send_response(request, EntityHandlerResult::Error, data)
    }

    fn send_response(
        &self,
        request: &ServerRequest,
        result: EntityHandlerResult,
        data: Option<&Object>,
    ) -> Result<()> {
        let (result, payload, encoding) = match data.map(encode_representation).transpose() {
            Ok(payload) => (result, payload, None),
            Err(e) => (EntityHandlerResult::Error, None, Some(e)),
        };

        // A stale resource is not addressed.
        let resource_handle = request.target.handle();
        if resource_handle.is_none() {
            warn!(
                "Answering request {} for the unregistered `{}`",
                request.id,
                request.target.resource_path()
            );
        }

        let sent = self.shared.transport.do_response(EntityResponse {
            request_handle: request.id,
            resource_handle,
            result,
            payload,
            resource_uri: request.target.resource_path(),
        });
        if !sent.is_ok() {
            return Err(Error::new(
                ErrorKind::TransportFailure,
                format!("Failed to send response to request {}", request.id),
            )
            .with_result(sent));
        }

        encoding.map_or(Ok(()), Err)
    }

    /// Starts announcing the device presence.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::TransportFailure`] error when the transport
    /// refuses.
    pub fn enable_presence(&self, time_to_live: u32) -> Result<()> {
        let result = self.shared.transport.start_presence(time_to_live);
        if !result.is_ok() {
            return Err(
                Error::new(ErrorKind::TransportFailure, "Failed to enable presence")
                    .with_result(result),
            );
        }
        info!("Presence enabled with a time-to-live of {time_to_live}");
        Ok(())
    }

    /// Stops announcing the device presence.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::TransportFailure`] error when the transport
    /// refuses.
    pub fn disable_presence(&self) -> Result<()> {
        let result = self.shared.transport.stop_presence();
        if !result.is_ok() {
            return Err(
                Error::new(ErrorKind::TransportFailure, "Failed to disable presence")
                    .with_result(result),
            );
        }
        info!("Presence disabled");
        Ok(())
    }

    fn dispatch(
        &self,
        resource: &ServerResource,
        flag: EntityHandlerFlag,
        request: &InboundRequest,
    ) -> Result<()> {
        if request.resource.is_some() && request.resource != resource.handle() {
            return Err(Error::new(
                ErrorKind::HandlerError,
                format!(
                    "Request {} received for wrong resource `{}`",
                    request.request_handle,
                    resource.resource_path()
                ),
            ));
        }

        let data = request
            .payload
            .as_ref()
            .map(decode_representation)
            .transpose()
            .map_err(|e| {
                Error::new(
                    ErrorKind::HandlerError,
                    format!("Request {}: {}", request.request_handle, e.description()),
                )
            })?;

        let kind = RequestKind::from_method(request.method).ok_or_else(|| {
            Error::new(
                ErrorKind::HandlerError,
                format!(
                    "Request {}: unknown method {}",
                    request.request_handle, request.method
                ),
            )
        })?;

        let (query, key) = resource.query_info(&request.query);

        let observe = match request.observe {
            Some(observe) if flag.contains(EntityHandlerFlag::OBSERVER) => {
                Some(resource.update_observers(key, observe))
            }
            _ => None,
        };

        self.events(kind).emit(&ServerRequest {
            id: request.request_handle,
            target: resource.clone(),
            query,
            data,
            observe,
        });

        Ok(())
    }
}

fn valid_handle(resource: &ServerResource) -> Result<ResourceHandle> {
    resource.handle().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidResource,
            format!("Invalid resource `{}`", resource.resource_path()),
        )
    })
}

// The transport owns the resource until it is deleted.
fn entity_handler(server: Weak<Shared>, resource: ServerResource) -> EntityHandler {
    Arc::new(move |flag: EntityHandlerFlag, request: &InboundRequest| {
        let Some(shared) = server.upgrade() else {
            warn!("Dropping request {} for a released server", request.request_handle);
            return EntityHandlerResult::Error;
        };
        let server = Server { shared };

        match server.dispatch(&resource, flag, request) {
            Ok(()) => EntityHandlerResult::Ok,
            Err(e) => {
                server.shared.errors.emit(&e);
                EntityHandlerResult::Error
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use ocf::address::{Address, DeviceId};
    use ocf::error::{Error, ErrorKind};
    use ocf::loopback::{FaultPoint, Loopback};
    use ocf::payload::{DevicePayload, Payload, RepPayload};
    use ocf::query::Query;
    use ocf::resource::{ResourceId, ResourceInit};
    use ocf::transport::{
        ClientTransport, EntityHandlerFlag, EntityHandlerResult, InboundRequest, Method,
        ObservationId, ObserveAction, ObserveInfo, OutboundRequest, RequestId, ResourceHandle,
        Response, StackResult, TransactionAction,
    };
    use ocf::value::{Object, Value};

    use ocf_client::{Client, FindResources, Resource};

    use crate::request::{RequestKind, ServerRequest};

    use super::{Server, entity_handler};

    type Requests = Arc<Mutex<Vec<ServerRequest>>>;

    fn loopback() -> Arc<Loopback> {
        Loopback::new("urn:dev:1", Address::new("10.0.0.2").port(5683))
    }

    fn light() -> ResourceInit {
        ResourceInit::new("/light")
            .resource_type("oic.r.light")
            .interface("oic.if.baseline")
            .discoverable()
            .observable()
            .properties(Object::new().with("power", "on"))
    }

    fn record(server: &Server, kind: RequestKind) -> Requests {
        let requests = Requests::default();
        let sink = Arc::clone(&requests);
        server.events(kind).subscribe(move |request: &ServerRequest| {
            sink.lock().push(request.clone());
        });
        requests
    }

    // Answers retrievals with the current properties and merges updates.
    fn serve(server: &Server) {
        let responder = server.clone();
        server
            .events(RequestKind::Retrieve)
            .subscribe(move |request: &ServerRequest| {
                if request.observe == Some(false) {
                    return;
                }
                responder
                    .respond(request, Some(&request.target.properties()))
                    .unwrap();
            });

        let responder = server.clone();
        server
            .events(RequestKind::Update)
            .subscribe(move |request: &ServerRequest| {
                if let Some(data) = request.data.as_ref() {
                    for (key, value) in data {
                        request.target.set_property(key.clone(), value.clone());
                    }
                }
                responder
                    .respond(request, Some(&request.target.properties()))
                    .unwrap();
            });
    }

    fn client(loopback: &Arc<Loopback>) -> Client {
        let client = Client::new(loopback.clone());
        client
            .resolver()
            .add(DeviceId::new("urn:dev:1"), loopback.address().clone());
        client
    }

    fn send(loopback: &Loopback, request: OutboundRequest) {
        loopback
            .do_resource(request, Box::new(|_: Response| TransactionAction::Delete))
            .unwrap();
    }

    fn inbound(resource: Option<ResourceHandle>, method: Method) -> InboundRequest {
        InboundRequest {
            request_handle: RequestId(100),
            resource,
            method,
            query: String::new(),
            payload: None,
            observe: None,
        }
    }

    // Two property paths leading to the same nested object.
    fn shared_nested() -> Object {
        let nested = Object::new().with("level", 1);
        Object::new().with("a", nested.clone()).with("b", nested)
    }

    #[test]
    fn registration() {
        let loopback = loopback();
        let server = Server::new(loopback.clone());

        let light = server
            .register(
                &light()
                    .resource_type("oic.r.switch.binary")
                    .interface("oic.if.a"),
            )
            .unwrap();

        let handle = light.handle().unwrap();
        assert!(light.is_registered());
        assert_eq!(light.resource_path(), "/light");
        assert!(light.discoverable());
        assert!(light.observable());
        assert!(!light.secure());
        assert_eq!(light.property("power"), Some(Value::from("on")));
        assert_eq!(
            loopback.resource_types(handle),
            ["oic.r.light", "oic.r.switch.binary"]
        );
        assert_eq!(loopback.interfaces(handle), ["oic.if.baseline", "oic.if.a"]);

        // The path is taken.
        let error = server.register(&self::light()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TransportFailure);
        assert_eq!(error.result(), Some(StackResult::INVALID_PARAM));

        let error = server
            .register(&ResourceInit::new("/fan").interface("oic.if.a"))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidResourceInit);
        assert_eq!(loopback.resource_count(), 1);
    }

    #[test]
    fn registration_rollback() {
        let loopback = loopback();
        let server = Server::new(loopback.clone());
        let init = ResourceInit::new("/fan")
            .resource_type("oic.r.fan")
            .resource_type("oic.r.speed")
            .interface("oic.if.baseline")
            .interface("oic.if.a");

        loopback.fail_next(FaultPoint::CreateResource, StackResult::ERROR);
        let error = server.register(&init).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TransportFailure);

        loopback.fail_next(FaultPoint::BindResourceType, StackResult::ERROR);
        let error = server.register(&init).unwrap_err();
        assert_eq!(error.result(), Some(StackResult::ERROR));
        assert_eq!(loopback.resource_count(), 0);

        loopback.fail_next(FaultPoint::BindInterface, StackResult::NO_MEMORY);
        let error = server.register(&init).unwrap_err();
        assert_eq!(error.result(), Some(StackResult::NO_MEMORY));
        assert_eq!(loopback.resource_count(), 0);

        assert!(server.register(&init).is_ok());
    }

    #[test]
    fn dispatch() {
        let loopback = loopback();
        let server = Server::new(loopback.clone());
        let light = server.register(&light()).unwrap();

        let retrievals = record(&server, RequestKind::Retrieve);
        let updates = record(&server, RequestKind::Update);
        let creations = record(&server, RequestKind::Create);
        let deletions = record(&server, RequestKind::Delete);

        send(
            &loopback,
            OutboundRequest::new(Method::Put, "/light")
                .query("unit=C;scale=2")
                .payload(Payload::Representation(
                    RepPayload::new().with("power", "off".into()),
                )),
        );
        send(&loopback, OutboundRequest::new(Method::Get, "/light"));
        send(&loopback, OutboundRequest::new(Method::Post, "/light"));
        send(&loopback, OutboundRequest::new(Method::Delete, "/light"));

        let update = updates.lock()[0].clone();
        assert_eq!(update.target, light);
        assert_eq!(update.query, Query::new().with("unit", "C").with("scale", "2"));
        assert_eq!(
            update.data.unwrap().get("power"),
            Some(&Value::from("off"))
        );
        assert_eq!(update.observe, None);

        assert_eq!(retrievals.lock().len(), 1);
        assert!(retrievals.lock()[0].data.is_none());
        assert_eq!(creations.lock().len(), 1);
        assert_eq!(deletions.lock().len(), 1);
        // Plain requests never register observers.
        assert!(light.observers().is_empty());
    }

    #[test]
    fn undispatchable_requests() {
        let loopback = loopback();
        let server = Server::new(loopback.clone());
        let light = server.register(&light()).unwrap();
        let handle = light.handle();

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        server
            .errors()
            .subscribe(move |error: &Error| sink.lock().push(error.kind()));
        let retrievals = record(&server, RequestKind::Retrieve);

        let handler = entity_handler(Arc::downgrade(&server.shared), light.clone());
        let flag = EntityHandlerFlag::REQUEST;

        // Addressed to another resource.
        let request = inbound(Some(ResourceHandle(999)), Method::Get);
        assert_eq!(handler(flag, &request), EntityHandlerResult::Error);

        // Not a representation.
        let mut request = inbound(handle, Method::Put);
        request.payload = Some(Payload::Device(DevicePayload::default()));
        assert_eq!(handler(flag, &request), EntityHandlerResult::Error);

        // Not a resource operation.
        let request = inbound(handle, Method::Discover);
        assert_eq!(handler(flag, &request), EntityHandlerResult::Error);

        assert_eq!(*errors.lock(), [ErrorKind::HandlerError; 3]);
        assert!(retrievals.lock().is_empty());

        let request = inbound(handle, Method::Get);
        assert_eq!(handler(flag, &request), EntityHandlerResult::Ok);
        assert_eq!(retrievals.lock().len(), 1);

        // A released server refuses every request.
        drop(server);
        assert_eq!(handler(flag, &request), EntityHandlerResult::Error);
    }

    #[test]
    fn observer_registration() {
        let loopback = loopback();
        let server = Server::new(loopback.clone());
        let light = server.register(&light()).unwrap();
        let retrievals = record(&server, RequestKind::Retrieve);

        let handler = entity_handler(Arc::downgrade(&server.shared), light.clone());
        let mut request = inbound(light.handle(), Method::Observe);
        request.query = "unit=C".into();
        request.observe = Some(ObserveInfo {
            action: ObserveAction::Register,
            id: ObservationId(7),
        });

        // Observe information is ignored without the observer flag.
        handler(EntityHandlerFlag::REQUEST, &request);
        assert!(light.observers().is_empty());
        assert_eq!(retrievals.lock()[0].observe, None);

        handler(
            EntityHandlerFlag::REQUEST | EntityHandlerFlag::OBSERVER,
            &request,
        );
        assert_eq!(
            light.observers(),
            [(Query::new().with("unit", "C"), vec![ObservationId(7)])]
        );
        assert_eq!(retrievals.lock()[1].observe, Some(true));

        request.observe = Some(ObserveInfo {
            action: ObserveAction::Deregister,
            id: ObservationId(7),
        });
        handler(EntityHandlerFlag::OBSERVER, &request);
        assert!(light.observers().is_empty());
        assert_eq!(retrievals.lock()[2].observe, Some(false));
    }

    #[test]
    fn unregistration() {
        let loopback = loopback();
        let server = Server::new(loopback.clone());
        let light = server.register(&light()).unwrap();

        loopback.fail_next(FaultPoint::DeleteResource, StackResult::ERROR);
        let error = server.unregister(&light).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TransportFailure);
        assert!(light.is_registered());

        server.unregister(&light).unwrap();
        assert!(!light.is_registered());
        assert_eq!(loopback.resource_count(), 0);
        // The stored path outlives the registration.
        assert_eq!(light.resource_path(), "/light");

        let error = server.unregister(&light).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidResource);

        let errors = server.notify(&light).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::InvalidResource);
    }

    #[test]
    fn responses() {
        let loopback = loopback();
        let server = Server::new(loopback.clone());
        let light = server.register(&light()).unwrap();
        let retrievals = record(&server, RequestKind::Retrieve);

        for _ in 0..3 {
            send(&loopback, OutboundRequest::new(Method::Get, "/light"));
        }
        let requests = retrievals.lock().clone();

        server
            .respond(&requests[0], Some(&light.properties()))
            .unwrap();
        let response = loopback.responses().pop().unwrap();
        assert_eq!(response.result, EntityHandlerResult::Ok);
        assert_eq!(response.resource_handle, light.handle());
        assert_eq!(response.resource_uri, "/light");
        assert!(response.payload.is_some());

        // Unencodable data turns into an error without payload.
        let error = server
            .respond(&requests[1], Some(&shared_nested()))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::CircularReference);
        let response = loopback.responses().pop().unwrap();
        assert_eq!(response.result, EntityHandlerResult::Error);
        assert!(response.payload.is_none());

        loopback.fail_next(FaultPoint::Response, StackResult::ERROR);
        let error = server.respond_with_error(&requests[2], None).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TransportFailure);

        // A stale resource is answered without its handle.
        server.unregister(&light).unwrap();
        server.respond_with_error(&requests[2], None).unwrap();
        let response = loopback.responses().pop().unwrap();
        assert_eq!(response.result, EntityHandlerResult::Error);
        assert_eq!(response.resource_handle, None);
    }

    #[test]
    fn presence() {
        let loopback = loopback();
        let server = Server::new(loopback.clone());

        server.enable_presence(30).unwrap();
        assert_eq!(loopback.presence(), Some(30));

        loopback.fail_next(FaultPoint::Presence, StackResult::ERROR);
        let error = server.disable_presence().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TransportFailure);
        assert_eq!(loopback.presence(), Some(30));

        server.disable_presence().unwrap();
        assert_eq!(loopback.presence(), None);
    }

    #[tokio::test]
    async fn find_hosted_resources() {
        let loopback = loopback();
        let server = Server::new(loopback.clone());
        server.register(&light()).unwrap();
        server
            .register(
                &ResourceInit::new("/fan")
                    .resource_type("oic.r.fan")
                    .interface("oic.if.baseline")
                    .discoverable(),
            )
            .unwrap();

        let client = client(&loopback);
        let resources = client
            .find_resources(
                &DeviceId::new("urn:dev:1"),
                &FindResources::new().resource_path("/light"),
            )
            .await
            .unwrap();

        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].resource_path(), "/light");
        assert_eq!(resources[0].resource_types(), ["oic.r.light"]);
        assert!(resources[0].observable());
    }

    #[tokio::test]
    async fn retrieve_update_and_observe() {
        let loopback = loopback();
        let server = Server::new(loopback.clone());
        let light = server.register(&light()).unwrap();
        serve(&server);

        let client = client(&loopback);
        let resource = client
            .resolve_resource(&ResourceId::new(DeviceId::new("urn:dev:1"), "/light"))
            .await
            .unwrap();

        let updates = Arc::new(AtomicUsize::new(0));
        let listener = {
            let updates = Arc::clone(&updates);
            move |_: &Resource| {
                updates.fetch_add(1, Ordering::SeqCst);
            }
        };

        let (observed, id) = client
            .retrieve_and_observe(&resource, None, listener)
            .await
            .unwrap();
        assert_eq!(observed.property("power"), Some(Value::from("on")));
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(light.observers().len(), 1);

        light.set_property("power", "off");
        server.notify(&light).unwrap();
        assert_eq!(updates.load(Ordering::SeqCst), 2);
        assert_eq!(observed.property("power"), Some(Value::from("off")));

        observed.set_property("power", "on");
        client.update(&observed).await.unwrap();
        assert_eq!(light.property("power"), Some(Value::from("on")));

        // Detaching the last listener deregisters the observer.
        assert!(observed.remove_update_listener(id));
        assert!(light.observers().is_empty());
        server.notify(&light).unwrap();
        assert_eq!(updates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn notify_per_query() {
        let loopback = loopback();
        let server = Server::new(loopback.clone());
        let light = server
            .register_with_transform(&light(), |properties: &Object, query: &Query| {
                match query.get("shape") {
                    Some("shared") => shared_nested(),
                    Some(shape) => properties.clone().with("shape", shape),
                    None => properties.clone(),
                }
            })
            .unwrap();
        serve(&server);

        let client = client(&loopback);
        let resource = client
            .resolve_resource(&ResourceId::new(DeviceId::new("urn:dev:1"), "/light"))
            .await
            .unwrap();

        let (flat, _) = client
            .retrieve_and_observe(&resource, Some(Query::new().with("shape", "flat")), |_| {})
            .await
            .unwrap();
        let (shared, _) = client
            .retrieve_and_observe(
                &resource,
                Some(Query::new().with("shape", "shared")),
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(light.observers().len(), 2);

        light.set_property("power", "off");
        let errors = server.notify(&light).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::CircularReference);

        // The other query is notified anyway.
        assert_eq!(loopback.notifications().len(), 1);
        assert_eq!(flat.property("power"), Some(Value::from("off")));
        assert_eq!(flat.property("shape"), Some(Value::from("flat")));
        assert_eq!(shared.property("power"), Some(Value::from("on")));
    }
}
