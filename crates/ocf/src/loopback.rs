//! In-process transport.
//!
//! A [`Loopback`] plays both the device and the network: resources
//! registered through its [`ServerTransport`] side are served to requests
//! issued through its [`ClientTransport`] side. Every request, cancellation,
//! response and notification is recorded, and each operation can be made to
//! fail once with [`Loopback::fail_next`].

use std::collections::VecDeque;
use std::sync::Arc;

use hashbrown::HashMap;

use indexmap::IndexMap;

use parking_lot::Mutex;

use tracing::{debug, warn};

use crate::address::{Address, DeviceId};
use crate::codec::{discovered_resource, resource_link};
use crate::payload::{
    DevicePayload, DiscoveryPayload, Payload, PlatformInfoPayload, PlatformPayload, RepPayload,
    RepValue, ResourceProperties,
};
use crate::query::Query;
use crate::resource::{ResourceDescriptor, ResourceId};
use crate::transport::{
    ClientTransport, EntityHandler, EntityHandlerFlag, EntityHandlerResult, EntityResponse,
    InboundRequest, Method, ObservationId, ObserveAction, ObserveInfo, OutboundRequest,
    QualityOfService, RequestHandle, RequestId, ResourceHandle, Response, ResponseCallback,
    ServerTransport, StackResult, TransactionAction,
};
use crate::{DEVICE_URI, DISCOVERY_URI, PLATFORM_URI};

/// Operations whose next invocation can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// [`ClientTransport::do_resource`].
    Request,
    /// [`ClientTransport::cancel`].
    Cancel,
    /// [`ServerTransport::create_resource`].
    CreateResource,
    /// [`ServerTransport::bind_resource_type`].
    BindResourceType,
    /// [`ServerTransport::bind_interface`].
    BindInterface,
    /// [`ServerTransport::delete_resource`].
    DeleteResource,
    /// [`ServerTransport::notify_list_of_observers`].
    Notify,
    /// [`ServerTransport::do_response`].
    Response,
    /// [`ServerTransport::start_presence`] and
    /// [`ServerTransport::stop_presence`].
    Presence,
    /// [`ServerTransport::set_device_info`].
    DeviceInfo,
    /// [`ServerTransport::set_platform_info`].
    PlatformInfo,
}

/// A request issued through the client side.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Assigned handle.
    pub handle: RequestHandle,
    /// Issued request.
    pub request: OutboundRequest,
}

/// A notification pushed through the server side.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedNotification {
    /// Notifying resource.
    pub resource: ResourceHandle,
    /// Addressed observers.
    pub observers: Vec<ObservationId>,
    /// Notification payload.
    pub payload: RepPayload,
}

struct Hosted {
    uri: String,
    types: Vec<String>,
    interfaces: Vec<String>,
    properties: ResourceProperties,
    handler: EntityHandler,
}

// A client callback, absent while it is running.
struct Slot {
    callback: Option<ResponseCallback>,
    backlog: VecDeque<Response>,
}

struct Observation {
    client: RequestHandle,
    resource: ResourceHandle,
}

struct State {
    next_id: u64,
    resources: IndexMap<ResourceHandle, Hosted>,
    slots: HashMap<RequestHandle, Slot>,
    // Inbound requests awaiting a server response.
    pending: HashMap<RequestId, (RequestHandle, Method)>,
    observations: HashMap<ObservationId, Observation>,
    device_info: Option<DevicePayload>,
    platform_info: Option<PlatformInfoPayload>,
    presence: Option<u32>,
    faults: HashMap<FaultPoint, StackResult>,
    requests: Vec<RecordedRequest>,
    cancellations: Vec<RequestHandle>,
    responses: Vec<EntityResponse>,
    notifications: Vec<RecordedNotification>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn fault(&mut self, point: FaultPoint) -> Option<StackResult> {
        self.faults.remove(&point)
    }

    fn forget(&mut self, handle: RequestHandle) {
        self.slots.remove(&handle);
        self.pending.retain(|_, (client, _)| *client != handle);
        self.observations
            .retain(|_, observation| observation.client != handle);
    }

    fn descriptor(&self, server_id: &DeviceId, hosted: &Hosted) -> ResourceDescriptor {
        ResourceDescriptor::from_bitmap(
            ResourceId::new(server_id.clone(), hosted.uri.clone()),
            hosted.types.clone(),
            hosted.interfaces.clone(),
            hosted.properties.contains(ResourceProperties::SECURE),
            hosted.properties,
        )
    }

    fn discoverable(&self, server_id: &DeviceId, query: &Query) -> Vec<ResourceDescriptor> {
        self.resources
            .values()
            .filter(|hosted| hosted.properties.contains(ResourceProperties::DISCOVERABLE))
            .filter(|hosted| {
                query
                    .get("rt")
                    .is_none_or(|rt| hosted.types.iter().any(|t| t == rt))
            })
            .map(|hosted| self.descriptor(server_id, hosted))
            .collect()
    }
}

/// In-process device and network.
pub struct Loopback {
    server_id: DeviceId,
    address: Address,
    state: Mutex<State>,
}

impl std::fmt::Debug for Loopback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loopback")
            .field("server_id", &self.server_id)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

enum Route {
    Respond(Response),
    Silent,
    Dispatch {
        handler: EntityHandler,
        flag: EntityHandlerFlag,
        request: InboundRequest,
    },
}

impl Loopback {
    /// Creates a [`Loopback`] for a device reachable at the given address.
    #[must_use]
    pub fn new(server_id: impl Into<DeviceId>, address: Address) -> Arc<Self> {
        Arc::new(Self {
            server_id: server_id.into(),
            address,
            state: Mutex::new(State {
                next_id: 0,
                resources: IndexMap::new(),
                slots: HashMap::new(),
                pending: HashMap::new(),
                observations: HashMap::new(),
                device_info: None,
                platform_info: None,
                presence: None,
                faults: HashMap::new(),
                requests: Vec::new(),
                cancellations: Vec::new(),
                responses: Vec::new(),
                notifications: Vec::new(),
            }),
        })
    }

    /// Returns the device address.
    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.address
    }

    /// Makes the next invocation of an operation fail with the given result.
    pub fn fail_next(&self, point: FaultPoint, result: StackResult) {
        self.state.lock().faults.insert(point, result);
    }

    /// Returns the requests issued through the client side.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Returns the number of requests issued with the given method.
    #[must_use]
    pub fn request_count(&self, method: Method) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|recorded| recorded.request.method == method)
            .count()
    }

    /// Returns the cancelled requests.
    #[must_use]
    pub fn cancellations(&self) -> Vec<RequestHandle> {
        self.state.lock().cancellations.clone()
    }

    /// Returns the responses sent through the server side.
    #[must_use]
    pub fn responses(&self) -> Vec<EntityResponse> {
        self.state.lock().responses.clone()
    }

    /// Returns the notifications sent through the server side.
    #[must_use]
    pub fn notifications(&self) -> Vec<RecordedNotification> {
        self.state.lock().notifications.clone()
    }

    /// Returns the number of outstanding client requests.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Returns the number of hosted resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.state.lock().resources.len()
    }

    /// Returns the types bound to a hosted resource.
    #[must_use]
    pub fn resource_types(&self, handle: ResourceHandle) -> Vec<String> {
        self.state
            .lock()
            .resources
            .get(&handle)
            .map(|hosted| hosted.types.clone())
            .unwrap_or_default()
    }

    /// Returns the interfaces bound to a hosted resource.
    #[must_use]
    pub fn interfaces(&self, handle: ResourceHandle) -> Vec<String> {
        self.state
            .lock()
            .resources
            .get(&handle)
            .map(|hosted| hosted.interfaces.clone())
            .unwrap_or_default()
    }

    /// Returns the presence time-to-live, if presence is enabled.
    #[must_use]
    pub fn presence(&self) -> Option<u32> {
        self.state.lock().presence
    }

    /// Returns the published device information.
    #[must_use]
    pub fn published_device_info(&self) -> Option<DevicePayload> {
        self.state.lock().device_info.clone()
    }

    /// Returns the published platform information.
    #[must_use]
    pub fn published_platform_info(&self) -> Option<PlatformInfoPayload> {
        self.state.lock().platform_info.clone()
    }

    /// Delivers a response to a client request.
    ///
    /// Responses addressed to a callback which is running are queued and
    /// delivered in order once it returns.
    pub fn deliver(&self, handle: RequestHandle, response: Response) {
        let mut callback = {
            let mut state = self.state.lock();
            let Some(slot) = state.slots.get_mut(&handle) else {
                warn!("Dropping response for unknown request {handle}");
                return;
            };
            match slot.callback.take() {
                Some(callback) => callback,
                None => {
                    slot.backlog.push_back(response);
                    return;
                }
            }
        };

        let mut next = Some(response);
        while let Some(response) = next.take() {
            let action = callback(response);

            let mut state = self.state.lock();
            if action == TransactionAction::Delete {
                state.forget(handle);
                return;
            }

            // The request has been cancelled by the callback.
            let Some(slot) = state.slots.get_mut(&handle) else {
                return;
            };

            match slot.backlog.pop_front() {
                Some(response) => next = Some(response),
                None => {
                    slot.callback = Some(callback);
                    return;
                }
            }
        }
    }

    fn response(&self, result: StackResult, payload: Option<Payload>) -> Response {
        Response {
            result,
            address: self.address.clone(),
            payload,
        }
    }

    fn device_payload(&self, state: &State) -> DevicePayload {
        state.device_info.clone().unwrap_or_else(|| DevicePayload {
            sid: Some(self.server_id.as_str().into()),
            ..DevicePayload::default()
        })
    }

    fn route(&self, state: &mut State, handle: RequestHandle, request: &OutboundRequest) -> Route {
        let query = request.query.as_deref().map(Query::parse).unwrap_or_default();

        match (request.method, request.uri.as_str()) {
            (Method::Discover, DISCOVERY_URI) => {
                let resources = state.discoverable(&self.server_id, &query);
                if resources.is_empty() {
                    return Route::Silent;
                }
                Route::Respond(self.response(
                    StackResult::OK,
                    Some(Payload::Discovery(DiscoveryPayload {
                        sid: Some(self.server_id.as_str().into()),
                        resources: resources.iter().map(discovered_resource).collect(),
                    })),
                ))
            }
            (Method::Get, DISCOVERY_URI) => {
                let resources = state.discoverable(&self.server_id, &query);
                if resources.is_empty() {
                    return Route::Respond(self.response(StackResult::NO_RESOURCE, None));
                }
                Route::Respond(self.response(
                    StackResult::OK,
                    Some(Payload::Representation(
                        RepPayload::new()
                            .with("di", self.server_id.as_str().into())
                            .with(
                                "links",
                                RepValue::ObjectArray(resources.iter().map(resource_link).collect()),
                            ),
                    )),
                ))
            }
            (Method::Get | Method::Discover, DEVICE_URI) => Route::Respond(self.response(
                StackResult::OK,
                Some(Payload::Device(self.device_payload(state))),
            )),
            (Method::Get | Method::Discover, PLATFORM_URI) => Route::Respond(self.response(
                StackResult::OK,
                Some(Payload::Platform(PlatformPayload {
                    info: Some(state.platform_info.clone().unwrap_or_default()),
                })),
            )),
            (Method::Discover, _) => Route::Silent,
            (method, uri) => {
                let Some((resource, hosted)) =
                    state.resources.iter().find(|(_, hosted)| hosted.uri == uri)
                else {
                    return Route::Respond(self.response(StackResult::NO_RESOURCE, None));
                };
                let resource = *resource;
                let handler = Arc::clone(&hosted.handler);

                let request_handle = RequestId(state.next_id());
                state.pending.insert(request_handle, (handle, method));

                let mut flag = EntityHandlerFlag::REQUEST;
                let observe = if method == Method::Observe {
                    flag |= EntityHandlerFlag::OBSERVER;
                    let id = ObservationId(state.next_id());
                    state.observations.insert(
                        id,
                        Observation {
                            client: handle,
                            resource,
                        },
                    );
                    Some(ObserveInfo {
                        action: ObserveAction::Register,
                        id,
                    })
                } else {
                    None
                };

                Route::Dispatch {
                    handler,
                    flag,
                    request: InboundRequest {
                        request_handle,
                        resource: Some(resource),
                        method,
                        query: request.query.clone().unwrap_or_default(),
                        payload: request.payload.clone(),
                        observe,
                    },
                }
            }
        }
    }
}

impl ClientTransport for Loopback {
    fn do_resource(
        &self,
        request: OutboundRequest,
        callback: ResponseCallback,
    ) -> Result<RequestHandle, StackResult> {
        let (handle, route) = {
            let mut state = self.state.lock();
            if let Some(result) = state.fault(FaultPoint::Request) {
                return Err(result);
            }

            let handle = RequestHandle(state.next_id());
            state.slots.insert(
                handle,
                Slot {
                    callback: Some(callback),
                    backlog: VecDeque::new(),
                },
            );
            let route = self.route(&mut state, handle, &request);
            state.requests.push(RecordedRequest { handle, request });
            (handle, route)
        };

        match route {
            Route::Respond(response) => self.deliver(handle, response),
            Route::Silent => {}
            Route::Dispatch {
                handler,
                flag,
                request,
            } => {
                if handler(flag, &request) == EntityHandlerResult::Error {
                    {
                        let mut state = self.state.lock();
                        state.pending.remove(&request.request_handle);
                        if let Some(observe) = request.observe {
                            state.observations.remove(&observe.id);
                        }
                    }
                    self.deliver(handle, self.response(StackResult::ERROR, None));
                }
            }
        }

        Ok(handle)
    }

    fn cancel(&self, handle: RequestHandle) -> StackResult {
        let deregistration = {
            let mut state = self.state.lock();
            if let Some(result) = state.fault(FaultPoint::Cancel) {
                return result;
            }
            if state.slots.remove(&handle).is_none() {
                return StackResult::INVALID_PARAM;
            }
            state.cancellations.push(handle);

            let observation = state
                .observations
                .iter()
                .find(|(_, observation)| observation.client == handle)
                .map(|(id, observation)| (*id, observation.resource));
            state.forget(handle);

            observation.and_then(|(id, resource)| {
                let handler = Arc::clone(&state.resources.get(&resource)?.handler);
                let request = InboundRequest {
                    request_handle: RequestId(state.next_id()),
                    resource: Some(resource),
                    method: Method::Get,
                    query: String::new(),
                    payload: None,
                    observe: Some(ObserveInfo {
                        action: ObserveAction::Deregister,
                        id,
                    }),
                };
                Some((handler, request))
            })
        };

        if let Some((handler, request)) = deregistration {
            handler(EntityHandlerFlag::OBSERVER, &request);
        }

        StackResult::OK
    }
}

impl ServerTransport for Loopback {
    fn create_resource(
        &self,
        uri: &str,
        resource_type: &str,
        interface: &str,
        properties: ResourceProperties,
        handler: EntityHandler,
    ) -> Result<ResourceHandle, StackResult> {
        let mut state = self.state.lock();
        if let Some(result) = state.fault(FaultPoint::CreateResource) {
            return Err(result);
        }
        if state.resources.values().any(|hosted| hosted.uri == uri) {
            return Err(StackResult::INVALID_PARAM);
        }

        let handle = ResourceHandle(state.next_id());
        state.resources.insert(
            handle,
            Hosted {
                uri: uri.into(),
                types: vec![resource_type.into()],
                interfaces: vec![interface.into()],
                properties,
                handler,
            },
        );
        debug!("Hosting `{uri}` as resource {handle}");

        Ok(handle)
    }

    fn bind_resource_type(&self, handle: ResourceHandle, resource_type: &str) -> StackResult {
        let mut state = self.state.lock();
        if let Some(result) = state.fault(FaultPoint::BindResourceType) {
            return result;
        }
        match state.resources.get_mut(&handle) {
            Some(hosted) => {
                hosted.types.push(resource_type.into());
                StackResult::OK
            }
            None => StackResult::INVALID_PARAM,
        }
    }

    fn bind_interface(&self, handle: ResourceHandle, interface: &str) -> StackResult {
        let mut state = self.state.lock();
        if let Some(result) = state.fault(FaultPoint::BindInterface) {
            return result;
        }
        match state.resources.get_mut(&handle) {
            Some(hosted) => {
                hosted.interfaces.push(interface.into());
                StackResult::OK
            }
            None => StackResult::INVALID_PARAM,
        }
    }

    fn delete_resource(&self, handle: ResourceHandle) -> StackResult {
        let mut state = self.state.lock();
        if let Some(result) = state.fault(FaultPoint::DeleteResource) {
            return result;
        }
        if state.resources.shift_remove(&handle).is_none() {
            return StackResult::NO_RESOURCE;
        }
        state
            .observations
            .retain(|_, observation| observation.resource != handle);
        StackResult::OK
    }

    fn resource_uri(&self, handle: ResourceHandle) -> Option<String> {
        self.state
            .lock()
            .resources
            .get(&handle)
            .map(|hosted| hosted.uri.clone())
    }

    fn resource_properties(&self, handle: ResourceHandle) -> Option<ResourceProperties> {
        self.state
            .lock()
            .resources
            .get(&handle)
            .map(|hosted| hosted.properties)
    }

    fn notify_list_of_observers(
        &self,
        handle: ResourceHandle,
        observers: &[ObservationId],
        payload: RepPayload,
        _qos: QualityOfService,
    ) -> StackResult {
        let deliveries = {
            let mut state = self.state.lock();
            if let Some(result) = state.fault(FaultPoint::Notify) {
                return result;
            }
            if !state.resources.contains_key(&handle) {
                return StackResult::NO_RESOURCE;
            }
            state.notifications.push(RecordedNotification {
                resource: handle,
                observers: observers.to_vec(),
                payload: payload.clone(),
            });

            observers
                .iter()
                .filter_map(|id| {
                    let observation = state.observations.get(id);
                    if observation.is_none() {
                        debug!("Observer {id} is gone");
                    }
                    observation.map(|observation| observation.client)
                })
                .collect::<Vec<_>>()
        };

        for client in deliveries {
            self.deliver(
                client,
                self.response(
                    StackResult::OK,
                    Some(Payload::Representation(payload.clone())),
                ),
            );
        }

        StackResult::OK
    }

    fn do_response(&self, response: EntityResponse) -> StackResult {
        let delivery = {
            let mut state = self.state.lock();
            if let Some(result) = state.fault(FaultPoint::Response) {
                return result;
            }
            state.responses.push(response.clone());
            state.pending.remove(&response.request_handle)
        };

        let Some((client, method)) = delivery else {
            debug!(
                "No client is waiting for request {}",
                response.request_handle
            );
            return StackResult::OK;
        };

        let result = match (response.result, method) {
            (EntityHandlerResult::Error, _) => StackResult::ERROR,
            (EntityHandlerResult::Ok, Method::Put) => StackResult::RESOURCE_CHANGED,
            (EntityHandlerResult::Ok, Method::Post) => StackResult::RESOURCE_CREATED,
            (EntityHandlerResult::Ok, Method::Delete) => StackResult::RESOURCE_DELETED,
            (EntityHandlerResult::Ok, _) => StackResult::OK,
        };

        self.deliver(
            client,
            self.response(result, response.payload.map(Payload::Representation)),
        );

        StackResult::OK
    }

    fn start_presence(&self, ttl: u32) -> StackResult {
        let mut state = self.state.lock();
        if let Some(result) = state.fault(FaultPoint::Presence) {
            return result;
        }
        state.presence = Some(ttl);
        StackResult::OK
    }

    fn stop_presence(&self) -> StackResult {
        let mut state = self.state.lock();
        if let Some(result) = state.fault(FaultPoint::Presence) {
            return result;
        }
        state.presence = None;
        StackResult::OK
    }

    fn server_instance_id(&self) -> DeviceId {
        self.server_id.clone()
    }

    fn set_device_info(&self, info: DevicePayload) -> StackResult {
        let mut state = self.state.lock();
        if let Some(result) = state.fault(FaultPoint::DeviceInfo) {
            return result;
        }
        state.device_info = Some(info);
        StackResult::OK
    }

    fn set_platform_info(&self, info: PlatformInfoPayload) -> StackResult {
        let mut state = self.state.lock();
        if let Some(result) = state.fault(FaultPoint::PlatformInfo) {
            return result;
        }
        state.platform_info = Some(info);
        StackResult::OK
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::address::Address;
    use crate::payload::{Payload, RepPayload, ResourceProperties};
    use crate::transport::{
        ClientTransport, EntityHandler, EntityHandlerFlag, EntityHandlerResult, EntityResponse,
        InboundRequest, Method, OutboundRequest, QualityOfService, Response, ResponseCallback,
        ServerTransport, StackResult, TransactionAction,
    };
    use crate::{DISCOVERY_URI, codec};

    use super::{FaultPoint, Loopback};

    type Responses = Arc<Mutex<Vec<Response>>>;

    fn collect(action: TransactionAction) -> (Responses, ResponseCallback) {
        let responses = Responses::default();
        let sink = Arc::clone(&responses);
        (
            responses,
            Box::new(move |response| {
                sink.lock().push(response);
                action
            }),
        )
    }

    fn recording_handler() -> (Arc<Mutex<Vec<InboundRequest>>>, EntityHandler) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&requests);
        (
            requests,
            Arc::new(move |_: EntityHandlerFlag, request: &InboundRequest| {
                sink.lock().push(request.clone());
                EntityHandlerResult::Ok
            }),
        )
    }

    #[test]
    fn directed_discovery() {
        let loopback = Loopback::new("urn:dev:1", Address::new("10.0.0.2").port(5683));
        let (_, handler) = recording_handler();

        let light = loopback
            .create_resource(
                "/light",
                "oic.r.light",
                "oic.if.baseline",
                ResourceProperties::DISCOVERABLE | ResourceProperties::OBSERVABLE,
                Arc::clone(&handler),
            )
            .unwrap();
        assert_eq!(loopback.bind_resource_type(light, "oic.r.switch"), StackResult::OK);
        // Hidden from discovery.
        loopback
            .create_resource("/hidden", "oic.r.x", "oic.if.a", ResourceProperties::empty(), handler)
            .unwrap();

        let (responses, callback) = collect(TransactionAction::Delete);
        loopback
            .do_resource(
                OutboundRequest::new(Method::Get, DISCOVERY_URI)
                    .destination(loopback.address().clone()),
                callback,
            )
            .unwrap();

        let responses = responses.lock();
        assert_eq!(responses.len(), 1);
        let descriptors =
            codec::parse_resource_batch(responses[0].payload.as_ref().unwrap()).unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].resource_path, "/light");
        assert_eq!(descriptors[0].resource_types, ["oic.r.light", "oic.r.switch"]);
        assert!(descriptors[0].observable);
        assert_eq!(loopback.outstanding(), 0);
    }

    #[test]
    fn observation_lifecycle() {
        let loopback = Loopback::new("urn:dev:1", Address::new("10.0.0.2"));
        let (requests, handler) = recording_handler();
        let resource = loopback
            .create_resource("/fan", "oic.r.fan", "oic.if.a", ResourceProperties::OBSERVABLE, handler)
            .unwrap();

        let (responses, callback) = collect(TransactionAction::Keep);
        let handle = loopback
            .do_resource(OutboundRequest::new(Method::Observe, "/fan"), callback)
            .unwrap();

        let registration = requests.lock()[0].clone();
        let observer = registration.observe.unwrap().id;

        // Answer the registration, then notify twice.
        loopback.do_response(EntityResponse {
            request_handle: registration.request_handle,
            resource_handle: Some(resource),
            result: EntityHandlerResult::Ok,
            payload: Some(RepPayload::new().with("speed", 1.into())),
            resource_uri: "/fan".into(),
        });
        for speed in [2, 3] {
            loopback.notify_list_of_observers(
                resource,
                &[observer],
                RepPayload::new().with("speed", i64::from(speed).into()),
                QualityOfService::High,
            );
        }
        assert_eq!(responses.lock().len(), 3);
        assert!(matches!(
            responses.lock()[2].payload,
            Some(Payload::Representation(_))
        ));

        // Cancelling delivers a deregistration to the handler.
        assert_eq!(loopback.cancel(handle), StackResult::OK);
        assert_eq!(loopback.cancellations(), [handle]);
        assert_eq!(requests.lock().len(), 2);
        assert!(requests.lock()[1].observe.is_some());

        // Further notifications reach nobody.
        loopback.notify_list_of_observers(
            resource,
            &[observer],
            RepPayload::new(),
            QualityOfService::High,
        );
        assert_eq!(responses.lock().len(), 3);
        assert_eq!(loopback.cancel(handle), StackResult::INVALID_PARAM);
    }

    #[test]
    fn one_shot_faults() {
        let loopback = Loopback::new("urn:dev:1", Address::new("10.0.0.2"));

        loopback.fail_next(FaultPoint::Request, StackResult::COMM_ERROR);
        let (_, callback) = collect(TransactionAction::Delete);
        assert_eq!(
            loopback
                .do_resource(OutboundRequest::new(Method::Get, "/oic/d"), callback)
                .unwrap_err(),
            StackResult::COMM_ERROR
        );

        // The fault is consumed.
        let (responses, callback) = collect(TransactionAction::Delete);
        assert!(
            loopback
                .do_resource(OutboundRequest::new(Method::Get, "/oic/d"), callback)
                .is_ok()
        );
        assert_eq!(responses.lock()[0].result, StackResult::OK);

        loopback.fail_next(FaultPoint::Presence, StackResult::ERROR);
        assert_eq!(loopback.start_presence(10), StackResult::ERROR);
        assert_eq!(loopback.start_presence(10), StackResult::OK);
        assert_eq!(loopback.presence(), Some(10));
    }
}
