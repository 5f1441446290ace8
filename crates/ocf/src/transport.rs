use std::sync::Arc;

use bitflags::bitflags;

use serde::{Deserialize, Serialize};

use crate::address::{Address, DeviceId};
use crate::error::Result;
use crate::payload::{
    DevicePayload, Payload, PlatformInfoPayload, RepPayload, ResourceProperties,
};
use crate::query::Query;

/// Request methods understood by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// `GET` method.
    Get,
    /// `PUT` method.
    Put,
    /// `POST` method.
    Post,
    /// `DELETE` method.
    Delete,
    /// `GET` with observation registration.
    Observe,
    /// Multicast discovery.
    Discover,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

impl Method {
    /// Returns the [`Method`] name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Observe => "OBSERVE",
            Self::Discover => "DISCOVER",
        }
    }
}

/// Raw result code returned by the transport stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackResult(pub i32);

macro_rules! stack_results {
    ($($name:ident = $code:literal),+ $(,)?) => {
        impl StackResult {
            $(
                #[doc = concat!("`", stringify!($name), "` result code.")]
                pub const $name: Self = Self($code);
            )+

            /// Returns the name of a known result code.
            #[must_use]
            pub const fn name(self) -> Option<&'static str> {
                match self.0 {
                    $($code => Some(stringify!($name)),)+
                    _ => None,
                }
            }
        }
    };
}

stack_results! {
    OK = 0,
    RESOURCE_CREATED = 1,
    RESOURCE_DELETED = 2,
    CONTINUE = 3,
    RESOURCE_CHANGED = 4,
    INVALID_URI = 20,
    INVALID_QUERY = 21,
    INVALID_IP = 22,
    INVALID_PORT = 23,
    INVALID_CALLBACK = 24,
    INVALID_METHOD = 25,
    INVALID_PARAM = 26,
    INVALID_OBSERVE_PARAM = 27,
    NO_MEMORY = 28,
    COMM_ERROR = 29,
    TIMEOUT = 30,
    ADAPTER_NOT_ENABLED = 31,
    NOTIMPL = 32,
    NO_RESOURCE = 33,
    RESOURCE_ERROR = 34,
    SLOW_RESOURCE = 35,
    DUPLICATE_REQUEST = 36,
    NO_OBSERVERS = 37,
    OBSERVER_NOT_FOUND = 38,
    VIRTUAL_DO_NOT_HANDLE = 39,
    INVALID_OPTION = 40,
    MALFORMED_RESPONSE = 41,
    PERSISTENT_BUFFER_REQUIRED = 42,
    INVALID_REQUEST_HANDLE = 43,
    INVALID_DEVICE_INFO = 44,
    INVALID_JSON = 45,
    UNAUTHORIZED_REQ = 46,
    TOO_LARGE_REQ = 47,
    PDM_IS_NOT_INITIALIZED = 48,
    DUPLICATE_UUID = 49,
    INCONSISTENT_DB = 50,
    PRESENCE_TIMEOUT = 128,
    ERROR = 255,
}

impl StackResult {
    /// Checks whether the code is the `OK` sentinel.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        self.0 == Self::OK.0
    }
}

impl std::fmt::Display for StackResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => name.fmt(f),
            None => write!(f, "{}", self.0),
        }
    }
}

/// What the transport does with a transaction after a response callback ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionAction {
    /// Keep the transaction alive to receive further responses.
    Keep,
    /// Delete the transaction.
    Delete,
}

/// Delivery guarantees requested from the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityOfService {
    /// Best-effort delivery.
    Low,
    /// Medium delivery guarantees.
    Medium,
    /// Confirmed delivery.
    #[default]
    High,
    /// Left to the transport.
    NoAck,
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

handle!(
    /// Outstanding client operation.
    RequestHandle
);
handle!(
    /// Inbound request awaiting a response.
    RequestId
);
handle!(
    /// Resource registered with the server transport.
    ResourceHandle
);
handle!(
    /// Remote observer of a server resource.
    ObservationId
);

/// A request issued by a client.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// Request method.
    pub method: Method,
    /// Target URI.
    pub uri: String,
    /// Serialized query, if any.
    pub query: Option<String>,
    /// Destination address, absent for multicast requests.
    pub destination: Option<Address>,
    /// Request payload.
    pub payload: Option<Payload>,
    /// Requested delivery guarantees.
    pub qos: QualityOfService,
}

impl OutboundRequest {
    /// Creates an [`OutboundRequest`] with no query, destination or payload.
    #[must_use]
    #[inline]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            query: None,
            destination: None,
            payload: None,
            qos: QualityOfService::default(),
        }
    }

    /// Sets the request query.
    #[must_use]
    #[inline]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Sets the destination address.
    #[must_use]
    #[inline]
    pub fn destination(mut self, destination: Address) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Sets the request payload.
    #[must_use]
    #[inline]
    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the delivery guarantees.
    #[must_use]
    pub const fn qos(mut self, qos: QualityOfService) -> Self {
        self.qos = qos;
        self
    }
}

/// A response delivered to a client callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Result code.
    pub result: StackResult,
    /// Address of the responder.
    pub address: Address,
    /// Response payload.
    pub payload: Option<Payload>,
}

/// Callback receiving the responses of an outbound request.
pub type ResponseCallback = Box<dyn FnMut(Response) -> TransactionAction + Send>;

/// Request execution primitives used by clients.
pub trait ClientTransport: Send + Sync {
    /// Issues a request.
    ///
    /// The callback is invoked once per response until it returns
    /// [`TransactionAction::Delete`] or the request is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the stack result when the request cannot be issued.
    fn do_resource(
        &self,
        request: OutboundRequest,
        callback: ResponseCallback,
    ) -> std::result::Result<RequestHandle, StackResult>;

    /// Cancels an outstanding request.
    fn cancel(&self, handle: RequestHandle) -> StackResult;
}

bitflags! {
    /// Reasons an entity handler is invoked for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EntityHandlerFlag: u8 {
        /// The invocation carries a request.
        const REQUEST = 1 << 1;
        /// The invocation carries observation information.
        const OBSERVER = 1 << 2;
    }
}

/// Entity handler outcome reported back to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityHandlerResult {
    /// The request has been accepted.
    Ok,
    /// The request could not be dispatched.
    Error,
}

/// Observation action carried by an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveAction {
    /// A remote observer registers.
    Register,
    /// A remote observer deregisters.
    Deregister,
}

/// Observation information carried by an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveInfo {
    /// Observation action.
    pub action: ObserveAction,
    /// Observer identifier.
    pub id: ObservationId,
}

/// A request received by a server.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundRequest {
    /// Handle used to answer the request.
    pub request_handle: RequestId,
    /// Addressed resource.
    pub resource: Option<ResourceHandle>,
    /// Request method.
    pub method: Method,
    /// Raw query string.
    pub query: String,
    /// Request payload.
    pub payload: Option<Payload>,
    /// Observation information.
    pub observe: Option<ObserveInfo>,
}

/// Dispatcher invoked by the transport for each inbound request.
pub type EntityHandler =
    Arc<dyn Fn(EntityHandlerFlag, &InboundRequest) -> EntityHandlerResult + Send + Sync>;

/// A response sent by a server.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityResponse {
    /// Answered request.
    pub request_handle: RequestId,
    /// Answering resource, absent when stale.
    pub resource_handle: Option<ResourceHandle>,
    /// Request outcome.
    pub result: EntityHandlerResult,
    /// Response payload.
    pub payload: Option<RepPayload>,
    /// Answering resource URI.
    pub resource_uri: String,
}

/// Resource hosting primitives used by servers.
pub trait ServerTransport: Send + Sync {
    /// Creates a resource with its first type and interface.
    ///
    /// # Errors
    ///
    /// Returns the stack result when the resource cannot be created.
    fn create_resource(
        &self,
        uri: &str,
        resource_type: &str,
        interface: &str,
        properties: ResourceProperties,
        handler: EntityHandler,
    ) -> std::result::Result<ResourceHandle, StackResult>;

    /// Binds an additional resource type.
    fn bind_resource_type(&self, handle: ResourceHandle, resource_type: &str) -> StackResult;

    /// Binds an additional interface.
    fn bind_interface(&self, handle: ResourceHandle, interface: &str) -> StackResult;

    /// Deletes a resource.
    fn delete_resource(&self, handle: ResourceHandle) -> StackResult;

    /// Returns the URI of a resource.
    fn resource_uri(&self, handle: ResourceHandle) -> Option<String>;

    /// Returns the property bitmap of a resource.
    fn resource_properties(&self, handle: ResourceHandle) -> Option<ResourceProperties>;

    /// Sends a notification to the given observers of a resource.
    fn notify_list_of_observers(
        &self,
        handle: ResourceHandle,
        observers: &[ObservationId],
        payload: RepPayload,
        qos: QualityOfService,
    ) -> StackResult;

    /// Answers an inbound request.
    fn do_response(&self, response: EntityResponse) -> StackResult;

    /// Starts announcing presence.
    fn start_presence(&self, ttl: u32) -> StackResult;

    /// Stops announcing presence.
    fn stop_presence(&self) -> StackResult;

    /// Returns the process-wide server instance identifier.
    fn server_instance_id(&self) -> DeviceId;

    /// Publishes the device information.
    fn set_device_info(&self, info: DevicePayload) -> StackResult;

    /// Publishes the platform information.
    fn set_platform_info(&self, info: PlatformInfoPayload) -> StackResult;
}

/// How a listener is registered with a [`HandleRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    /// Replace the listeners of a live request.
    Replace,
    /// Add a listener next to the existing ones.
    Accumulate,
    /// Remove a listener.
    Remove,
}

/// Description of a request tracked by a [`HandleRegistry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    /// Request method.
    pub method: Method,
    /// Target URI.
    pub uri: String,
    /// Request query.
    pub query: Option<Query>,
    /// Target device, absent for multicast requests.
    pub device_id: Option<DeviceId>,
}

impl RequestDescriptor {
    /// Creates a [`RequestDescriptor`].
    #[must_use]
    #[inline]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            query: None,
            device_id: None,
        }
    }

    /// Sets the request query.
    #[must_use]
    #[inline]
    pub fn query(mut self, query: Query) -> Self {
        self.query = (!query.is_empty()).then_some(query);
        self
    }

    /// Sets the target device.
    #[must_use]
    #[inline]
    pub fn device_id(mut self, device_id: DeviceId) -> Self {
        self.device_id = Some(device_id);
        self
    }
}

/// Listener receiving the responses of a tracked request.
pub type ResponseListener = Arc<dyn Fn(&Response) + Send + Sync>;

/// Mapping from outstanding transport operations to response listeners.
pub trait HandleRegistry: Send + Sync {
    /// Registers or removes a listener.
    ///
    /// Returns `true` when an existing request absorbed the listener and no
    /// new transport traffic was generated.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport refuses the request or its
    /// cancellation.
    fn replace(
        &self,
        descriptor: &RequestDescriptor,
        listener: &ResponseListener,
        mode: ReplaceMode,
    ) -> Result<bool>;
}
