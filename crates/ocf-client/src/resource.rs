use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use tokio::sync::oneshot;

use tracing::{debug, info};

use ocf::address::DeviceId;
use ocf::codec::decode_representation;
use ocf::emitter::{Emitter, ListenerId};
use ocf::error::{Error, ErrorKind, Result};
use ocf::query::Query;
use ocf::resource::{ResourceDescriptor, ResourceId};
use ocf::transport::{
    HandleRegistry, Method, ReplaceMode, RequestDescriptor, Response, ResponseListener,
};
use ocf::value::{Object, Value};

pub(crate) type Pending = oneshot::Sender<Result<Resource>>;

// Outcome of an observation attempt.
pub(crate) enum Observation {
    // A subscription has been issued, the first notification settles the
    // pending sender.
    Started,
    // A subscription already exists, the pending sender is handed back.
    AlreadyObserving(Option<Pending>),
}

#[derive(Default)]
struct ObserveState {
    query: Query,
    observer: Option<ResponseListener>,
    pending: Option<Pending>,
}

struct Inner {
    descriptor: ResourceDescriptor,
    properties: Mutex<Object>,
    state: Mutex<ObserveState>,
    handles: Arc<dyn HandleRegistry>,
    updates: Emitter<Resource>,
    errors: Emitter<Error>,
}

/// A remote resource.
///
/// A [`Resource`] is a cheap handle: clones share the same property bag,
/// observation and listeners.
#[derive(Clone)]
pub struct Resource {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("descriptor", &self.inner.descriptor)
            .field("properties", &*self.inner.properties.lock())
            .field("update_listeners", &self.inner.updates.len())
            .finish_non_exhaustive()
    }
}

impl Resource {
    pub(crate) fn new(descriptor: ResourceDescriptor, handles: Arc<dyn HandleRegistry>) -> Self {
        Self::with_state(descriptor, Object::new(), Query::new(), handles)
    }

    fn with_state(
        descriptor: ResourceDescriptor,
        properties: Object,
        query: Query,
        handles: Arc<dyn HandleRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                descriptor,
                properties: Mutex::new(properties),
                state: Mutex::new(ObserveState {
                    query,
                    ..ObserveState::default()
                }),
                handles,
                updates: Emitter::new(),
                errors: Emitter::new(),
            }),
        }
    }

    // A distinct resource sharing the descriptor and a snapshot of the
    // properties, bound to another query.
    pub(crate) fn copy_with_query(&self, query: Query) -> Self {
        Self::with_state(
            self.inner.descriptor.clone(),
            self.properties(),
            query,
            Arc::clone(&self.inner.handles),
        )
    }

    /// Returns the [`ResourceDescriptor`].
    #[must_use]
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.inner.descriptor
    }

    /// Returns the [`ResourceId`].
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.inner.descriptor.id()
    }

    /// Returns the hosting device identifier.
    #[must_use]
    pub fn device_id(&self) -> &DeviceId {
        &self.inner.descriptor.device_id
    }

    /// Returns the resource path.
    #[must_use]
    pub fn resource_path(&self) -> &str {
        &self.inner.descriptor.resource_path
    }

    /// Returns the resource types.
    #[must_use]
    pub fn resource_types(&self) -> &[String] {
        &self.inner.descriptor.resource_types
    }

    /// Returns the resource interfaces.
    #[must_use]
    pub fn interfaces(&self) -> &[String] {
        &self.inner.descriptor.interfaces
    }

    /// Whether the resource is secure.
    #[must_use]
    pub fn secure(&self) -> bool {
        self.inner.descriptor.secure
    }

    /// Whether the resource is discoverable.
    #[must_use]
    pub fn discoverable(&self) -> bool {
        self.inner.descriptor.discoverable
    }

    /// Whether the resource is observable.
    #[must_use]
    pub fn observable(&self) -> bool {
        self.inner.descriptor.observable
    }

    /// Whether the resource is slow.
    #[must_use]
    pub fn slow(&self) -> bool {
        self.inner.descriptor.slow
    }

    /// Whether the resource is active.
    #[must_use]
    pub fn active(&self) -> bool {
        self.inner.descriptor.active
    }

    /// Returns a snapshot of the properties.
    #[must_use]
    pub fn properties(&self) -> Object {
        self.inner.properties.lock().clone()
    }

    /// Returns a property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<Value> {
        self.inner.properties.lock().get(key).cloned()
    }

    /// Replaces the properties.
    pub fn set_properties(&self, properties: Object) {
        *self.inner.properties.lock() = properties;
    }

    /// Sets a property.
    pub fn set_property(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.properties.lock().insert(key, value);
    }

    /// Returns the query bound to the resource.
    #[must_use]
    pub fn query(&self) -> Query {
        self.inner.state.lock().query.clone()
    }

    /// Returns the error listeners.
    ///
    /// Observation failures are reported here.
    #[must_use]
    pub fn errors(&self) -> &Emitter<Error> {
        &self.inner.errors
    }

    /// Attaches an update listener.
    ///
    /// The first listener starts observing the resource. A failure to do
    /// so is reported to the error listeners.
    pub fn on_update(&self, listener: impl Fn(&Resource) + Send + Sync + 'static) -> ListenerId {
        let id = self.inner.updates.subscribe(listener);
        self.observe(None);
        id
    }

    /// Detaches an update listener.
    ///
    /// Detaching the last listener cancels the observation. A failure to do
    /// so is reported to the error listeners.
    ///
    /// Returns `false` if the listener was not attached.
    pub fn remove_update_listener(&self, id: ListenerId) -> bool {
        if !self.inner.updates.unsubscribe(id) {
            return false;
        }

        if self.inner.updates.is_empty() {
            let observer = {
                let mut state = self.inner.state.lock();
                // A pending retrieval is dropped along with the observation.
                state.pending = None;
                state.observer.take()
            };

            if let Some(observer) = observer {
                info!("Stop observing `{}`", self.resource_path());
                if let Err(e) = self.inner.handles.replace(
                    &self.request_descriptor(),
                    &observer,
                    ReplaceMode::Remove,
                ) {
                    self.inner.errors.emit(&e);
                }
            }
        }

        true
    }

    /// Returns the number of update listeners.
    #[must_use]
    pub fn update_listener_count(&self) -> usize {
        self.inner.updates.len()
    }

    /// Checks whether the resource is being observed.
    #[must_use]
    pub fn is_observing(&self) -> bool {
        self.inner.state.lock().observer.is_some()
    }

    pub(crate) fn subscribe_update(
        &self,
        listener: impl Fn(&Resource) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.updates.subscribe(listener)
    }

    pub(crate) fn merge_properties(&self, update: &Object) {
        self.inner.properties.lock().merge(update);
    }

    pub(crate) fn observe(&self, pending: Option<Pending>) -> Observation {
        let observer = {
            let mut state = self.inner.state.lock();
            if state.observer.is_some() {
                return Observation::AlreadyObserving(pending);
            }

            let resource = Arc::downgrade(&self.inner);
            let observer: ResponseListener =
                Arc::new(move |response: &Response| notify(&resource, response));
            state.observer = Some(Arc::clone(&observer));
            state.pending = pending;
            observer
        };

        info!("Start observing `{}`", self.resource_path());

        match self.inner.handles.replace(
            &self.request_descriptor(),
            &observer,
            ReplaceMode::Accumulate,
        ) {
            Ok(false) => Observation::Started,
            // Joined a live subscription, no fresh answer settles the pending
            // retrieval.
            Ok(true) => Observation::AlreadyObserving(self.inner.state.lock().pending.take()),
            Err(e) => {
                self.inner.state.lock().observer = None;
                self.fail(e);
                Observation::Started
            }
        }
    }

    fn request_descriptor(&self) -> RequestDescriptor {
        RequestDescriptor::new(Method::Observe, self.resource_path())
            .device_id(self.device_id().clone())
            .query(self.query())
    }

    fn on_notification(&self, response: &Response) {
        if !response.result.is_ok() {
            self.fail(
                Error::new(
                    ErrorKind::TransportFailure,
                    format!("Observation of `{}` failed", self.resource_path()),
                )
                .with_result(response.result),
            );
            return;
        }

        let update = match response.payload.as_ref() {
            Some(payload) => decode_representation(payload),
            None => Err(Error::new(
                ErrorKind::InvalidPayload,
                format!("Empty notification from `{}`", self.resource_path()),
            )),
        };

        match update {
            Ok(update) => {
                debug!("Notification from `{}`", self.resource_path());
                self.merge_properties(&update);
                self.inner.updates.emit(self);

                let pending = self.inner.state.lock().pending.take();
                if let Some(pending) = pending {
                    let _ = pending.send(Ok(self.clone()));
                }
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&self, error: Error) {
        self.inner.errors.emit(&error);
        let pending = self.inner.state.lock().pending.take();
        if let Some(pending) = pending {
            let _ = pending.send(Err(error));
        }
    }
}

fn notify(resource: &Weak<Inner>, response: &Response) {
    if let Some(inner) = resource.upgrade() {
        Resource { inner }.on_notification(response);
    }
}
