use std::sync::Arc;

use indexmap::IndexMap;

use parking_lot::Mutex;

use tracing::debug;

use ocf::payload::ResourceProperties;
use ocf::query::{QUERY_SEPARATOR, Query};
use ocf::resource::ResourceInit;
use ocf::transport::{ObservationId, ObserveAction, ObserveInfo, ResourceHandle, ServerTransport};
use ocf::value::{Object, Value};

/// Shapes the notified properties for the observers of a query.
pub type Transform = Arc<dyn Fn(&Object, &Query) -> Object + Send + Sync>;

struct Inner {
    resource_path: String,
    resource_types: Vec<String>,
    interfaces: Vec<String>,
    handle: Mutex<Option<ResourceHandle>>,
    transport: Arc<dyn ServerTransport>,
    properties: Mutex<Object>,
    transform: Option<Transform>,
    // Observer identifiers grouped by canonical query string.
    observers: Mutex<IndexMap<String, Vec<ObservationId>>>,
}

/// A resource hosted by a [`Server`](crate::Server).
///
/// A [`ServerResource`] is a cheap handle: clones share the same property
/// bag and observers.
#[derive(Clone)]
pub struct ServerResource {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ServerResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerResource")
            .field("resource_path", &self.inner.resource_path)
            .field("handle", &*self.inner.handle.lock())
            .field("properties", &*self.inner.properties.lock())
            .finish_non_exhaustive()
    }
}

impl PartialEq for ServerResource {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl ServerResource {
    pub(crate) fn new(
        init: &ResourceInit,
        transport: Arc<dyn ServerTransport>,
        transform: Option<Transform>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                resource_path: init.resource_path().into(),
                resource_types: init.resource_types().to_vec(),
                interfaces: init.interfaces().to_vec(),
                handle: Mutex::new(None),
                transport,
                properties: Mutex::new(init.initial_properties().clone()),
                transform,
                observers: Mutex::new(IndexMap::new()),
            }),
        }
    }

    pub(crate) fn handle(&self) -> Option<ResourceHandle> {
        *self.inner.handle.lock()
    }

    pub(crate) fn set_handle(&self, handle: Option<ResourceHandle>) {
        *self.inner.handle.lock() = handle;
    }

    pub(crate) fn transform(&self) -> Option<&Transform> {
        self.inner.transform.as_ref()
    }

    /// Returns the resource path.
    ///
    /// The path known to the transport is preferred while the resource is
    /// registered.
    #[must_use]
    pub fn resource_path(&self) -> String {
        self.handle()
            .and_then(|handle| self.inner.transport.resource_uri(handle))
            .unwrap_or_else(|| self.inner.resource_path.clone())
    }

    /// Returns the resource types.
    #[must_use]
    pub fn resource_types(&self) -> &[String] {
        &self.inner.resource_types
    }

    /// Returns the interfaces.
    #[must_use]
    pub fn interfaces(&self) -> &[String] {
        &self.inner.interfaces
    }

    /// Whether the resource is discoverable.
    #[must_use]
    pub fn discoverable(&self) -> bool {
        self.has(ResourceProperties::DISCOVERABLE)
    }

    /// Whether the resource is observable.
    #[must_use]
    pub fn observable(&self) -> bool {
        self.has(ResourceProperties::OBSERVABLE)
    }

    /// Whether the resource is secure.
    #[must_use]
    pub fn secure(&self) -> bool {
        self.has(ResourceProperties::SECURE)
    }

    /// Whether the resource is slow.
    #[must_use]
    pub fn slow(&self) -> bool {
        self.has(ResourceProperties::SLOW)
    }

    /// Whether the resource is active.
    #[must_use]
    pub fn active(&self) -> bool {
        self.has(ResourceProperties::ACTIVE)
    }

    /// Checks whether the resource is registered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.handle().is_some()
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

    /// Returns the observers grouped by query.
    #[must_use]
    pub fn observers(&self) -> Vec<(Query, Vec<ObservationId>)> {
        self.observer_buckets()
            .into_iter()
            .map(|(query, ids)| (Query::parse(&query), ids))
            .collect()
    }

    pub(crate) fn observer_buckets(&self) -> Vec<(String, Vec<ObservationId>)> {
        self.inner
            .observers
            .lock()
            .iter()
            .map(|(query, ids)| (query.clone(), ids.clone()))
            .collect()
    }

    pub(crate) fn clear_observers(&self) {
        self.inner.observers.lock().clear();
    }

    // Returns the parsed query and the key of its observer bucket. An
    // existing bucket whose query is equal is reused.
    pub(crate) fn query_info(&self, query: &str) -> (Query, String) {
        let normalized = query.replace(QUERY_SEPARATOR, "&");
        let parsed = Query::parse(&normalized);

        let key = self
            .inner
            .observers
            .lock()
            .keys()
            .find(|key| Query::parse(key) == parsed)
            .cloned()
            .unwrap_or(normalized);

        (parsed, key)
    }

    // Updates the observer bucket of a query, returning whether the observer
    // registers.
    pub(crate) fn update_observers(&self, key: String, observe: ObserveInfo) -> bool {
        let mut observers = self.inner.observers.lock();
        match observe.action {
            ObserveAction::Register => {
                debug!("Observer {} registers on `{key}`", observe.id);
                observers.entry(key).or_default().push(observe.id);
                true
            }
            ObserveAction::Deregister => {
                debug!("Observer {} deregisters from `{key}`", observe.id);
                if let Some(ids) = observers.get_mut(&key) {
                    ids.retain(|id| *id != observe.id);
                    if ids.is_empty() {
                        observers.shift_remove(&key);
                    }
                }
                false
            }
        }
    }

    fn has(&self, flag: ResourceProperties) -> bool {
        self.handle()
            .and_then(|handle| self.inner.transport.resource_properties(handle))
            .is_some_and(|properties| properties.contains(flag))
    }
}
