use std::sync::{Arc, Weak};

use hashbrown::HashMap;

use parking_lot::Mutex;

use tracing::{debug, warn};

use ocf::error::{Error, ErrorKind, Result};
use ocf::transport::{
    ClientTransport, HandleRegistry, OutboundRequest, QualityOfService, ReplaceMode,
    RequestDescriptor, RequestHandle, Response, ResponseListener, TransactionAction,
};

use crate::resolver::Resolver;

// A live transport request and the listeners sharing it.
struct Entry {
    handle: Option<RequestHandle>,
    listeners: Vec<ResponseListener>,
}

type Table = Mutex<HashMap<String, Entry>>;

/// Default [`HandleRegistry`].
///
/// Requests are identified by method, device, path and query. Listeners
/// registered for the same request share a single transport operation,
/// which is cancelled once its last listener is removed.
pub struct Handles {
    transport: Arc<dyn ClientTransport>,
    resolver: Arc<Resolver>,
    qos: QualityOfService,
    table: Arc<Table>,
}

impl std::fmt::Debug for Handles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handles")
            .field("requests", &self.len())
            .field("qos", &self.qos)
            .finish_non_exhaustive()
    }
}

impl Handles {
    /// Creates a [`Handles`] registry.
    #[must_use]
    pub fn new(
        transport: Arc<dyn ClientTransport>,
        resolver: Arc<Resolver>,
        qos: QualityOfService,
    ) -> Self {
        Self {
            transport,
            resolver,
            qos,
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the number of live requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Checks whether there are no live requests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }

    /// Returns the number of listeners sharing a request.
    #[must_use]
    pub fn listener_count(&self, descriptor: &RequestDescriptor) -> usize {
        self.table
            .lock()
            .get(&key(descriptor))
            .map_or(0, |entry| entry.listeners.len())
    }

    fn issue(
        &self,
        key: String,
        descriptor: &RequestDescriptor,
        listener: &ResponseListener,
    ) -> Result<bool> {
        let mut request =
            OutboundRequest::new(descriptor.method, descriptor.uri.clone()).qos(self.qos);
        if let Some(query) = descriptor.query.as_ref() {
            request = request.query(query.to_query_string());
        }
        if let Some(device_id) = descriptor.device_id.as_ref() {
            request = request.destination(self.resolver.get(device_id)?);
        }

        self.table.lock().insert(
            key.clone(),
            Entry {
                handle: None,
                listeners: vec![Arc::clone(listener)],
            },
        );

        let callback = dispatcher(Arc::downgrade(&self.table), key.clone());

        match self.transport.do_resource(request, callback) {
            Ok(handle) => {
                let mut table = self.table.lock();
                match table.get_mut(&key) {
                    Some(entry) => entry.handle = Some(handle),
                    None => {
                        // Every listener left while the request was issued.
                        drop(table);
                        let result = self.transport.cancel(handle);
                        if !result.is_ok() {
                            warn!("Unable to cancel abandoned request {handle}: {result}");
                        }
                    }
                }
                Ok(false)
            }
            Err(result) => {
                self.table.lock().remove(&key);
                Err(Error::new(
                    ErrorKind::TransportFailure,
                    format!(
                        "{} `{}`: request failed",
                        descriptor.method, descriptor.uri
                    ),
                )
                .with_result(result))
            }
        }
    }

    fn remove(
        &self,
        key: &str,
        descriptor: &RequestDescriptor,
        listener: &ResponseListener,
    ) -> Result<bool> {
        let handle = {
            let mut table = self.table.lock();
            let Some(entry) = table.get_mut(key) else {
                debug!("No live request for `{}`", descriptor.uri);
                return Ok(false);
            };

            let len = entry.listeners.len();
            entry
                .listeners
                .retain(|registered| !Arc::ptr_eq(registered, listener));
            if entry.listeners.len() == len {
                return Ok(false);
            }
            if !entry.listeners.is_empty() {
                return Ok(true);
            }

            table.remove(key).and_then(|entry| entry.handle)
        };

        if let Some(handle) = handle {
            let result = self.transport.cancel(handle);
            if !result.is_ok() {
                return Err(Error::new(
                    ErrorKind::TransportFailure,
                    format!(
                        "{} `{}`: cancellation failed",
                        descriptor.method, descriptor.uri
                    ),
                )
                .with_result(result));
            }
        }

        Ok(true)
    }
}

impl HandleRegistry for Handles {
    fn replace(
        &self,
        descriptor: &RequestDescriptor,
        listener: &ResponseListener,
        mode: ReplaceMode,
    ) -> Result<bool> {
        let key = key(descriptor);

        if mode == ReplaceMode::Remove {
            return self.remove(&key, descriptor, listener);
        }

        {
            let mut table = self.table.lock();
            if let Some(entry) = table.get_mut(&key) {
                if mode == ReplaceMode::Replace {
                    entry.listeners.clear();
                }
                entry.listeners.push(Arc::clone(listener));
                return Ok(true);
            }
        }

        self.issue(key, descriptor, listener)
    }
}

fn key(descriptor: &RequestDescriptor) -> String {
    format!(
        "{} {} {}?{}",
        descriptor.method,
        descriptor
            .device_id
            .as_ref()
            .map_or("*", |device_id| device_id.as_str()),
        descriptor.uri,
        descriptor
            .query
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    )
}

fn dispatcher(
    table: Weak<Table>,
    key: String,
) -> Box<dyn FnMut(Response) -> TransactionAction + Send> {
    Box::new(move |response| {
        let Some(table) = table.upgrade() else {
            return TransactionAction::Delete;
        };

        // Listeners are invoked outside of the table lock.
        let listeners = match table.lock().get(&key) {
            Some(entry) => entry.listeners.clone(),
            None => return TransactionAction::Delete,
        };

        for listener in &listeners {
            listener(&response);
        }

        TransactionAction::Keep
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ocf::DISCOVERY_URI;
    use ocf::address::{Address, DeviceId};
    use ocf::error::ErrorKind;
    use ocf::loopback::{FaultPoint, Loopback};
    use ocf::payload::ResourceProperties;
    use ocf::transport::{
        EntityHandlerFlag, EntityHandlerResult, HandleRegistry, InboundRequest, Method,
        QualityOfService, ReplaceMode, RequestDescriptor, Response, ResponseListener,
        ServerTransport, StackResult,
    };

    use crate::resolver::Resolver;

    use super::Handles;

    fn counting_listener() -> (Arc<AtomicUsize>, ResponseListener) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (
            count,
            Arc::new(move |_: &Response| {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    fn setup() -> (Arc<Loopback>, Handles) {
        let loopback = Loopback::new("urn:dev:1", Address::new("10.0.0.2"));
        loopback
            .create_resource(
                "/light",
                "oic.r.light",
                "oic.if.baseline",
                ResourceProperties::DISCOVERABLE,
                Arc::new(|_: EntityHandlerFlag, _: &InboundRequest| EntityHandlerResult::Ok),
            )
            .unwrap();

        let resolver = Arc::new(Resolver::new());
        resolver.add(DeviceId::new("urn:dev:1"), loopback.address().clone());

        let handles = Handles::new(loopback.clone(), resolver, QualityOfService::High);
        (loopback, handles)
    }

    #[test]
    fn accumulate_shares_request() {
        let (loopback, handles) = setup();
        let descriptor = RequestDescriptor::new(Method::Discover, DISCOVERY_URI);

        let (first_count, first) = counting_listener();
        let (second_count, second) = counting_listener();

        assert!(!handles.replace(&descriptor, &first, ReplaceMode::Accumulate).unwrap());
        assert!(handles.replace(&descriptor, &second, ReplaceMode::Accumulate).unwrap());

        assert_eq!(loopback.request_count(Method::Discover), 1);
        assert_eq!(handles.listener_count(&descriptor), 2);
        // The first listener received the synchronous discovery answer.
        assert_eq!(first_count.load(Ordering::SeqCst), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 0);

        // Removing one listener keeps the request alive.
        assert!(handles.replace(&descriptor, &first, ReplaceMode::Remove).unwrap());
        assert!(loopback.cancellations().is_empty());

        // Removing the last one cancels it.
        assert!(handles.replace(&descriptor, &second, ReplaceMode::Remove).unwrap());
        assert_eq!(loopback.cancellations().len(), 1);
        assert!(handles.is_empty());

        // Nothing left to remove.
        assert!(!handles.replace(&descriptor, &second, ReplaceMode::Remove).unwrap());
    }

    #[test]
    fn replace_listeners() {
        let (loopback, handles) = setup();
        let descriptor = RequestDescriptor::new(Method::Discover, DISCOVERY_URI);

        let (_, first) = counting_listener();
        let (_, second) = counting_listener();

        assert!(!handles.replace(&descriptor, &first, ReplaceMode::Replace).unwrap());
        assert!(handles.replace(&descriptor, &second, ReplaceMode::Replace).unwrap());

        assert_eq!(handles.listener_count(&descriptor), 1);
        assert_eq!(loopback.request_count(Method::Discover), 1);
    }

    #[test]
    fn failures() {
        let (loopback, handles) = setup();
        let (_, listener) = counting_listener();

        // Unknown device.
        let unresolved =
            RequestDescriptor::new(Method::Observe, "/light").device_id(DeviceId::new("urn:dev:9"));
        assert_eq!(
            handles
                .replace(&unresolved, &listener, ReplaceMode::Accumulate)
                .unwrap_err()
                .kind(),
            ErrorKind::UnresolvedDevice
        );

        // Refused request.
        let descriptor = RequestDescriptor::new(Method::Discover, DISCOVERY_URI);
        loopback.fail_next(FaultPoint::Request, StackResult::COMM_ERROR);
        let error = handles
            .replace(&descriptor, &listener, ReplaceMode::Accumulate)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TransportFailure);
        assert_eq!(error.result(), Some(StackResult::COMM_ERROR));
        assert!(handles.is_empty());

        // Refused cancellation.
        handles
            .replace(&descriptor, &listener, ReplaceMode::Accumulate)
            .unwrap();
        loopback.fail_next(FaultPoint::Cancel, StackResult::ERROR);
        assert_eq!(
            handles
                .replace(&descriptor, &listener, ReplaceMode::Remove)
                .unwrap_err()
                .result(),
            Some(StackResult::ERROR)
        );
    }
}
