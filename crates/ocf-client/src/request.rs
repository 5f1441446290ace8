use tokio::sync::oneshot;

use ocf::error::{Error, ErrorKind, Result};
use ocf::payload::Payload;
use ocf::transport::{
    ClientTransport, OutboundRequest, Response, ResponseCallback, StackResult, TransactionAction,
};

// Results accepted by requests which do not change the resource.
pub(crate) const OK: &[StackResult] = &[StackResult::OK];

// A request expecting a single response.
pub(crate) struct OneShot<'a> {
    name: &'static str,
    request: OutboundRequest,
    expected: &'a [StackResult],
}

impl<'a> OneShot<'a> {
    pub(crate) const fn new(
        name: &'static str,
        request: OutboundRequest,
        expected: &'a [StackResult],
    ) -> Self {
        Self {
            name,
            request,
            expected,
        }
    }

    pub(crate) async fn send(self, transport: &dyn ClientTransport) -> Result<Response> {
        let (sender, receiver) = oneshot::channel();

        let mut sender = Some(sender);
        let callback: ResponseCallback = Box::new(move |response| {
            if let Some(sender) = sender.take() {
                let _ = sender.send(response);
            }
            TransactionAction::Delete
        });

        transport
            .do_resource(self.request, callback)
            .map_err(|result| {
                Error::new(
                    ErrorKind::TransportFailure,
                    format!("{}: request failed", self.name),
                )
                .with_result(result)
            })?;

        let response = receiver.await.map_err(|_| {
            Error::new(
                ErrorKind::TransportFailure,
                format!("{}: request dropped without a response", self.name),
            )
        })?;

        if !self.expected.contains(&response.result) {
            return Err(Error::new(
                ErrorKind::TransportFailure,
                format!("{}: unexpected response", self.name),
            )
            .with_result(response.result));
        }

        Ok(response)
    }
}

// Returns the payload of a response.
pub(crate) fn payload<'r>(name: &str, response: &'r Response) -> Result<&'r Payload> {
    response.payload.as_ref().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidPayload,
            format!("{name}: response without payload"),
        )
    })
}

#[cfg(test)]
mod tests {
    use ocf::address::Address;
    use ocf::error::ErrorKind;
    use ocf::loopback::{FaultPoint, Loopback};
    use ocf::transport::{Method, OutboundRequest, StackResult};

    use super::{OK, OneShot, payload};

    #[tokio::test]
    async fn device_request() {
        let loopback = Loopback::new("urn:dev:1", Address::new("10.0.0.2"));

        let request = OutboundRequest::new(Method::Get, "/oic/d");
        let response = OneShot::new("device_info", request, OK)
            .send(&*loopback)
            .await
            .unwrap();

        assert_eq!(response.result, StackResult::OK);
        assert!(payload("device_info", &response).is_ok());
        assert_eq!(loopback.outstanding(), 0);
    }

    #[tokio::test]
    async fn request_failures() {
        let loopback = Loopback::new("urn:dev:1", Address::new("10.0.0.2"));

        loopback.fail_next(FaultPoint::Request, StackResult::COMM_ERROR);
        let error = OneShot::new("retrieve", OutboundRequest::new(Method::Get, "/light"), OK)
            .send(&*loopback)
            .await
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "Transport Failure: retrieve: request failed (result: COMM_ERROR)"
        );

        // Nothing is hosted at `/light`.
        let error = OneShot::new("retrieve", OutboundRequest::new(Method::Get, "/light"), OK)
            .send(&*loopback)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TransportFailure);
        assert_eq!(error.result(), Some(StackResult::NO_RESOURCE));
    }
}
