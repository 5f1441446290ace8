use std::borrow::Cow;

use tracing::error;

use crate::transport::StackResult;

/// All possible error kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or wrongly tagged wire data.
    InvalidPayload,
    /// A device identifier has never been associated with an address.
    UnresolvedDevice,
    /// A directed discovery yielded no matching resource.
    ResourceNotFound,
    /// A shared nested object met twice while encoding a representation.
    CircularReference,
    /// A resource registration request failed validation.
    InvalidResourceInit,
    /// The transport executor returned a non-success result.
    TransportFailure,
    /// A server-side request could not be dispatched.
    HandlerError,
    /// An operation targeted a resource which is not registered anymore.
    InvalidResource,
    /// Device or platform information failed validation.
    InvalidInfo,
}

impl ErrorKind {
    pub(crate) const fn description(self) -> &'static str {
        match self {
            Self::InvalidPayload => "Invalid Payload",
            Self::UnresolvedDevice => "Unresolved Device",
            Self::ResourceNotFound => "Resource Not Found",
            Self::CircularReference => "Circular Reference",
            Self::InvalidResourceInit => "Invalid Resource Init",
            Self::TransportFailure => "Transport Failure",
            Self::HandlerError => "Handler Error",
            Self::InvalidResource => "Invalid Resource",
            Self::InvalidInfo => "Invalid Info",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.description().fmt(f)
    }
}

/// Protocol error.
#[derive(Clone, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    description: Cow<'static, str>,
    result: Option<StackResult>,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.format(f)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.format(f)
    }
}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    #[inline]
    pub fn new(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        let description = description.into();
        error!("{}", description.as_ref());
        Self {
            kind,
            description,
            result: None,
        }
    }

    /// Attaches the raw [`StackResult`] returned by the transport.
    #[must_use]
    pub const fn with_result(mut self, result: StackResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the raw [`StackResult`], if the error originated from the
    /// transport.
    #[must_use]
    pub const fn result(&self) -> Option<StackResult> {
        self.result
    }

    fn format(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)?;
        if let Some(result) = self.result {
            write!(f, " (result: {result})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// A specialized [`Result`] type for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use crate::transport::StackResult;

    use super::{Error, ErrorKind};

    #[test]
    fn protocol_error() {
        let error = Error::new(ErrorKind::UnresolvedDevice, "Unknown device `urn:dev:1`.");

        assert_eq!(
            error.to_string(),
            r"Unresolved Device: Unknown device `urn:dev:1`."
        );
        assert_eq!(error.result(), None);
    }

    #[test]
    fn error_with_result() {
        let error = Error::new(ErrorKind::TransportFailure, "request failed")
            .with_result(StackResult::COMM_ERROR);

        assert_eq!(error.kind(), ErrorKind::TransportFailure);
        assert_eq!(error.result(), Some(StackResult::COMM_ERROR));
        assert_eq!(
            error.to_string(),
            "Transport Failure: request failed (result: COMM_ERROR)"
        );
    }
}
