use ocf::query::Query;
use ocf::transport::{Method, RequestId};
use ocf::value::Object;

use crate::resource::ServerResource;

/// Kinds of requests received by a [`Server`](crate::Server).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// `GET` and `OBSERVE` requests.
    Retrieve,
    /// `PUT` requests.
    Update,
    /// `POST` requests.
    Create,
    /// `DELETE` requests.
    Delete,
}

impl RequestKind {
    pub(crate) const fn from_method(method: Method) -> Option<Self> {
        match method {
            Method::Get | Method::Observe => Some(Self::Retrieve),
            Method::Put => Some(Self::Update),
            Method::Post => Some(Self::Create),
            Method::Delete => Some(Self::Delete),
            Method::Discover => None,
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retrieve => "retrieve",
            Self::Update => "update",
            Self::Create => "create",
            Self::Delete => "delete",
        }
        .fmt(f)
    }
}

/// A request addressed to a hosted resource.
///
/// Answer it with [`Server::respond`](crate::Server::respond) or
/// [`Server::respond_with_error`](crate::Server::respond_with_error).
#[derive(Debug, Clone)]
pub struct ServerRequest {
    /// Request identifier.
    pub id: RequestId,
    /// Addressed resource.
    pub target: ServerResource,
    /// Request query.
    pub query: Query,
    /// Request body.
    pub data: Option<Object>,
    /// Whether an observer registers, `false` when it deregisters.
    pub observe: Option<bool>,
}
