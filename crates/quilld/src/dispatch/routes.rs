//! Route descriptors and the handler seam.

use std::fmt;
use std::sync::Arc;

use super::request::Request;
use super::response::Response;

/// Table a handler route lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// Matches one path exactly.
    Exact,
    /// Matches every descendant of a path.
    Subtree,
    /// Matches one path exactly, upgrade requests only.
    WebSocket,
}

impl RouteKind {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Subtree => "subtree",
            Self::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces a response for a matched request.
///
/// Handlers run on the blocking pool and may perform I/O.
pub trait Handler: Send + Sync {
    /// Handles one request.
    fn handle(&self, request: &Request) -> Response;
}

impl<F> Handler for F
where
    F: Fn(&Request) -> Response + Send + Sync,
{
    fn handle(&self, request: &Request) -> Response {
        self(request)
    }
}

/// A registered handler route.
#[derive(Clone)]
pub struct RouteEntry {
    pattern: String,
    kind: RouteKind,
    handler: Arc<dyn Handler>,
}

impl RouteEntry {
    /// Creates a route of the given kind.
    ///
    /// Subtree patterns are stored without a trailing slash so `/blog` and
    /// `/blog/` name the same subtree; `/` becomes the empty root.
    #[must_use]
    pub fn new(kind: RouteKind, pattern: &str, handler: Arc<dyn Handler>) -> Self {
        let normalised = match kind {
            RouteKind::Subtree => pattern.trim_end_matches('/').to_owned(),
            RouteKind::Exact | RouteKind::WebSocket => pattern.to_owned(),
        };
        Self {
            pattern: normalised,
            kind,
            handler,
        }
    }

    /// Registered pattern after normalisation.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Route table.
    #[must_use]
    pub const fn kind(&self) -> RouteKind {
        self.kind
    }

    /// Runs the handler.
    #[must_use]
    pub fn handle(&self, request: &Request) -> Response {
        self.handler.handle(request)
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("pattern", &self.pattern)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
