//! Route tables and request resolution.
//!
//! Handler routes are registered on a [`DispatcherBuilder`] and frozen by
//! [`DispatcherBuilder::build`], so the exact, subtree and WebSocket tables
//! never change while requests are served. The static index is shared and
//! may grow at any time.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use tracing::{debug, warn};

use super::errors::DispatchError;
use super::request::Request;
use super::response::Response;
use super::routes::{Handler, RouteEntry, RouteKind};
use super::statics::{StaticAsset, StaticIndex};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

const STATIC_METHODS: &str = "GET, HEAD";

/// Outcome of resolving a path against the route tables.
#[derive(Debug)]
pub enum Resolution<'a> {
    /// An exact route matched.
    Exact(&'a RouteEntry),
    /// A published static file matched.
    Static(StaticAsset),
    /// The nearest registered ancestor subtree matched.
    Subtree(&'a RouteEntry),
    /// A WebSocket route matched an upgrade request.
    WebSocket(&'a RouteEntry),
    /// Nothing matched.
    NotFound,
}

/// Collects handler routes before serving starts.
#[derive(Debug)]
pub struct DispatcherBuilder {
    exact: HashMap<String, RouteEntry>,
    subtree: HashMap<String, RouteEntry>,
    websocket: HashMap<String, RouteEntry>,
    statics: Arc<StaticIndex>,
}

impl DispatcherBuilder {
    /// Starts a builder that serves files from `statics`.
    #[must_use]
    pub fn new(statics: Arc<StaticIndex>) -> Self {
        Self {
            exact: HashMap::new(),
            subtree: HashMap::new(),
            websocket: HashMap::new(),
            statics,
        }
    }

    /// Registers a handler for one exact path.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::DuplicateRegistration`] when the path is
    /// already taken; the existing route is kept.
    pub fn register_exact(
        &mut self,
        pattern: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<(), DispatchError> {
        self.register(RouteEntry::new(RouteKind::Exact, pattern, handler))
    }

    /// Registers a handler for every descendant of `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::DuplicateRegistration`] when the subtree is
    /// already taken.
    pub fn register_subtree(
        &mut self,
        pattern: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<(), DispatchError> {
        self.register(RouteEntry::new(RouteKind::Subtree, pattern, handler))
    }

    /// Registers a handler for upgrade requests on one exact path.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::DuplicateRegistration`] when the path is
    /// already taken.
    pub fn register_websocket(
        &mut self,
        pattern: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<(), DispatchError> {
        self.register(RouteEntry::new(RouteKind::WebSocket, pattern, handler))
    }

    /// Inserts a route into the table named by its kind.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::DuplicateRegistration`] when the table
    /// already holds the pattern.
    pub fn register(&mut self, entry: RouteEntry) -> Result<(), DispatchError> {
        let kind = entry.kind();
        let table = match kind {
            RouteKind::Exact => &mut self.exact,
            RouteKind::Subtree => &mut self.subtree,
            RouteKind::WebSocket => &mut self.websocket,
        };
        if table.contains_key(entry.pattern()) {
            warn!(
                target: DISPATCH_TARGET,
                kind = kind.as_str(),
                pattern = entry.pattern(),
                "ignoring duplicate route registration"
            );
            return Err(DispatchError::duplicate(kind, entry.pattern()));
        }
        debug!(
            target: DISPATCH_TARGET,
            kind = kind.as_str(),
            pattern = entry.pattern(),
            "route registered"
        );
        table.insert(entry.pattern().to_owned(), entry);
        Ok(())
    }

    /// Freezes the handler tables.
    #[must_use]
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            exact: self.exact,
            subtree: self.subtree,
            websocket: self.websocket,
            statics: self.statics,
        }
    }
}

/// Resolves requests to exactly one handler.
#[derive(Debug)]
pub struct Dispatcher {
    exact: HashMap<String, RouteEntry>,
    subtree: HashMap<String, RouteEntry>,
    websocket: HashMap<String, RouteEntry>,
    statics: Arc<StaticIndex>,
}

impl Dispatcher {
    /// Shared static index, for publishing after startup.
    #[must_use]
    pub const fn statics(&self) -> &Arc<StaticIndex> {
        &self.statics
    }

    /// Picks the route for `path`.
    ///
    /// Priority is exact, then static, then the nearest subtree ancestor,
    /// then WebSocket (upgrade requests only). A subtree does not match its
    /// own path.
    #[must_use]
    pub fn resolve(&self, path: &str, upgrade: bool) -> Resolution<'_> {
        if let Some(entry) = self.exact.get(path) {
            return Resolution::Exact(entry);
        }
        if let Some(asset) = self.statics.lookup(path) {
            return Resolution::Static(asset);
        }
        if let Some(entry) = self.nearest_subtree(path) {
            return Resolution::Subtree(entry);
        }
        if upgrade && let Some(entry) = self.websocket.get(path) {
            return Resolution::WebSocket(entry);
        }
        Resolution::NotFound
    }

    /// Resolves and runs `request`.
    #[must_use]
    pub fn serve(&self, request: &Request) -> Response {
        match self.resolve(request.path(), request.is_websocket_upgrade()) {
            Resolution::Exact(entry)
            | Resolution::Subtree(entry)
            | Resolution::WebSocket(entry) => entry.handle(request),
            Resolution::Static(asset) => serve_static(request, &asset),
            Resolution::NotFound => {
                debug!(
                    target: DISPATCH_TARGET,
                    method = %request.method(),
                    path = request.path(),
                    "no route matched"
                );
                Response::not_found()
            }
        }
    }

    fn nearest_subtree(&self, path: &str) -> Option<&RouteEntry> {
        let mut remaining = path;
        while let Some((head, _)) = remaining.rsplit_once('/') {
            if let Some(entry) = self.subtree.get(head) {
                return Some(entry);
            }
            remaining = head;
        }
        None
    }
}

fn serve_static(request: &Request, asset: &StaticAsset) -> Response {
    let head = *request.method() == Method::HEAD;
    if !head && *request.method() != Method::GET {
        return Response::method_not_allowed(STATIC_METHODS);
    }
    match fs::read(&asset.path) {
        Ok(contents) => {
            let response = Response::new(StatusCode::OK, asset.content_type, contents);
            if head {
                response.without_body()
            } else {
                response
            }
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            debug!(
                target: DISPATCH_TARGET,
                path = %asset.path.display(),
                "published file no longer exists"
            );
            Response::not_found()
        }
        Err(error) => {
            warn!(
                target: DISPATCH_TARGET,
                path = %asset.path.display(),
                %error,
                "failed to read published file"
            );
            Response::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "static_read",
                "failed to read file",
            )
        }
    }
}
