//! Error types for route registration and static publishing.
//!
//! None of these are fatal to a running server: a rejected registration is
//! logged and skipped, and a failed static walk publishes nothing. Dispatch
//! misses are not errors at all; see [`super::Resolution::NotFound`].

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use super::routes::RouteKind;

/// Which walk ceiling was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkLimitKind {
    /// Nesting deeper than allowed.
    Depth,
    /// More entries than allowed.
    Entries,
}

impl std::fmt::Display for WalkLimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Depth => f.write_str("depth"),
            Self::Entries => f.write_str("entry count"),
        }
    }
}

/// Errors surfaced while registering routes or publishing static trees.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// A route with the same pattern already exists in its table.
    #[error("{kind} route '{pattern}' is already registered")]
    DuplicateRegistration {
        /// Table the registration targeted.
        kind: RouteKind,
        /// Rejected pattern.
        pattern: String,
    },

    /// The static root could not be opened as a directory.
    #[error("cannot open static root '{path}': {source}")]
    StaticRoot {
        /// Root that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The static tree exceeded a walk ceiling.
    #[error("static tree '{path}' exceeds the {kind} limit of {limit}")]
    StaticWalkLimit {
        /// Root being walked.
        path: PathBuf,
        /// Ceiling that was hit.
        kind: WalkLimitKind,
        /// Configured ceiling.
        limit: usize,
    },

    /// Reading a directory inside the static tree failed.
    #[error("failed to walk static tree at '{path}': {source}")]
    StaticWalk {
        /// Directory being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl DispatchError {
    /// Builds a [`DispatchError::DuplicateRegistration`].
    #[must_use]
    pub fn duplicate(kind: RouteKind, pattern: impl Into<String>) -> Self {
        Self::DuplicateRegistration {
            kind,
            pattern: pattern.into(),
        }
    }

    /// Builds a [`DispatchError::StaticRoot`].
    #[must_use]
    pub fn static_root(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StaticRoot {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Builds a [`DispatchError::StaticWalk`].
    #[must_use]
    pub fn static_walk(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StaticWalk {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}
