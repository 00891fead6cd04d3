//! Static asset publishing.
//!
//! [`StaticIndex`] maps public web paths to local files. Trees are walked
//! through a `cap-std` directory handle that never follows symlinks, and the
//! walk is bounded in depth and entry count because plugin code is untrusted.
//! The index is the only dispatch table mutated after startup, so every read
//! and write goes through its mutex.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use cap_std::ambient_authority;
use cap_std::fs::Dir;
use tracing::{debug, info};

use super::content_type::content_type_for;
use super::errors::{DispatchError, WalkLimitKind};

/// Tracing target for static publishing.
pub(crate) const STATICS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::statics");

/// Ceilings applied to one tree walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkLimits {
    /// Deepest directory nesting followed.
    pub max_depth: usize,
    /// Largest number of directory entries visited.
    pub max_entries: usize,
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_entries: 20_000,
        }
    }
}

/// A published file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAsset {
    /// Absolute local path.
    pub path: PathBuf,
    /// Content type resolved from the extension.
    pub content_type: &'static str,
}

/// Outcome of publishing one tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Paths newly added.
    pub added: usize,
    /// Paths already published and left untouched.
    pub skipped: usize,
}

/// Web path to local file mapping.
#[derive(Debug, Default)]
pub struct StaticIndex {
    entries: Mutex<HashMap<String, StaticAsset>>,
    limits: WalkLimits,
}

impl StaticIndex {
    /// Creates an empty index using `limits` for every walk.
    #[must_use]
    pub fn new(limits: WalkLimits) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            limits,
        }
    }

    /// Looks up a web path; leading slashes are ignored.
    #[must_use]
    pub fn lookup(&self, web_path: &str) -> Option<StaticAsset> {
        self.entries()
            .get(web_path.trim_start_matches('/'))
            .cloned()
    }

    /// Number of published paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Reports whether nothing is published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Publishes every regular file under `dir` beneath `prefix`.
    ///
    /// A path that is already published keeps its existing target. The walk
    /// completes before anything is inserted, so a failed walk publishes
    /// nothing. Symlinks and names that are not UTF-8 are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::StaticRoot`] when `dir` cannot be opened,
    /// [`DispatchError::StaticWalkLimit`] when a ceiling is exceeded, and
    /// [`DispatchError::StaticWalk`] when a directory cannot be read.
    pub fn publish_tree(&self, prefix: &str, dir: &Path) -> Result<PublishReport, DispatchError> {
        let root = fs::canonicalize(dir).map_err(|error| DispatchError::static_root(dir, error))?;
        let handle = Dir::open_ambient_dir(&root, ambient_authority())
            .map_err(|error| DispatchError::static_root(&root, error))?;

        let mut walk = TreeWalk {
            root: &root,
            limits: self.limits,
            visited: 0,
            found: Vec::new(),
        };
        walk.visit(&handle, "", &root, 0)?;

        let web_prefix = prefix.trim_matches('/');
        let mut report = PublishReport::default();
        let mut entries = self.entries();
        for (relative, path) in walk.found {
            let web_path = if web_prefix.is_empty() {
                relative
            } else {
                format!("{web_prefix}/{relative}")
            };
            if entries.contains_key(&web_path) {
                report.skipped += 1;
                continue;
            }
            let content_type = content_type_for(&path);
            entries.insert(web_path, StaticAsset { path, content_type });
            report.added += 1;
        }
        drop(entries);

        info!(
            target: STATICS_TARGET,
            prefix = web_prefix,
            root = %root.display(),
            added = report.added,
            skipped = report.skipped,
            "static tree published"
        );
        Ok(report)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, StaticAsset>> {
        // Inserts are single map operations, so a poisoned map is intact.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct TreeWalk<'a> {
    root: &'a Path,
    limits: WalkLimits,
    visited: usize,
    found: Vec<(String, PathBuf)>,
}

impl TreeWalk<'_> {
    fn visit(
        &mut self,
        dir: &Dir,
        relative: &str,
        local: &Path,
        depth: usize,
    ) -> Result<(), DispatchError> {
        if depth > self.limits.max_depth {
            return Err(self.limit(WalkLimitKind::Depth, self.limits.max_depth));
        }
        let entries = dir
            .entries()
            .map_err(|error| DispatchError::static_walk(local, error))?;
        for item in entries {
            let entry = item.map_err(|error| DispatchError::static_walk(local, error))?;
            self.visited += 1;
            if self.visited > self.limits.max_entries {
                return Err(self.limit(WalkLimitKind::Entries, self.limits.max_entries));
            }

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                debug!(
                    target: STATICS_TARGET,
                    dir = %local.display(),
                    "skipping entry with non-UTF-8 name"
                );
                continue;
            };
            let file_type = entry
                .file_type()
                .map_err(|error| DispatchError::static_walk(local, error))?;
            let child_local = local.join(name);
            let child_relative = if relative.is_empty() {
                name.to_owned()
            } else {
                format!("{relative}/{name}")
            };

            if file_type.is_dir() {
                let child = entry
                    .open_dir()
                    .map_err(|error| DispatchError::static_walk(&child_local, error))?;
                self.visit(&child, &child_relative, &child_local, depth + 1)?;
            } else if file_type.is_file() {
                self.found.push((child_relative, child_local));
            }
        }
        Ok(())
    }

    fn limit(&self, kind: WalkLimitKind, limit: usize) -> DispatchError {
        DispatchError::StaticWalkLimit {
            path: self.root.to_path_buf(),
            kind,
            limit,
        }
    }
}
