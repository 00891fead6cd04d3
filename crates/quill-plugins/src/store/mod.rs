//! Plugin registry rows and the store abstraction that persists them.
//!
//! The SQL-backed registry lives outside this crate. [`PluginStore`] is the
//! seam it plugs into; [`MemoryPluginStore`] backs the daemon by default and
//! every test.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use time::OffsetDateTime;

use crate::descriptor::{PluginDescriptor, PluginType};
use crate::error::StoreError;

/// Internal registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PluginId(u64);

impl PluginId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PluginId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fields written on insert or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDraft {
    /// Stable external identity.
    pub uuid: String,
    /// Display name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Registry classification.
    pub plugin_type: PluginType,
}

impl From<&PluginDescriptor> for PluginDraft {
    fn from(descriptor: &PluginDescriptor) -> Self {
        Self {
            uuid: descriptor.uuid().to_owned(),
            name: descriptor.name().to_owned(),
            version: descriptor.version().to_owned(),
            plugin_type: descriptor.plugin_type(),
        }
    }
}

/// A registry row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRecord {
    /// Internal key, stable across re-ingestion.
    pub id: PluginId,
    /// Stable external identity.
    pub uuid: String,
    /// Display name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Registry classification.
    pub plugin_type: PluginType,
    /// When the row was first inserted.
    pub created_at: OffsetDateTime,
}

/// Persistence operations the ingestion pipeline relies on.
pub trait PluginStore: Send + Sync {
    /// Reports whether a row exists for `uuid`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store cannot be queried.
    fn exists(&self, uuid: &str) -> Result<bool, StoreError> {
        self.fetch(uuid).map(|row| row.is_some())
    }

    /// Fetches the row for `uuid`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store cannot be queried.
    fn fetch(&self, uuid: &str) -> Result<Option<PluginRecord>, StoreError>;

    /// Inserts a new row and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] when the uuid is already present.
    fn insert(&self, draft: &PluginDraft) -> Result<PluginRecord, StoreError>;

    /// Rewrites the row `id` in place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingRow`] when no such row exists.
    fn update(&self, id: PluginId, draft: &PluginDraft) -> Result<PluginRecord, StoreError>;

    /// Lists every row ordered by uuid.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store cannot be queried.
    fn list(&self) -> Result<Vec<PluginRecord>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    rows: BTreeMap<String, PluginRecord>,
}

/// Process-local [`PluginStore`].
#[derive(Debug, Default)]
pub struct MemoryPluginStore {
    state: Mutex<MemoryState>,
}

impl MemoryPluginStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Unavailable {
            message: String::from("memory store lock poisoned"),
        })
    }
}

impl PluginStore for MemoryPluginStore {
    fn fetch(&self, uuid: &str) -> Result<Option<PluginRecord>, StoreError> {
        Ok(self.state()?.rows.get(uuid).cloned())
    }

    fn insert(&self, draft: &PluginDraft) -> Result<PluginRecord, StoreError> {
        let mut state = self.state()?;
        if state.rows.contains_key(&draft.uuid) {
            return Err(StoreError::Duplicate {
                uuid: draft.uuid.clone(),
            });
        }
        state.next_id = state.next_id.saturating_add(1);
        let record = PluginRecord {
            id: PluginId(state.next_id),
            uuid: draft.uuid.clone(),
            name: draft.name.clone(),
            version: draft.version.clone(),
            plugin_type: draft.plugin_type,
            created_at: OffsetDateTime::now_utc(),
        };
        state.rows.insert(draft.uuid.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, id: PluginId, draft: &PluginDraft) -> Result<PluginRecord, StoreError> {
        let mut state = self.state()?;
        let row = state
            .rows
            .values_mut()
            .find(|row| row.id == id)
            .ok_or(StoreError::MissingRow { id: id.get() })?;
        row.name.clone_from(&draft.name);
        row.version.clone_from(&draft.version);
        row.plugin_type = draft.plugin_type;
        Ok(row.clone())
    }

    fn list(&self) -> Result<Vec<PluginRecord>, StoreError> {
        Ok(self.state()?.rows.values().cloned().collect())
    }
}
