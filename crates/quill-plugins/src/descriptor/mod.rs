//! Plugin descriptor (`plugin.info`) schema and validation.
//!
//! The descriptor is JSON and is deserialised into a strict schema: unknown
//! keys, missing required fields and unrecognised `type` tags are all
//! rejected as [`IngestError::Validation`] before anything outside the
//! extraction scratch directory is touched.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

/// File name of the descriptor inside a plugin archive.
pub const DESCRIPTOR_FILE: &str = "plugin.info";

const MAX_UUID_LEN: usize = 128;

/// Runtime hosting an interpreted plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptRuntime {
    /// CPython.
    Python,
    /// JVM.
    Java,
    /// Node.js.
    Node,
}

impl ScriptRuntime {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Java => "java",
            Self::Node => "node",
        }
    }
}

/// Registry classification of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginType {
    /// Compiled executable (`golang`, `cpp`).
    NativeBinary,
    /// Static HTML/JS bundle served as-is.
    WebBundle,
    /// Script run by an interpreter.
    InterpretedScript(ScriptRuntime),
}

impl std::fmt::Display for PluginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NativeBinary => f.write_str("native_binary"),
            Self::WebBundle => f.write_str("web_bundle"),
            Self::InterpretedScript(runtime) => {
                write!(f, "interpreted_script({})", runtime.as_str())
            }
        }
    }
}

/// Language tag carried in the descriptor's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Go executable.
    Golang,
    /// C++ executable.
    Cpp,
    /// Web bundle.
    Html,
    /// Python script.
    Python,
    /// Java program.
    Java,
    /// Node.js script.
    Node,
}

impl Language {
    /// Registry type for this language.
    #[must_use]
    pub const fn plugin_type(self) -> PluginType {
        match self {
            Self::Golang | Self::Cpp => PluginType::NativeBinary,
            Self::Html => PluginType::WebBundle,
            Self::Python => PluginType::InterpretedScript(ScriptRuntime::Python),
            Self::Java => PluginType::InterpretedScript(ScriptRuntime::Java),
            Self::Node => PluginType::InterpretedScript(ScriptRuntime::Node),
        }
    }
}

/// How the supervisor should launch the plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaunchCommand {
    /// Working directory relative to `code/`.
    #[serde(default)]
    pub work_dir: Option<String>,
    /// Interpreter or environment binary.
    #[serde(default)]
    pub env: Option<String>,
    /// Entry file.
    #[serde(default)]
    pub file: Option<String>,
}

/// Parsed and validated `plugin.info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginDescriptor {
    uuid: String,
    name: String,
    version: String,
    #[serde(rename = "type")]
    language: Language,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    command: Option<LaunchCommand>,
}

impl PluginDescriptor {
    /// Parses and validates descriptor bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Validation`] for malformed JSON, missing or
    /// empty required fields, unknown keys, unknown `type` tags, or an unsafe
    /// uuid.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, IngestError> {
        let descriptor: Self = serde_json::from_slice(bytes).map_err(|error| {
            IngestError::validation(format!("{DESCRIPTOR_FILE} is malformed: {error}"))
        })?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Reads and validates the descriptor stored at `path`.
    ///
    /// # Errors
    ///
    /// A missing or unreadable file is a validation failure; otherwise see
    /// [`Self::from_slice`].
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let bytes = fs::read(path).map_err(|error| {
            IngestError::validation(format!("cannot read {}: {error}", path.display()))
        })?;
        Self::from_slice(&bytes)
    }

    fn validate(&self) -> Result<(), IngestError> {
        validate_uuid(&self.uuid)?;
        for (field, value) in [("name", &self.name), ("version", &self.version)] {
            if value.trim().is_empty() {
                return Err(IngestError::validation(format!(
                    "{DESCRIPTOR_FILE} field '{field}' is empty"
                )));
            }
        }
        Ok(())
    }

    /// Stable external identity.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version string as shipped.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Language tag.
    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    /// Registry classification.
    #[must_use]
    pub const fn plugin_type(&self) -> PluginType {
        self.language.plugin_type()
    }

    /// Optional free-text description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Optional launch instructions.
    #[must_use]
    pub const fn command(&self) -> Option<&LaunchCommand> {
        self.command.as_ref()
    }
}

/// Checks that `uuid` is usable as a single path component.
///
/// # Errors
///
/// Returns [`IngestError::Validation`] for empty, overlong, dot-only or
/// separator-bearing values.
pub fn validate_uuid(uuid: &str) -> Result<(), IngestError> {
    let acceptable = !uuid.is_empty()
        && uuid.len() <= MAX_UUID_LEN
        && uuid != "."
        && uuid != ".."
        && uuid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if acceptable {
        Ok(())
    } else {
        Err(IngestError::validation(format!(
            "plugin uuid '{uuid}' is not a safe identifier"
        )))
    }
}
