//! Fabricates plugin upload archives for tests.

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};
use zip::ZipWriter;
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;

use crate::descriptor::DESCRIPTOR_FILE;
use crate::install::{BIG_COVER, CODE_ARCHIVE, SMALL_COVER};

/// Builder for packaged plugin archives.
#[derive(Debug, Clone)]
pub struct PluginArchiveBuilder {
    descriptor: Map<String, Value>,
    raw_descriptor: Option<String>,
    wrapper: Option<String>,
    code_wrapper: Option<String>,
    code_files: Vec<(String, Vec<u8>)>,
    omitted: Vec<String>,
    extra: Vec<(String, Vec<u8>)>,
}

impl PluginArchiveBuilder {
    /// Starts a `golang` plugin named `chess`, version `1.0.0`.
    #[must_use]
    pub fn new(uuid: &str) -> Self {
        let descriptor = json!({
            "uuid": uuid,
            "name": "chess",
            "version": "1.0.0",
            "type": "golang",
            "description": "test plugin",
            "command": { "work_dir": "./run", "env": "", "file": "chess" }
        });
        let descriptor = match descriptor {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            descriptor,
            raw_descriptor: None,
            wrapper: None,
            code_wrapper: Some(String::from("code")),
            code_files: vec![(String::from("run/chess"), b"\x7fELF".to_vec())],
            omitted: Vec::new(),
            extra: Vec::new(),
        }
    }

    /// Sets a descriptor field.
    #[must_use]
    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.descriptor
            .insert(key.to_owned(), Value::String(value.to_owned()));
        self
    }

    /// Sets the version.
    #[must_use]
    pub fn version(self, version: &str) -> Self {
        self.field("version", version)
    }

    /// Sets the name.
    #[must_use]
    pub fn name(self, name: &str) -> Self {
        self.field("name", name)
    }

    /// Sets the language tag.
    #[must_use]
    pub fn language(self, language: &str) -> Self {
        self.field("type", language)
    }

    /// Removes a descriptor field.
    #[must_use]
    pub fn without_field(mut self, key: &str) -> Self {
        self.descriptor.remove(key);
        self
    }

    /// Replaces the descriptor with literal text.
    #[must_use]
    pub fn raw_descriptor(mut self, text: &str) -> Self {
        self.raw_descriptor = Some(text.to_owned());
        self
    }

    /// Nests the payload under one top-level directory.
    #[must_use]
    pub fn wrapped_in(mut self, dir: &str) -> Self {
        self.wrapper = Some(dir.to_owned());
        self
    }

    /// Packs code files at the root of `code.zip` instead of under `code/`.
    #[must_use]
    pub fn flat_code(mut self) -> Self {
        self.code_wrapper = None;
        self
    }

    /// Adds a file to `code.zip`.
    #[must_use]
    pub fn code_file(mut self, path: &str, data: &[u8]) -> Self {
        self.code_files.push((path.to_owned(), data.to_vec()));
        self
    }

    /// Leaves a payload entry out of the archive.
    #[must_use]
    pub fn omit(mut self, entry: &str) -> Self {
        self.omitted.push(entry.to_owned());
        self
    }

    /// Adds an arbitrary raw entry, name taken literally.
    #[must_use]
    pub fn entry(mut self, name: &str, data: &[u8]) -> Self {
        self.extra.push((name.to_owned(), data.to_vec()));
        self
    }

    /// Encodes the archive.
    ///
    /// # Errors
    ///
    /// Propagates [`zip::result::ZipError`] from the writer.
    pub fn build(&self) -> ZipResult<Vec<u8>> {
        let descriptor = match &self.raw_descriptor {
            Some(text) => text.clone().into_bytes(),
            None => Value::Object(self.descriptor.clone()).to_string().into_bytes(),
        };
        let code = self.build_code()?;
        let payload: [(&str, Vec<u8>); 4] = [
            (DESCRIPTOR_FILE, descriptor),
            (BIG_COVER, b"big-cover-jpeg".to_vec()),
            (SMALL_COVER, b"small-cover-jpeg".to_vec()),
            (CODE_ARCHIVE, code),
        ];

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, data) in payload {
            if self.omitted.iter().any(|omitted| omitted == name) {
                continue;
            }
            let entry = match &self.wrapper {
                Some(wrapper) => format!("{wrapper}/{name}"),
                None => name.to_owned(),
            };
            zip.start_file(entry, options)?;
            zip.write_all(&data)?;
        }
        for (name, data) in &self.extra {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }
        Ok(zip.finish()?.into_inner())
    }

    /// Writes the archive to `<dir>/<file_name>`.
    ///
    /// # Errors
    ///
    /// Propagates encoding and I/O failures.
    pub fn write_to(&self, dir: &Path, file_name: &str) -> ZipResult<PathBuf> {
        let path = dir.join(file_name);
        fs::write(&path, self.build()?)?;
        Ok(path)
    }

    fn build_code(&self) -> ZipResult<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (path, data) in &self.code_files {
            let entry = match &self.code_wrapper {
                Some(wrapper) => format!("{wrapper}/{path}"),
                None => path.clone(),
            };
            zip.start_file(entry, options)?;
            zip.write_all(data)?;
        }
        Ok(zip.finish()?.into_inner())
    }
}
