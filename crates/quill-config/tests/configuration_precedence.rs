use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::rstest;
use tempfile::TempDir;

use quill_config::{
    Config, DEFAULT_ASSETS_PREFIX, DEFAULT_LISTEN_ADDR, DEFAULT_MAX_UPLOAD_BYTES, LogFormat,
};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let previous = std::env::var_os(key);
        // Environment mutation is unsafe on edition 2024; callers hold
        // ENV_MUTEX for the lifetime of the override.
        unsafe { std::env::set_var(key, value) };
        Self { key, previous }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
    }
}

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_MUTEX
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_config(dir: &TempDir, body: &str) -> OsString {
    let path = dir.path().join("quill.toml");
    fs::write(&path, body).expect("write configuration");
    path.into_os_string()
}

#[test]
fn defaults_apply_without_sources() {
    let _lock = env_lock();
    let config = Config::load_from_iter([OsString::from("quilld")]).expect("load defaults");
    assert_eq!(config.listen_addr.as_deref(), Some(DEFAULT_LISTEN_ADDR));
    assert_eq!(config.listen_addr(), DEFAULT_LISTEN_ADDR);
    assert_eq!(config.assets_prefix(), DEFAULT_ASSETS_PREFIX);
    assert_eq!(config.max_upload_bytes(), DEFAULT_MAX_UPLOAD_BYTES);
    assert_eq!(config.ingest_workers(), 1);
    assert_eq!(config.log_format(), LogFormat::Json);
}

#[rstest]
#[case::file_only(None, None, "127.0.0.1:7001")]
#[case::env_beats_file(Some("127.0.0.1:7002"), None, "127.0.0.1:7002")]
#[case::cli_beats_env(Some("127.0.0.1:7002"), Some("127.0.0.1:7003"), "127.0.0.1:7003")]
fn listen_addr_precedence(
    #[case] env_value: Option<&str>,
    #[case] cli_value: Option<&str>,
    #[case] expected: &str,
) {
    let _lock = env_lock();
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, "listen_addr = \"127.0.0.1:7001\"\n");
    let _env = env_value.map(|value| EnvOverride::set_var("QUILL_LISTEN_ADDR", OsStr::new(value)));

    let mut args = vec![
        OsString::from("quilld"),
        OsString::from("--config-path"),
        path,
    ];
    if let Some(value) = cli_value {
        args.push(OsString::from("--listen-addr"));
        args.push(OsString::from(value));
    }

    let config = Config::load_from_iter(args).expect("configuration should load");
    assert_eq!(config.listen_addr(), expected);
}

#[test]
fn storage_root_from_file_drives_derived_directories() {
    let _lock = env_lock();
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(
        &dir,
        "storage_root = \"/srv/quill\"\nraw_root = \"/private/raw\"\n",
    );

    let config = Config::load_from_iter([
        OsString::from("quilld"),
        OsString::from("--config-path"),
        path,
    ])
    .expect("configuration should load");

    assert_eq!(config.plugin_root().as_str(), "/srv/quill/plugin");
    assert_eq!(config.raw_root().as_str(), "/private/raw");
}

#[test]
fn malformed_file_is_reported() {
    let _lock = env_lock();
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, "ingest_workers = \"many\"\n");

    let result = Config::load_from_iter([
        OsString::from("quilld"),
        OsString::from("--config-path"),
        path,
    ]);

    assert!(result.is_err(), "non-numeric worker count must be rejected");
}
