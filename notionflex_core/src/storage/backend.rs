use std::collections::HashMap;
use std::sync::Mutex;
use std::{fs, io, path::PathBuf};

use directories::ProjectDirs;

/// Durable string storage addressed by key.
///
/// Calls are synchronous round-trips; callers treat them as cheap.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> io::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// `~/.config/notionflex` on Linux, `%APPDATA%\notionflex` on Windows, etc.
    pub fn new() -> io::Result<Self> {
        let proj = ProjectDirs::from("", "", "notionflex")
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Unable to locate config dir"))?;
        Self::in_dir(proj.config_dir())
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn file_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.file_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        fs::write(self.file_for(key), value)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.file_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> io::Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory store lock poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// Stores each key as a secret in the OS keyring under one service name.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> io::Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key).map_err(keyring_error)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new("notionflex")
    }
}

fn keyring_error(err: keyring::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

/// A missing entry reads as `None`.
fn password_or_none(result: Result<String, keyring::Error>) -> io::Result<Option<String>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(keyring_error(e)),
    }
}

/// Deleting a missing entry succeeds.
fn deleted_or_missing(result: Result<(), keyring::Error>) -> io::Result<()> {
    match result {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(keyring_error(e)),
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        password_or_none(self.entry(key)?.get_password())
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.entry(key)?.set_password(value).map_err(keyring_error)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        deleted_or_missing(self.entry(key)?.delete_credential())
    }
}
