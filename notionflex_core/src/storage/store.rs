use std::io;
use std::sync::Arc;

use log::{error, warn};

use super::backend::{FileStore, KeyValueStore, KeyringStore};
use super::profile::Profile;
use crate::api::error::NotionError;

/// Key holding the JSON array of profiles.
pub const PROFILES_KEY: &str = "notionflex_profiles";
/// Key holding the name of the last selected profile.
pub const LAST_PROFILE_NAME_KEY: &str = "notionflex_last_profile_name";

/// CRUD over named profiles plus the "last selected" pointer.
///
/// Reads degrade to empty on corrupt data; writes are best effort and only
/// logged on failure.
#[derive(Clone)]
pub struct ProfileStore {
    backend: Arc<dyn KeyValueStore>,
}

impl ProfileStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Backed by files in the platform config directory.
    pub fn open_default() -> io::Result<Self> {
        Ok(Self::new(Arc::new(FileStore::new()?)))
    }

    /// Backed by the OS keyring, so credentials never touch plain files.
    pub fn open_keyring() -> Self {
        Self::new(Arc::new(KeyringStore::default()))
    }

    /// Returns every stored profile, in insertion order.
    pub fn list(&self) -> Vec<Profile> {
        let raw = match self.backend.get(PROFILES_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!("Error loading profiles: {e}");
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Stored profiles are unreadable, treating as empty: {e}");
            Vec::new()
        })
    }

    pub fn get(&self, name: &str) -> Option<Profile> {
        self.list().into_iter().find(|p| p.name == name)
    }

    /// Create a profile, or replace the credential of the one with this name
    /// in place.
    pub fn upsert(&self, name: &str, credential: &str) -> Result<(), NotionError> {
        if name.trim().is_empty() || credential.trim().is_empty() {
            return Err(NotionError::validation(
                "Profile name and key cannot be empty.",
            ));
        }

        let mut profiles = self.list();
        match profiles.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.credential = credential.to_string(),
            None => profiles.push(Profile::new(name, credential)),
        }
        self.save(&profiles);
        Ok(())
    }

    /// Delete a profile. Unknown names are ignored; returns whether one was removed.
    pub fn delete(&self, name: &str) -> bool {
        let mut profiles = self.list();
        let before = profiles.len();
        profiles.retain(|p| p.name != name);
        let removed = profiles.len() != before;
        self.save(&profiles);
        removed
    }

    pub fn last_selected(&self) -> Option<String> {
        match self.backend.get(LAST_PROFILE_NAME_KEY) {
            Ok(name) => name.filter(|n| !n.is_empty()),
            Err(e) => {
                error!("Error reading last selected profile: {e}");
                None
            }
        }
    }

    pub fn set_last_selected(&self, name: Option<&str>) {
        let result = match name {
            Some(name) => self.backend.set(LAST_PROFILE_NAME_KEY, name),
            None => self.backend.remove(LAST_PROFILE_NAME_KEY),
        };
        if let Err(e) = result {
            error!("Error saving last selected profile: {e}");
        }
    }

    fn save(&self, profiles: &[Profile]) {
        let result = serde_json::to_string(profiles)
            .map_err(io::Error::from)
            .and_then(|json| self.backend.set(PROFILES_KEY, &json));
        if let Err(e) = result {
            error!("Error saving profiles: {e}");
        }
    }
}
