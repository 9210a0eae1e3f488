use serde::{Deserialize, Serialize};

/// A user-named Notion credential.
///
/// Stored as part of a JSON array:
/// `[{ "name":"work", "credential":"secret_..." }]`
/// Older files used `key` for the credential and are still accepted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(alias = "key")]
    pub credential: String,
}

impl Profile {
    pub fn new(name: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credential: credential.into(),
        }
    }

    /// Returns the unique, human-readable identifier.
    pub fn name(&self) -> &str {
        &self.name
    }
}

// Credentials stay out of logs and debug output.
impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("name", &self.name)
            .field("credential", &"<redacted>")
            .finish()
    }
}
