pub mod backend;
pub mod profile;
pub mod store;

pub use backend::{FileStore, KeyValueStore, KeyringStore, MemoryStore};
pub use profile::Profile;
pub use store::ProfileStore;
