pub mod api;
pub mod config;
pub mod core;
pub mod storage;
pub mod utils;

// re‑export ergonomic entry points
pub use api::client::NotionClient;
pub use api::error::{ErrorRecord, NotionError};
pub use config::ApiConfig;
pub use crate::core::connection_manager::ConnectionManager;
pub use crate::core::model::{Page, Workspace};
pub use crate::core::session::{ConnectionStatus, Session};
pub use storage::{Profile, ProfileStore};
