pub mod connection_manager;
pub mod model;
pub mod session;

pub use connection_manager::ConnectionManager;
pub use model::{extract_title, Page, Workspace};
pub use session::{ConnectionStatus, Session};
