pub mod client;
pub mod error;
pub mod rate_limit;
pub mod response;
pub mod retry;
pub mod transport;

// Re-export the modules here for easy import elsewhere.
pub use client::*;
pub use error::*;
pub use rate_limit::*;
pub use response::*;
pub use retry::*;
pub use transport::*;
