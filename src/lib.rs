//! Peer-addressed real-time message relay library.

pub mod admin;
pub mod auth;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;
pub mod session;
pub mod users;

pub use config::schema::RelayConfig;
pub use http::RelayServer;
pub use lifecycle::Shutdown;
