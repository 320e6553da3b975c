//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, graceful shutdown)
//!     → request.rs (request ID, bearer credential)
//!     → handlers.rs (accounts and credentials) | websocket.rs (relay sessions)
//!     → response.rs (gate errors → status + JSON body)
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use response::ApiError;
pub use server::{AppState, RelayServer};
