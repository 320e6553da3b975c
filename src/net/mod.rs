//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tls.rs (optional TLS handshake)
//!     → HTTP layer
//!     → connection.rs (relay session slot, held until the session ends)
//! ```
//!
//! # Design Decisions
//! - Session count is bounded; upgrades over the limit are refused
//! - Each session is tracked for graceful shutdown
//! - TLS is optional and handled transparently

pub mod connection;
pub mod tls;
