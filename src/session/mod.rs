//! Session gate subsystem.
//!
//! # Data Flow
//! ```text
//! GET /ws?token=…     → gate.authenticate → PeerId → (upgrade) → Registry admission
//! /login?id=&password → gate.login        → TokenPair
//! /refresh?refresh_…  → gate.refresh      → AccessGrant
//! /logout?refresh_…   → gate.logout       → renewal entry deleted
//! ```

pub mod gate;

pub use gate::{AccessGrant, AuthFailure, GateError, SessionGate, TokenPair};
