//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger (drain)
//!     second signal  → Shutdown::force (terminate)
//!
//! Shutdown (shutdown.rs):
//!     trigger → stop accepting, stop reading frames
//!     grace period → force → abandon in-flight deliveries → exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
