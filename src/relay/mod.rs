//! Peer-to-peer message relay.
//!
//! # Data Flow
//! ```text
//! verified connection
//!     → registry.rs (Admission: peer id → connection handle)
//!     → router.rs (read loop per sender)
//!         → frame.rs (target:payload)
//!         → registry.rs (lookup target)
//!         → handle.rs (bounded write to target)
//!     → disconnect: Admission released
//! ```
//!
//! # Design Decisions
//! - One task per admitted connection; tasks share nothing but the registry
//! - The registry is an owned component passed by `Arc`, never a global

pub mod frame;
pub mod handle;
pub mod peer;
pub mod registry;
pub mod router;

pub use frame::{Frame, FrameError};
pub use handle::{BoxMessageSink, ConnectionHandle, TransportError};
pub use peer::PeerId;
pub use registry::{Admission, Registry};
pub use router::{DeliveryError, Disconnect, Router, RouterStatsSnapshot};
