//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured address
//!     → listener.rs (parse, bind, bounded accept)
//!     → Hand off to the protocol adapter (http or rpc)
//! ```
//!
//! # Design Decisions
//! - A failed bind is fatal for startup
//! - Each accepted stream holds a permit until its connection task ends

pub mod listener;

pub use listener::{bind, BoundedListener, ConnectionPermit, ListenerError};
