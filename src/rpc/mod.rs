//! Binary RPC adapter.
//!
//! # Data Flow
//! ```text
//! TCP connection (bounded accept)
//!     → protocol.rs (length-prefixed bincode frame → RpcRequest)
//!     → server.rs dispatch (one UserStore call)
//!     → protocol.rs (RpcResponse → frame)
//! ```
//!
//! # Design Decisions
//! - One request in flight per connection; replies keep request order
//! - Absent ids become `RpcCode::NotFound`; a bad payload becomes
//!   `RpcCode::InvalidArgument` and the connection stays open
//! - Delete reports `success: false` instead of an error

pub mod client;
pub mod protocol;
pub mod server;

pub use client::{RpcClient, RpcError};
pub use protocol::{RpcCode, RpcRequest, RpcResponse};
pub use server::RpcServer;
