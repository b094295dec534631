//! User service library.
//!
//! One in-memory user store served over two protocol surfaces: a JSON REST
//! API (axum) and a length-prefixed binary RPC API. Both listeners share the
//! store, run in parallel, and drain together on shutdown.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod rpc;
pub mod store;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::{ServiceLifecycle, Shutdown, ShutdownReport};
pub use rpc::{RpcClient, RpcServer};
pub use store::{InMemoryUserStore, StoreError, User, UserFields, UserStore};
