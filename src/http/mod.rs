//! REST adapter.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, span)
//!     → handlers.rs (one UserStore call per request)
//!     → response.rs (StoreError / bad body → status + JSON error)
//!     → Send to client
//! ```
//!
//! # Routes
//! - `GET    /api/users`       → 200, all users
//! - `POST   /api/users`       → 201, created user
//! - `GET    /api/users/{id}`  → 200 | 404
//! - `PUT    /api/users/{id}`  → 200 | 400 | 404
//! - `DELETE /api/users/{id}`  → 204 | 404
//! - `GET    /health`          → 200

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::ApiError;
pub use server::{build_router, AppState, HttpServer};
