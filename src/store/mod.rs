//! User storage subsystem.
//!
//! # Data Flow
//! ```text
//! http adapter ─┐
//!               ├─→ UserStore (trait, five operations)
//! rpc adapter  ─┘        → memory.rs (RwLock<HashMap<id, User>>)
//! ```
//!
//! # Design Decisions
//! - Adapters depend on the `UserStore` trait only, never on each other
//! - The store is the single owner of user state; callers get clones
//! - Every operation is atomic on its own; nothing spans two calls

pub mod memory;
pub mod user;

pub use memory::InMemoryUserStore;
pub use user::{User, UserFields};

/// Error returned by store operations that address a single user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No user exists under the given id.
    #[error("user {0} not found")]
    NotFound(String),
}

/// The operations an adapter may perform against user state.
///
/// Implementations must be safe to call from any number of tasks at once.
/// All calls are synchronous and short; none performs I/O.
pub trait UserStore: Send + Sync {
    /// Store a new user under a freshly generated id and return it.
    fn create(&self, fields: UserFields) -> User;

    /// Fetch the user currently stored under `id`.
    fn get(&self, id: &str) -> Result<User, StoreError>;

    /// Snapshot of every stored user, in no particular order.
    fn list(&self) -> Vec<User>;

    /// Replace every field but the id. Nothing is written if `id` is absent.
    fn update(&self, id: &str, fields: UserFields) -> Result<User, StoreError>;

    /// Remove the user, returning whether anything was removed.
    fn delete(&self, id: &str) -> bool;
}
