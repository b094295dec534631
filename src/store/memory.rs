//! In-memory user store.
//!
//! # Responsibilities
//! - Own the id → user map for the lifetime of the process
//! - Generate collision-resistant ids (UUID v4)
//! - Serialize writers against everything, let readers share
//!
//! # Design Decisions
//! - `std::sync::RwLock`: guards are held for a map operation only, never across `.await`
//! - A poisoned lock is recovered; no critical section can leave the map half-written
//! - The stored-count gauge is set under the write guard, so it follows the
//!   order in which writers commit

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::observability::metrics;
use crate::store::{StoreError, User, UserFields, UserStore};

/// Thread-safe, memory-resident [`UserStore`].
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users currently stored.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, User>> {
        self.users.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, User>> {
        self.users.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UserStore for InMemoryUserStore {
    fn create(&self, fields: UserFields) -> User {
        let user = User::from_fields(Uuid::new_v4().to_string(), fields);
        {
            let mut users = self.write();
            users.insert(user.id.clone(), user.clone());
            metrics::record_users_stored(users.len());
        }
        tracing::debug!(user_id = %user.id, "User created");
        user
    }

    fn get(&self, id: &str) -> Result<User, StoreError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn list(&self) -> Vec<User> {
        self.read().values().cloned().collect()
    }

    fn update(&self, id: &str, fields: UserFields) -> Result<User, StoreError> {
        let updated = {
            let mut users = self.write();
            users.get_mut(id).map(|slot| {
                *slot = User::from_fields(id.to_string(), fields);
                slot.clone()
            })
        };
        match updated {
            Some(user) => {
                tracing::debug!(user_id = %id, "User updated");
                Ok(user)
            }
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    fn delete(&self, id: &str) -> bool {
        let removed = {
            let mut users = self.write();
            let removed = users.remove(id).is_some();
            if removed {
                metrics::record_users_stored(users.len());
            }
            removed
        };
        if removed {
            tracing::debug!(user_id = %id, "User deleted");
        }
        removed
    }
}
