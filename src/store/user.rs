//! The user record and its mutable fields.

use serde::{Deserialize, Serialize};

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Store-assigned identifier (UUID v4), never changes.
    pub id: String,
    pub name: String,
    /// Contact address. Not validated.
    pub email: String,
    pub age: i32,
}

/// Everything about a user except its id.
///
/// Used as the body of create and update calls. Unknown fields (including a
/// stray `id`) are ignored when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFields {
    pub name: String,
    pub email: String,
    pub age: i32,
}

impl User {
    /// Build a user from an id and its fields.
    pub fn from_fields(id: String, fields: UserFields) -> Self {
        Self {
            id,
            name: fields.name,
            email: fields.email,
            age: fields.age,
        }
    }

    /// The mutable part of this user.
    pub fn fields(&self) -> UserFields {
        UserFields {
            name: self.name.clone(),
            email: self.email.clone(),
            age: self.age,
        }
    }
}
