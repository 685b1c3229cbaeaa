//! Address value objects

use serde::{Deserialize, Serialize};

/// Raw address fields of one alumni profile, as stored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AddressFields {
    pub user_id: String,
    /// Street address
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
}

/// A profile identifier paired with its formatted free-text query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressQuery {
    pub user_id: String,
    pub query: String,
}

impl AddressQuery {
    pub fn new(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            query: query.into(),
        }
    }
}
