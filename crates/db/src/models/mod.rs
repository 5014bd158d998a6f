pub mod board;
pub mod detail;
pub mod machine;
pub mod order;
pub mod plan;
pub mod report;
pub mod step;
pub mod user;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

/// A summed quantity for one detail of one order; a row of the reported or planned ledger.
#[derive(Debug, Clone, Copy, FromRow, Serialize, Deserialize, TS, PartialEq, Eq)]
pub struct OrderDetailQuantity {
    pub order_id: Uuid,
    pub detail_id: Uuid,
    pub quantity: i64,
}

/// Errors raised by model writes that validate their input before touching the database.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl ModelError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True when the underlying sqlite error is a UNIQUE constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            ModelError::Database(sqlx::Error::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }
}

/// Header+entries writes need at least one entry.
pub(crate) fn require_entries<T>(entries: &[T], what: &str) -> Result<(), ModelError> {
    if entries.is_empty() {
        return Err(ModelError::validation(format!(
            "{what} must contain at least one entry"
        )));
    }
    Ok(())
}

/// Largest quantity a single entry may carry; keeps every ledger sum far from `i64` overflow.
pub const MAX_QUANTITY: i64 = i32::MAX as i64;

pub(crate) fn require_quantity(quantity: i64) -> Result<(), ModelError> {
    if !(0..=MAX_QUANTITY).contains(&quantity) {
        return Err(ModelError::validation(format!(
            "quantity must be between 0 and {MAX_QUANTITY}, got {quantity}"
        )));
    }
    Ok(())
}

/// Every detail an entry points at must exist.
pub(crate) async fn require_details(
    pool: &SqlitePool,
    detail_ids: impl IntoIterator<Item = Uuid>,
) -> Result<(), ModelError> {
    let mut checked = HashSet::new();
    for id in detail_ids {
        if checked.insert(id) && detail::Detail::find_by_id(pool, id).await?.is_none() {
            return Err(ModelError::validation(format!("detail {id} does not exist")));
        }
    }
    Ok(())
}

pub(crate) fn require_name(name: &str, field: &str) -> Result<(), ModelError> {
    if name.trim().is_empty() {
        return Err(ModelError::validation(format!("{field} must not be empty")));
    }
    if name.chars().count() > 200 {
        return Err(ModelError::validation(format!(
            "{field} must be at most 200 characters"
        )));
    }
    Ok(())
}
