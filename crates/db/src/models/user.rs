use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::ModelError;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UserRole {
    Admin,
    Moderator,
    #[default]
    Worker,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateUser {
    pub username: String,
    pub role: Option<UserRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub role: Option<UserRole>,
}

const MAX_USERNAME_CHARS: usize = 150;

/// Usernames allow letters of any script, digits, spaces and `@ . + - _`.
pub fn validate_username(username: &str) -> Result<(), ModelError> {
    let count = username.chars().count();
    if username.trim().is_empty() {
        return Err(ModelError::validation("username must not be empty"));
    }
    if count > MAX_USERNAME_CHARS {
        return Err(ModelError::validation(format!(
            "username must be at most {MAX_USERNAME_CHARS} characters"
        )));
    }
    if let Some(bad) = username
        .chars()
        .find(|c| !(c.is_alphanumeric() || *c == ' ' || "@.+-_".contains(*c)))
    {
        return Err(ModelError::validation(format!(
            "username contains an invalid character: {bad:?}"
        )));
    }
    Ok(())
}

const USER_COLUMNS: &str = "id, username, role, created_at, updated_at";

impl User {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY username ASC"
        ))
        .fetch_all(pool)
        .await
    }

    /// Users with the given role; backs the moderator and worker listings.
    pub async fn find_by_role(pool: &SqlitePool, role: UserRole) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY username ASC"
        ))
        .bind(role)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_username(
        pool: &SqlitePool,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(pool)
        .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreateUser) -> Result<Self, ModelError> {
        let username = data.username.trim();
        validate_username(username)?;
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, username, role) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(data.role.unwrap_or_default())
        .fetch_one(pool)
        .await?;
        Ok(user)
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateUser,
    ) -> Result<Option<Self>, ModelError> {
        let Some(existing) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let username = data
            .username
            .as_deref()
            .map(str::trim)
            .unwrap_or(&existing.username)
            .to_string();
        validate_username(&username)?;
        let role = data.role.unwrap_or(existing.role);
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET username = $2, role = $3, updated_at = datetime('now', 'subsec')
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(username)
        .bind(role)
        .fetch_optional(pool)
        .await?;
        Ok(user)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
