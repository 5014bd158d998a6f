use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::{ModelError, require_name};

/// A stage of the production pipeline (cutting, bending, assembly, ...).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Step {
    pub id: Uuid,
    pub name: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateStep {
    pub name: String,
    /// Defaults to the end of the pipeline.
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateStep {
    pub name: Option<String>,
    pub position: Option<i64>,
}

impl Step {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Step>(
            "SELECT id, name, position, created_at FROM steps ORDER BY position ASC, created_at ASC",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Step>("SELECT id, name, position, created_at FROM steps WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// First step of the pipeline, used when the board has no step selected yet.
    pub async fn find_first(pool: &SqlitePool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Step>(
            "SELECT id, name, position, created_at FROM steps
             ORDER BY position ASC, created_at ASC
             LIMIT 1",
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreateStep) -> Result<Self, ModelError> {
        require_name(&data.name, "step name")?;
        let position = match data.position {
            Some(position) => position,
            None => {
                sqlx::query_scalar::<_, i64>("SELECT COALESCE(MAX(position) + 1, 0) FROM steps")
                    .fetch_one(pool)
                    .await?
            }
        };
        let step = sqlx::query_as::<_, Step>(
            "INSERT INTO steps (id, name, position) VALUES ($1, $2, $3)
             RETURNING id, name, position, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(data.name.trim())
        .bind(position)
        .fetch_one(pool)
        .await?;
        Ok(step)
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateStep,
    ) -> Result<Option<Self>, ModelError> {
        let Some(existing) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let name = data.name.as_deref().unwrap_or(&existing.name).trim().to_string();
        require_name(&name, "step name")?;
        let step = sqlx::query_as::<_, Step>(
            "UPDATE steps SET name = $2, position = $3 WHERE id = $1
             RETURNING id, name, position, created_at",
        )
        .bind(id)
        .bind(name)
        .bind(data.position.unwrap_or(existing.position))
        .fetch_optional(pool)
        .await?;
        Ok(step)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM steps WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
