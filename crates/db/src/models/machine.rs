use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::{ModelError, require_name, step::Step};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Machine {
    pub id: Uuid,
    pub name: String,
    pub step_id: Option<Uuid>, // Nulled when the step is deleted
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateMachine {
    pub name: String,
    pub step_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateMachine {
    pub name: Option<String>,
    pub step_id: Option<Uuid>,
}

impl Machine {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Machine>(
            "SELECT id, name, step_id, created_at FROM machines ORDER BY name ASC, created_at ASC",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Machine>(
            "SELECT id, name, step_id, created_at FROM machines WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Machines working a step, in the column order of the shift grid.
    pub async fn find_by_step_id(
        pool: &SqlitePool,
        step_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Machine>(
            "SELECT id, name, step_id, created_at FROM machines
             WHERE step_id = $1
             ORDER BY name ASC, created_at ASC",
        )
        .bind(step_id)
        .fetch_all(pool)
        .await
    }

    async fn ensure_step(pool: &SqlitePool, step_id: Option<Uuid>) -> Result<(), ModelError> {
        let Some(step_id) = step_id else {
            return Ok(());
        };
        if Step::find_by_id(pool, step_id).await?.is_none() {
            return Err(ModelError::validation(format!("step {step_id} does not exist")));
        }
        Ok(())
    }

    pub async fn create(pool: &SqlitePool, data: &CreateMachine) -> Result<Self, ModelError> {
        require_name(&data.name, "machine name")?;
        Self::ensure_step(pool, data.step_id).await?;
        let machine = sqlx::query_as::<_, Machine>(
            "INSERT INTO machines (id, name, step_id) VALUES ($1, $2, $3)
             RETURNING id, name, step_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(data.name.trim())
        .bind(data.step_id)
        .fetch_one(pool)
        .await?;
        Ok(machine)
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateMachine,
    ) -> Result<Option<Self>, ModelError> {
        let Some(existing) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let name = data.name.as_deref().unwrap_or(&existing.name).trim().to_string();
        require_name(&name, "machine name")?;
        let step_id = data.step_id.or(existing.step_id);
        Self::ensure_step(pool, step_id).await?;
        let machine = sqlx::query_as::<_, Machine>(
            "UPDATE machines SET name = $2, step_id = $3 WHERE id = $1
             RETURNING id, name, step_id, created_at",
        )
        .bind(id)
        .bind(name)
        .bind(step_id)
        .fetch_optional(pool)
        .await?;
        Ok(machine)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM machines WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
