use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::{ModelError, require_name};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Detail {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateDetail {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateDetail {
    pub name: String,
}

impl Detail {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Detail>(
            "SELECT id, name, created_at FROM details ORDER BY name ASC, created_at ASC",
        )
        .fetch_all(pool)
        .await
    }

    /// Details in catalog order: by name, oldest first within a name.
    /// Duplicate detection relies on this ordering to pick the keeper.
    pub async fn find_all_by_age(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Detail>(
            "SELECT id, name, created_at FROM details ORDER BY name ASC, created_at ASC, rowid ASC",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Detail>("SELECT id, name, created_at FROM details WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Details ordered by an order, for picking what a report or plan entry may reference.
    pub async fn find_by_order_id(
        pool: &SqlitePool,
        order_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Detail>(
            "SELECT DISTINCT d.id, d.name, d.created_at
             FROM details d
             JOIN order_entries oe ON oe.detail_id = d.id
             WHERE oe.order_id = $1
             ORDER BY d.name ASC",
        )
        .bind(order_id)
        .fetch_all(pool)
        .await
    }

    pub async fn create(pool: &SqlitePool, data: &CreateDetail) -> Result<Self, ModelError> {
        require_name(&data.name, "detail name")?;
        let detail = sqlx::query_as::<_, Detail>(
            "INSERT INTO details (id, name) VALUES ($1, $2) RETURNING id, name, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(data.name.trim())
        .fetch_one(pool)
        .await?;
        Ok(detail)
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateDetail,
    ) -> Result<Option<Self>, ModelError> {
        require_name(&data.name, "detail name")?;
        let detail = sqlx::query_as::<_, Detail>(
            "UPDATE details SET name = $2 WHERE id = $1 RETURNING id, name, created_at",
        )
        .bind(id)
        .bind(data.name.trim())
        .fetch_optional(pool)
        .await?;
        Ok(detail)
    }

    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM details WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    /// Point every order, report and plan entry referencing `from` at `to`.
    /// Returns the number of entries moved.
    pub async fn reassign_entries(
        conn: &mut sqlx::SqliteConnection,
        from: Uuid,
        to: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let mut moved = 0;
        for table in ["order_entries", "report_entries", "plan_entries"] {
            let result = sqlx::query(&format!(
                "UPDATE {table} SET detail_id = $2 WHERE detail_id = $1"
            ))
            .bind(from)
            .bind(to)
            .execute(&mut *conn)
            .await?;
            moved += result.rows_affected();
        }
        Ok(moved)
    }
}
