use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// The single production-board row: the rolling clock the shift grid starts from
/// and the step the board is currently showing.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Board {
    pub clock_date: DateTime<Utc>,
    pub current_step_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl Board {
    pub async fn find(pool: &SqlitePool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Board>(
            "SELECT clock_date, current_step_id, updated_at FROM board WHERE id = 1",
        )
        .fetch_optional(pool)
        .await
    }

    /// Return the board row, creating it with `initial_clock` when it does not exist yet.
    pub async fn get_or_init(
        pool: &SqlitePool,
        initial_clock: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query(
            "INSERT INTO board (id, clock_date, current_step_id)
             VALUES (1, $1, (SELECT id FROM steps ORDER BY position ASC, created_at ASC LIMIT 1))
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(initial_clock)
        .execute(pool)
        .await?;
        Self::find(pool).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn set_clock(
        pool: &SqlitePool,
        clock_date: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Board>(
            "UPDATE board SET clock_date = $1, updated_at = datetime('now', 'subsec')
             WHERE id = 1
             RETURNING clock_date, current_step_id, updated_at",
        )
        .bind(clock_date)
        .fetch_one(pool)
        .await
    }

    pub async fn set_current_step(
        pool: &SqlitePool,
        step_id: Option<Uuid>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Board>(
            "UPDATE board SET current_step_id = $1, updated_at = datetime('now', 'subsec')
             WHERE id = 1
             RETURNING clock_date, current_step_id, updated_at",
        )
        .bind(step_id)
        .fetch_one(pool)
        .await
    }
}
