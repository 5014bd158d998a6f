use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    ModelError, OrderDetailQuantity, machine::Machine, order::Order, require_details,
    require_entries, require_quantity, step::Step,
};

/// Work allocated to one machine for one shift. `date` is always the shift start,
/// and a (machine, step, shift) slot owns at most one plan.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Plan {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub machine_id: Uuid,
    pub step_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct PlanEntry {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub order_id: Option<Uuid>,
    pub order_number: Option<String>,
    pub detail_id: Uuid,
    pub detail_name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct PlanWithEntries {
    #[serde(flatten)]
    #[ts(flatten)]
    pub plan: Plan,
    pub entries: Vec<PlanEntry>,
}

impl std::ops::Deref for PlanWithEntries {
    type Target = Plan;
    fn deref(&self) -> &Self::Target {
        &self.plan
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreatePlanEntry {
    pub order_id: Option<Uuid>,
    pub detail_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreatePlan {
    /// Must already be normalised to a shift start.
    pub date: DateTime<Utc>,
    pub machine_id: Uuid,
    pub step_id: Uuid,
    pub entries: Vec<CreatePlanEntry>,
}

/// Slot key used when materialising placeholder plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanSlot {
    pub machine_id: Uuid,
    pub date: DateTime<Utc>,
}

const PLAN_COLUMNS: &str = "id, date, machine_id, step_id, created_at";

const PLAN_ENTRY_SELECT: &str = "SELECT pe.id, pe.plan_id, pe.order_id, o.number AS order_number,
        pe.detail_id, d.name AS detail_name, pe.quantity
     FROM plan_entries pe
     JOIN plans p ON p.id = pe.plan_id
     JOIN details d ON d.id = pe.detail_id
     LEFT JOIN orders o ON o.id = pe.order_id";

async fn validate_entries(
    pool: &SqlitePool,
    entries: &[CreatePlanEntry],
) -> Result<(), ModelError> {
    require_entries(entries, "plan")?;
    for entry in entries {
        require_quantity(entry.quantity)?;
        if let Some(order_id) = entry.order_id {
            if Order::find_by_id(pool, order_id).await?.is_none() {
                return Err(ModelError::validation(format!(
                    "order {order_id} does not exist"
                )));
            }
        }
    }
    require_details(pool, entries.iter().map(|e| e.detail_id).collect::<Vec<_>>()).await
}

impl CreatePlan {
    async fn validate(&self, pool: &SqlitePool) -> Result<(), ModelError> {
        if Step::find_by_id(pool, self.step_id).await?.is_none() {
            return Err(ModelError::validation(format!(
                "step {} does not exist",
                self.step_id
            )));
        }
        let on_step: HashSet<Uuid> = Machine::find_by_step_id(pool, self.step_id)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();
        if !on_step.contains(&self.machine_id) {
            return Err(ModelError::validation(format!(
                "machine {} does not belong to step {}",
                self.machine_id, self.step_id
            )));
        }
        validate_entries(pool, &self.entries).await
    }
}

impl Plan {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Plan>(&format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_with_entries(
        pool: &SqlitePool,
        id: Uuid,
    ) -> Result<Option<PlanWithEntries>, sqlx::Error> {
        let Some(plan) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let entries = PlanEntry::find_by_plan_id(pool, id).await?;
        Ok(Some(PlanWithEntries { plan, entries }))
    }

    /// Plans of a step whose shift starts in `[from, to)`.
    pub async fn find_in_window(
        pool: &SqlitePool,
        step_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans
             WHERE step_id = $1
               AND datetime(date) >= datetime($2)
               AND datetime(date) < datetime($3)
             ORDER BY date ASC"
        ))
        .bind(step_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }

    /// Create an empty plan for every slot that has none yet, in one transaction.
    /// Returns how many plans were created.
    pub async fn insert_missing(
        pool: &SqlitePool,
        step_id: Uuid,
        slots: &[PlanSlot],
    ) -> Result<u64, sqlx::Error> {
        if slots.is_empty() {
            return Ok(0);
        }
        let mut tx = pool.begin().await?;
        let mut created = 0;
        for slot in slots {
            let result = sqlx::query(
                "INSERT INTO plans (id, date, machine_id, step_id) VALUES ($1, $2, $3, $4)
                 ON CONFLICT (machine_id, step_id, date) DO NOTHING",
            )
            .bind(Uuid::new_v4())
            .bind(slot.date)
            .bind(slot.machine_id)
            .bind(step_id)
            .execute(&mut *tx)
            .await?;
            created += result.rows_affected();
        }
        tx.commit().await?;
        Ok(created)
    }

    /// Create a plan for a slot, or replace the entries of the plan already holding it.
    pub async fn upsert(pool: &SqlitePool, data: &CreatePlan) -> Result<PlanWithEntries, ModelError> {
        data.validate(pool).await?;
        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT INTO plans (id, date, machine_id, step_id) VALUES ($1, $2, $3, $4)
             ON CONFLICT (machine_id, step_id, date) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(data.date)
        .bind(data.machine_id)
        .bind(data.step_id)
        .execute(&mut *tx)
        .await?;
        let id: Uuid = sqlx::query_scalar(
            "SELECT id FROM plans WHERE machine_id = $1 AND step_id = $2 AND date = $3",
        )
        .bind(data.machine_id)
        .bind(data.step_id)
        .bind(data.date)
        .fetch_one(&mut *tx)
        .await?;
        PlanEntry::replace_all(&mut tx, id, &data.entries).await?;
        tx.commit().await?;

        Self::find_with_entries(pool, id)
            .await?
            .ok_or(ModelError::Database(sqlx::Error::RowNotFound))
    }

    /// Fill an existing (possibly placeholder) plan with new entries.
    pub async fn set_entries(
        pool: &SqlitePool,
        id: Uuid,
        entries: &[CreatePlanEntry],
    ) -> Result<Option<PlanWithEntries>, ModelError> {
        if Self::find_by_id(pool, id).await?.is_none() {
            return Ok(None);
        }
        validate_entries(pool, entries).await?;
        let mut tx = pool.begin().await?;
        PlanEntry::replace_all(&mut tx, id, entries).await?;
        tx.commit().await?;
        Ok(Self::find_with_entries(pool, id).await?)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM plans WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl PlanEntry {
    pub async fn find_by_plan_id(
        pool: &SqlitePool,
        plan_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PlanEntry>(&format!(
            "{PLAN_ENTRY_SELECT} WHERE pe.plan_id = $1 ORDER BY pe.rowid ASC"
        ))
        .bind(plan_id)
        .fetch_all(pool)
        .await
    }

    /// Entries of all plans of a step whose shift starts in `[from, to)`.
    pub async fn find_in_window(
        pool: &SqlitePool,
        step_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, PlanEntry>(&format!(
            "{PLAN_ENTRY_SELECT}
             WHERE p.step_id = $1
               AND datetime(p.date) >= datetime($2)
               AND datetime(p.date) < datetime($3)
             ORDER BY p.date ASC, pe.rowid ASC"
        ))
        .bind(step_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }

    /// Planned quantity per (order, detail) at a step for shifts starting at or after `from`.
    /// Entries without an order do not count against any order.
    pub async fn sum_by_order_detail(
        pool: &SqlitePool,
        step_id: Uuid,
        from: Option<DateTime<Utc>>,
    ) -> Result<Vec<OrderDetailQuantity>, sqlx::Error> {
        sqlx::query_as::<_, OrderDetailQuantity>(
            "SELECT pe.order_id, pe.detail_id, SUM(pe.quantity) AS quantity
             FROM plan_entries pe
             JOIN plans p ON p.id = pe.plan_id
             WHERE p.step_id = $1
               AND pe.order_id IS NOT NULL
               AND ($2 IS NULL OR datetime(p.date) >= datetime($2))
             GROUP BY pe.order_id, pe.detail_id",
        )
        .bind(step_id)
        .bind(from)
        .fetch_all(pool)
        .await
    }

    async fn replace_all(
        conn: &mut SqliteConnection,
        plan_id: Uuid,
        entries: &[CreatePlanEntry],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM plan_entries WHERE plan_id = $1")
            .bind(plan_id)
            .execute(&mut *conn)
            .await?;
        for entry in entries {
            sqlx::query(
                "INSERT INTO plan_entries (id, plan_id, order_id, detail_id, quantity)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(plan_id)
            .bind(entry.order_id)
            .bind(entry.detail_id)
            .bind(entry.quantity)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}
