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

/// A worker's shift report for one order at one production step.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Report {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub date: DateTime<Utc>,
    pub order_id: Uuid,
    pub step_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ReportEntry {
    pub id: Uuid,
    pub report_id: Uuid,
    pub machine_id: Uuid,
    pub machine_name: String,
    pub detail_id: Uuid,
    pub detail_name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ReportWithEntries {
    #[serde(flatten)]
    #[ts(flatten)]
    pub report: Report,
    pub entries: Vec<ReportEntry>,
}

impl std::ops::Deref for ReportWithEntries {
    type Target = Report;
    fn deref(&self) -> &Self::Target {
        &self.report
    }
}

/// A report entry joined with its report header, as bucketed into the shift grid.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ShiftReportEntry {
    pub id: Uuid,
    pub report_id: Uuid,
    pub date: DateTime<Utc>,
    pub order_id: Uuid,
    pub order_number: String,
    pub machine_id: Uuid,
    pub detail_id: Uuid,
    pub detail_name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateReportEntry {
    pub machine_id: Uuid,
    pub detail_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateReport {
    pub user_id: Option<Uuid>,
    pub date: DateTime<Utc>,
    pub order_id: Uuid,
    pub step_id: Uuid,
    pub entries: Vec<CreateReportEntry>,
}

const REPORT_COLUMNS: &str = "id, user_id, date, order_id, step_id, created_at";

const SHIFT_ENTRY_SELECT: &str = "SELECT re.id, re.report_id, r.date, r.order_id,
        o.number AS order_number, re.machine_id, re.detail_id, d.name AS detail_name, re.quantity
     FROM report_entries re
     JOIN reports r ON r.id = re.report_id
     JOIN orders o ON o.id = r.order_id
     JOIN details d ON d.id = re.detail_id";

impl CreateReport {
    /// Entries must be non-empty, non-negative and filed against machines of the report's step.
    async fn validate(&self, pool: &SqlitePool) -> Result<(), ModelError> {
        require_entries(&self.entries, "report")?;
        if Order::find_by_id(pool, self.order_id).await?.is_none() {
            return Err(ModelError::validation(format!(
                "order {} does not exist",
                self.order_id
            )));
        }
        if Step::find_by_id(pool, self.step_id).await?.is_none() {
            return Err(ModelError::validation(format!(
                "step {} does not exist",
                self.step_id
            )));
        }
        let step_machines: HashSet<Uuid> = Machine::find_by_step_id(pool, self.step_id)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();
        for entry in &self.entries {
            require_quantity(entry.quantity)?;
            if !step_machines.contains(&entry.machine_id) {
                return Err(ModelError::validation(format!(
                    "machine {} does not belong to step {}",
                    entry.machine_id, self.step_id
                )));
            }
        }
        require_details(pool, self.entries.iter().map(|e| e.detail_id).collect::<Vec<_>>()).await
    }
}

impl Report {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Report>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports ORDER BY date DESC"
        ))
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_step_id(
        pool: &SqlitePool,
        step_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Report>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE step_id = $1 ORDER BY date DESC"
        ))
        .bind(step_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Report>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_with_entries(
        pool: &SqlitePool,
        id: Uuid,
    ) -> Result<Option<ReportWithEntries>, sqlx::Error> {
        let Some(report) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let entries = ReportEntry::find_by_report_id(pool, id).await?;
        Ok(Some(ReportWithEntries { report, entries }))
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateReport,
    ) -> Result<ReportWithEntries, ModelError> {
        data.validate(pool).await?;
        let id = Uuid::new_v4();
        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT INTO reports (id, user_id, date, order_id, step_id) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(data.user_id)
        .bind(data.date)
        .bind(data.order_id)
        .bind(data.step_id)
        .execute(&mut *tx)
        .await?;
        ReportEntry::insert_all(&mut tx, id, &data.entries).await?;
        tx.commit().await?;

        Self::find_with_entries(pool, id)
            .await?
            .ok_or(ModelError::Database(sqlx::Error::RowNotFound))
    }

    /// Replace the header fields and all entries of a report.
    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &CreateReport,
    ) -> Result<Option<ReportWithEntries>, ModelError> {
        data.validate(pool).await?;
        let mut tx = pool.begin().await?;
        let result = sqlx::query(
            "UPDATE reports SET user_id = $2, date = $3, order_id = $4, step_id = $5 WHERE id = $1",
        )
        .bind(id)
        .bind(data.user_id)
        .bind(data.date)
        .bind(data.order_id)
        .bind(data.step_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        sqlx::query("DELETE FROM report_entries WHERE report_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        ReportEntry::insert_all(&mut tx, id, &data.entries).await?;
        tx.commit().await?;

        Ok(Self::find_with_entries(pool, id).await?)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl ReportEntry {
    pub async fn find_by_report_id(
        pool: &SqlitePool,
        report_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ReportEntry>(
            "SELECT re.id, re.report_id, re.machine_id, m.name AS machine_name,
                    re.detail_id, d.name AS detail_name, re.quantity
             FROM report_entries re
             JOIN machines m ON m.id = re.machine_id
             JOIN details d ON d.id = re.detail_id
             WHERE re.report_id = $1
             ORDER BY re.rowid ASC",
        )
        .bind(report_id)
        .fetch_all(pool)
        .await
    }

    /// Entries reported at `step_id` with a report date in `[from, to)`, oldest first.
    pub async fn find_in_window(
        pool: &SqlitePool,
        step_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ShiftReportEntry>, sqlx::Error> {
        sqlx::query_as::<_, ShiftReportEntry>(&format!(
            "{SHIFT_ENTRY_SELECT}
             WHERE r.step_id = $1
               AND datetime(r.date) >= datetime($2)
               AND datetime(r.date) < datetime($3)
             ORDER BY r.date ASC, re.rowid ASC"
        ))
        .bind(step_id)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
    }

    /// Reported quantity per (order, detail) at a step, optionally only before `before`.
    pub async fn sum_by_order_detail(
        pool: &SqlitePool,
        step_id: Uuid,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<OrderDetailQuantity>, sqlx::Error> {
        sqlx::query_as::<_, OrderDetailQuantity>(
            "SELECT r.order_id, re.detail_id, SUM(re.quantity) AS quantity
             FROM report_entries re
             JOIN reports r ON r.id = re.report_id
             WHERE r.step_id = $1
               AND ($2 IS NULL OR datetime(r.date) < datetime($2))
             GROUP BY r.order_id, re.detail_id",
        )
        .bind(step_id)
        .bind(before)
        .fetch_all(pool)
        .await
    }

    async fn insert_all(
        conn: &mut SqliteConnection,
        report_id: Uuid,
        entries: &[CreateReportEntry],
    ) -> Result<(), sqlx::Error> {
        for entry in entries {
            sqlx::query(
                "INSERT INTO report_entries (id, report_id, machine_id, detail_id, quantity)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(report_id)
            .bind(entry.machine_id)
            .bind(entry.detail_id)
            .bind(entry.quantity)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}
