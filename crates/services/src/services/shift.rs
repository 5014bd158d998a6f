//! Shift arithmetic and the shift × machine production grid.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveTime, TimeDelta, Timelike, Utc};
use db::models::{
    machine::Machine,
    plan::{Plan, PlanEntry, PlanSlot, PlanWithEntries},
    report::{ReportEntry, ShiftReportEntry},
    step::Step,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use strum_macros::Display;
use thiserror::Error;
use tracing::{debug, info};
use ts_rs::TS;
use uuid::Uuid;

pub const SHIFT_HOURS: i64 = 12;

/// Rows shown by the shift table when no size is requested.
pub const DEFAULT_GRID_SHIFTS: usize = 23;

/// Upper bound on a requested grid, a month of shifts.
pub const MAX_GRID_SHIFTS: usize = 62;

#[derive(Debug, Error)]
pub enum ShiftGridError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("step {0} not found")]
    StepNotFound(Uuid),
    #[error("grid size must be between 1 and {MAX_GRID_SHIFTS}, got {0}")]
    InvalidSize(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ShiftKind {
    Day,
    Night,
}

/// One 12-hour production period, `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct Shift {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kind: ShiftKind,
    pub label: String,
}

impl Shift {
    /// The shift that starts at `start`; callers pass a value from [`shift_start`].
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        let kind = if start.hour() < 12 {
            ShiftKind::Day
        } else {
            ShiftKind::Night
        };
        Self {
            start,
            end: start + TimeDelta::hours(SHIFT_HOURS),
            kind,
            label: format!("{} {}", start.format("%d.%m"), kind),
        }
    }

    pub fn containing(t: DateTime<Utc>) -> Self {
        Self::starting_at(shift_start(t))
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    pub fn next(&self) -> Self {
        Self::starting_at(self.end)
    }
}

/// Floor `t` to the start of its shift: 00:00 for the day shift, 12:00 for the night shift.
pub fn shift_start(t: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = t.date_naive().and_time(NaiveTime::MIN).and_utc();
    if t.hour() < 12 {
        midnight
    } else {
        midnight + TimeDelta::hours(SHIFT_HOURS)
    }
}

/// `count` consecutive shifts, the first one containing `origin`.
pub fn shift_window(origin: DateTime<Utc>, count: usize) -> Vec<Shift> {
    let mut shifts = Vec::with_capacity(count);
    let mut current = Shift::containing(origin);
    for _ in 0..count {
        let next = current.next();
        shifts.push(current);
        current = next;
    }
    shifts
}

/// A grid cell: either the work reported on the machine in that shift, or the plan
/// standing in for it when nothing was reported.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ShiftCell {
    Done {
        machine_id: Uuid,
        entries: Vec<ShiftReportEntry>,
    },
    Plan {
        machine_id: Uuid,
        plan: PlanWithEntries,
    },
}

impl ShiftCell {
    pub fn machine_id(&self) -> Uuid {
        match self {
            ShiftCell::Done { machine_id, .. } | ShiftCell::Plan { machine_id, .. } => *machine_id,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, ShiftCell::Done { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ShiftRow {
    pub shift: Shift,
    pub cells: Vec<ShiftCell>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ShiftGrid {
    pub step: Option<Step>,
    pub machines: Vec<Machine>,
    pub rows: Vec<ShiftRow>,
    /// Placeholder plans created while building this grid.
    pub plans_created: u64,
}

impl ShiftGrid {
    fn empty(step: Option<Step>) -> Self {
        Self {
            step,
            machines: Vec::new(),
            rows: Vec::new(),
            plans_created: 0,
        }
    }

    /// Build the grid for `step_id` over `count` shifts starting at the shift containing `origin`.
    ///
    /// Report entries are bucketed by the shift their report date falls in. Every
    /// (shift, machine) slot without reports is backed by a plan row; missing ones are
    /// created here so supervisors always have a plan to fill.
    pub async fn build(
        pool: &SqlitePool,
        step_id: Option<Uuid>,
        origin: DateTime<Utc>,
        count: usize,
    ) -> Result<Self, ShiftGridError> {
        if count == 0 || count > MAX_GRID_SHIFTS {
            return Err(ShiftGridError::InvalidSize(count));
        }
        let Some(step_id) = step_id else {
            debug!("Shift grid: no step selected");
            return Ok(Self::empty(None));
        };
        let step = Step::find_by_id(pool, step_id)
            .await?
            .ok_or(ShiftGridError::StepNotFound(step_id))?;
        let machines = Machine::find_by_step_id(pool, step_id).await?;
        if machines.is_empty() {
            return Ok(Self::empty(Some(step)));
        }

        let shifts = shift_window(origin, count);
        let (from, to) = window_bounds(&shifts);

        let reports = ReportEntry::find_in_window(pool, step_id, from, to).await?;
        let mut done = bucket_reports(reports);

        let mut plans = Plan::find_in_window(pool, step_id, from, to).await?;
        let missing = missing_slots(&shifts, &machines, &done, &plans);
        let plans_created = Plan::insert_missing(pool, step_id, &missing).await?;
        if plans_created > 0 {
            info!(
                step_id = %step_id,
                created = plans_created,
                "Shift grid: materialised placeholder plans"
            );
            plans = Plan::find_in_window(pool, step_id, from, to).await?;
        }

        let mut entries_by_plan: HashMap<Uuid, Vec<PlanEntry>> = HashMap::new();
        for entry in PlanEntry::find_in_window(pool, step_id, from, to).await? {
            entries_by_plan.entry(entry.plan_id).or_default().push(entry);
        }
        let mut plans_by_slot: HashMap<(DateTime<Utc>, Uuid), Plan> = plans
            .into_iter()
            .map(|plan| ((plan.date, plan.machine_id), plan))
            .collect();

        let mut rows = Vec::with_capacity(shifts.len());
        for shift in shifts {
            let mut cells = Vec::with_capacity(machines.len());
            for machine in &machines {
                let key = (shift.start, machine.id);
                if let Some(entries) = done.remove(&key) {
                    cells.push(ShiftCell::Done {
                        machine_id: machine.id,
                        entries,
                    });
                } else if let Some(plan) = plans_by_slot.remove(&key) {
                    let entries = entries_by_plan.remove(&plan.id).unwrap_or_default();
                    cells.push(ShiftCell::Plan {
                        machine_id: machine.id,
                        plan: PlanWithEntries { plan, entries },
                    });
                } else {
                    // insert_missing covered every empty slot; a concurrent delete can still race it
                    return Err(ShiftGridError::Database(sqlx::Error::RowNotFound));
                }
            }
            rows.push(ShiftRow { shift, cells });
        }

        Ok(Self {
            step: Some(step),
            machines,
            rows,
            plans_created,
        })
    }
}

/// `[first.start, last.end)` of a non-empty window.
pub fn window_bounds(shifts: &[Shift]) -> (DateTime<Utc>, DateTime<Utc>) {
    match (shifts.first(), shifts.last()) {
        (Some(first), Some(last)) => (first.start, last.end),
        _ => {
            let now = shift_start(Utc::now());
            (now, now)
        }
    }
}

/// Group report entries by (shift start, machine).
pub fn bucket_reports(
    entries: Vec<ShiftReportEntry>,
) -> HashMap<(DateTime<Utc>, Uuid), Vec<ShiftReportEntry>> {
    let mut buckets: HashMap<(DateTime<Utc>, Uuid), Vec<ShiftReportEntry>> = HashMap::new();
    for entry in entries {
        buckets
            .entry((shift_start(entry.date), entry.machine_id))
            .or_default()
            .push(entry);
    }
    buckets
}

fn missing_slots(
    shifts: &[Shift],
    machines: &[Machine],
    done: &HashMap<(DateTime<Utc>, Uuid), Vec<ShiftReportEntry>>,
    plans: &[Plan],
) -> Vec<PlanSlot> {
    let planned: HashSet<(DateTime<Utc>, Uuid)> =
        plans.iter().map(|p| (p.date, p.machine_id)).collect();
    shifts
        .iter()
        .flat_map(|shift| machines.iter().map(move |m| (shift.start, m.id)))
        .filter(|key| !done.contains_key(key) && !planned.contains(key))
        .map(|(date, machine_id)| PlanSlot { machine_id, date })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use db::{
        DBService,
        models::{
            detail::{CreateDetail, Detail},
            machine::CreateMachine,
            order::{CreateOrder, CreateOrderEntry, Order},
            report::{CreateReport, CreateReportEntry, Report},
            step::CreateStep,
        },
    };

    use super::*;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, d, h, m, 0).unwrap()
    }

    #[test]
    fn shift_start_floors_to_half_day() {
        assert_eq!(shift_start(at(20, 0, 0)), at(20, 0, 0));
        assert_eq!(shift_start(at(20, 11, 59)), at(20, 0, 0));
        assert_eq!(shift_start(at(20, 12, 0)), at(20, 12, 0));
        assert_eq!(shift_start(at(20, 23, 59)), at(20, 12, 0));
    }

    #[test]
    fn shift_kind_and_label() {
        let day = Shift::containing(at(5, 9, 0));
        assert_eq!(day.kind, ShiftKind::Day);
        assert_eq!(day.label, "05.02 day");
        let night = day.next();
        assert_eq!(night.kind, ShiftKind::Night);
        assert_eq!(night.label, "05.02 night");
        assert_eq!(night.next().start, at(6, 0, 0));
    }

    #[test]
    fn boundary_belongs_to_later_shift() {
        let day = Shift::containing(at(5, 3, 0));
        assert!(day.contains(at(5, 0, 0)));
        assert!(!day.contains(at(5, 12, 0)));
        assert!(day.next().contains(at(5, 12, 0)));
    }

    #[test]
    fn window_is_contiguous() {
        let shifts = shift_window(at(28, 15, 0), 4);
        assert_eq!(shifts.len(), 4);
        assert_eq!(shifts[0].start, at(28, 12, 0));
        for pair in shifts.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(
            window_bounds(&shifts),
            (at(28, 12, 0), Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn grid_marks_done_cells_and_materialises_plans() {
        let db = DBService::new_in_memory().await.unwrap();
        let pool = &db.pool;
        let step = Step::create(
            pool,
            &CreateStep {
                name: "Cutting".into(),
                position: None,
            },
        )
        .await
        .unwrap();
        let saw = Machine::create(
            pool,
            &CreateMachine {
                name: "A saw".into(),
                step_id: Some(step.id),
            },
        )
        .await
        .unwrap();
        let laser = Machine::create(
            pool,
            &CreateMachine {
                name: "B laser".into(),
                step_id: Some(step.id),
            },
        )
        .await
        .unwrap();
        let detail = Detail::create(pool, &CreateDetail { name: "Panel".into() })
            .await
            .unwrap();
        let order = Order::create(
            pool,
            &CreateOrder {
                user_id: None,
                name: "Lockers".into(),
                number: "88".into(),
                date: at(1, 0, 0),
                is_active: None,
                entries: vec![CreateOrderEntry {
                    detail_id: detail.id,
                    quantity: 500,
                }],
            },
        )
        .await
        .unwrap();
        Report::create(
            pool,
            &CreateReport {
                user_id: None,
                date: at(20, 14, 30),
                order_id: order.id,
                step_id: step.id,
                entries: vec![CreateReportEntry {
                    machine_id: saw.id,
                    detail_id: detail.id,
                    quantity: 120,
                }],
            },
        )
        .await
        .unwrap();

        let grid = ShiftGrid::build(pool, Some(step.id), at(20, 5, 0), 3)
            .await
            .unwrap();
        assert_eq!(grid.rows.len(), 3);
        assert_eq!(grid.machines.len(), 2);
        assert_eq!(grid.plans_created, 5);

        let night = &grid.rows[1];
        assert_eq!(night.shift.start, at(20, 12, 0));
        assert!(night.cells[0].is_done());
        assert_eq!(night.cells[0].machine_id(), saw.id);
        assert!(!night.cells[1].is_done());
        assert_eq!(night.cells[1].machine_id(), laser.id);

        let json = serde_json::to_value(&night.cells).unwrap();
        assert_eq!(json[0]["status"], "done");
        assert_eq!(json[0]["entries"][0]["quantity"], 120);
        assert_eq!(json[1]["status"], "plan");
        assert!(json[1]["plan"]["entries"].as_array().unwrap().is_empty());

        let again = ShiftGrid::build(pool, Some(step.id), at(20, 5, 0), 3)
            .await
            .unwrap();
        assert_eq!(again.plans_created, 0);
    }

    #[tokio::test]
    async fn grid_without_step_is_empty() {
        let db = DBService::new_in_memory().await.unwrap();
        let grid = ShiftGrid::build(&db.pool, None, Utc::now(), DEFAULT_GRID_SHIFTS)
            .await
            .unwrap();
        assert!(grid.rows.is_empty());
        assert!(grid.step.is_none());
    }

    #[tokio::test]
    async fn grid_size_is_bounded() {
        let db = DBService::new_in_memory().await.unwrap();
        let err = ShiftGrid::build(&db.pool, None, Utc::now(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ShiftGridError::InvalidSize(0)));
    }
}
