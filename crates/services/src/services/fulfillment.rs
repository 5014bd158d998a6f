//! Order fulfillment ledgers: ordered vs. reported vs. planned quantities per step.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use db::models::{
    OrderDetailQuantity,
    order::{Order, OrderEntry},
    plan::{Plan, PlanEntry},
    report::ReportEntry,
    step::Step,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use strum_macros::Display;
use thiserror::Error;
use tracing::debug;
use ts_rs::TS;
use uuid::Uuid;

use super::shift::{Shift, bucket_reports, shift_start, shift_window, window_bounds};

#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("step {0} not found")]
    StepNotFound(Uuid),
    #[error("order {0} not found")]
    OrderNotFound(Uuid),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct FulfillmentTotals {
    pub ordered: i64,
    pub reported: i64,
    pub planned: i64,
    /// `ordered - reported`; negative when a step over-produced.
    pub leftover: i64,
    /// `ordered - reported - planned`.
    pub leftover_with_plan: i64,
}

impl FulfillmentTotals {
    pub fn new(ordered: i64, reported: i64, planned: i64) -> Self {
        Self {
            ordered,
            reported,
            planned,
            leftover: ordered.saturating_sub(reported),
            leftover_with_plan: ordered.saturating_sub(reported).saturating_sub(planned),
        }
    }

    fn add(&mut self, other: &FulfillmentTotals) {
        *self = Self::new(
            self.ordered.saturating_add(other.ordered),
            self.reported.saturating_add(other.reported),
            self.planned.saturating_add(other.planned),
        );
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct DetailFulfillment {
    pub detail_id: Uuid,
    pub detail_name: String,
    #[serde(flatten)]
    #[ts(flatten)]
    pub totals: FulfillmentTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct OrderFulfillment {
    pub order_id: Uuid,
    pub name: String,
    pub number: String,
    pub date: DateTime<Utc>,
    pub totals: FulfillmentTotals,
    pub details: Vec<DetailFulfillment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct StepFulfillment {
    pub step: Step,
    pub totals: FulfillmentTotals,
    pub orders: Vec<OrderFulfillment>,
}

type LedgerKey = (Uuid, Uuid);

fn saturating_sum(values: impl Iterator<Item = i64>) -> i64 {
    values.fold(0, i64::saturating_add)
}

fn ledger(rows: &[OrderDetailQuantity]) -> HashMap<LedgerKey, i64> {
    let mut map = HashMap::new();
    for row in rows {
        let total = map.entry((row.order_id, row.detail_id)).or_insert(0i64);
        *total = total.saturating_add(row.quantity);
    }
    map
}

/// Cross the ordered entries of `orders` with the reported and planned ledgers of one step.
///
/// Only ordered details are tracked; work reported against a detail the order does not
/// contain is ignored. Duplicate entries for one detail are merged into one row.
pub fn compute_orders(
    orders: &[Order],
    ordered: &[OrderEntry],
    reported: &[OrderDetailQuantity],
    planned: &[OrderDetailQuantity],
) -> Vec<OrderFulfillment> {
    let reported = ledger(reported);
    let planned = ledger(planned);

    let mut entries_by_order: HashMap<Uuid, Vec<&OrderEntry>> = HashMap::new();
    for entry in ordered {
        entries_by_order.entry(entry.order_id).or_default().push(entry);
    }

    orders
        .iter()
        .map(|order| {
            let mut details: Vec<DetailFulfillment> = Vec::new();
            for entry in entries_by_order.remove(&order.id).unwrap_or_default() {
                if let Some(existing) = details.iter_mut().find(|d| d.detail_id == entry.detail_id)
                {
                    let t = existing.totals;
                    existing.totals = FulfillmentTotals::new(
                        t.ordered.saturating_add(entry.quantity),
                        t.reported,
                        t.planned,
                    );
                    continue;
                }
                let key = (order.id, entry.detail_id);
                details.push(DetailFulfillment {
                    detail_id: entry.detail_id,
                    detail_name: entry.detail_name.clone(),
                    totals: FulfillmentTotals::new(
                        entry.quantity,
                        reported.get(&key).copied().unwrap_or(0),
                        planned.get(&key).copied().unwrap_or(0),
                    ),
                });
            }
            let mut totals = FulfillmentTotals::default();
            for detail in &details {
                totals.add(&detail.totals);
            }
            OrderFulfillment {
                order_id: order.id,
                name: order.name.clone(),
                number: order.number.clone(),
                date: order.date,
                totals,
                details,
            }
        })
        .collect()
}

/// Which ledger a shift's contribution to the projection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BalanceSource {
    Actual,
    Planned,
    Mixed,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct BalancePoint {
    pub shift: Shift,
    pub reported: i64,
    pub planned: i64,
    pub source: BalanceSource,
    pub cumulative_reported: i64,
    pub cumulative_projected: i64,
    pub leftover: i64,
    pub projected_leftover: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct OrderBalance {
    pub order_id: Uuid,
    pub step_id: Uuid,
    pub ordered: i64,
    pub reported_before: i64,
    pub points: Vec<BalancePoint>,
}

/// What one (shift, machine) cell contributed for the order being balanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellActivity {
    pub shift_start: DateTime<Utc>,
    pub machine_id: Uuid,
    /// Whether anything at all was reported in the cell, for any order.
    pub has_reports: bool,
    pub reported: i64,
    pub planned: i64,
}

/// Walk the shifts in order keeping the actual and projected ledgers side by side.
///
/// A cell with reports contributes its actual output to the projection; a cell
/// without reports contributes its plan, the same rule the shift grid uses to show
/// a done cell or a plan cell.
pub fn running_balance(
    shifts: &[Shift],
    ordered: i64,
    reported_before: i64,
    cells: &[CellActivity],
) -> Vec<BalancePoint> {
    let mut by_shift: HashMap<DateTime<Utc>, Vec<&CellActivity>> = HashMap::new();
    for cell in cells {
        by_shift.entry(cell.shift_start).or_default().push(cell);
    }

    let mut cumulative_reported = reported_before;
    let mut cumulative_projected = reported_before;
    shifts
        .iter()
        .map(|shift| {
            let cells = by_shift.remove(&shift.start).unwrap_or_default();
            let reported = saturating_sum(cells.iter().map(|c| c.reported));
            let planned = saturating_sum(cells.iter().map(|c| c.planned));
            let from_actual =
                saturating_sum(cells.iter().filter(|c| c.has_reports).map(|c| c.reported));
            let from_plan =
                saturating_sum(cells.iter().filter(|c| !c.has_reports).map(|c| c.planned));
            let source = match (from_actual > 0, from_plan > 0) {
                (true, true) => BalanceSource::Mixed,
                (true, false) => BalanceSource::Actual,
                (false, true) => BalanceSource::Planned,
                (false, false) => BalanceSource::Idle,
            };
            cumulative_reported = cumulative_reported.saturating_add(reported);
            cumulative_projected = cumulative_projected
                .saturating_add(from_actual)
                .saturating_add(from_plan);
            BalancePoint {
                shift: shift.clone(),
                reported,
                planned,
                source,
                cumulative_reported,
                cumulative_projected,
                leftover: ordered.saturating_sub(cumulative_reported),
                projected_leftover: ordered.saturating_sub(cumulative_projected),
            }
        })
        .collect()
}

pub struct FulfillmentService;

impl FulfillmentService {
    /// Step → order → detail ledger for every active order.
    /// Plans count from the current shift on; past plans were either fulfilled or missed.
    pub async fn for_step(
        pool: &SqlitePool,
        step_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<StepFulfillment, FulfillmentError> {
        let step = Step::find_by_id(pool, step_id)
            .await?
            .ok_or(FulfillmentError::StepNotFound(step_id))?;
        let orders = Order::find_active(pool).await?;
        let ordered = OrderEntry::find_for_active_orders(pool).await?;
        Self::assemble(pool, step, &orders, &ordered, now).await
    }

    /// The ledger of every step in pipeline order, for following an order down the line.
    pub async fn overview(
        pool: &SqlitePool,
        now: DateTime<Utc>,
    ) -> Result<Vec<StepFulfillment>, FulfillmentError> {
        let orders = Order::find_active(pool).await?;
        let ordered = OrderEntry::find_for_active_orders(pool).await?;
        let mut steps = Vec::new();
        for step in Step::find_all(pool).await? {
            steps.push(Self::assemble(pool, step, &orders, &ordered, now).await?);
        }
        debug!(steps = steps.len(), orders = orders.len(), "Fulfillment overview built");
        Ok(steps)
    }

    async fn assemble(
        pool: &SqlitePool,
        step: Step,
        orders: &[Order],
        ordered: &[OrderEntry],
        now: DateTime<Utc>,
    ) -> Result<StepFulfillment, FulfillmentError> {
        let reported = ReportEntry::sum_by_order_detail(pool, step.id, None).await?;
        let planned = PlanEntry::sum_by_order_detail(pool, step.id, Some(shift_start(now))).await?;
        let orders = compute_orders(orders, ordered, &reported, &planned);
        let mut totals = FulfillmentTotals::default();
        for order in &orders {
            totals.add(&order.totals);
        }
        Ok(StepFulfillment {
            step,
            totals,
            orders,
        })
    }

    /// Running balance of one order at one step over `count` shifts starting at `origin`.
    pub async fn order_balance(
        pool: &SqlitePool,
        order_id: Uuid,
        step_id: Uuid,
        origin: DateTime<Utc>,
        count: usize,
    ) -> Result<OrderBalance, FulfillmentError> {
        let order = Order::find_with_entries(pool, order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;
        if Step::find_by_id(pool, step_id).await?.is_none() {
            return Err(FulfillmentError::StepNotFound(step_id));
        }
        let tracked: HashSet<Uuid> = order.entries.iter().map(|e| e.detail_id).collect();
        let ordered = saturating_sum(order.entries.iter().map(|e| e.quantity));

        let shifts = shift_window(origin, count);
        let (from, to) = window_bounds(&shifts);

        let reported_before = saturating_sum(
            ReportEntry::sum_by_order_detail(pool, step_id, Some(from))
                .await?
                .iter()
                .filter(|row| row.order_id == order_id && tracked.contains(&row.detail_id))
                .map(|row| row.quantity),
        );

        let mut cells: HashMap<(DateTime<Utc>, Uuid), CellActivity> = HashMap::new();
        for ((shift_start, machine_id), entries) in
            bucket_reports(ReportEntry::find_in_window(pool, step_id, from, to).await?)
        {
            let reported = saturating_sum(
                entries
                    .iter()
                    .filter(|e| e.order_id == order_id && tracked.contains(&e.detail_id))
                    .map(|e| e.quantity),
            );
            cells.insert(
                (shift_start, machine_id),
                CellActivity {
                    shift_start,
                    machine_id,
                    has_reports: true,
                    reported,
                    planned: 0,
                },
            );
        }

        let plans: HashMap<Uuid, Plan> = Plan::find_in_window(pool, step_id, from, to)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        for entry in PlanEntry::find_in_window(pool, step_id, from, to).await? {
            if entry.order_id != Some(order_id) || !tracked.contains(&entry.detail_id) {
                continue;
            }
            let Some(plan) = plans.get(&entry.plan_id) else {
                continue;
            };
            let cell = cells
                .entry((plan.date, plan.machine_id))
                .or_insert(CellActivity {
                    shift_start: plan.date,
                    machine_id: plan.machine_id,
                    has_reports: false,
                    reported: 0,
                    planned: 0,
                });
            cell.planned = cell.planned.saturating_add(entry.quantity);
        }

        let cells: Vec<CellActivity> = cells.into_values().collect();
        Ok(OrderBalance {
            order_id,
            step_id,
            ordered,
            reported_before,
            points: running_balance(&shifts, ordered, reported_before, &cells),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use db::{
        DBService,
        models::{
            detail::{CreateDetail, Detail},
            machine::{CreateMachine, Machine},
            order::{CreateOrder, CreateOrderEntry},
            plan::{CreatePlan, CreatePlanEntry},
            report::{CreateReport, CreateReportEntry, Report},
            step::CreateStep,
        },
    };

    use super::*;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, d, h, 0, 0).unwrap()
    }

    fn order(id: Uuid) -> Order {
        Order {
            id,
            user_id: None,
            name: "Shelves".into(),
            number: "5".into(),
            date: at(1, 0),
            is_active: true,
            created_at: at(1, 0),
        }
    }

    fn entry(order_id: Uuid, detail_id: Uuid, name: &str, quantity: i64) -> OrderEntry {
        OrderEntry {
            id: Uuid::new_v4(),
            order_id,
            detail_id,
            detail_name: name.into(),
            quantity,
        }
    }

    #[test]
    fn leftovers_per_detail_and_order() {
        let order_id = Uuid::new_v4();
        let (shelf, bracket, stray) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let result = compute_orders(
            &[order(order_id)],
            &[
                entry(order_id, shelf, "Shelf", 400),
                entry(order_id, bracket, "Bracket", 800),
            ],
            &[
                OrderDetailQuantity {
                    order_id,
                    detail_id: shelf,
                    quantity: 450,
                },
                OrderDetailQuantity {
                    order_id,
                    detail_id: bracket,
                    quantity: 300,
                },
                OrderDetailQuantity {
                    order_id,
                    detail_id: stray,
                    quantity: 999,
                },
            ],
            &[OrderDetailQuantity {
                order_id,
                detail_id: bracket,
                quantity: 200,
            }],
        );
        assert_eq!(result.len(), 1);
        let details = &result[0].details;
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].totals, FulfillmentTotals::new(400, 450, 0));
        assert_eq!(details[0].totals.leftover, -50);
        assert_eq!(details[1].totals.leftover, 500);
        assert_eq!(details[1].totals.leftover_with_plan, 300);
        assert_eq!(result[0].totals, FulfillmentTotals::new(1200, 750, 200));
    }

    #[test]
    fn order_without_entries_has_zero_totals() {
        let result = compute_orders(&[order(Uuid::new_v4())], &[], &[], &[]);
        assert_eq!(result[0].totals, FulfillmentTotals::default());
        assert!(result[0].details.is_empty());
    }

    #[test]
    fn duplicate_order_entries_merge() {
        let order_id = Uuid::new_v4();
        let shelf = Uuid::new_v4();
        let result = compute_orders(
            &[order(order_id)],
            &[
                entry(order_id, shelf, "Shelf", 100),
                entry(order_id, shelf, "Shelf", 50),
            ],
            &[OrderDetailQuantity {
                order_id,
                detail_id: shelf,
                quantity: 30,
            }],
            &[],
        );
        assert_eq!(result[0].details.len(), 1);
        assert_eq!(result[0].totals, FulfillmentTotals::new(150, 30, 0));
    }

    #[test]
    fn running_balance_prefers_actuals_over_plans() {
        let shifts = shift_window(at(10, 0), 3);
        let (m1, m2) = (Uuid::new_v4(), Uuid::new_v4());
        let cells = [
            // shift 0: m1 reported 100 (its plan of 150 is superseded), m2 planned 50
            CellActivity {
                shift_start: at(10, 0),
                machine_id: m1,
                has_reports: true,
                reported: 100,
                planned: 150,
            },
            CellActivity {
                shift_start: at(10, 0),
                machine_id: m2,
                has_reports: false,
                reported: 0,
                planned: 50,
            },
            // shift 2: another order's report fills m1, so this order's plan is not projected
            CellActivity {
                shift_start: at(11, 0),
                machine_id: m1,
                has_reports: true,
                reported: 0,
                planned: 70,
            },
        ];
        let points = running_balance(&shifts, 1000, 200, &cells);
        assert_eq!(points.len(), 3);

        assert_eq!(points[0].source, BalanceSource::Mixed);
        assert_eq!(points[0].cumulative_reported, 300);
        assert_eq!(points[0].cumulative_projected, 350);
        assert_eq!(points[0].leftover, 700);
        assert_eq!(points[0].projected_leftover, 650);

        assert_eq!(points[1].source, BalanceSource::Idle);
        assert_eq!(points[1].cumulative_projected, 350);

        assert_eq!(points[2].source, BalanceSource::Idle);
        assert_eq!(points[2].planned, 70);
        assert_eq!(points[2].projected_leftover, 650);
    }

    #[tokio::test]
    async fn step_ledger_counts_only_current_and_future_plans() {
        let db = DBService::new_in_memory().await.unwrap();
        let pool = &db.pool;
        let step = Step::create(
            pool,
            &CreateStep {
                name: "Painting".into(),
                position: None,
            },
        )
        .await
        .unwrap();
        let booth = Machine::create(
            pool,
            &CreateMachine {
                name: "Booth".into(),
                step_id: Some(step.id),
            },
        )
        .await
        .unwrap();
        let door = Detail::create(pool, &CreateDetail { name: "Door".into() })
            .await
            .unwrap();
        let order = Order::create(
            pool,
            &CreateOrder {
                user_id: None,
                name: "Kitchen".into(),
                number: "300".into(),
                date: at(1, 0),
                is_active: None,
                entries: vec![CreateOrderEntry {
                    detail_id: door.id,
                    quantity: 1000,
                }],
            },
        )
        .await
        .unwrap();
        Report::create(
            pool,
            &CreateReport {
                user_id: None,
                date: at(9, 3),
                order_id: order.id,
                step_id: step.id,
                entries: vec![CreateReportEntry {
                    machine_id: booth.id,
                    detail_id: door.id,
                    quantity: 250,
                }],
            },
        )
        .await
        .unwrap();
        for (date, quantity) in [(at(9, 12), 40), (at(10, 0), 100), (at(10, 12), 120)] {
            Plan::upsert(
                pool,
                &CreatePlan {
                    date,
                    machine_id: booth.id,
                    step_id: step.id,
                    entries: vec![CreatePlanEntry {
                        order_id: Some(order.id),
                        detail_id: door.id,
                        quantity,
                    }],
                },
            )
            .await
            .unwrap();
        }

        let ledger = FulfillmentService::for_step(pool, step.id, at(10, 5))
            .await
            .unwrap();
        assert_eq!(ledger.orders.len(), 1);
        assert_eq!(ledger.totals, FulfillmentTotals::new(1000, 250, 220));
        assert_eq!(ledger.orders[0].details[0].detail_name, "Door");

        let balance = FulfillmentService::order_balance(pool, order.id, step.id, at(9, 12), 3)
            .await
            .unwrap();
        assert_eq!(balance.reported_before, 250);
        let projected: Vec<i64> = balance.points.iter().map(|p| p.projected_leftover).collect();
        assert_eq!(projected, vec![710, 610, 490]);
    }

    #[test]
    fn extreme_quantities_saturate_instead_of_overflowing() {
        let order_id = Uuid::new_v4();
        let (shelf, bracket) = (Uuid::new_v4(), Uuid::new_v4());
        let result = compute_orders(
            &[order(order_id)],
            &[
                entry(order_id, shelf, "Shelf", i64::MAX),
                entry(order_id, shelf, "Shelf", i64::MAX),
                entry(order_id, bracket, "Bracket", i64::MAX),
            ],
            &[],
            &[OrderDetailQuantity {
                order_id,
                detail_id: bracket,
                quantity: i64::MAX,
            }],
        );
        assert_eq!(result[0].details[0].totals.ordered, i64::MAX);
        assert_eq!(result[0].totals.ordered, i64::MAX);
        assert_eq!(result[0].totals.leftover_with_plan, 0);

        let totals = FulfillmentTotals::new(i64::MIN, i64::MAX, i64::MAX);
        assert_eq!(totals.leftover, i64::MIN);
        assert_eq!(totals.leftover_with_plan, i64::MIN);

        let cells = [CellActivity {
            shift_start: at(10, 0),
            machine_id: Uuid::new_v4(),
            has_reports: true,
            reported: i64::MAX,
            planned: 0,
        }];
        let points = running_balance(&shift_window(at(10, 0), 1), 10, i64::MAX, &cells);
        assert_eq!(points[0].cumulative_reported, i64::MAX);
        assert_eq!(points[0].leftover, 10 - i64::MAX);
    }

    #[tokio::test]
    async fn inactive_orders_drop_out_of_ledgers() {
        let db = DBService::new_in_memory().await.unwrap();
        let pool = &db.pool;
        let step = Step::create(
            pool,
            &CreateStep {
                name: "Assembly".into(),
                position: None,
            },
        )
        .await
        .unwrap();
        let leg = Detail::create(pool, &CreateDetail { name: "Leg".into() })
            .await
            .unwrap();
        let order = Order::create(
            pool,
            &CreateOrder {
                user_id: None,
                name: "Tables".into(),
                number: "T-1".into(),
                date: at(1, 0),
                is_active: None,
                entries: vec![CreateOrderEntry {
                    detail_id: leg.id,
                    quantity: 40,
                }],
            },
        )
        .await
        .unwrap();

        let ledger = FulfillmentService::for_step(pool, step.id, at(10, 0))
            .await
            .unwrap();
        assert_eq!(ledger.orders.len(), 1);

        assert_eq!(Order::set_active(pool, order.id, false).await.unwrap(), 1);
        let ledger = FulfillmentService::for_step(pool, step.id, at(10, 0))
            .await
            .unwrap();
        assert!(ledger.orders.is_empty());
        assert_eq!(ledger.totals, FulfillmentTotals::default());

        let overview = FulfillmentService::overview(pool, at(10, 0)).await.unwrap();
        assert_eq!(overview.len(), 1);
        assert!(overview[0].orders.is_empty());
    }

    #[tokio::test]
    async fn unknown_step_is_an_error() {
        let db = DBService::new_in_memory().await.unwrap();
        let err = FulfillmentService::for_step(&db.pool, Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::StepNotFound(_)));
    }
}
