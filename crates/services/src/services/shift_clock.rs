//! The production board's rolling clock: navigation, step switching and the
//! background service that keeps the shift window following real time.

use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use db::{
    DBService,
    models::{board::Board, step::Step},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tokio::time::interval;
use tracing::{debug, error, info};
use ts_rs::TS;
use uuid::Uuid;

/// How many days of history the default window shows before today.
pub const DAYS_BEFORE_TODAY: i64 = 2;

#[derive(Debug, Error)]
pub enum ShiftClockError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unknown board navigation '{0}', expected back, forward or today")]
    UnknownNavigation(String),
    #[error("step {0} not found")]
    StepNotFound(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BoardNavigation {
    Back,
    Forward,
    Today,
}

impl BoardNavigation {
    pub fn parse(value: &str) -> Result<Self, ShiftClockError> {
        value
            .parse()
            .map_err(|_| ShiftClockError::UnknownNavigation(value.to_string()))
    }

    /// Where the clock lands after navigating from `clock` at wall time `now`.
    pub fn apply(self, clock: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            BoardNavigation::Back => clock - TimeDelta::days(1),
            BoardNavigation::Forward => clock + TimeDelta::days(1),
            BoardNavigation::Today => default_origin(now),
        }
    }
}

/// Midnight of today minus [`DAYS_BEFORE_TODAY`]: the window origin of a fresh board.
pub fn default_origin(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc() - TimeDelta::days(DAYS_BEFORE_TODAY)
}

pub struct ShiftClock;

impl ShiftClock {
    /// The board, created on first use with the default origin and the first step.
    pub async fn board(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Board, ShiftClockError> {
        Ok(Board::get_or_init(pool, default_origin(now)).await?)
    }

    pub async fn navigate(
        pool: &SqlitePool,
        navigation: BoardNavigation,
        now: DateTime<Utc>,
    ) -> Result<Board, ShiftClockError> {
        let board = Self::board(pool, now).await?;
        let clock = navigation.apply(board.clock_date, now);
        debug!(%navigation, from = %board.clock_date, to = %clock, "Board navigation");
        Ok(Board::set_clock(pool, clock).await?)
    }

    pub async fn switch_step(
        pool: &SqlitePool,
        step_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Board, ShiftClockError> {
        if Step::find_by_id(pool, step_id).await?.is_none() {
            return Err(ShiftClockError::StepNotFound(step_id));
        }
        Self::board(pool, now).await?;
        info!(step_id = %step_id, "Board switched step");
        Ok(Board::set_current_step(pool, Some(step_id)).await?)
    }

    /// Move the clock up to the rolling origin when it has fallen behind.
    /// Returns the new clock when it moved.
    pub async fn follow(
        pool: &SqlitePool,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ShiftClockError> {
        let board = Self::board(pool, now).await?;
        let target = default_origin(now);
        if board.clock_date >= target {
            return Ok(None);
        }
        Board::set_clock(pool, target).await?;
        Ok(Some(target))
    }
}

/// Background service rolling the board forward as days pass.
pub struct ShiftClockService {
    db: DBService,
    poll_interval: Duration,
}

impl ShiftClockService {
    /// Spawn the background shift clock service
    pub async fn spawn(db: DBService, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
        let service = Self { db, poll_interval };
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting shift clock service with interval {:?}",
            self.poll_interval
        );

        let mut interval = interval(self.poll_interval);

        loop {
            interval.tick().await;
            match ShiftClock::follow(&self.db.pool, Utc::now()).await {
                Ok(Some(clock)) => info!(clock = %clock, "Shift clock: board rolled forward"),
                Ok(None) => debug!("Shift clock: board is current"),
                Err(e) => error!("Error advancing shift clock: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use db::models::step::CreateStep;

    use super::*;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, d, h, 0, 0).unwrap()
    }

    #[test]
    fn navigation_parses_and_moves_by_a_day() {
        assert_eq!(BoardNavigation::parse("back").unwrap(), BoardNavigation::Back);
        assert!(matches!(
            BoardNavigation::parse("sideways"),
            Err(ShiftClockError::UnknownNavigation(_))
        ));
        let clock = at(10, 0);
        assert_eq!(BoardNavigation::Back.apply(clock, at(20, 9)), at(9, 0));
        assert_eq!(BoardNavigation::Forward.apply(clock, at(20, 9)), at(11, 0));
        assert_eq!(BoardNavigation::Today.apply(clock, at(20, 9)), at(18, 0));
    }

    #[tokio::test]
    async fn follow_only_moves_forward() {
        let db = DBService::new_in_memory().await.unwrap();
        let pool = &db.pool;
        ShiftClock::board(pool, at(10, 8)).await.unwrap();

        assert_eq!(ShiftClock::follow(pool, at(10, 20)).await.unwrap(), None);
        assert_eq!(
            ShiftClock::follow(pool, at(11, 1)).await.unwrap(),
            Some(at(9, 0))
        );

        ShiftClock::navigate(pool, BoardNavigation::Forward, at(11, 1))
            .await
            .unwrap();
        assert_eq!(ShiftClock::follow(pool, at(11, 2)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn switch_step_requires_existing_step() {
        let db = DBService::new_in_memory().await.unwrap();
        let pool = &db.pool;
        let err = ShiftClock::switch_step(pool, Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ShiftClockError::StepNotFound(_)));

        let step = Step::create(
            pool,
            &CreateStep {
                name: "Assembly".into(),
                position: None,
            },
        )
        .await
        .unwrap();
        let board = ShiftClock::switch_step(pool, step.id, Utc::now()).await.unwrap();
        assert_eq!(board.current_step_id, Some(step.id));
    }
}
