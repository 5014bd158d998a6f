//! Detail catalog hygiene: spotting details registered twice under the same name
//! and folding them into one.

use db::models::detail::Detail;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct DuplicateGroup {
    pub name: String,
    /// Oldest detail of the group; survives the merge.
    pub keeper: Detail,
    pub duplicates: Vec<Detail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct MergeSummary {
    pub groups: usize,
    pub details_removed: u64,
    pub entries_moved: u64,
}

/// Group details sharing an exact name. Input must be sorted by name, then age.
pub fn group_duplicates(details: Vec<Detail>) -> Vec<DuplicateGroup> {
    let mut groups: Vec<DuplicateGroup> = Vec::new();
    let mut current: Option<DuplicateGroup> = None;
    for detail in details {
        match current.as_mut() {
            Some(group) if group.name == detail.name => group.duplicates.push(detail),
            _ => {
                if let Some(done) = current.take() {
                    groups.push(done);
                }
                current = Some(DuplicateGroup {
                    name: detail.name.clone(),
                    keeper: detail,
                    duplicates: Vec::new(),
                });
            }
        }
    }
    groups.extend(current);
    groups.retain(|g| !g.duplicates.is_empty());
    groups
}

pub struct CatalogService;

impl CatalogService {
    pub async fn find_duplicates(pool: &SqlitePool) -> Result<Vec<DuplicateGroup>, CatalogError> {
        Ok(group_duplicates(Detail::find_all_by_age(pool).await?))
    }

    /// Repoint all entries of every duplicate at its keeper and delete the duplicate,
    /// all in one transaction.
    pub async fn merge_duplicates(pool: &SqlitePool) -> Result<MergeSummary, CatalogError> {
        let groups = Self::find_duplicates(pool).await?;
        let mut summary = MergeSummary {
            groups: groups.len(),
            ..Default::default()
        };
        if groups.is_empty() {
            return Ok(summary);
        }

        let mut tx = pool.begin().await?;
        for group in &groups {
            for duplicate in &group.duplicates {
                let moved = Detail::reassign_entries(&mut tx, duplicate.id, group.keeper.id).await?;
                summary.entries_moved += moved;
                summary.details_removed += Detail::delete(&mut *tx, duplicate.id).await?;
                info!(
                    detail = %group.name,
                    keeper_id = %group.keeper.id,
                    merged_id = %duplicate.id,
                    entries_moved = moved,
                    "Catalog: merged duplicate detail"
                );
            }
        }
        tx.commit().await?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use db::{
        DBService,
        models::{
            detail::CreateDetail,
            order::{CreateOrder, CreateOrderEntry, Order, OrderEntry},
        },
    };
    use uuid::Uuid;

    use super::*;

    fn detail(name: &str, minute: u32) -> Detail {
        Detail {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
        }
    }

    #[test]
    fn groups_only_repeated_names() {
        let groups = group_duplicates(vec![
            detail("Bolt", 0),
            detail("Bolt", 5),
            detail("Nut", 1),
            detail("Washer", 2),
            detail("Washer", 3),
            detail("Washer", 4),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "Bolt");
        assert_eq!(groups[0].duplicates.len(), 1);
        assert_eq!(groups[1].keeper.created_at.format("%M").to_string(), "02");
        assert_eq!(groups[1].duplicates.len(), 2);
    }

    #[tokio::test]
    async fn merge_moves_entries_to_keeper() {
        let db = DBService::new_in_memory().await.unwrap();
        let pool = &db.pool;
        let keeper = Detail::create(pool, &CreateDetail { name: "Hinge".into() })
            .await
            .unwrap();
        let duplicate = Detail::create(pool, &CreateDetail { name: "Hinge".into() })
            .await
            .unwrap();
        let order = Order::create(
            pool,
            &CreateOrder {
                user_id: None,
                name: "Doors".into(),
                number: "12".into(),
                date: Utc::now(),
                is_active: None,
                entries: vec![CreateOrderEntry {
                    detail_id: duplicate.id,
                    quantity: 40,
                }],
            },
        )
        .await
        .unwrap();

        let summary = CatalogService::merge_duplicates(pool).await.unwrap();
        assert_eq!(
            summary,
            MergeSummary {
                groups: 1,
                details_removed: 1,
                entries_moved: 1,
            }
        );
        let entries = OrderEntry::find_by_order_id(pool, order.id).await.unwrap();
        assert_eq!(entries[0].detail_id, keeper.id);
        assert!(Detail::find_by_id(pool, duplicate.id).await.unwrap().is_none());
        assert!(CatalogService::find_duplicates(pool).await.unwrap().is_empty());
    }
}
