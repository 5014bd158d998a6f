use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::{ModelError, require_details, require_entries, require_name, require_quantity};

/// A customer order: a header plus the quantity ordered per detail.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Option<Uuid>, // Who registered the order
    pub name: String,
    pub number: String,
    pub date: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct OrderEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub detail_id: Uuid,
    pub detail_name: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct OrderWithEntries {
    #[serde(flatten)]
    #[ts(flatten)]
    pub order: Order,
    pub entries: Vec<OrderEntry>,
}

impl std::ops::Deref for OrderWithEntries {
    type Target = Order;
    fn deref(&self) -> &Self::Target {
        &self.order
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateOrderEntry {
    pub detail_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateOrder {
    pub user_id: Option<Uuid>,
    pub name: String,
    pub number: String,
    pub date: DateTime<Utc>,
    pub is_active: Option<bool>,
    pub entries: Vec<CreateOrderEntry>,
}

/// Full replacement of an order; entries not listed are removed.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateOrder {
    pub name: String,
    pub number: String,
    pub date: DateTime<Utc>,
    pub is_active: bool,
    pub entries: Vec<CreateOrderEntry>,
}

const ORDER_COLUMNS: &str = "id, user_id, name, number, date, is_active, created_at";

impl CreateOrder {
    fn validate(&self) -> Result<(), ModelError> {
        require_name(&self.name, "order name")?;
        require_entries(&self.entries, "order")?;
        self.entries
            .iter()
            .try_for_each(|entry| require_quantity(entry.quantity))
    }
}

impl UpdateOrder {
    fn validate(&self) -> Result<(), ModelError> {
        require_name(&self.name, "order name")?;
        require_entries(&self.entries, "order")?;
        self.entries
            .iter()
            .try_for_each(|entry| require_quantity(entry.quantity))
    }
}

impl Order {
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY date DESC"
        ))
        .fetch_all(pool)
        .await
    }

    /// Orders still in production, newest first.
    pub async fn find_active(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE is_active = 1 ORDER BY date DESC"
        ))
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Order>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_with_entries(
        pool: &SqlitePool,
        id: Uuid,
    ) -> Result<Option<OrderWithEntries>, sqlx::Error> {
        let Some(order) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let entries = OrderEntry::find_by_order_id(pool, id).await?;
        Ok(Some(OrderWithEntries { order, entries }))
    }

    pub async fn create(pool: &SqlitePool, data: &CreateOrder) -> Result<OrderWithEntries, ModelError> {
        data.validate()?;
        require_details(pool, data.entries.iter().map(|e| e.detail_id).collect::<Vec<_>>()).await?;
        let id = Uuid::new_v4();
        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT INTO orders (id, user_id, name, number, date, is_active)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(data.user_id)
        .bind(data.name.trim())
        .bind(data.number.trim())
        .bind(data.date)
        .bind(data.is_active.unwrap_or(true))
        .execute(&mut *tx)
        .await?;
        OrderEntry::insert_all(&mut tx, id, &data.entries).await?;
        tx.commit().await?;

        Self::find_with_entries(pool, id)
            .await?
            .ok_or(ModelError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateOrder,
    ) -> Result<Option<OrderWithEntries>, ModelError> {
        data.validate()?;
        require_details(pool, data.entries.iter().map(|e| e.detail_id).collect::<Vec<_>>()).await?;
        let mut tx = pool.begin().await?;
        let result = sqlx::query(
            "UPDATE orders SET name = $2, number = $3, date = $4, is_active = $5 WHERE id = $1",
        )
        .bind(id)
        .bind(data.name.trim())
        .bind(data.number.trim())
        .bind(data.date)
        .bind(data.is_active)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        sqlx::query("DELETE FROM order_entries WHERE order_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        OrderEntry::insert_all(&mut tx, id, &data.entries).await?;
        tx.commit().await?;

        Ok(Self::find_with_entries(pool, id).await?)
    }

    pub async fn set_active(pool: &SqlitePool, id: Uuid, is_active: bool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE orders SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl OrderEntry {
    pub async fn find_by_order_id(
        pool: &SqlitePool,
        order_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, OrderEntry>(
            "SELECT oe.id, oe.order_id, oe.detail_id, d.name AS detail_name, oe.quantity
             FROM order_entries oe
             JOIN details d ON d.id = oe.detail_id
             WHERE oe.order_id = $1
             ORDER BY d.name ASC, oe.rowid ASC",
        )
        .bind(order_id)
        .fetch_all(pool)
        .await
    }

    /// Entries of all active orders; the ordered side of the fulfillment ledger.
    pub async fn find_for_active_orders(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, OrderEntry>(
            "SELECT oe.id, oe.order_id, oe.detail_id, d.name AS detail_name, oe.quantity
             FROM order_entries oe
             JOIN orders o ON o.id = oe.order_id
             JOIN details d ON d.id = oe.detail_id
             WHERE o.is_active = 1
             ORDER BY o.date DESC, d.name ASC, oe.rowid ASC",
        )
        .fetch_all(pool)
        .await
    }

    async fn insert_all(
        conn: &mut SqliteConnection,
        order_id: Uuid,
        entries: &[CreateOrderEntry],
    ) -> Result<(), sqlx::Error> {
        for entry in entries {
            sqlx::query(
                "INSERT INTO order_entries (id, order_id, detail_id, quantity) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(order_id)
            .bind(entry.detail_id)
            .bind(entry.quantity)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::{
        MAX_QUANTITY,
        detail::{CreateDetail, Detail},
        test_support::db,
    };

    async fn detail(pool: &SqlitePool, name: &str) -> Detail {
        Detail::create(pool, &CreateDetail { name: name.into() })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_and_replace_entries() {
        let db = db().await;
        let bracket = detail(&db.pool, "Bracket").await;
        let hinge = detail(&db.pool, "Hinge").await;
        let order = Order::create(
            &db.pool,
            &CreateOrder {
                user_id: None,
                name: "Cabinets".into(),
                number: "1042".into(),
                date: Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap(),
                is_active: None,
                entries: vec![
                    CreateOrderEntry {
                        detail_id: bracket.id,
                        quantity: 300,
                    },
                    CreateOrderEntry {
                        detail_id: hinge.id,
                        quantity: 600,
                    },
                ],
            },
        )
        .await
        .unwrap();
        assert!(order.is_active);
        assert_eq!(order.entries.len(), 2);
        assert_eq!(order.entries[0].detail_name, "Bracket");

        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["number"], "1042");
        assert_eq!(json["entries"][1]["quantity"], 600);

        let updated = Order::update(
            &db.pool,
            order.id,
            &UpdateOrder {
                name: "Cabinets".into(),
                number: "1042".into(),
                date: order.date,
                is_active: false,
                entries: vec![CreateOrderEntry {
                    detail_id: hinge.id,
                    quantity: 500,
                }],
            },
        )
        .await
        .unwrap()
        .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.entries.len(), 1);
        assert_eq!(updated.entries[0].quantity, 500);

        assert!(Order::find_active(&db.pool).await.unwrap().is_empty());
        let details = Detail::find_by_order_id(&db.pool, order.id).await.unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].id, hinge.id);
    }

    #[tokio::test]
    async fn order_without_entries_is_rejected() {
        let db = db().await;
        let err = Order::create(
            &db.pool,
            &CreateOrder {
                user_id: None,
                name: "Empty".into(),
                number: "1".into(),
                date: Utc::now(),
                is_active: None,
                entries: vec![],
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ModelError::Validation(_)));
    }

    #[tokio::test]
    async fn deleting_order_cascades_entries() {
        let db = db().await;
        let bracket = detail(&db.pool, "Bracket").await;
        let order = Order::create(
            &db.pool,
            &CreateOrder {
                user_id: None,
                name: "Cabinets".into(),
                number: "7".into(),
                date: Utc::now(),
                is_active: Some(true),
                entries: vec![CreateOrderEntry {
                    detail_id: bracket.id,
                    quantity: 10,
                }],
            },
        )
        .await
        .unwrap();
        assert_eq!(Order::delete(&db.pool, order.id).await.unwrap(), 1);
        assert!(OrderEntry::find_by_order_id(&db.pool, order.id)
            .await
            .unwrap()
            .is_empty());
    }

    fn single_entry_order(detail_id: Uuid, quantity: i64) -> CreateOrder {
        CreateOrder {
            user_id: None,
            name: "Shelving".into(),
            number: "88".into(),
            date: Utc::now(),
            is_active: None,
            entries: vec![CreateOrderEntry {
                detail_id,
                quantity,
            }],
        }
    }

    #[tokio::test]
    async fn quantity_above_limit_is_rejected() {
        let db = db().await;
        let bracket = detail(&db.pool, "Bracket").await;
        let err = Order::create(&db.pool, &single_entry_order(bracket.id, MAX_QUANTITY + 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Validation(_)));

        let order = Order::create(&db.pool, &single_entry_order(bracket.id, MAX_QUANTITY))
            .await
            .unwrap();
        assert_eq!(order.entries[0].quantity, MAX_QUANTITY);
    }

    #[tokio::test]
    async fn unknown_detail_is_rejected() {
        let db = db().await;
        let err = Order::create(&db.pool, &single_entry_order(Uuid::new_v4(), 5))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Validation(_)));
        assert!(Order::find_active(&db.pool).await.unwrap().is_empty());

        let bracket = detail(&db.pool, "Bracket").await;
        let order = Order::create(&db.pool, &single_entry_order(bracket.id, 5))
            .await
            .unwrap();
        let mut update = UpdateOrder {
            name: order.name.clone(),
            number: order.number.clone(),
            date: order.date,
            is_active: true,
            entries: vec![CreateOrderEntry {
                detail_id: Uuid::new_v4(),
                quantity: 5,
            }],
        };
        let err = Order::update(&db.pool, order.id, &update).await.unwrap_err();
        assert!(matches!(err, ModelError::Validation(_)));
        update.entries[0].detail_id = bracket.id;
        assert!(Order::update(&db.pool, order.id, &update).await.unwrap().is_some());
    }
}
