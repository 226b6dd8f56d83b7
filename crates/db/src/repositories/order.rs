use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use orderline_core::domain::order::{
    CallId, FulfillmentType, Order, OrderId, OrderItem, OrderStatus,
};
use orderline_core::domain::restaurant::{MenuItemId, RestaurantId};
use orderline_core::transcript::{TranscriptEntry, TranscriptEvent};

use super::{OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                order_item.menu_item_id, order_item.quantity,
                order_item.modifications, menu_item.name AS menu_item_name
            FROM order_item
            JOIN menu_item ON menu_item.id = order_item.menu_item_id
            WHERE order_item.order_id = ?1
            ORDER BY menu_item.name ASC, order_item.id ASC
            "#,
        )
        .bind(&order_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(order_item_from_row).collect()
    }
}

#[async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn get_or_create(
        &self,
        call_id: &CallId,
        restaurant_id: &RestaurantId,
    ) -> Result<Order, RepositoryError> {
        // The insert is a no-op when another turn won the race; the select
        // below reads whichever row survived.
        sqlx::query(
            r#"
            INSERT INTO orders (id, call_id, restaurant_id, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(call_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&call_id.0)
        .bind(&restaurant_id.0)
        .bind(OrderStatus::Pending.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.find_by_call_id(call_id)
            .await?
            .ok_or_else(|| RepositoryError::OrderNotFound(call_id.0.clone()))
    }

    async fn find_by_call_id(&self, call_id: &CallId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                id, call_id, restaurant_id, status, fulfillment_type, address,
                pickup_branch, pickup_time, booking_party_size, booking_time,
                created_at
            FROM orders
            WHERE call_id = ?1
            "#,
        )
        .bind(&call_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut order = order_from_row(&row)?;
        order.items = self.load_items(&order.id).await?;
        Ok(Some(order))
    }

    async fn reconcile_item(
        &self,
        order_id: &OrderId,
        item: OrderItem,
    ) -> Result<(), RepositoryError> {
        let modifications = if item.modifications.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&item.modifications).map_err(|error| {
                RepositoryError::Decode(format!("order_item.modifications: {error}"))
            })?)
        };

        let mut tx = self.pool.begin().await?;

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM order_item WHERE order_id = ?1 AND menu_item_id = ?2",
        )
        .bind(&order_id.0)
        .bind(&item.menu_item_id.0)
        .fetch_optional(&mut *tx)
        .await?;

        match existing {
            Some(row_id) => {
                sqlx::query(
                    "UPDATE order_item SET quantity = ?1, modifications = ?2 WHERE id = ?3",
                )
                .bind(i64::from(item.quantity))
                .bind(modifications.as_deref())
                .bind(&row_id)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO order_item (id, order_id, menu_item_id, quantity, modifications)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(&order_id.0)
                .bind(&item.menu_item_id.0)
                .bind(i64::from(item.quantity))
                .bind(modifications.as_deref())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_fulfillment_type(
        &self,
        order_id: &OrderId,
        fulfillment_type: FulfillmentType,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE orders SET fulfillment_type = ?1 WHERE id = ?2")
            .bind(fulfillment_type.as_str())
            .bind(&order_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_address(&self, order_id: &OrderId, address: &str) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE orders SET address = ?1 WHERE id = ?2")
            .bind(address)
            .bind(&order_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_table_booking(
        &self,
        order_id: &OrderId,
        party_size: u32,
        time: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET fulfillment_type = ?1, booking_party_size = ?2, booking_time = ?3
            WHERE id = ?4
            "#,
        )
        .bind(FulfillmentType::TableBooking.as_str())
        .bind(i64::from(party_size))
        .bind(time)
        .bind(&order_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_pickup(
        &self,
        order_id: &OrderId,
        branch: &str,
        time: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET fulfillment_type = ?1, pickup_branch = ?2, pickup_time = ?3
            WHERE id = ?4
            "#,
        )
        .bind(FulfillmentType::Pickup.as_str())
        .bind(branch)
        .bind(time)
        .bind(&order_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE orders SET status = ?1 WHERE id = ?2")
            .bind(status.as_str())
            .bind(&order_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_event(&self, event: TranscriptEvent) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(&event.entry)
            .map_err(|error| RepositoryError::Decode(format!("order_event.payload: {error}")))?;

        sqlx::query(
            r#"
            INSERT INTO order_event (id, order_id, kind, payload, occurred_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.order_id.0)
        .bind(event.entry.kind())
        .bind(payload)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_events(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<TranscriptEvent>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, payload, occurred_at
            FROM order_event
            WHERE order_id = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(&order_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(event_from_row).collect()
    }

    async fn count_events(&self, order_id: &OrderId) -> Result<i64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM order_event WHERE order_id = ?1")
                .bind(&order_id.0)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

fn order_from_row(row: &SqliteRow) -> Result<Order, RepositoryError> {
    let status_text: String = row.get("status");
    let status = OrderStatus::from_str(&status_text)
        .map_err(|error| RepositoryError::Decode(format!("orders.status: {error}")))?;

    let fulfillment_type = row
        .get::<Option<String>, _>("fulfillment_type")
        .map(|value| {
            FulfillmentType::from_str(&value).map_err(|error| {
                RepositoryError::Decode(format!("orders.fulfillment_type: {error}"))
            })
        })
        .transpose()?;

    let created_at_text: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at_text)
        .map_err(|error| RepositoryError::Decode(format!("orders.created_at: {error}")))?
        .with_timezone(&Utc);

    Ok(Order {
        id: OrderId(row.get("id")),
        call_id: CallId(row.get("call_id")),
        restaurant_id: RestaurantId(row.get("restaurant_id")),
        status,
        fulfillment_type,
        address: row.get("address"),
        pickup_branch: row.get("pickup_branch"),
        pickup_time: row.get("pickup_time"),
        booking_party_size: row
            .get::<Option<i64>, _>("booking_party_size")
            .map(|value| value as u32),
        booking_time: row.get("booking_time"),
        items: Vec::new(),
        created_at,
    })
}

fn order_item_from_row(row: &SqliteRow) -> Result<OrderItem, RepositoryError> {
    let modifications = match row.get::<Option<String>, _>("modifications") {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|error| RepositoryError::Decode(format!("order_item.modifications: {error}")))?,
        None => Vec::new(),
    };

    Ok(OrderItem {
        menu_item_id: MenuItemId(row.get("menu_item_id")),
        menu_item_name: row.get("menu_item_name"),
        quantity: row.get::<i64, _>("quantity") as u32,
        modifications,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<TranscriptEvent, RepositoryError> {
    let payload: String = row.get("payload");
    let entry: TranscriptEntry = serde_json::from_str(&payload)
        .map_err(|error| RepositoryError::Decode(format!("order_event.payload: {error}")))?;

    let occurred_at_text: String = row.get("occurred_at");
    let occurred_at = DateTime::parse_from_rfc3339(&occurred_at_text)
        .map_err(|error| RepositoryError::Decode(format!("order_event.occurred_at: {error}")))?
        .with_timezone(&Utc);

    Ok(TranscriptEvent {
        event_id: row.get("id"),
        order_id: OrderId(row.get("order_id")),
        entry,
        occurred_at,
    })
}

#[cfg(test)]
mod tests {
    use orderline_core::domain::order::{CallId, FulfillmentType, OrderItem, OrderStatus};
    use orderline_core::domain::restaurant::{MenuItemId, RestaurantId};
    use orderline_core::transcript::{ToolOutcomeKind, TranscriptEntry, TranscriptEvent};

    use crate::repositories::{OrderRepository, SqlOrderRepository};
    use crate::{connect_with_settings, migrations};

    async fn seeded_pool() -> crate::DbPool {
        // One connection keeps the in-memory database alive and private to
        // the test.
        seeded_pool_at("sqlite::memory:", 1).await
    }

    async fn seeded_pool_at(database_url: &str, max_connections: u32) -> crate::DbPool {
        let pool =
            connect_with_settings(database_url, max_connections, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO restaurant (id, name, phone_number) VALUES ('rest-1', 'Spice Route', '+15550100')",
        )
        .execute(&pool)
        .await
        .expect("insert restaurant");
        sqlx::query(
            "INSERT INTO menu_item (id, restaurant_id, category_id, name, price)
             VALUES ('mi-1', 'rest-1', NULL, 'Chicken Biryani', '9.99'),
                    ('mi-2', 'rest-1', NULL, 'Cola', '2.50')",
        )
        .execute(&pool)
        .await
        .expect("insert menu items");

        pool
    }

    fn ids() -> (CallId, RestaurantId) {
        (CallId("CA-100".to_string()), RestaurantId("rest-1".to_string()))
    }

    #[tokio::test]
    async fn get_or_create_returns_the_same_order_for_repeat_calls() {
        let pool = seeded_pool().await;
        let repo = SqlOrderRepository::new(pool.clone());
        let (call_id, restaurant_id) = ids();

        let first = repo.get_or_create(&call_id, &restaurant_id).await.expect("first create");
        let second = repo.get_or_create(&call_id, &restaurant_id).await.expect("second create");

        assert_eq!(first.id, second.id);
        assert_eq!(first.status, OrderStatus::Pending);

        let order_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM orders WHERE call_id = 'CA-100'")
                .fetch_one(&pool)
                .await
                .expect("count orders");
        assert_eq!(order_count, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn concurrent_first_turns_converge_on_one_order() {
        let pool =
            seeded_pool_at("sqlite:file:concurrent_first_turns?mode=memory&cache=shared", 5).await;
        let repo_a = SqlOrderRepository::new(pool.clone());
        let repo_b = SqlOrderRepository::new(pool.clone());
        let (call_id, restaurant_id) = ids();

        let (left, right) = tokio::join!(
            repo_a.get_or_create(&call_id, &restaurant_id),
            repo_b.get_or_create(&call_id, &restaurant_id),
        );

        let left = left.expect("left create");
        let right = right.expect("right create");
        assert_eq!(left.id, right.id);

        pool.close().await;
    }

    #[tokio::test]
    async fn reconcile_item_updates_in_place_without_duplicating_rows() {
        let pool = seeded_pool().await;
        let repo = SqlOrderRepository::new(pool.clone());
        let (call_id, restaurant_id) = ids();
        let order = repo.get_or_create(&call_id, &restaurant_id).await.expect("create");

        let first = OrderItem::new(MenuItemId("mi-1".to_string()), "Chicken Biryani", 2, Vec::new())
            .expect("item");
        repo.reconcile_item(&order.id, first).await.expect("insert item");

        let second = OrderItem::new(
            MenuItemId("mi-1".to_string()),
            "Chicken Biryani",
            3,
            vec!["extra spicy".to_string()],
        )
        .expect("item");
        repo.reconcile_item(&order.id, second).await.expect("update item");

        let reloaded = repo.find_by_call_id(&call_id).await.expect("reload").expect("order");
        assert_eq!(reloaded.items.len(), 1);
        assert_eq!(reloaded.items[0].quantity, 3);
        assert_eq!(reloaded.items[0].modifications, vec!["extra spicy".to_string()]);

        let row_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM order_item WHERE order_id = ?1 AND menu_item_id = 'mi-1'",
        )
        .bind(&order.id.0)
        .fetch_one(&pool)
        .await
        .expect("count rows");
        assert_eq!(row_count, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn fulfillment_fields_round_trip() {
        let pool = seeded_pool().await;
        let repo = SqlOrderRepository::new(pool.clone());
        let (call_id, restaurant_id) = ids();
        let order = repo.get_or_create(&call_id, &restaurant_id).await.expect("create");

        repo.set_fulfillment_type(&order.id, FulfillmentType::Delivery)
            .await
            .expect("set fulfillment");
        repo.set_address(&order.id, "12 Oak St").await.expect("set address");

        let reloaded = repo.find_by_call_id(&call_id).await.expect("reload").expect("order");
        assert_eq!(reloaded.fulfillment_type, Some(FulfillmentType::Delivery));
        assert_eq!(reloaded.address.as_deref(), Some("12 Oak St"));

        repo.set_table_booking(&order.id, 4, "19:30").await.expect("set booking");
        let booked = repo.find_by_call_id(&call_id).await.expect("reload").expect("order");
        assert_eq!(booked.fulfillment_type, Some(FulfillmentType::TableBooking));
        assert_eq!(booked.booking_party_size, Some(4));
        assert_eq!(booked.booking_time.as_deref(), Some("19:30"));

        repo.set_pickup(&order.id, "Downtown", "18:00").await.expect("set pickup");
        let pickup = repo.find_by_call_id(&call_id).await.expect("reload").expect("order");
        assert_eq!(pickup.fulfillment_type, Some(FulfillmentType::Pickup));
        assert_eq!(pickup.pickup_branch.as_deref(), Some("Downtown"));

        pool.close().await;
    }

    #[tokio::test]
    async fn transcript_events_append_in_order_and_only_grow() {
        let pool = seeded_pool().await;
        let repo = SqlOrderRepository::new(pool.clone());
        let (call_id, restaurant_id) = ids();
        let order = repo.get_or_create(&call_id, &restaurant_id).await.expect("create");

        assert_eq!(repo.count_events(&order.id).await.expect("count"), 0);

        repo.append_event(TranscriptEvent::new(
            order.id.clone(),
            TranscriptEntry::CallerTurn { text: "two biryanis please".to_string() },
        ))
        .await
        .expect("append caller turn");
        repo.append_event(TranscriptEvent::new(
            order.id.clone(),
            TranscriptEntry::ToolOutcome {
                tool: "set_or_modify_items".to_string(),
                outcome: ToolOutcomeKind::Success,
                message: "Order created or modified successfully.".to_string(),
            },
        ))
        .await
        .expect("append tool outcome");

        assert_eq!(repo.count_events(&order.id).await.expect("count"), 2);

        let events = repo.list_events(&order.id).await.expect("list events");
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].entry, TranscriptEntry::CallerTurn { .. }));
        assert!(matches!(events[1].entry, TranscriptEntry::ToolOutcome { .. }));

        pool.close().await;
    }
}
