use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use orderline_core::domain::order::{
    CallId, FulfillmentType, Order, OrderId, OrderItem, OrderStatus,
};
use orderline_core::domain::restaurant::{Menu, MenuItem, Restaurant, RestaurantId};
use orderline_core::transcript::TranscriptEvent;

use super::{
    OrderRepository, RepositoryError, RestaurantRepository, SettingsRepository,
};

/// In-memory doubles for agent and driver tests. Same contracts as the SQL
/// implementations, no database.
#[derive(Default)]
pub struct InMemoryRestaurantRepository {
    restaurants: RwLock<Vec<Restaurant>>,
    menu_items: RwLock<HashMap<String, Vec<MenuItem>>>,
}

impl InMemoryRestaurantRepository {
    pub async fn insert(&self, restaurant: Restaurant, items: Vec<MenuItem>) {
        self.menu_items.write().await.insert(restaurant.id.0.clone(), items);
        self.restaurants.write().await.push(restaurant);
    }
}

#[async_trait]
impl RestaurantRepository for InMemoryRestaurantRepository {
    async fn find_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<Restaurant>, RepositoryError> {
        let restaurants = self.restaurants.read().await;
        Ok(restaurants.iter().find(|value| value.phone_number == phone_number).cloned())
    }

    async fn menu(&self, restaurant_id: &RestaurantId) -> Result<Menu, RepositoryError> {
        let menu_items = self.menu_items.read().await;
        Ok(Menu {
            restaurant_id: restaurant_id.clone(),
            items: menu_items.get(&restaurant_id.0).cloned().unwrap_or_default(),
        })
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, Order>>,
    events: RwLock<Vec<TranscriptEvent>>,
}

impl InMemoryOrderRepository {
    async fn update_order<F>(&self, order_id: &OrderId, apply: F) -> Result<(), RepositoryError>
    where
        F: FnOnce(&mut Order),
    {
        let mut orders = self.orders.write().await;
        let order = orders
            .values_mut()
            .find(|value| value.id == *order_id)
            .ok_or_else(|| RepositoryError::OrderNotFound(order_id.0.clone()))?;
        apply(order);
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn get_or_create(
        &self,
        call_id: &CallId,
        restaurant_id: &RestaurantId,
    ) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;
        let order = orders.entry(call_id.0.clone()).or_insert_with(|| Order {
            id: OrderId(Uuid::new_v4().to_string()),
            call_id: call_id.clone(),
            restaurant_id: restaurant_id.clone(),
            status: OrderStatus::Pending,
            fulfillment_type: None,
            address: None,
            pickup_branch: None,
            pickup_time: None,
            booking_party_size: None,
            booking_time: None,
            items: Vec::new(),
            created_at: Utc::now(),
        });
        Ok(order.clone())
    }

    async fn find_by_call_id(&self, call_id: &CallId) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&call_id.0).cloned())
    }

    async fn reconcile_item(
        &self,
        order_id: &OrderId,
        item: OrderItem,
    ) -> Result<(), RepositoryError> {
        self.update_order(order_id, |order| {
            match order
                .items
                .iter_mut()
                .find(|existing| existing.menu_item_id == item.menu_item_id)
            {
                Some(existing) => {
                    existing.quantity = item.quantity;
                    existing.modifications = item.modifications;
                }
                None => order.items.push(item),
            }
        })
        .await
    }

    async fn set_fulfillment_type(
        &self,
        order_id: &OrderId,
        fulfillment_type: FulfillmentType,
    ) -> Result<(), RepositoryError> {
        self.update_order(order_id, |order| order.fulfillment_type = Some(fulfillment_type)).await
    }

    async fn set_address(&self, order_id: &OrderId, address: &str) -> Result<(), RepositoryError> {
        let address = address.to_string();
        self.update_order(order_id, move |order| order.address = Some(address)).await
    }

    async fn set_table_booking(
        &self,
        order_id: &OrderId,
        party_size: u32,
        time: &str,
    ) -> Result<(), RepositoryError> {
        let time = time.to_string();
        self.update_order(order_id, move |order| {
            order.fulfillment_type = Some(FulfillmentType::TableBooking);
            order.booking_party_size = Some(party_size);
            order.booking_time = Some(time);
        })
        .await
    }

    async fn set_pickup(
        &self,
        order_id: &OrderId,
        branch: &str,
        time: &str,
    ) -> Result<(), RepositoryError> {
        let branch = branch.to_string();
        let time = time.to_string();
        self.update_order(order_id, move |order| {
            order.fulfillment_type = Some(FulfillmentType::Pickup);
            order.pickup_branch = Some(branch);
            order.pickup_time = Some(time);
        })
        .await
    }

    async fn set_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        self.update_order(order_id, |order| order.status = status).await
    }

    async fn append_event(&self, event: TranscriptEvent) -> Result<(), RepositoryError> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn list_events(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<TranscriptEvent>, RepositoryError> {
        let events = self.events.read().await;
        Ok(events.iter().filter(|event| event.order_id == *order_id).cloned().collect())
    }

    async fn count_events(&self, order_id: &OrderId) -> Result<i64, RepositoryError> {
        Ok(self.list_events(order_id).await?.len() as i64)
    }
}

#[derive(Default)]
pub struct InMemorySettingsRepository {
    values: RwLock<HashMap<String, String>>,
}

impl InMemorySettingsRepository {
    pub async fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().await.insert(key.into(), value.into());
    }
}

#[async_trait]
impl SettingsRepository for InMemorySettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let values = self.values.read().await;
        Ok(values.get(key).cloned())
    }
}
