use async_trait::async_trait;
use thiserror::Error;

use orderline_core::domain::order::{
    CallId, FulfillmentType, Order, OrderId, OrderItem, OrderStatus,
};
use orderline_core::domain::restaurant::{Menu, Restaurant, RestaurantId};
use orderline_core::transcript::TranscriptEvent;

pub mod memory;
pub mod order;
pub mod restaurant;
pub mod settings;

pub use memory::{InMemoryOrderRepository, InMemoryRestaurantRepository, InMemorySettingsRepository};
pub use order::SqlOrderRepository;
pub use restaurant::SqlRestaurantRepository;
pub use settings::SqlSettingsRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unknown order for call `{0}`")]
    OrderNotFound(String),
}

/// Read-only view of restaurants and their menus. Writes belong to the
/// admin surface, never to the call path.
#[async_trait]
pub trait RestaurantRepository: Send + Sync {
    async fn find_by_phone(&self, phone_number: &str)
        -> Result<Option<Restaurant>, RepositoryError>;

    async fn menu(&self, restaurant_id: &RestaurantId) -> Result<Menu, RepositoryError>;
}

/// Mutations on one call's order. Every write is keyed by the call id or the
/// order id derived from it; cross-call state never mixes.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Race-safe get-or-create: concurrent first turns for the same call id
    /// converge on a single row via the `orders.call_id` uniqueness
    /// constraint.
    async fn get_or_create(
        &self,
        call_id: &CallId,
        restaurant_id: &RestaurantId,
    ) -> Result<Order, RepositoryError>;

    /// Loads the order with its items, or `None` when the call is unknown.
    async fn find_by_call_id(&self, call_id: &CallId) -> Result<Option<Order>, RepositoryError>;

    /// Snapshot reconciliation for one item: update quantity/modifications
    /// in place when the `(order, menu_item)` row exists, insert otherwise.
    /// Runs inside a single transaction.
    async fn reconcile_item(
        &self,
        order_id: &OrderId,
        item: OrderItem,
    ) -> Result<(), RepositoryError>;

    async fn set_fulfillment_type(
        &self,
        order_id: &OrderId,
        fulfillment_type: FulfillmentType,
    ) -> Result<(), RepositoryError>;

    async fn set_address(&self, order_id: &OrderId, address: &str) -> Result<(), RepositoryError>;

    async fn set_table_booking(
        &self,
        order_id: &OrderId,
        party_size: u32,
        time: &str,
    ) -> Result<(), RepositoryError>;

    async fn set_pickup(
        &self,
        order_id: &OrderId,
        branch: &str,
        time: &str,
    ) -> Result<(), RepositoryError>;

    async fn set_status(
        &self,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError>;

    /// Appends one transcript event. The transcript only ever grows.
    async fn append_event(&self, event: TranscriptEvent) -> Result<(), RepositoryError>;

    async fn list_events(&self, order_id: &OrderId)
        -> Result<Vec<TranscriptEvent>, RepositoryError>;

    async fn count_events(&self, order_id: &OrderId) -> Result<i64, RepositoryError>;
}

/// Runtime-tunable text looked up by fixed keys (greeting, reprompt,
/// goodbye). Values are maintained through the admin surface.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;
}
