use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::restaurant::{MenuItemId, RestaurantId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

/// Telephony-provided call identifier. One call maps to exactly one order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Unpaid,
    Confirmed,
    InProgress,
    Ready,
    OutForDelivery,
    Completed,
    Cancelled,
    Failed,
    CallBackRequested,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Unpaid => "UNPAID",
            Self::Confirmed => "CONFIRMED",
            Self::InProgress => "IN_PROGRESS",
            Self::Ready => "READY",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
            Self::CallBackRequested => "CALL_BACK_REQUESTED",
        }
    }

    /// States that stop the call flow from gathering further speech.
    /// Kitchen-side states past CONFIRMED belong to fulfillment tooling and
    /// never occur while a call is live.
    pub fn is_call_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Cancelled | Self::Failed | Self::CallBackRequested)
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "UNPAID" => Ok(Self::Unpaid),
            "CONFIRMED" => Ok(Self::Confirmed),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "READY" => Ok(Self::Ready),
            "OUT_FOR_DELIVERY" => Ok(Self::OutForDelivery),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            "FAILED" => Ok(Self::Failed),
            "CALL_BACK_REQUESTED" => Ok(Self::CallBackRequested),
            other => Err(DomainError::InvariantViolation(format!("unknown order status `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentType {
    Delivery,
    Pickup,
    TableBooking,
}

impl FulfillmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivery => "delivery",
            Self::Pickup => "pickup",
            Self::TableBooking => "table_booking",
        }
    }
}

impl std::str::FromStr for FulfillmentType {
    type Err = DomainError;

    /// Voice transcripts do not produce reliable underscores, so "pick up"
    /// and "table booking" normalize to their canonical spellings.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value
            .trim()
            .to_ascii_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
            .replace('-', "_");

        match normalized.as_str() {
            "delivery" => Ok(Self::Delivery),
            "pickup" | "pick_up" => Ok(Self::Pickup),
            "table_booking" => Ok(Self::TableBooking),
            _ => Err(DomainError::InvalidFulfillmentType(value.trim().to_string())),
        }
    }
}

/// One line of an order. At most one row exists per (order, menu item) pair;
/// re-mentioning an item updates this row instead of appending another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub menu_item_id: MenuItemId,
    pub menu_item_name: String,
    pub quantity: u32,
    pub modifications: Vec<String>,
}

impl OrderItem {
    pub fn new(
        menu_item_id: MenuItemId,
        menu_item_name: impl Into<String>,
        quantity: u32,
        modifications: Vec<String>,
    ) -> Result<Self, DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvariantViolation(
                "order item quantity must be positive".to_string(),
            ));
        }
        Ok(Self { menu_item_id, menu_item_name: menu_item_name.into(), quantity, modifications })
    }
}

/// Aggregate root for one phone call's order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub call_id: CallId,
    pub restaurant_id: RestaurantId,
    pub status: OrderStatus,
    pub fulfillment_type: Option<FulfillmentType>,
    pub address: Option<String>,
    pub pickup_branch: Option<String>,
    pub pickup_time: Option<String>,
    pub booking_party_size: Option<u32>,
    pub booking_time: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self.status, next),
            (Pending, Unpaid)
                | (Pending, Confirmed)
                | (Unpaid, Confirmed)
                | (Confirmed, InProgress)
                | (InProgress, Ready)
                | (Ready, OutForDelivery)
                | (Ready, Completed)
                | (OutForDelivery, Completed)
        ) || (!self.status.is_call_terminal()
            && self.status != OrderStatus::Completed
            && matches!(next, Cancelled | Failed | CallBackRequested))
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidStatusTransition { from: self.status, to: next })
    }

    /// Both legs of the confirmation gate: at least one item and a chosen
    /// fulfillment type. `confirm_order` refuses until this holds.
    pub fn ready_to_confirm(&self) -> Result<(), DomainError> {
        if self.items.is_empty() {
            return Err(DomainError::InvariantViolation(
                "order has no items; call set_or_modify_items first".to_string(),
            ));
        }
        if self.fulfillment_type.is_none() {
            return Err(DomainError::InvariantViolation(
                "order type is not set; call set_order_type first".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::restaurant::{MenuItemId, RestaurantId};
    use crate::errors::DomainError;

    use super::{CallId, FulfillmentType, Order, OrderId, OrderItem, OrderStatus};

    fn order(status: OrderStatus) -> Order {
        Order {
            id: OrderId("ord-1".to_string()),
            call_id: CallId("CA-100".to_string()),
            restaurant_id: RestaurantId("rest-1".to_string()),
            status,
            fulfillment_type: None,
            address: None,
            pickup_branch: None,
            pickup_time: None,
            booking_party_size: None,
            booking_time: None,
            items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn allows_pending_to_confirmed() {
        let mut order = order(OrderStatus::Pending);
        order.transition_to(OrderStatus::Confirmed).expect("pending -> confirmed");
        assert_eq!(order.status, OrderStatus::Confirmed);
    }

    #[test]
    fn blocks_pending_to_completed() {
        let mut order = order(OrderStatus::Pending);
        let error =
            order.transition_to(OrderStatus::Completed).expect_err("pending -> completed fails");
        assert!(matches!(error, DomainError::InvalidStatusTransition { .. }));
    }

    #[test]
    fn call_back_reachable_from_non_terminal_states() {
        for status in [OrderStatus::Pending, OrderStatus::Unpaid, OrderStatus::InProgress] {
            let mut order = order(status);
            order.transition_to(OrderStatus::CallBackRequested).expect("-> call back");
        }

        let mut confirmed = order(OrderStatus::Confirmed);
        assert!(confirmed.transition_to(OrderStatus::CallBackRequested).is_err());
    }

    #[test]
    fn confirmed_ends_the_call_flow() {
        assert!(OrderStatus::Confirmed.is_call_terminal());
        assert!(OrderStatus::CallBackRequested.is_call_terminal());
        assert!(!OrderStatus::Pending.is_call_terminal());
    }

    #[test]
    fn fulfillment_type_parses_spoken_variants() {
        assert_eq!("delivery".parse::<FulfillmentType>().expect("delivery"), FulfillmentType::Delivery);
        assert_eq!("Pick up".parse::<FulfillmentType>().expect("pick up"), FulfillmentType::Pickup);
        assert_eq!(
            "table booking".parse::<FulfillmentType>().expect("table booking"),
            FulfillmentType::TableBooking
        );
        assert!("drone drop".parse::<FulfillmentType>().is_err());
    }

    #[test]
    fn order_item_rejects_zero_quantity() {
        let error = OrderItem::new(MenuItemId("mi-1".to_string()), "Cola", 0, Vec::new())
            .expect_err("zero quantity");
        assert!(matches!(error, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn confirmation_gate_requires_items_and_order_type() {
        let mut bare = order(OrderStatus::Pending);
        assert!(bare.ready_to_confirm().is_err());

        bare.items.push(
            OrderItem::new(MenuItemId("mi-1".to_string()), "Cola", 1, Vec::new()).expect("item"),
        );
        assert!(bare.ready_to_confirm().is_err(), "items alone are not enough");

        bare.fulfillment_type = Some(FulfillmentType::Delivery);
        bare.ready_to_confirm().expect("items + order type clears the gate");
    }
}
