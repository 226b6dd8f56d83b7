//! The fixed tool set the agent may invoke. Each operation is a small
//! transaction: validate, mutate the order store, append one transcript
//! audit event, and answer with a structured `{status, message}` result.
//! Nothing here ever panics or raises past `dispatch` - the model always
//! gets a result it can speak about.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use orderline_core::catalog::CatalogResolver;
use orderline_core::domain::order::{CallId, FulfillmentType, Order, OrderItem, OrderStatus};
use orderline_core::domain::restaurant::{Menu, Restaurant};
use orderline_core::transcript::{ToolOutcomeKind, TranscriptEntry, TranscriptEvent};
use orderline_db::repositories::{OrderRepository, RestaurantRepository};

use crate::llm::ToolSchema;

/// Session-scoped dependencies shared by every tool. The menu is the
/// snapshot frozen when the agent definition was built for this call.
pub struct ToolContext {
    pub call_id: CallId,
    pub restaurant: Restaurant,
    pub menu: Menu,
    pub resolver: CatalogResolver,
    pub orders: Arc<dyn OrderRepository>,
    pub restaurants: Arc<dyn RestaurantRepository>,
}

impl ToolContext {
    /// Best-effort audit append. The transcript line must survive even when
    /// the operation itself failed; a failure to write the line is logged
    /// and swallowed.
    async fn append_outcome(&self, tool: &str, outcome: ToolOutcomeKind, message: &str) {
        let order = match self.orders.find_by_call_id(&self.call_id).await {
            Ok(Some(order)) => order,
            Ok(None) => return,
            Err(error) => {
                warn!(
                    event_name = "agent.tools.audit_lookup_failed",
                    call_id = %self.call_id.0,
                    tool,
                    error = %error,
                    "could not resolve order for audit line"
                );
                return;
            }
        };

        let event = TranscriptEvent::new(
            order.id,
            TranscriptEntry::ToolOutcome {
                tool: tool.to_string(),
                outcome,
                message: message.to_string(),
            },
        );
        if let Err(error) = self.orders.append_event(event).await {
            warn!(
                event_name = "agent.tools.audit_append_failed",
                call_id = %self.call_id.0,
                tool,
                error = %error,
                "could not append audit line"
            );
        }
    }

    async fn find_order(&self, session_id: &str) -> Result<Option<Order>> {
        Ok(self.orders.find_by_call_id(&CallId(session_id.to_string())).await?)
    }
}

pub fn success_result(message: impl Into<String>) -> Value {
    json!({"status": "success", "message": message.into()})
}

pub fn error_result(message: impl Into<String>) -> Value {
    json!({"status": "error", "message": message.into()})
}

fn result_message(result: &Value) -> String {
    result.get("message").and_then(Value::as_str).unwrap_or_default().to_string()
}

fn result_outcome(result: &Value) -> ToolOutcomeKind {
    match result.get("status").and_then(Value::as_str) {
        Some("success") => ToolOutcomeKind::Success,
        _ => ToolOutcomeKind::Error,
    }
}

fn parse_args<T: DeserializeOwned>(tool: &'static str, arguments: Value) -> Result<T, Value> {
    serde_json::from_value(arguments)
        .map_err(|error| error_result(format!("Invalid arguments for {tool}: {error}.")))
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> Value;

    /// Expected failures (validation, lookups) come back as `Ok` with an
    /// error result; `Err` is reserved for unexpected storage faults and is
    /// converted to a generic result by the registry.
    async fn execute(&self, arguments: Value) -> Result<Value>;
}

pub struct ToolRegistry {
    context: Arc<ToolContext>,
    tools: HashMap<&'static str, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registers the complete dispatch set for one call session.
    pub fn for_session(context: ToolContext) -> Self {
        let context = Arc::new(context);
        let mut registry = Self { context: context.clone(), tools: HashMap::new() };

        registry.register(GetMenuTool { context: context.clone() });
        registry.register(SetOrModifyItemsTool { context: context.clone() });
        registry.register(SetOrderTypeTool { context: context.clone() });
        registry.register(SetAddressTool { context: context.clone() });
        registry.register(SetTableBookingTool { context: context.clone() });
        registry.register(SetPickUpBranchTool { context: context.clone() });
        registry.register(ConfirmOrderTool { context: context.clone() });
        registry.register(CallBackTool { context: context.clone() });
        registry.register(TransferToHumanTool { context });

        registry
    }

    fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas = self
            .tools
            .values()
            .map(|tool| ToolSchema {
                name: tool.name(),
                description: tool.description(),
                parameters: tool.parameters(),
            })
            .collect::<Vec<_>>();
        schemas.sort_by_key(|schema| schema.name);
        schemas
    }

    /// Runs one tool invocation to completion. Never fails: unknown tools
    /// and unexpected faults both come back as structured error results,
    /// with the audit line still written.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> Value {
        let Some(tool) = self.tools.get(name) else {
            let result = error_result(format!("Unknown tool '{name}'."));
            self.context
                .append_outcome(name, ToolOutcomeKind::Error, &result_message(&result))
                .await;
            return result;
        };

        match tool.execute(arguments).await {
            Ok(result) => {
                self.context
                    .append_outcome(name, result_outcome(&result), &result_message(&result))
                    .await;
                result
            }
            Err(error) => {
                warn!(
                    event_name = "agent.tools.unexpected_failure",
                    call_id = %self.context.call_id.0,
                    tool = name,
                    error = %error,
                    "tool operation failed unexpectedly"
                );
                let result = error_result(format!("An unexpected error occurred: {error}."));
                self.context
                    .append_outcome(name, ToolOutcomeKind::Error, &result_message(&result))
                    .await;
                result
            }
        }
    }
}

fn session_only_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "session_id": {"type": "string", "description": "Unique identifier for the order."},
        },
        "required": ["session_id"],
    })
}

// --- get_menu ---

struct GetMenuTool {
    context: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct GetMenuArgs {
    restaurant_phone: String,
}

#[async_trait]
impl Tool for GetMenuTool {
    fn name(&self) -> &'static str {
        "get_menu"
    }

    fn description(&self) -> &'static str {
        "Get the menu of the restaurant with the given phone number, grouped by category."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "restaurant_phone": {
                    "type": "string",
                    "description": "Phone number of the restaurant.",
                },
            },
            "required": ["restaurant_phone"],
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: GetMenuArgs = match parse_args(self.name(), arguments) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let Some(restaurant) = self.context.restaurants.find_by_phone(&args.restaurant_phone).await?
        else {
            return Ok(error_result(format!(
                "Restaurant with phone number '{}' not found.",
                args.restaurant_phone
            )));
        };

        let menu = self.context.restaurants.menu(&restaurant.id).await?;

        let mut sections: Map<String, Value> = Map::new();
        for item in &menu.items {
            let category = item.category.clone().unwrap_or_else(|| "Other".to_string());
            let section = sections.entry(category).or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(entries) = section {
                entries.insert(item.name.clone(), Value::String(item.price.to_string()));
            }
        }

        let mut result = success_result("Menu retrieved successfully.");
        result["menu"] = Value::Object(sections);
        Ok(result)
    }
}

// --- set_or_modify_items ---

struct SetOrModifyItemsTool {
    context: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct ItemArg {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    quantity: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ModificationArg {
    #[serde(default)]
    item_name: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetOrModifyItemsArgs {
    session_id: String,
    items: Vec<ItemArg>,
    #[serde(default)]
    modifications: Vec<ModificationArg>,
}

#[async_trait]
impl Tool for SetOrModifyItemsTool {
    fn name(&self) -> &'static str {
        "set_or_modify_items"
    }

    fn description(&self) -> &'static str {
        "Create or modify the order. Always pass the complete current list of items; \
         existing items are updated in place, new ones are added."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {"type": "string", "description": "Unique identifier for the order."},
                "items": {
                    "type": "array",
                    "description": "The full current snapshot of ordered items.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "quantity": {"type": "integer", "minimum": 1},
                        },
                        "required": ["name", "quantity"],
                    },
                },
                "modifications": {
                    "type": "array",
                    "description": "Special requests, each tied to an item by name.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "item_name": {"type": "string"},
                            "details": {"type": "string"},
                        },
                        "required": ["item_name", "details"],
                    },
                },
            },
            "required": ["session_id", "items"],
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: SetOrModifyItemsArgs = match parse_args(self.name(), arguments) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let order = self
            .context
            .orders
            .get_or_create(&CallId(args.session_id.clone()), &self.context.restaurant.id)
            .await?;

        let menu_names = self.context.menu.item_names();
        let mut processed_items = Vec::new();

        for item in &args.items {
            let (Some(name), Some(quantity)) = (item.name.as_deref(), item.quantity) else {
                return Ok(error_result("Each item must have 'name' and 'quantity'."));
            };
            if name.trim().is_empty() || quantity == 0 {
                return Ok(error_result("Each item must have 'name' and 'quantity'."));
            }

            let Some(matched) = self.context.resolver.resolve(name, menu_names.iter().copied())
            else {
                return Ok(error_result(format!("Item '{name}' not found in menu.")));
            };
            // resolve() only returns names taken from the menu itself
            let menu_item = self
                .context
                .menu
                .item_by_name(&matched.name)
                .ok_or_else(|| anyhow::anyhow!("resolved item `{}` missing from menu", matched.name))?;

            let item_modifications = args
                .modifications
                .iter()
                .filter(|modification| modification.item_name.as_deref() == Some(name))
                .filter_map(|modification| modification.details.clone())
                .collect::<Vec<_>>();

            let order_item = match OrderItem::new(
                menu_item.id.clone(),
                menu_item.name.clone(),
                quantity,
                item_modifications.clone(),
            ) {
                Ok(order_item) => order_item,
                Err(error) => return Ok(error_result(error.to_string())),
            };

            // One transaction per item; earlier items stay committed if a
            // later one fails.
            self.context.orders.reconcile_item(&order.id, order_item).await?;

            processed_items.push(json!({
                "name": menu_item.name,
                "quantity": quantity,
                "modifications": item_modifications,
            }));
        }

        let mut result = success_result("Order created or modified successfully.");
        result["ordered_items"] = Value::Array(processed_items);
        Ok(result)
    }
}

// --- set_order_type ---

struct SetOrderTypeTool {
    context: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct SetOrderTypeArgs {
    session_id: String,
    order_type: String,
}

#[async_trait]
impl Tool for SetOrderTypeTool {
    fn name(&self) -> &'static str {
        "set_order_type"
    }

    fn description(&self) -> &'static str {
        "Set the type of the order. Valid values: 'delivery', 'pickup', 'table_booking'."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {"type": "string", "description": "Unique identifier for the order."},
                "order_type": {
                    "type": "string",
                    "enum": ["delivery", "pickup", "table_booking"],
                },
            },
            "required": ["session_id", "order_type"],
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: SetOrderTypeArgs = match parse_args(self.name(), arguments) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let fulfillment_type: FulfillmentType = match args.order_type.parse() {
            Ok(fulfillment_type) => fulfillment_type,
            Err(error) => return Ok(error_result(format!("{error}."))),
        };

        let order = self
            .context
            .orders
            .get_or_create(&CallId(args.session_id), &self.context.restaurant.id)
            .await?;
        self.context.orders.set_fulfillment_type(&order.id, fulfillment_type).await?;

        Ok(success_result("Order type set successfully."))
    }
}

// --- set_address ---

struct SetAddressTool {
    context: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct SetAddressArgs {
    session_id: String,
    address: String,
}

#[async_trait]
impl Tool for SetAddressTool {
    fn name(&self) -> &'static str {
        "set_address"
    }

    fn description(&self) -> &'static str {
        "Set the delivery address for an order with order type 'delivery'."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {"type": "string", "description": "Unique identifier for the order."},
                "address": {"type": "string", "description": "Full delivery address."},
            },
            "required": ["session_id", "address"],
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: SetAddressArgs = match parse_args(self.name(), arguments) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let Some(order) = self.context.find_order(&args.session_id).await? else {
            return Ok(error_result("Order not found."));
        };
        self.context.orders.set_address(&order.id, args.address.trim()).await?;

        Ok(success_result("Address set successfully."))
    }
}

// --- set_table_booking ---

struct SetTableBookingTool {
    context: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct SetTableBookingArgs {
    session_id: String,
    party_size: u32,
    time: String,
}

#[async_trait]
impl Tool for SetTableBookingTool {
    fn name(&self) -> &'static str {
        "set_table_booking"
    }

    fn description(&self) -> &'static str {
        "Book a table: set the order type to table booking with a party size and a time."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {"type": "string", "description": "Unique identifier for the order."},
                "party_size": {"type": "integer", "minimum": 1},
                "time": {"type": "string", "description": "Requested booking time."},
            },
            "required": ["session_id", "party_size", "time"],
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: SetTableBookingArgs = match parse_args(self.name(), arguments) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        if args.party_size == 0 {
            return Ok(error_result("Party size must be at least 1."));
        }

        let Some(order) = self.context.find_order(&args.session_id).await? else {
            return Ok(error_result("Order not found."));
        };
        self.context.orders.set_table_booking(&order.id, args.party_size, args.time.trim()).await?;

        Ok(success_result("Table booking set successfully."))
    }
}

// --- set_pick_up_branch ---

struct SetPickUpBranchTool {
    context: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct SetPickUpBranchArgs {
    session_id: String,
    branch_name: String,
    time: String,
}

#[async_trait]
impl Tool for SetPickUpBranchTool {
    fn name(&self) -> &'static str {
        "set_pick_up_branch"
    }

    fn description(&self) -> &'static str {
        "Set the pickup branch and pickup time for an order with order type 'pickup'."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": {"type": "string", "description": "Unique identifier for the order."},
                "branch_name": {"type": "string", "description": "Name of the pickup location."},
                "time": {"type": "string", "description": "Desired pickup time."},
            },
            "required": ["session_id", "branch_name", "time"],
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: SetPickUpBranchArgs = match parse_args(self.name(), arguments) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let Some(order) = self.context.find_order(&args.session_id).await? else {
            return Ok(error_result("Order not found."));
        };
        self.context
            .orders
            .set_pickup(&order.id, args.branch_name.trim(), args.time.trim())
            .await?;

        Ok(success_result("Pickup branch and time set successfully."))
    }
}

// --- confirm_order ---

struct ConfirmOrderTool {
    context: Arc<ToolContext>,
}

#[derive(Debug, Deserialize)]
struct SessionArgs {
    session_id: String,
}

#[async_trait]
impl Tool for ConfirmOrderTool {
    fn name(&self) -> &'static str {
        "confirm_order"
    }

    fn description(&self) -> &'static str {
        "Mark the order as confirmed so the kitchen can start preparing. Requires items \
         and an order type to have been set already."
    }

    fn parameters(&self) -> Value {
        session_only_parameters()
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: SessionArgs = match parse_args(self.name(), arguments) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let Some(mut order) = self.context.find_order(&args.session_id).await? else {
            return Ok(error_result("Order not found."));
        };

        if let Err(error) = order.ready_to_confirm() {
            return Ok(error_result(format!("Cannot confirm: {error}.")));
        }
        if let Err(error) = order.transition_to(OrderStatus::Confirmed) {
            return Ok(error_result(format!("Cannot confirm: {error}.")));
        }
        self.context.orders.set_status(&order.id, OrderStatus::Confirmed).await?;

        Ok(success_result("Order confirmed."))
    }
}

// --- call_back ---

struct CallBackTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl Tool for CallBackTool {
    fn name(&self) -> &'static str {
        "call_back"
    }

    fn description(&self) -> &'static str {
        "Flag the order so staff call the customer back, and end the automated flow."
    }

    fn parameters(&self) -> Value {
        session_only_parameters()
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        let args: SessionArgs = match parse_args(self.name(), arguments) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let Some(mut order) = self.context.find_order(&args.session_id).await? else {
            return Ok(error_result("Order not found."));
        };

        if let Err(error) = order.transition_to(OrderStatus::CallBackRequested) {
            return Ok(error_result(format!("Cannot request a call back: {error}.")));
        }
        self.context.orders.set_status(&order.id, OrderStatus::CallBackRequested).await?;

        Ok(success_result("A member of staff will call you back shortly."))
    }
}

// --- transfer_to_human ---

struct TransferToHumanTool {
    context: Arc<ToolContext>,
}

#[async_trait]
impl Tool for TransferToHumanTool {
    fn name(&self) -> &'static str {
        "transfer_to_human"
    }

    fn description(&self) -> &'static str {
        "Hand the call over to a human operator. Does not change the order."
    }

    fn parameters(&self) -> Value {
        session_only_parameters()
    }

    async fn execute(&self, arguments: Value) -> Result<Value> {
        if let Err(result) = parse_args::<SessionArgs>(self.name(), arguments) {
            return Ok(result);
        }

        // No persisted state change; the transcript line is the signal the
        // operator side watches for.
        let _ = &self.context;
        Ok(success_result("Transferring you to a human operator."))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use serde_json::{json, Value};

    use orderline_core::catalog::CatalogResolver;
    use orderline_core::domain::order::{CallId, FulfillmentType, OrderStatus};
    use orderline_core::domain::restaurant::{
        Menu, MenuItem, MenuItemId, Restaurant, RestaurantId,
    };
    use orderline_core::transcript::TranscriptEntry;
    use orderline_db::repositories::{
        InMemoryOrderRepository, InMemoryRestaurantRepository, OrderRepository,
    };

    use super::{ToolContext, ToolRegistry};

    const CALL_ID: &str = "CA-1000";
    const PHONE: &str = "+15550100";

    fn restaurant() -> Restaurant {
        Restaurant {
            id: RestaurantId("rest-1".to_string()),
            name: "Spice Route".to_string(),
            phone_number: PHONE.to_string(),
        }
    }

    fn menu_items() -> Vec<MenuItem> {
        [("Chicken Biryani", 999, "Mains"), ("Butter Chicken", 1149, "Mains"), ("Cola", 250, "Drinks")]
            .iter()
            .enumerate()
            .map(|(index, (name, cents, category))| MenuItem {
                id: MenuItemId(format!("mi-{index}")),
                restaurant_id: RestaurantId("rest-1".to_string()),
                name: (*name).to_string(),
                price: Decimal::new(*cents, 2),
                category: Some((*category).to_string()),
            })
            .collect()
    }

    async fn registry() -> (ToolRegistry, Arc<InMemoryOrderRepository>) {
        let restaurants = Arc::new(InMemoryRestaurantRepository::default());
        restaurants.insert(restaurant(), menu_items()).await;
        let orders = Arc::new(InMemoryOrderRepository::default());

        // The driver creates the order before any tool runs.
        orders
            .get_or_create(&CallId(CALL_ID.to_string()), &RestaurantId("rest-1".to_string()))
            .await
            .expect("seed order");

        let context = ToolContext {
            call_id: CallId(CALL_ID.to_string()),
            restaurant: restaurant(),
            menu: Menu { restaurant_id: RestaurantId("rest-1".to_string()), items: menu_items() },
            resolver: CatalogResolver::default(),
            orders: orders.clone(),
            restaurants,
        };

        (ToolRegistry::for_session(context), orders)
    }

    async fn order(orders: &InMemoryOrderRepository) -> orderline_core::domain::order::Order {
        orders
            .find_by_call_id(&CallId(CALL_ID.to_string()))
            .await
            .expect("lookup")
            .expect("order")
    }

    fn items_payload(items: Value) -> Value {
        json!({"session_id": CALL_ID, "items": items})
    }

    #[tokio::test]
    async fn registry_exposes_the_full_dispatch_set() {
        let (registry, _) = registry().await;
        let names = registry.schemas().iter().map(|schema| schema.name).collect::<Vec<_>>();

        assert_eq!(registry.len(), 9);
        assert_eq!(
            names,
            vec![
                "call_back",
                "confirm_order",
                "get_menu",
                "set_address",
                "set_or_modify_items",
                "set_order_type",
                "set_pick_up_branch",
                "set_table_booking",
                "transfer_to_human",
            ]
        );
    }

    #[tokio::test]
    async fn snapshot_reconciliation_updates_existing_items_in_place() {
        let (registry, orders) = registry().await;

        let first = registry
            .dispatch(
                "set_or_modify_items",
                items_payload(json!([{"name": "Chicken Biryani", "quantity": 2}])),
            )
            .await;
        assert_eq!(first["status"], "success");

        // Same item re-sent with a new quantity plus a second item.
        let second = registry
            .dispatch(
                "set_or_modify_items",
                json!({
                    "session_id": CALL_ID,
                    "items": [
                        {"name": "Chicken Biryani", "quantity": 3},
                        {"name": "Cola", "quantity": 1},
                    ],
                    "modifications": [
                        {"item_name": "Chicken Biryani", "details": "extra spicy"},
                    ],
                }),
            )
            .await;
        assert_eq!(second["status"], "success");

        let order = order(&orders).await;
        assert_eq!(order.items.len(), 2);
        let biryani =
            order.items.iter().find(|item| item.menu_item_name == "Chicken Biryani").expect("row");
        assert_eq!(biryani.quantity, 3);
        assert_eq!(biryani.modifications, vec!["extra spicy".to_string()]);
    }

    #[tokio::test]
    async fn noisy_item_names_resolve_through_the_catalog() {
        let (registry, orders) = registry().await;

        let result = registry
            .dispatch(
                "set_or_modify_items",
                items_payload(json!([{"name": "byriani", "quantity": 1}])),
            )
            .await;

        assert_eq!(result["status"], "success");
        assert_eq!(result["ordered_items"][0]["name"], "Chicken Biryani");
        assert_eq!(order(&orders).await.items[0].menu_item_name, "Chicken Biryani");
    }

    #[tokio::test]
    async fn unknown_item_is_a_structured_not_found_error() {
        let (registry, orders) = registry().await;

        let result = registry
            .dispatch(
                "set_or_modify_items",
                items_payload(json!([{"name": "Sushi", "quantity": 1}])),
            )
            .await;

        assert_eq!(result["status"], "error");
        assert_eq!(result["message"], "Item 'Sushi' not found in menu.");
        assert!(order(&orders).await.items.is_empty());
    }

    #[tokio::test]
    async fn missing_quantity_is_a_validation_error() {
        let (registry, _) = registry().await;

        let result = registry
            .dispatch("set_or_modify_items", items_payload(json!([{"name": "Cola"}])))
            .await;

        assert_eq!(result["status"], "error");
        assert_eq!(result["message"], "Each item must have 'name' and 'quantity'.");
    }

    #[tokio::test]
    async fn order_type_is_validated_server_side() {
        let (registry, orders) = registry().await;

        let invalid = registry
            .dispatch("set_order_type", json!({"session_id": CALL_ID, "order_type": "drone drop"}))
            .await;
        assert_eq!(invalid["status"], "error");
        assert!(order(&orders).await.fulfillment_type.is_none());

        let valid = registry
            .dispatch("set_order_type", json!({"session_id": CALL_ID, "order_type": "delivery"}))
            .await;
        assert_eq!(valid["status"], "success");
        assert_eq!(order(&orders).await.fulfillment_type, Some(FulfillmentType::Delivery));
    }

    #[tokio::test]
    async fn delivery_address_round_trip() {
        let (registry, orders) = registry().await;

        registry
            .dispatch("set_order_type", json!({"session_id": CALL_ID, "order_type": "delivery"}))
            .await;
        let result = registry
            .dispatch("set_address", json!({"session_id": CALL_ID, "address": "12 Oak St"}))
            .await;

        assert_eq!(result["status"], "success");
        let order = order(&orders).await;
        assert_eq!(order.fulfillment_type, Some(FulfillmentType::Delivery));
        assert_eq!(order.address.as_deref(), Some("12 Oak St"));
    }

    #[tokio::test]
    async fn table_booking_sets_type_and_details_together() {
        let (registry, orders) = registry().await;

        let result = registry
            .dispatch(
                "set_table_booking",
                json!({"session_id": CALL_ID, "party_size": 4, "time": "19:30"}),
            )
            .await;

        assert_eq!(result["status"], "success");
        let order = order(&orders).await;
        assert_eq!(order.fulfillment_type, Some(FulfillmentType::TableBooking));
        assert_eq!(order.booking_party_size, Some(4));
        assert_eq!(order.booking_time.as_deref(), Some("19:30"));
    }

    #[tokio::test]
    async fn pickup_branch_sets_type_and_details_together() {
        let (registry, orders) = registry().await;

        let result = registry
            .dispatch(
                "set_pick_up_branch",
                json!({"session_id": CALL_ID, "branch_name": "Downtown", "time": "18:00"}),
            )
            .await;

        assert_eq!(result["status"], "success");
        let order = order(&orders).await;
        assert_eq!(order.fulfillment_type, Some(FulfillmentType::Pickup));
        assert_eq!(order.pickup_branch.as_deref(), Some("Downtown"));
    }

    #[tokio::test]
    async fn confirm_is_rejected_until_items_and_order_type_are_set() {
        let (registry, orders) = registry().await;

        let bare = registry.dispatch("confirm_order", json!({"session_id": CALL_ID})).await;
        assert_eq!(bare["status"], "error");
        assert_eq!(order(&orders).await.status, OrderStatus::Pending);

        registry
            .dispatch(
                "set_or_modify_items",
                items_payload(json!([{"name": "Cola", "quantity": 2}])),
            )
            .await;
        let still_gated = registry.dispatch("confirm_order", json!({"session_id": CALL_ID})).await;
        assert_eq!(still_gated["status"], "error");

        registry
            .dispatch("set_order_type", json!({"session_id": CALL_ID, "order_type": "pickup"}))
            .await;
        let confirmed = registry.dispatch("confirm_order", json!({"session_id": CALL_ID})).await;
        assert_eq!(confirmed["status"], "success");
        assert_eq!(order(&orders).await.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn call_back_moves_the_order_to_a_terminal_state() {
        let (registry, orders) = registry().await;

        let result = registry.dispatch("call_back", json!({"session_id": CALL_ID})).await;

        assert_eq!(result["status"], "success");
        assert_eq!(order(&orders).await.status, OrderStatus::CallBackRequested);
    }

    #[tokio::test]
    async fn get_menu_groups_items_by_category() {
        let (registry, _) = registry().await;

        let result =
            registry.dispatch("get_menu", json!({"restaurant_phone": PHONE})).await;

        assert_eq!(result["status"], "success");
        assert_eq!(result["menu"]["Mains"]["Chicken Biryani"], "9.99");
        assert_eq!(result["menu"]["Drinks"]["Cola"], "2.50");

        let missing =
            registry.dispatch("get_menu", json!({"restaurant_phone": "+15559999"})).await;
        assert_eq!(missing["status"], "error");
    }

    #[tokio::test]
    async fn every_invocation_appends_exactly_one_transcript_event() {
        let (registry, orders) = registry().await;
        let order_id = order(&orders).await.id;

        registry
            .dispatch(
                "set_or_modify_items",
                items_payload(json!([{"name": "Cola", "quantity": 1}])),
            )
            .await;
        assert_eq!(orders.count_events(&order_id).await.expect("count"), 1);

        // Failures audit too.
        registry
            .dispatch(
                "set_or_modify_items",
                items_payload(json!([{"name": "Sushi", "quantity": 1}])),
            )
            .await;
        assert_eq!(orders.count_events(&order_id).await.expect("count"), 2);

        registry.dispatch("no_such_tool", json!({})).await;
        assert_eq!(orders.count_events(&order_id).await.expect("count"), 3);

        let events = orders.list_events(&order_id).await.expect("events");
        assert!(events
            .iter()
            .all(|event| matches!(event.entry, TranscriptEntry::ToolOutcome { .. })));
    }

    #[tokio::test]
    async fn unknown_tool_returns_a_structured_error() {
        let (registry, _) = registry().await;

        let result = registry.dispatch("no_such_tool", json!({})).await;

        assert_eq!(result["status"], "error");
        assert_eq!(result["message"], "Unknown tool 'no_such_tool'.");
    }

    #[tokio::test]
    async fn transfer_to_human_changes_no_state() {
        let (registry, orders) = registry().await;

        let result = registry.dispatch("transfer_to_human", json!({"session_id": CALL_ID})).await;

        assert_eq!(result["status"], "success");
        let order = order(&orders).await;
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.items.is_empty());
    }
}
