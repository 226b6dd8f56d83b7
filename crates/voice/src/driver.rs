//! Per-call conversation driver. One call moves through
//! `AwaitingGreeting -> ProcessingTurn -> AwaitingSpeech | CallEnded`; each
//! inbound transcript is one strictly sequential `ProcessingTurn` pass that
//! persists the exchange, runs the agent, and decides whether to hang up.

use std::sync::Arc;

use tracing::{error, info, warn};

use orderline_agent::runtime::AgentRuntime;
use orderline_core::domain::order::{CallId, Order};
use orderline_core::errors::{ApplicationError, InterfaceError};
use orderline_core::transcript::{TranscriptEntry, TranscriptEvent};
use orderline_db::repositories::{OrderRepository, RestaurantRepository, SettingsRepository};

use crate::events::TurnRequest;

pub const GREETING_KEY: &str = "GREETING";
pub const REPROMPT_KEY: &str = "REPROMPT";
pub const GOODBYE_KEY: &str = "GOODBYE";

const DEFAULT_REPROMPT: &str = "Sorry, I did not catch that. Please try again.";
const DEFAULT_GOODBYE: &str = "I can't hear you, goodbye.";

/// Where the call flow stands after a driver decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallPhase {
    AwaitingGreeting,
    ProcessingTurn,
    AwaitingSpeech,
    CallEnded,
}

/// The complete outbound interface: one utterance plus the end-call signal.
/// Markup and voice selection belong to the telephony collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    pub say: String,
    pub end_call: bool,
}

impl TurnOutcome {
    fn speak(say: impl Into<String>) -> Self {
        Self { say: say.into(), end_call: false }
    }

    fn hang_up(say: impl Into<String>) -> Self {
        Self { say: say.into(), end_call: true }
    }

    pub fn next_phase(&self) -> CallPhase {
        if self.end_call {
            CallPhase::CallEnded
        } else {
            CallPhase::AwaitingSpeech
        }
    }
}

pub struct ConversationDriver {
    restaurants: Arc<dyn RestaurantRepository>,
    orders: Arc<dyn OrderRepository>,
    settings: Arc<dyn SettingsRepository>,
    runtime: Arc<AgentRuntime>,
    development: bool,
}

impl ConversationDriver {
    pub fn new(
        restaurants: Arc<dyn RestaurantRepository>,
        orders: Arc<dyn OrderRepository>,
        settings: Arc<dyn SettingsRepository>,
        runtime: Arc<AgentRuntime>,
        development: bool,
    ) -> Self {
        Self { restaurants, orders, settings, runtime, development }
    }

    /// Greeting for a freshly answered call. The prompt is operator-tunable
    /// and required: a deployment without it is misconfigured.
    pub async fn open_call(&self) -> Result<String, ApplicationError> {
        match self.settings.get(GREETING_KEY).await {
            Ok(Some(greeting)) => Ok(greeting),
            Ok(None) => Err(ApplicationError::Configuration(format!(
                "admin setting `{GREETING_KEY}` is not configured"
            ))),
            Err(error) => Err(ApplicationError::Persistence(error.to_string())),
        }
    }

    pub async fn reprompt(&self) -> String {
        self.setting_or(REPROMPT_KEY, DEFAULT_REPROMPT).await
    }

    pub async fn goodbye(&self) -> String {
        self.setting_or(GOODBYE_KEY, DEFAULT_GOODBYE).await
    }

    async fn setting_or(&self, key: &str, fallback: &str) -> String {
        match self.settings.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => fallback.to_string(),
            Err(error) => {
                warn!(
                    event_name = "voice.driver.setting_lookup_failed",
                    key,
                    error = %error,
                    "falling back to built-in prompt"
                );
                fallback.to_string()
            }
        }
    }

    /// One transcript in, one utterance out. Never panics and never leaks
    /// raw errors to the caller; the only hard failure is an unroutable
    /// restaurant, which ends the call.
    pub async fn handle_turn(&self, turn: &TurnRequest) -> TurnOutcome {
        let call_id = CallId(turn.call_id.clone());

        let Some(routing_number) = turn.routing_number(self.development) else {
            error!(
                event_name = "voice.driver.missing_routing_number",
                call_id = %call_id.0,
                development = self.development,
                "turn carried no usable phone number"
            );
            return TurnOutcome::hang_up(
                ApplicationError::Configuration("no routing number on turn".to_string())
                    .into_interface(call_id.0.clone())
                    .user_message(),
            );
        };

        let restaurant = match self.restaurants.find_by_phone(routing_number).await {
            Ok(Some(restaurant)) => restaurant,
            Ok(None) => {
                error!(
                    event_name = "voice.driver.unknown_restaurant",
                    call_id = %call_id.0,
                    routing_number,
                    "no restaurant mapped to the dialed number"
                );
                return TurnOutcome::hang_up(
                    InterfaceError::Internal {
                        message: format!("no restaurant for `{routing_number}`"),
                        call_id: call_id.0.clone(),
                    }
                    .user_message(),
                );
            }
            Err(error) => {
                error!(
                    event_name = "voice.driver.restaurant_lookup_failed",
                    call_id = %call_id.0,
                    error = %error,
                    "restaurant lookup failed"
                );
                return TurnOutcome::hang_up(
                    ApplicationError::Persistence(error.to_string())
                        .into_interface(call_id.0.clone())
                        .user_message(),
                );
            }
        };

        // An empty transcript is a valid turn: re-prompt, no agent call.
        if turn.transcript.trim().is_empty() {
            return TurnOutcome::speak(self.reprompt().await);
        }

        let order = match self.orders.get_or_create(&call_id, &restaurant.id).await {
            Ok(order) => order,
            Err(error) => {
                error!(
                    event_name = "voice.driver.order_create_failed",
                    call_id = %call_id.0,
                    error = %error,
                    "could not attach an order to the call"
                );
                return TurnOutcome::speak(
                    ApplicationError::Persistence(error.to_string())
                        .into_interface(call_id.0.clone())
                        .user_message(),
                );
            }
        };

        self.append_entry(&order, TranscriptEntry::CallerTurn { text: turn.transcript.clone() })
            .await;

        let response = match self.runtime.run_turn(&restaurant, &call_id, &turn.transcript).await {
            Ok(response) => response,
            Err(error) => {
                error!(
                    event_name = "voice.driver.agent_turn_failed",
                    call_id = %call_id.0,
                    error = %error,
                    "agent turn failed"
                );
                return TurnOutcome::speak(
                    error.into_interface(call_id.0.clone()).user_message(),
                );
            }
        };

        self.append_entry(&order, TranscriptEntry::AgentTurn { text: response.clone() }).await;

        // Tools may have moved the order; the termination decision reads the
        // freshest status.
        let end_call = match self.orders.find_by_call_id(&call_id).await {
            Ok(Some(order)) => order.status.is_call_terminal(),
            Ok(None) => false,
            Err(error) => {
                warn!(
                    event_name = "voice.driver.status_reload_failed",
                    call_id = %call_id.0,
                    error = %error,
                    "keeping the call open after a failed status read"
                );
                false
            }
        };

        info!(
            event_name = "voice.driver.turn_complete",
            call_id = %call_id.0,
            restaurant = %restaurant.name,
            end_call,
            "turn processed"
        );

        TurnOutcome { say: response, end_call }
    }

    async fn append_entry(&self, order: &Order, entry: TranscriptEntry) {
        let event = TranscriptEvent::new(order.id.clone(), entry);
        if let Err(error) = self.orders.append_event(event).await {
            warn!(
                event_name = "voice.driver.transcript_append_failed",
                order_id = %order.id.0,
                error = %error,
                "could not append transcript event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use serde_json::json;

    use orderline_agent::llm::{AgentStep, ScriptedAgentModel};
    use orderline_agent::runtime::AgentRuntime;
    use orderline_core::catalog::CatalogResolver;
    use orderline_core::domain::order::{CallId, FulfillmentType, OrderStatus};
    use orderline_core::domain::restaurant::{MenuItem, MenuItemId, Restaurant, RestaurantId};
    use orderline_core::transcript::TranscriptEntry;
    use orderline_db::repositories::{
        InMemoryOrderRepository, InMemoryRestaurantRepository, InMemorySettingsRepository,
        OrderRepository,
    };

    use crate::events::TurnRequest;

    use super::{CallPhase, ConversationDriver};

    const CALL_ID: &str = "CA-3000";
    const PHONE: &str = "+15550100";

    fn restaurant() -> Restaurant {
        Restaurant {
            id: RestaurantId("rest-1".to_string()),
            name: "Spice Route".to_string(),
            phone_number: PHONE.to_string(),
        }
    }

    fn menu_items() -> Vec<MenuItem> {
        [("Chicken Biryani", 999), ("Cola", 250)]
            .iter()
            .enumerate()
            .map(|(index, (name, cents))| MenuItem {
                id: MenuItemId(format!("mi-{index}")),
                restaurant_id: RestaurantId("rest-1".to_string()),
                name: (*name).to_string(),
                price: Decimal::new(*cents, 2),
                category: None,
            })
            .collect()
    }

    async fn driver_with(
        steps: Vec<AgentStep>,
    ) -> (ConversationDriver, Arc<InMemoryOrderRepository>) {
        let restaurants = Arc::new(InMemoryRestaurantRepository::default());
        restaurants.insert(restaurant(), menu_items()).await;
        let orders = Arc::new(InMemoryOrderRepository::default());
        let settings = Arc::new(InMemorySettingsRepository::default());
        settings.insert("GREETING", "Hi! What would you like to order today?").await;

        let runtime = Arc::new(AgentRuntime::new(
            Arc::new(ScriptedAgentModel::new(steps)),
            orders.clone(),
            restaurants.clone(),
            CatalogResolver::default(),
            8,
            8,
        ));

        (ConversationDriver::new(restaurants, orders.clone(), settings, runtime, false), orders)
    }

    fn turn(transcript: &str) -> TurnRequest {
        TurnRequest {
            call_id: CALL_ID.to_string(),
            to_number: Some(PHONE.to_string()),
            from_number: Some("+15550199".to_string()),
            transcript: transcript.to_string(),
        }
    }

    #[tokio::test]
    async fn open_call_returns_the_configured_greeting() {
        let (driver, _) = driver_with(Vec::new()).await;
        let greeting = driver.open_call().await.expect("greeting");
        assert_eq!(greeting, "Hi! What would you like to order today?");
    }

    #[tokio::test]
    async fn open_call_fails_without_a_greeting_setting() {
        let restaurants = Arc::new(InMemoryRestaurantRepository::default());
        let orders = Arc::new(InMemoryOrderRepository::default());
        let settings = Arc::new(InMemorySettingsRepository::default());
        let runtime = Arc::new(AgentRuntime::new(
            Arc::new(ScriptedAgentModel::default()),
            orders.clone(),
            restaurants.clone(),
            CatalogResolver::default(),
            8,
            8,
        ));
        let driver = ConversationDriver::new(restaurants, orders, settings, runtime, false);

        assert!(driver.open_call().await.is_err());
    }

    #[tokio::test]
    async fn ordering_turn_mutates_the_order_and_keeps_the_call_open() {
        let steps = vec![
            AgentStep::ToolCall {
                name: "set_or_modify_items".to_string(),
                arguments: json!({
                    "session_id": CALL_ID,
                    "items": [
                        {"name": "Chicken Biryani", "quantity": 2},
                        {"name": "Cola", "quantity": 1},
                    ],
                }),
            },
            AgentStep::ToolCall {
                name: "set_order_type".to_string(),
                arguments: json!({"session_id": CALL_ID, "order_type": "delivery"}),
            },
            AgentStep::ToolCall {
                name: "set_address".to_string(),
                arguments: json!({"session_id": CALL_ID, "address": "5 Main St"}),
            },
            AgentStep::Reply { text: "Two biryanis and a cola to 5 Main St. Anything else?".to_string() },
        ];
        let (driver, orders) = driver_with(steps).await;

        let outcome = driver
            .handle_turn(&turn("I'd like two chicken biryanis and a cola, deliver to 5 Main St"))
            .await;

        assert!(!outcome.end_call);
        assert_eq!(outcome.next_phase(), CallPhase::AwaitingSpeech);

        let order = orders
            .find_by_call_id(&CallId(CALL_ID.to_string()))
            .await
            .expect("lookup")
            .expect("order");
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.fulfillment_type, Some(FulfillmentType::Delivery));
        assert_eq!(order.address.as_deref(), Some("5 Main St"));
        assert_eq!(order.items.len(), 2);

        // caller turn + 3 tool outcomes + agent turn
        assert_eq!(orders.count_events(&order.id).await.expect("count"), 5);
    }

    #[tokio::test]
    async fn confirmation_turn_ends_the_call() {
        let steps = vec![
            AgentStep::ToolCall {
                name: "set_or_modify_items".to_string(),
                arguments: json!({
                    "session_id": CALL_ID,
                    "items": [{"name": "Cola", "quantity": 1}],
                }),
            },
            AgentStep::ToolCall {
                name: "set_order_type".to_string(),
                arguments: json!({"session_id": CALL_ID, "order_type": "pickup"}),
            },
            AgentStep::Reply { text: "Anything else?".to_string() },
            AgentStep::ToolCall {
                name: "confirm_order".to_string(),
                arguments: json!({"session_id": CALL_ID}),
            },
            AgentStep::Reply { text: "Great! Your order has been placed.".to_string() },
        ];
        let (driver, orders) = driver_with(steps).await;

        let first = driver.handle_turn(&turn("a cola for pickup please")).await;
        assert!(!first.end_call);

        let second = driver.handle_turn(&turn("that's all, confirm it")).await;
        assert!(second.end_call);
        assert_eq!(second.say, "Great! Your order has been placed.");
        assert_eq!(second.next_phase(), CallPhase::CallEnded);

        let order = orders
            .find_by_call_id(&CallId(CALL_ID.to_string()))
            .await
            .expect("lookup")
            .expect("order");
        assert_eq!(order.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn empty_transcript_reprompts_without_touching_the_order() {
        let (driver, orders) = driver_with(Vec::new()).await;

        let outcome = driver.handle_turn(&turn("   ")).await;

        assert!(!outcome.end_call);
        assert_eq!(outcome.say, "Sorry, I did not catch that. Please try again.");
        assert!(orders
            .find_by_call_id(&CallId(CALL_ID.to_string()))
            .await
            .expect("lookup")
            .is_none());
    }

    #[tokio::test]
    async fn unknown_restaurant_ends_the_call_with_a_safe_message() {
        let (driver, _) = driver_with(Vec::new()).await;

        let mut unknown = turn("hello");
        unknown.to_number = Some("+15559999".to_string());
        let outcome = driver.handle_turn(&unknown).await;

        assert!(outcome.end_call);
        assert_eq!(outcome.say, "Sorry, something went wrong. Goodbye.");
    }

    #[tokio::test]
    async fn transcript_only_grows_across_turns() {
        let steps = vec![
            AgentStep::Reply { text: "Of course.".to_string() },
            AgentStep::Reply { text: "Anything else?".to_string() },
        ];
        let (driver, orders) = driver_with(steps).await;

        driver.handle_turn(&turn("hello")).await;
        let order = orders
            .find_by_call_id(&CallId(CALL_ID.to_string()))
            .await
            .expect("lookup")
            .expect("order");
        let after_first = orders.count_events(&order.id).await.expect("count");

        driver.handle_turn(&turn("do you have biryani?")).await;
        let after_second = orders.count_events(&order.id).await.expect("count");

        assert!(after_first >= 2);
        assert!(after_second > after_first);

        let events = orders.list_events(&order.id).await.expect("events");
        assert!(matches!(events[0].entry, TranscriptEntry::CallerTurn { .. }));
    }

    #[tokio::test]
    async fn development_mode_routes_by_the_caller_number() {
        let restaurants = Arc::new(InMemoryRestaurantRepository::default());
        // Restaurant registered under the *caller's* number.
        restaurants
            .insert(
                Restaurant {
                    id: RestaurantId("rest-1".to_string()),
                    name: "Spice Route".to_string(),
                    phone_number: "+15550199".to_string(),
                },
                menu_items(),
            )
            .await;
        let orders = Arc::new(InMemoryOrderRepository::default());
        let settings = Arc::new(InMemorySettingsRepository::default());
        let runtime = Arc::new(AgentRuntime::new(
            Arc::new(ScriptedAgentModel::new(vec![AgentStep::Reply {
                text: "Hello!".to_string(),
            }])),
            orders.clone(),
            restaurants.clone(),
            CatalogResolver::default(),
            8,
            8,
        ));
        let driver = ConversationDriver::new(restaurants, orders, settings, runtime, true);

        let outcome = driver.handle_turn(&turn("hello")).await;

        assert!(!outcome.end_call);
        assert_eq!(outcome.say, "Hello!");
    }
}
