use std::sync::Arc;

use tracing::{info, warn};

use orderline_core::catalog::CatalogResolver;
use orderline_core::domain::order::CallId;
use orderline_core::domain::restaurant::Restaurant;
use orderline_core::errors::ApplicationError;
use orderline_db::repositories::{OrderRepository, RestaurantRepository};

use crate::llm::{AgentModel, AgentStep, ChatEntry};
use crate::session::{AgentCache, SessionStore};
use crate::tools::{ToolContext, ToolRegistry};

const EXHAUSTED_REPLY: &str =
    "Sorry, I'm having a little trouble with that. Could you say it again?";

/// Runs one conversational turn: bind the session, hand the transcript to
/// the model, execute its tool calls one at a time, and return the final
/// spoken reply. Tool calls for the same order never run in parallel - the
/// session lock is held for the whole turn.
pub struct AgentRuntime {
    model: Arc<dyn AgentModel>,
    sessions: SessionStore,
    cache: AgentCache,
    orders: Arc<dyn OrderRepository>,
    restaurants: Arc<dyn RestaurantRepository>,
    resolver: CatalogResolver,
    max_tool_steps: u32,
}

impl AgentRuntime {
    pub fn new(
        model: Arc<dyn AgentModel>,
        orders: Arc<dyn OrderRepository>,
        restaurants: Arc<dyn RestaurantRepository>,
        resolver: CatalogResolver,
        max_tool_steps: u32,
        cache_max_entries: usize,
    ) -> Self {
        Self {
            model,
            sessions: SessionStore::default(),
            cache: AgentCache::new(cache_max_entries),
            orders,
            restaurants,
            resolver,
            max_tool_steps: max_tool_steps.max(1),
        }
    }

    pub fn cache(&self) -> &AgentCache {
        &self.cache
    }

    pub async fn run_turn(
        &self,
        restaurant: &Restaurant,
        call_id: &CallId,
        transcript: &str,
    ) -> Result<String, ApplicationError> {
        let menu = self
            .restaurants
            .menu(&restaurant.id)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;
        let definition = self.cache.get_or_build(restaurant, &menu).await;

        let session = self.sessions.get_or_create(call_id, &restaurant.phone_number).await;
        let mut session = session.lock().await;

        let registry = ToolRegistry::for_session(ToolContext {
            call_id: call_id.clone(),
            restaurant: restaurant.clone(),
            menu: definition.menu.clone(),
            resolver: self.resolver.clone(),
            orders: self.orders.clone(),
            restaurants: self.restaurants.clone(),
        });
        let instructions = definition.instructions_for(call_id);
        let schemas = registry.schemas();

        info!(
            event_name = "agent.turn.start",
            call_id = %call_id.0,
            restaurant = %restaurant.name,
            policy_version = definition.policy_version,
            "processing transcript"
        );

        session.history.push(ChatEntry::User { text: transcript.to_string() });

        for _ in 0..self.max_tool_steps {
            let step = self
                .model
                .next_step(&instructions, &session.history, &schemas)
                .await
                .map_err(|error| ApplicationError::Integration(error.to_string()))?;

            match step {
                AgentStep::ToolCall { name, arguments } => {
                    info!(
                        event_name = "agent.turn.tool_call",
                        call_id = %call_id.0,
                        tool = %name,
                        "dispatching tool"
                    );
                    session
                        .history
                        .push(ChatEntry::ToolCall { name: name.clone(), arguments: arguments.clone() });
                    let result = registry.dispatch(&name, arguments).await;
                    session.history.push(ChatEntry::ToolResult { name, result });
                }
                AgentStep::Reply { text } => {
                    session.history.push(ChatEntry::Assistant { text: text.clone() });
                    return Ok(text);
                }
            }
        }

        warn!(
            event_name = "agent.turn.tool_steps_exhausted",
            call_id = %call_id.0,
            max_tool_steps = self.max_tool_steps,
            "model kept calling tools; returning fallback reply"
        );
        session.history.push(ChatEntry::Assistant { text: EXHAUSTED_REPLY.to_string() });
        Ok(EXHAUSTED_REPLY.to_string())
    }
}
