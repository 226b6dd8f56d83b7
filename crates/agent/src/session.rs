//! Explicit session and agent-definition stores. The original design kept
//! both in process-wide globals; here they are components with owners, a
//! create-if-absent lifecycle, and a bounded cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, RwLock};

use orderline_core::domain::order::CallId;
use orderline_core::domain::restaurant::{Menu, Restaurant};

use crate::llm::ChatEntry;
use crate::policy::AgentDefinition;

/// Conversational state for one call: the identifiers the tools need plus
/// the model-visible exchange history. Lives for the duration of the call.
#[derive(Debug)]
pub struct CallSession {
    pub call_id: CallId,
    pub restaurant_phone: String,
    pub history: Vec<ChatEntry>,
}

/// Create-if-absent session store keyed by call id. Calls are bounded, so
/// there is no explicit teardown; dropping the store drops the sessions.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<CallSession>>>>,
}

impl SessionStore {
    pub async fn get_or_create(
        &self,
        call_id: &CallId,
        restaurant_phone: &str,
    ) -> Arc<Mutex<CallSession>> {
        if let Some(session) = self.sessions.read().await.get(&call_id.0) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(call_id.0.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(CallSession {
                    call_id: call_id.clone(),
                    restaurant_phone: restaurant_phone.to_string(),
                    history: Vec::new(),
                }))
            })
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

struct CacheSlot {
    definition: Arc<AgentDefinition>,
    last_used: Instant,
}

/// Restaurant-keyed cache of built agent definitions. An entry is reused
/// only while its menu fingerprint still matches the current menu; above
/// capacity the least-recently-used entry is evicted.
pub struct AgentCache {
    max_entries: usize,
    entries: Mutex<HashMap<String, CacheSlot>>,
}

impl AgentCache {
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries: max_entries.max(1), entries: Mutex::new(HashMap::new()) }
    }

    pub async fn get_or_build(&self, restaurant: &Restaurant, menu: &Menu) -> Arc<AgentDefinition> {
        let fingerprint = menu.fingerprint();
        let mut entries = self.entries.lock().await;

        if let Some(slot) = entries.get_mut(&restaurant.phone_number) {
            if slot.definition.menu_fingerprint == fingerprint {
                slot.last_used = Instant::now();
                return slot.definition.clone();
            }
        }

        let definition = Arc::new(AgentDefinition::build(restaurant.clone(), menu.clone()));
        entries.insert(
            restaurant.phone_number.clone(),
            CacheSlot { definition: definition.clone(), last_used: Instant::now() },
        );

        while entries.len() > self.max_entries {
            let Some(oldest_key) = entries
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            entries.remove(&oldest_key);
        }

        definition
    }

    pub async fn invalidate(&self, restaurant_phone: &str) {
        self.entries.lock().await.remove(restaurant_phone);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
