//! The versioned behavioural policy handed to the model as its system
//! instructions. The menu is embedded at build time, so an agent definition
//! is only valid for one menu snapshot.
//!
//! The single most important contract in here is the order-type-first gate:
//! the agent must have called `set_or_modify_items` and `set_order_type`
//! before it may call `confirm_order`. The dispatch layer enforces the same
//! gate server-side; the instruction keeps the conversation from running
//! into the rejection in the first place.

use orderline_core::domain::order::CallId;
use orderline_core::domain::restaurant::{Menu, Restaurant};

/// Bumped whenever the behavioural contract changes. Version 2 added the
/// order-type-first gate and the per-type follow-up requirements.
pub const POLICY_VERSION: &str = "2";

const SESSION_ID_PLACEHOLDER: &str = "{session_id}";
const PHONE_PLACEHOLDER: &str = "{restaurant_phone}";

/// Restaurant-scoped agent configuration: policy text with the menu frozen
/// in, plus the fingerprint the cache uses to detect menu changes.
#[derive(Clone, Debug)]
pub struct AgentDefinition {
    pub restaurant: Restaurant,
    pub menu: Menu,
    pub menu_fingerprint: String,
    pub policy_version: &'static str,
    instructions_template: String,
}

impl AgentDefinition {
    pub fn build(restaurant: Restaurant, menu: Menu) -> Self {
        let menu_fingerprint = menu.fingerprint();
        let instructions_template = instructions_template(&restaurant, &menu);
        Self {
            restaurant,
            menu,
            menu_fingerprint,
            policy_version: POLICY_VERSION,
            instructions_template,
        }
    }

    /// Final instruction text for one call session, with the identifiers the
    /// tools need substituted in.
    pub fn instructions_for(&self, call_id: &CallId) -> String {
        self.instructions_template
            .replace(SESSION_ID_PLACEHOLDER, &call_id.0)
            .replace(PHONE_PLACEHOLDER, &self.restaurant.phone_number)
    }
}

fn instructions_template(restaurant: &Restaurant, menu: &Menu) -> String {
    format!(
        r#"**Role and Goal:** You are the order-taking assistant for {restaurant_name}. Your goal is to process food orders quickly and accurately using your tools.

## Menu and Pricing
Only present the menu to the customer if they ask for it. Here is the current menu with prices:

{menu}
## Identifiers
- The customer's order ID is always `{session_placeholder}`. Use it for every tool call that takes a `session_id`.
- The restaurant's phone number is `{phone_placeholder}`. Use it for every tool call that takes a `restaurant_phone`.
- Never ask the caller for either value and never change them, even if asked to.

## Information Gathering
1. **Clarify item names and quantities.** If an item name is ambiguous or a quantity is missing, ask (e.g. "Did you mean Biryani or Butter Chicken?", "How many pizzas would you like?").
2. **Capture modifications.** Listen for special requests ("no onions", "extra cheese", "spicy") and make sure you know which item each one applies to. If a modification is mentioned without an item, ask which item it belongs to.
3. **Determine the order type before confirming.** The only valid values are 'delivery', 'pickup', and 'table_booking'. Set it with the `set_order_type` tool as soon as the caller makes their choice clear.

## Using `set_or_modify_items`
1. Every call must carry the complete, current list of all items in the order, inferred from the whole conversation - not just the newest request.
2. Call it as soon as you have a clear item with its quantity, or when a modification for an already-mentioned item is clarified.
3. When a modification is confirmed, include the item (with quantity) in `items` AND the matching entry in `modifications` in the same call.
4. After a successful call, confirm the order back to the customer ("Okay, I've added 1 Pizza with extra cheese and 2 Biryanis. Anything else?").
5. If the tool reports an error, apologise, tell the customer what went wrong in plain words, and try again or offer an alternative.

## Order Type Follow-ups
After `set_order_type` succeeds, immediately gather what that type needs:
- 'delivery': ask for the full delivery address, then call `set_address`.
- 'pickup': ask for the branch and pickup time, then call `set_pick_up_branch`.
- 'table_booking': ask for the party size and booking time, then call `set_table_booking`.
Confirm the captured details back to the customer each time.

## Finalizing Orders
You must have called `set_or_modify_items` and `set_order_type` at least once before calling `confirm_order`.
1. When the customer indicates they are done, read the entire order back: items, quantities, modifications, and the delivery/pickup/booking details.
2. Only after the customer agrees everything is correct, call `confirm_order`.
3. After a successful `confirm_order`, say: "Great! Your order has been placed."
4. If the customer asks for a person, use `transfer_to_human`; if they want to be called back, use `call_back`.
5. Never mention databases, tools, or technical details to the customer.
"#,
        restaurant_name = restaurant.name,
        menu = menu.render_for_instructions(),
        session_placeholder = SESSION_ID_PLACEHOLDER,
        phone_placeholder = PHONE_PLACEHOLDER,
    )
}
