//! Telephony-facing side of the ordering assistant: the inbound turn
//! payload, the per-call conversation driver, and the TwiML rendering the
//! webhook hands back to the carrier. Speech synthesis, audio, and webhook
//! authentication all live with the telephony collaborator.

pub mod driver;
pub mod events;
pub mod twiml;

pub use driver::{CallPhase, ConversationDriver, TurnOutcome};
pub use events::TurnRequest;
