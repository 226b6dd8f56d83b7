//! Thin telephony webhook glue: form params in, TwiML out. All decisions
//! live in the conversation driver; this layer only parses and renders.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use tracing::error;

use orderline_voice::driver::{ConversationDriver, TurnOutcome};
use orderline_voice::events::TurnRequest;
use orderline_voice::twiml;

#[derive(Clone)]
pub struct WebhookState {
    pub driver: Arc<ConversationDriver>,
    pub speech_timeout_secs: u64,
}

pub fn router(driver: Arc<ConversationDriver>, speech_timeout_secs: u64) -> Router {
    Router::new()
        .route("/voice", post(voice))
        .route("/process_speech", post(process_speech))
        .with_state(WebhookState { driver, speech_timeout_secs })
}

fn xml(body: String) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/xml")], body)
}

/// Call start: greet and open the first speech-gathering window.
pub async fn voice(
    State(state): State<WebhookState>,
    Form(_params): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    let reprompt = state.driver.reprompt().await;

    match state.driver.open_call().await {
        Ok(greeting) => {
            xml(twiml::greeting_response(&greeting, state.speech_timeout_secs, &reprompt))
        }
        Err(application_error) => {
            error!(
                event_name = "server.webhook.greeting_unavailable",
                error = %application_error,
                "cannot open call"
            );
            let outcome = TurnOutcome {
                say: application_error.into_interface("call-start").user_message().to_string(),
                end_call: true,
            };
            xml(twiml::turn_response(&outcome, state.speech_timeout_secs, &reprompt))
        }
    }
}

/// One speech turn. Runs in a loop for the duration of the call.
pub async fn process_speech(
    State(state): State<WebhookState>,
    Form(params): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    let goodbye = state.driver.goodbye().await;

    let Some(turn) = TurnRequest::from_params(&params) else {
        error!(
            event_name = "server.webhook.malformed_turn",
            "turn payload had no usable CallSid"
        );
        let outcome = TurnOutcome { say: goodbye.clone(), end_call: true };
        return xml(twiml::turn_response(&outcome, state.speech_timeout_secs, &goodbye));
    };

    let outcome = state.driver.handle_turn(&turn).await;
    xml(twiml::turn_response(&outcome, state.speech_timeout_secs, &goodbye))
}
