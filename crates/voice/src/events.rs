use std::collections::HashMap;

/// One inbound webhook turn: the call identifier, both phone numbers, and
/// whatever the transcriber heard. An empty transcript is a valid turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnRequest {
    pub call_id: String,
    pub to_number: Option<String>,
    pub from_number: Option<String>,
    pub transcript: String,
}

impl TurnRequest {
    /// Builds a turn from the carrier's form parameters. `CallSid` is the
    /// only hard requirement; a missing `SpeechResult` is an empty turn.
    pub fn from_params(params: &HashMap<String, String>) -> Option<Self> {
        let call_id = params.get("CallSid").map(|value| value.trim())?;
        if call_id.is_empty() {
            return None;
        }

        Some(Self {
            call_id: call_id.to_string(),
            to_number: non_empty(params.get("To")),
            from_number: non_empty(params.get("From")),
            transcript: params.get("SpeechResult").cloned().unwrap_or_default(),
        })
    }

    /// The phone number that selects the restaurant. Production routes by
    /// the dialed number; development mode routes by the caller's number
    /// because every local test dials the same trunk.
    pub fn routing_number(&self, development: bool) -> Option<&str> {
        let number = if development { &self.from_number } else { &self.to_number };
        number.as_deref()
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}
