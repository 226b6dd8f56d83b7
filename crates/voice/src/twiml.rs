//! Minimal TwiML rendering for the webhook responses. Only the handful of
//! verbs the call flow needs; anything fancier belongs to the carrier side.

use crate::driver::TurnOutcome;

const SPEECH_ACTION: &str = "/process_speech";

/// `<Gather>` wrapping for the greeting: speak, then listen. The trailing
/// `<Say>` plays only when the gather window times out with no speech.
pub fn greeting_response(greeting: &str, speech_timeout_secs: u64, timeout_prompt: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>\
         <Gather input=\"speech\" action=\"{SPEECH_ACTION}\" method=\"POST\" \
         timeout=\"{speech_timeout_secs}\" speechTimeout=\"auto\">\
         <Say>{}</Say></Gather><Say>{}</Say></Response>",
        escape(greeting),
        escape(timeout_prompt),
    )
}

/// Response for a processed turn: hang up after terminal turns, otherwise
/// speak and re-open the speech-gathering window.
pub fn turn_response(outcome: &TurnOutcome, speech_timeout_secs: u64, goodbye: &str) -> String {
    if outcome.end_call {
        return format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>\
             <Say>{}</Say><Hangup/></Response>",
            escape(&outcome.say),
        );
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>\
         <Gather input=\"speech\" action=\"{SPEECH_ACTION}\" method=\"POST\" \
         timeout=\"{speech_timeout_secs}\" speechTimeout=\"auto\">\
         <Say>{}</Say></Gather><Say>{}</Say></Response>",
        escape(&outcome.say),
        escape(goodbye),
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use crate::driver::TurnOutcome;

    use super::{greeting_response, turn_response};

    #[test]
    fn greeting_gathers_speech_then_reprompts() {
        let xml = greeting_response("Hi! What would you like?", 15, "Please try again.");

        assert!(xml.contains("<Gather input=\"speech\""));
        assert!(xml.contains("timeout=\"15\""));
        assert!(xml.contains("<Say>Hi! What would you like?</Say>"));
        assert!(xml.ends_with("<Say>Please try again.</Say></Response>"));
    }

    #[test]
    fn terminal_turn_hangs_up() {
        let outcome =
            TurnOutcome { say: "Great! Your order has been placed.".to_string(), end_call: true };
        let xml = turn_response(&outcome, 20, "Goodbye.");

        assert!(xml.contains("<Hangup/>"));
        assert!(!xml.contains("<Gather"));
    }

    #[test]
    fn open_turn_keeps_gathering() {
        let outcome = TurnOutcome { say: "Anything else?".to_string(), end_call: false };
        let xml = turn_response(&outcome, 20, "I can't hear you, goodbye.");

        assert!(xml.contains("<Gather input=\"speech\""));
        assert!(xml.contains("<Say>Anything else?</Say>"));
        assert!(xml.contains("I can&apos;t hear you, goodbye."));
    }

    #[test]
    fn utterances_are_xml_escaped() {
        let outcome =
            TurnOutcome { say: "Fish & chips <today>".to_string(), end_call: true };
        let xml = turn_response(&outcome, 20, "bye");

        assert!(xml.contains("Fish &amp; chips &lt;today&gt;"));
    }
}
