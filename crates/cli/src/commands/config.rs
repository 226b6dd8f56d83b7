use std::env;

use orderline_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line("database.url", &config.database.url, "ORDERLINE_DATABASE_URL"));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        "ORDERLINE_DATABASE_MAX_CONNECTIONS",
    ));
    lines.push(render_line(
        "telephony.development",
        &config.telephony.development.to_string(),
        "ORDERLINE_TELEPHONY_DEVELOPMENT",
    ));
    lines.push(render_line(
        "telephony.speech_timeout_secs",
        &config.telephony.speech_timeout_secs.to_string(),
        "ORDERLINE_TELEPHONY_SPEECH_TIMEOUT_SECS",
    ));
    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider).to_lowercase(),
        "ORDERLINE_LLM_PROVIDER",
    ));
    lines.push(render_line("llm.model", &config.llm.model, "ORDERLINE_LLM_MODEL"));
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|value| redact_secret(value.expose_secret()))
        .unwrap_or_else(|| "(unset)".to_string());
    lines.push(render_line("llm.api_key", &api_key, "ORDERLINE_LLM_API_KEY"));
    lines.push(render_line(
        "catalog.match_threshold",
        &config.catalog.match_threshold.to_string(),
        "ORDERLINE_CATALOG_MATCH_THRESHOLD",
    ));
    lines.push(render_line(
        "agent.max_tool_steps",
        &config.agent.max_tool_steps.to_string(),
        "ORDERLINE_AGENT_MAX_TOOL_STEPS",
    ));
    lines.push(render_line(
        "agent.cache_max_entries",
        &config.agent.cache_max_entries.to_string(),
        "ORDERLINE_AGENT_CACHE_MAX_ENTRIES",
    ));
    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        "ORDERLINE_SERVER_BIND_ADDRESS",
    ));
    lines.push(render_line(
        "server.webhook_port",
        &config.server.webhook_port.to_string(),
        "ORDERLINE_SERVER_WEBHOOK_PORT",
    ));
    lines.push(render_line(
        "server.health_check_port",
        &config.server.health_check_port.to_string(),
        "ORDERLINE_SERVER_HEALTH_CHECK_PORT",
    ));
    lines.push(render_line("logging.level", &config.logging.level, "ORDERLINE_LOGGING_LEVEL"));

    lines.join("\n")
}

fn render_line(key: &str, value: &str, env_var: &str) -> String {
    let source = if env::var(env_var).map(|value| !value.trim().is_empty()).unwrap_or(false) {
        format!("env:{env_var}")
    } else {
        "file|default".to_string()
    };
    format!("- {key} = {value} ({source})")
}

fn redact_secret(value: &str) -> String {
    if value.len() <= 4 {
        return "****".to_string();
    }
    format!("{}****", &value[..4])
}

#[cfg(test)]
mod tests {
    use super::redact_secret;

    #[test]
    fn secrets_are_redacted_to_a_short_prefix() {
        assert_eq!(redact_secret("sk-abcdef123456"), "sk-a****");
        assert_eq!(redact_secret("ab"), "****");
    }
}
