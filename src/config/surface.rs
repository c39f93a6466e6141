//! Flat key surface for client options (`spring:cloud:config:*`).

use crate::error::ConfigError;
use crate::validation::{ValidationIssue, ValidationResult};

use super::model::ClientOptions;

/// Key prefix under which client options are exposed.
pub const PREFIX: &str = "spring:cloud:config";

const KNOWN_KEYS: &[&str] = &[
    "enabled",
    "failFast",
    "name",
    "env",
    "label",
    "uri",
    "username",
    "password",
    "token",
    "timeout",
    "pollingInterval",
    "validateCertificates",
    "retry:enabled",
    "retry:initialInterval",
    "retry:maxInterval",
    "retry:multiplier",
    "retry:maxAttempts",
    "discovery:enabled",
    "discovery:serviceId",
    "health:enabled",
    "health:timeToLive",
];

/// Flattens options into `(key, value)` pairs under [`PREFIX`].
///
/// Booleans render as `True`/`False`, durations as milliseconds.
pub fn to_pairs(options: &ClientOptions) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut push = |key: &str, value: String| pairs.push((format!("{}:{}", PREFIX, key), value));

    push("enabled", render_bool(options.enabled));
    push("failFast", render_bool(options.fail_fast));
    push("name", options.name.clone());
    push("env", options.env.clone());
    if let Some(label) = &options.label {
        push("label", label.clone());
    }
    push("uri", options.uri.clone());
    if let Some(username) = &options.username {
        push("username", username.clone());
    }
    if let Some(password) = &options.password {
        push("password", password.clone());
    }
    if let Some(token) = &options.token {
        push("token", token.clone());
    }
    push("timeout", options.timeout.to_string());
    push("pollingInterval", options.polling_interval.to_string());
    push("validateCertificates", render_bool(options.validate_certificates));

    push("retry:enabled", render_bool(options.retry.enabled));
    push("retry:initialInterval", options.retry.initial_interval.to_string());
    push("retry:maxInterval", options.retry.max_interval.to_string());
    push("retry:multiplier", options.retry.multiplier.to_string());
    push("retry:maxAttempts", options.retry.max_attempts.to_string());

    push("discovery:enabled", render_bool(options.discovery.enabled));
    push("discovery:serviceId", options.discovery.service_id.clone());

    push("health:enabled", render_bool(options.health.enabled));
    push("health:timeToLive", options.health.time_to_live.to_string());

    for (name, value) in &options.headers {
        push(&format!("headers:{}", name), value.clone());
    }

    pairs
}

/// Builds options from flat keys, starting from the defaults.
///
/// Keys may carry the [`PREFIX`] or not and are matched case-insensitively.
/// Unknown keys are returned as warnings.
pub fn from_pairs<I, K, V>(pairs: I) -> Result<(ClientOptions, ValidationResult), ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut options = ClientOptions::default();
    let mut result = ValidationResult::new();

    for (key, value) in pairs {
        let full_key = key.as_ref();
        let key = strip_prefix(full_key);
        let value = value.as_ref();
        let lower = key.to_ascii_lowercase();

        if let Some(header) = header_name(key) {
            options.headers.insert(header.to_string(), value.to_string());
            continue;
        }

        match lower.as_str() {
            "enabled" => options.enabled = parse_bool(full_key, value)?,
            "failfast" => options.fail_fast = parse_bool(full_key, value)?,
            "name" => options.name = value.to_string(),
            "env" | "environment" | "profile" => options.env = value.to_string(),
            "label" => options.label = Some(value.to_string()),
            "uri" => options.uri = value.to_string(),
            "username" => options.username = Some(value.to_string()),
            "password" => options.password = Some(value.to_string()),
            "token" => options.token = Some(value.to_string()),
            "timeout" => options.timeout = parse_number(full_key, value)?,
            "pollinginterval" => options.polling_interval = parse_number(full_key, value)?,
            "validatecertificates" => {
                options.validate_certificates = parse_bool(full_key, value)?
            }
            "retry:enabled" => options.retry.enabled = parse_bool(full_key, value)?,
            "retry:initialinterval" => {
                options.retry.initial_interval = parse_number(full_key, value)?
            }
            "retry:maxinterval" => options.retry.max_interval = parse_number(full_key, value)?,
            "retry:multiplier" => options.retry.multiplier = parse_number(full_key, value)?,
            "retry:maxattempts" => options.retry.max_attempts = parse_number(full_key, value)?,
            "discovery:enabled" => options.discovery.enabled = parse_bool(full_key, value)?,
            "discovery:serviceid" => options.discovery.service_id = value.to_string(),
            "health:enabled" => options.health.enabled = parse_bool(full_key, value)?,
            "health:timetolive" => options.health.time_to_live = parse_number(full_key, value)?,
            _ => {
                let suggestion = find_similar_key(key);
                result.push(
                    ValidationIssue::warning(full_key, "Unknown client option, ignored")
                        .with_suggestion(format!("Did you mean '{}'?", suggestion)),
                );
            }
        }
    }

    Ok((options, result))
}

fn strip_prefix(key: &str) -> &str {
    strip_ignore_case(key, PREFIX)
        .and_then(|rest| rest.strip_prefix(':'))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(key)
}

fn header_name(key: &str) -> Option<&str> {
    strip_ignore_case(key, "headers:").filter(|name| !name.is_empty())
}

fn strip_ignore_case<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    let head = key.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &key[prefix.len()..])
}

fn render_bool(value: bool) -> String {
    if value { "True" } else { "False" }.to_string()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Finds the most similar known key using Levenshtein distance.
fn find_similar_key(input: &str) -> &'static str {
    let input = input.to_ascii_lowercase();
    KNOWN_KEYS
        .iter()
        .min_by_key(|k| strsim::levenshtein(&input, &k.to_ascii_lowercase()))
        .copied()
        .unwrap_or("uri")
}
