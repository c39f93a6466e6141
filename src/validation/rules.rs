//! Validation rules for client option values.

use url::Url;

use crate::config::model::{ClientOptions, RetryOptions};

use super::{ValidationIssue, ValidationResult};

/// Checks the name, base URIs, credentials and timeout.
pub fn check_connection(options: &ClientOptions, result: &mut ValidationResult) {
    if options.name.trim().is_empty() {
        result.push(ValidationIssue::error("name", "Application name must not be empty"));
    }

    if options.env.trim().is_empty() {
        result.push(ValidationIssue::error("env", "Profile must not be empty"));
    }

    let uris = options.uris();
    if uris.is_empty() && !options.discovery.enabled {
        result.push(
            ValidationIssue::error("uri", "No config server uri configured")
                .with_suggestion("Set uri, e.g. http://localhost:8888"),
        );
    }

    for (i, uri) in uris.iter().enumerate() {
        match Url::parse(uri) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => {
                result.push(ValidationIssue::error(
                    format!("uri[{}]", i),
                    format!("Unsupported scheme '{}' in '{}'", parsed.scheme(), uri),
                ));
            }
            Err(e) => {
                result.push(ValidationIssue::error(
                    format!("uri[{}]", i),
                    format!("'{}' is not an absolute uri: {}", uri, e),
                ));
            }
        }
    }

    if options.timeout == 0 {
        result.push(ValidationIssue::error("timeout", "Timeout must be greater than zero"));
    }

    if !options.validate_certificates {
        result.push(ValidationIssue::warning(
            "validateCertificates",
            "TLS certificate validation is disabled",
        ));
    }

    if options.token.is_some() && (options.username.is_some() || options.password.is_some()) {
        result.push(
            ValidationIssue::warning(
                "token",
                "Both a token and basic credentials are configured; both will be sent",
            )
            .with_suggestion("Use either token or username/password"),
        );
    }
}

/// Checks the retry bounds.
pub fn check_retry(retry: &RetryOptions, result: &mut ValidationResult) {
    if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
        result.push(
            ValidationIssue::error(
                "retry.multiplier",
                format!("Multiplier {} would shrink the backoff", retry.multiplier),
            )
            .with_suggestion("Multiplier must be at least 1.0"),
        );
    }

    if retry.max_attempts == 0 {
        result.push(ValidationIssue::error(
            "retry.maxAttempts",
            "Max attempts must be at least 1",
        ));
    }

    if retry.initial_interval > retry.max_interval {
        result.push(ValidationIssue::error(
            "retry.initialInterval",
            format!(
                "Initial interval {}ms exceeds max interval {}ms",
                retry.initial_interval, retry.max_interval
            ),
        ));
    }
}

/// Checks discovery settings.
pub fn check_discovery(options: &ClientOptions, result: &mut ValidationResult) {
    if options.discovery.enabled && options.discovery.service_id.trim().is_empty() {
        result.push(ValidationIssue::error(
            "discovery.serviceId",
            "Service id is required when discovery is enabled",
        ));
    }
}
