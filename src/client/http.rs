//! Single-request fetch against one config server URI.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::environment::RemoteEnvironment;
use crate::config::model::ClientOptions;
use crate::error::{ConfigServerError, FetchFailure};

/// Header carrying the config server token.
pub const TOKEN_HEADER: &str = "X-Config-Token";

/// Basic auth credentials for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

/// Result of one fetch. Only `Success` carries an environment.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// 2xx response. `environment` is `None` when the body was empty.
    Success {
        status: u16,
        environment: Option<RemoteEnvironment>,
    },
    /// 404: the server has no such environment.
    NotFound,
    /// Anything else that prevented getting an environment.
    Failed(FetchFailure),
}

impl FetchOutcome {
    /// Short outcome label used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            FetchOutcome::Success {
                environment: Some(_),
                ..
            } => "success",
            FetchOutcome::Success {
                environment: None, ..
            } => "no_content",
            FetchOutcome::NotFound => "not_found",
            FetchOutcome::Failed(failure) => failure.outcome(),
        }
    }
}

/// HTTP fetch layer shared by every candidate of a load.
#[derive(Debug, Clone)]
pub struct ConfigServerHttp {
    client: reqwest::Client,
    timeout: Duration,
    headers: HeaderMap,
}

impl ConfigServerHttp {
    /// Builds the HTTP client from the client options.
    pub fn new(options: &ClientOptions) -> Result<Self, ConfigServerError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!options.validate_certificates)
            .build()?;

        Ok(Self {
            client,
            timeout: options.timeout_duration(),
            headers: build_headers(options),
        })
    }

    /// Request timeout applied to each fetch.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Performs one GET against `uri`.
    ///
    /// A malformed `uri` fails with `InvalidUri` without touching the network.
    /// Only cancellation is returned as `Err`.
    pub async fn fetch(
        &self,
        uri: &str,
        credentials: Option<&Credentials>,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, ConfigServerError> {
        let url = match Url::parse(uri) {
            Ok(url) => url,
            Err(e) => {
                return Ok(FetchOutcome::Failed(FetchFailure::InvalidUri {
                    uri: uri.to_string(),
                    message: e.to_string(),
                }))
            }
        };

        let mut request = self.client.get(url).headers(self.headers.clone());
        if let Some(credentials) = credentials {
            request = request.basic_auth(&credentials.username, credentials.password.as_ref());
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let timed = tokio::time::timeout(self.timeout, exchange);

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(ConfigServerError::Cancelled),
            result = timed => match result {
                Err(_) => FetchOutcome::Failed(FetchFailure::Timeout(self.timeout)),
                Ok(Err(e)) if e.is_timeout() => {
                    FetchOutcome::Failed(FetchFailure::Timeout(self.timeout))
                }
                Ok(Err(e)) => FetchOutcome::Failed(FetchFailure::Transport(e.to_string())),
                Ok(Ok((status, body))) => classify_response(status, &body),
            },
        };

        debug!(uri = %uri, outcome = outcome.outcome(), "Config server fetch finished");
        Ok(outcome)
    }
}

/// Maps a status and body onto a fetch outcome.
pub fn classify_response(status: StatusCode, body: &str) -> FetchOutcome {
    if status == StatusCode::NOT_FOUND {
        return FetchOutcome::NotFound;
    }

    if !status.is_success() {
        return FetchOutcome::Failed(FetchFailure::Status(status.as_u16()));
    }

    if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
        return FetchOutcome::Success {
            status: status.as_u16(),
            environment: None,
        };
    }

    match RemoteEnvironment::from_json(body) {
        Ok(environment) => FetchOutcome::Success {
            status: status.as_u16(),
            environment: Some(environment),
        },
        Err(e) => FetchOutcome::Failed(FetchFailure::Parse(e.to_string())),
    }
}

fn build_headers(options: &ClientOptions) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    if let Some(token) = &options.token {
        match HeaderValue::from_str(token) {
            Ok(value) => {
                headers.insert(HeaderName::from_static("x-config-token"), value);
            }
            Err(e) => warn!(header = TOKEN_HEADER, error = %e, "Ignoring invalid token header"),
        }
    }

    for (name, value) in &options.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "Ignoring invalid custom header"),
        }
    }

    headers
}
