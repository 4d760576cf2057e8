//! reqwest implementation of the remote data endpoint.
//!
//! Every action is a JSON POST to `<base>/<action>`. The server answers 200
//! with `{success, ...}` or `{error}`; non-2xx statuses are transport
//! failures.

use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::{header, Client, StatusCode, Url};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{Action, ApiError, RemoteEndpoint};
use crate::config::Config;

/// HTTP request timeout in seconds.
/// Matches the web client's script timeout so both fail at the same point.
pub const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::InvalidResponse(format!("Invalid API base URL {}: {}", base_url, e)))?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn action_url(&self, action: Action) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            action.as_str()
        )
    }

    /// Body with the credential attached as `token`.
    fn with_credential(body: Value, credential: Option<&str>) -> Value {
        let mut fields = match body {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            other => {
                let mut fields = Map::new();
                fields.insert("body".to_string(), other);
                fields
            }
        };
        if let Some(token) = credential.filter(|t| !t.is_empty()) {
            fields.insert("token".to_string(), Value::String(token.to_string()));
        }
        Value::Object(fields)
    }

    /// Ok(Some(body)) for an answer, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<Value>, ApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(Some(response.json().await?))
        } else if status.as_u16() == 429 {
            Ok(None)
        } else {
            let body = response.text().await.unwrap_or_default();
            Self::error_body(status, &body).map(Some)
        }
    }

    /// The server reports rejections as a JSON object with a non-2xx status.
    /// Those are answers for the caller to inspect; anything else is a
    /// transport failure.
    fn error_body(status: StatusCode, body: &str) -> Result<Value, ApiError> {
        match serde_json::from_str::<Value>(body) {
            Ok(value) if value.is_object() => {
                debug!(status = status.as_u16(), "Server rejected request with JSON body");
                Ok(value)
            }
            _ => Err(ApiError::from_status(status, body)),
        }
    }

    async fn post(&self, action: Action, body: &Value) -> Result<Value, ApiError> {
        let url = self.action_url(action);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .post(&url)
                .header(header::ACCEPT, "application/json")
                .header(header::CACHE_CONTROL, "no-store")
                .json(body)
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(value) => {
                    debug!(action = %action, "Remote call completed");
                    return Ok(value);
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(action = %action, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }
}

impl RemoteEndpoint for ApiClient {
    fn call<'a>(
        &'a self,
        action: Action,
        body: Value,
        credential: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Value, ApiError>> {
        async move {
            let body = Self::with_credential(body, credential);
            self.post(action, &body).await
        }
        .boxed()
    }
}
