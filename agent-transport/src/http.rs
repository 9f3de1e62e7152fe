//! HTTPS implementation of [`PlatformTransport`].

use std::fmt;
use std::time::Duration;

use agent_primitives::{
    ActionSubmission, AgentEvent, AgentIdentity, AgentToken, ApiKey, ExecutionRecord,
};
use async_trait::async_trait;
use bytes::Bytes;
use hyper::body::to_bytes;
use hyper::header::{ACCEPT, CONTENT_TYPE, HeaderValue, RETRY_AFTER, USER_AGENT};
use hyper::{Body, Method, Request, StatusCode, Uri};
use serde::Serialize;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{TransportError, TransportResult};
use crate::http_client::{HyperClient, build_https_client};
use crate::retry::{RetryPolicy, is_transient_status};
use crate::traits::{ActionAck, PlatformTransport, PollFilters};
use crate::wire::{ActionRequest, ErrorResponse, PendingPage, RegisterRequest, RegisterResponse};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-avala-api-key";

/// Header carrying the submission identifier on action calls.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

const USER_AGENT_VALUE: &str = concat!("avala-agents-rs/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`HttpTransport`].
#[derive(Clone, Debug)]
pub struct TransportConfig {
    base_url: String,
    api_key: ApiKey,
    timeout: Duration,
    retry: RetryPolicy,
}

impl TransportConfig {
    /// Uses the identity's base URL and credential with default timeout and retry.
    #[must_use]
    pub fn from_identity(identity: &AgentIdentity) -> Self {
        Self {
            base_url: identity.base_url().to_owned(),
            api_key: identity.api_key().clone(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy for polling and action submission.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn retry(&self) -> RetryPolicy {
        self.retry
    }
}

/// Transport that talks to the platform's agent API over HTTP(S).
pub struct HttpTransport {
    client: HyperClient,
    base_url: String,
    api_key: HeaderValue,
    timeout: Duration,
    retry: RetryPolicy,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

struct RawResponse {
    status: StatusCode,
    retry_after: Option<Duration>,
    body: Bytes,
}

enum RetryFailure {
    Build(TransportError),
    Exhausted {
        attempts: u32,
        status: Option<u16>,
        reason: String,
    },
}

impl HttpTransport {
    /// Constructs a transport from the supplied configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`] if the base URL does not parse
    /// or the API key cannot be sent as a header value.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: TransportConfig) -> TransportResult<Self> {
        config.base_url.parse::<Uri>().map_err(|err| {
            TransportError::configuration(format!("invalid platform base URL: {err}"))
        })?;

        let mut api_key = HeaderValue::from_str(config.api_key.expose()).map_err(|_| {
            TransportError::configuration("API key contains characters not allowed in headers")
        })?;
        api_key.set_sensitive(true);

        Ok(Self {
            client: build_https_client(),
            base_url: config.base_url,
            api_key,
            timeout: config.timeout,
            retry: config.retry,
        })
    }

    fn endpoint(&self, path: &str) -> TransportResult<Uri> {
        format!("{}{path}", self.base_url)
            .parse::<Uri>()
            .map_err(|err| TransportError::configuration(format!("invalid endpoint `{path}`: {err}")))
    }

    fn pending_uri(&self, token: &AgentToken, filters: &PollFilters) -> TransportResult<Uri> {
        let mut path = format!(
            "agents/{}/executions/?status=pending",
            urlencoding::encode(token.as_str())
        );
        if let Some(project) = filters.project() {
            path.push_str("&project=");
            path.push_str(&urlencoding::encode(project));
        }
        if !filters.task_types().is_empty() {
            let joined = filters
                .task_types()
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(",");
            path.push_str("&task_types=");
            path.push_str(&urlencoding::encode(&joined));
        }
        self.endpoint(&path)
    }

    fn request(
        &self,
        method: Method,
        uri: Uri,
        body: Option<Bytes>,
        idempotency_key: Option<&HeaderValue>,
    ) -> TransportResult<Request<Body>> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(API_KEY_HEADER, self.api_key.clone())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, USER_AGENT_VALUE);
        if let Some(key) = idempotency_key {
            builder = builder.header(IDEMPOTENCY_KEY_HEADER, key.clone());
        }
        let body = match body {
            Some(bytes) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(bytes)
            }
            None => Body::empty(),
        };
        builder
            .body(body)
            .map_err(|err| TransportError::configuration(format!("failed to build request: {err}")))
    }

    /// Performs one request. `Err` carries a transient network failure.
    async fn exchange(&self, request: Request<Body>) -> Result<RawResponse, String> {
        let call = async {
            let response = self.client.request(request).await?;
            let status = response.status();
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = to_bytes(response.into_body()).await?;
            Ok::<_, hyper::Error>(RawResponse {
                status,
                retry_after,
                body,
            })
        };

        timeout(self.timeout, call)
            .await
            .map_err(|_| format!("request timed out after {:?}", self.timeout))?
            .map_err(|err| format!("request failed: {err}"))
    }

    async fn exchange_with_retry<F>(
        &self,
        operation: &'static str,
        build: F,
    ) -> Result<(RawResponse, u32), RetryFailure>
    where
        F: Fn() -> TransportResult<Request<Body>> + Send + Sync,
    {
        let max_attempts = self.retry.max_attempts().get();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request = build().map_err(RetryFailure::Build)?;

            let (reason, status, hint) = match self.exchange(request).await {
                Ok(response) if !is_transient_status(response.status) => {
                    return Ok((response, attempt));
                }
                Ok(response) => (
                    format!(
                        "HTTP {}: {}",
                        response.status,
                        ErrorResponse::describe(&response.body)
                    ),
                    Some(response.status.as_u16()),
                    response.retry_after,
                ),
                Err(reason) => (reason, None, None),
            };

            if attempt >= max_attempts {
                return Err(RetryFailure::Exhausted {
                    attempts: attempt,
                    status,
                    reason,
                });
            }

            let delay = self.retry.delay_with_hint(attempt, hint);
            warn!(
                operation,
                attempt,
                max_attempts,
                ?delay,
                %reason,
                "transient platform failure; retrying"
            );
            sleep(delay).await;
        }
    }
}

fn encode<T: Serialize>(payload: &T) -> TransportResult<Bytes> {
    serde_json::to_vec(payload)
        .map(Bytes::from)
        .map_err(|err| TransportError::configuration(format!("failed to encode request: {err}")))
}

#[async_trait]
impl PlatformTransport for HttpTransport {
    async fn register(
        &self,
        identity: &AgentIdentity,
        events: &[AgentEvent],
    ) -> TransportResult<AgentToken> {
        let payload = RegisterRequest {
            name: identity.name().to_owned(),
            events: events.iter().map(|event| event.as_str().to_owned()).collect(),
            project: identity.project().map(ToOwned::to_owned),
            task_types: identity.task_types().iter().cloned().collect(),
        };
        let request = self.request(
            Method::POST,
            self.endpoint("agents/")?,
            Some(encode(&payload)?),
            None,
        )?;

        let response = self.exchange(request).await.map_err(|reason| {
            TransportError::registration(None, format!("network error during registration: {reason}"))
        })?;

        let status = response.status;
        if !status.is_success() {
            return Err(TransportError::registration(
                Some(status.as_u16()),
                format!(
                    "failed to register agent '{}': HTTP {status}: {}",
                    identity.name(),
                    ErrorResponse::describe(&response.body)
                ),
            ));
        }

        let parsed: RegisterResponse = serde_json::from_slice(&response.body).map_err(|err| {
            TransportError::registration(
                Some(status.as_u16()),
                format!("undecodable registration response: {err}"),
            )
        })?;

        let uid = parsed.uid.unwrap_or_default();
        let token = AgentToken::new(uid).map_err(|_| {
            TransportError::registration(
                Some(status.as_u16()),
                format!(
                    "platform returned success but no agent uid for '{}'",
                    identity.name()
                ),
            )
        })?;

        debug!(agent = %identity.name(), uid = %token, "registration accepted");
        Ok(token)
    }

    async fn fetch_pending(
        &self,
        token: &AgentToken,
        filters: &PollFilters,
    ) -> TransportResult<Vec<ExecutionRecord>> {
        let uri = self.pending_uri(token, filters)?;
        let (response, _) = self
            .exchange_with_retry("fetch_pending", || {
                self.request(Method::GET, uri.clone(), None, None)
            })
            .await
            .map_err(|failure| match failure {
                RetryFailure::Build(err) => err,
                RetryFailure::Exhausted {
                    attempts, reason, ..
                } => TransportError::Poll { attempts, reason },
            })?;

        let status = response.status;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TransportError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(TransportError::api(
                Some(status.as_u16()),
                format!(
                    "fetching executions returned HTTP {status}: {}",
                    ErrorResponse::describe(&response.body)
                ),
            ));
        }

        let page: PendingPage = serde_json::from_slice(&response.body).map_err(|err| {
            TransportError::api(
                Some(status.as_u16()),
                format!("undecodable executions response: {err}"),
            )
        })?;
        let records = page.into_records();
        debug!(count = records.len(), "fetched pending executions");
        Ok(records)
    }

    async fn post_action(&self, submission: &ActionSubmission) -> TransportResult<ActionAck> {
        let payload = ActionRequest {
            execution: submission.execution_id().as_str().to_owned(),
            action: submission.action(),
            reason: submission.reason().map(ToOwned::to_owned),
        };
        let body = encode(&payload)?;
        let key = HeaderValue::from_str(&submission.submission_id().to_string()).map_err(|err| {
            TransportError::configuration(format!("invalid idempotency key: {err}"))
        })?;
        let uri = self.endpoint("agent-actions/")?;

        let (response, attempts) = self
            .exchange_with_retry("post_action", || {
                self.request(Method::POST, uri.clone(), Some(body.clone()), Some(&key))
            })
            .await
            .map_err(|failure| match failure {
                RetryFailure::Build(err) => err,
                RetryFailure::Exhausted {
                    attempts,
                    status,
                    reason,
                } => TransportError::Action {
                    status,
                    attempts,
                    reason,
                },
            })?;

        let status = response.status;
        if status.is_success() {
            debug!(
                execution_id = %submission.execution_id(),
                action = %submission.action(),
                "action accepted"
            );
            return Ok(ActionAck::Accepted);
        }
        if status == StatusCode::CONFLICT {
            info!(
                execution_id = %submission.execution_id(),
                action = %submission.action(),
                detail = %ErrorResponse::describe(&response.body),
                "platform already holds an action for this execution"
            );
            return Ok(ActionAck::AlreadySatisfied);
        }

        Err(TransportError::Action {
            status: Some(status.as_u16()),
            attempts,
            reason: format!(
                "submitting '{}' for execution '{}' returned HTTP {status}: {}",
                submission.action(),
                submission.execution_id(),
                ErrorResponse::describe(&response.body)
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> HttpTransport {
        let identity = AgentIdentity::builder(ApiKey::new("avk_test").unwrap())
            .base_url("https://api.example.test/api/v1")
            .unwrap()
            .build()
            .unwrap();
        HttpTransport::new(TransportConfig::from_identity(&identity)).expect("transport")
    }

    #[test]
    fn pending_uri_encodes_filters() {
        let transport = transport();
        let token = AgentToken::new("agent-1").unwrap();
        let filters = PollFilters::new()
            .with_project("proj x")
            .with_task_types(["polygon", "bounding_box"]);

        let uri = transport.pending_uri(&token, &filters).unwrap();
        assert_eq!(
            uri.to_string(),
            "https://api.example.test/api/v1/agents/agent-1/executions/?status=pending&project=proj%20x&task_types=bounding_box%2Cpolygon"
        );
    }

    #[test]
    fn pending_uri_without_filters() {
        let transport = transport();
        let token = AgentToken::new("agent-1").unwrap();
        let uri = transport.pending_uri(&token, &PollFilters::new()).unwrap();
        assert_eq!(uri.query(), Some("status=pending"));
    }

    #[test]
    fn debug_hides_credentials() {
        let rendered = format!("{:?}", transport());
        assert!(!rendered.contains("avk_test"));
    }

    #[test]
    fn rejects_unusable_api_key() {
        let identity = AgentIdentity::builder(ApiKey::new("bad\nkey").unwrap())
            .build()
            .unwrap();
        let err = HttpTransport::new(TransportConfig::from_identity(&identity))
            .expect_err("newline in header should fail");
        assert!(matches!(err, TransportError::Configuration { .. }));
    }
}
