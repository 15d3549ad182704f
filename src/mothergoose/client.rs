//! `MotherGoose` API client implementation.
//!
//! This module provides the HTTP client for the `MotherGoose` REST API:
//! bearer authentication, JSON bodies, and bounded exponential-backoff retry
//! that honors the operation context.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url, header};
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::{debug, trace, warn};

use crate::config::EggConfig;
use crate::error::ApiError;
use crate::planner::DeploymentPlan;

use super::api::MotherGooseApi;
use super::context::OperationContext;
use super::types::EggStatus;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry; doubles for each further retry.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// `MotherGoose` API client.
#[derive(Debug, Clone)]
pub struct MotherGooseClient {
    /// HTTP client.
    http: Client,
    /// Base URL without a trailing slash.
    base_url: String,
    /// Parsed base URL that endpoint paths are appended to.
    base: Url,
    /// API key.
    api_key: String,
    /// Per-attempt timeout.
    timeout: Duration,
    /// Retries after the first attempt.
    max_retries: u32,
    /// Delay before the first retry.
    backoff_base: Duration,
}

/// Builder for [`MotherGooseClient`].
#[derive(Debug)]
pub struct MotherGooseClientBuilder {
    base_url: String,
    api_key: String,
    timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
    http_client: Option<Client>,
}

impl MotherGooseClientBuilder {
    /// Sets the per-attempt timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how many times a retryable failure is retried.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub const fn backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Uses a caller-supplied HTTP client.
    #[must_use]
    pub fn http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not an HTTP(S) URL, the API key is
    /// empty, or the HTTP client cannot be created.
    pub fn build(self) -> Result<MotherGooseClient, ApiError> {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::InvalidConfiguration {
                message: format!("API URL must start with http:// or https://, got \"{base_url}\""),
            });
        }
        let base = Url::parse(&base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ApiError::InvalidConfiguration {
                message: format!("API URL is not a valid base URL: \"{base_url}\""),
            })?;
        if self.api_key.is_empty() {
            return Err(ApiError::InvalidConfiguration {
                message: String::from("API key must not be empty"),
            });
        }

        let http = match self.http_client {
            Some(client) => client,
            None => Client::builder().build().map_err(|e| ApiError::InvalidConfiguration {
                message: format!("failed to create HTTP client: {e}"),
            })?,
        };

        Ok(MotherGooseClient {
            http,
            base_url,
            base,
            api_key: self.api_key,
            timeout: self.timeout,
            max_retries: self.max_retries,
            backoff_base: self.backoff_base,
        })
    }
}

impl MotherGooseClient {
    /// Creates a client with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ApiError> {
        Self::builder(base_url, api_key).build()
    }

    /// Starts building a client.
    #[must_use]
    pub fn builder(base_url: &str, api_key: &str) -> MotherGooseClientBuilder {
        MotherGooseClientBuilder {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            http_client: None,
        }
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`.
    #[must_use]
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(20);
        self.backoff_base.saturating_mul(factor)
    }

    /// Appends path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidConfiguration {
                message: format!("API URL cannot take a path: \"{}\"", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Runs a request with retry, returning the decoded body if there is one.
    async fn request<T: DeserializeOwned>(
        &self,
        ctx: &OperationContext,
        method: Method,
        segments: &[&str],
        body: Option<Vec<u8>>,
    ) -> Result<Option<T>, ApiError> {
        let url = self.endpoint(segments)?;
        let path = url.path();
        let mut retry = 0;

        loop {
            if let Some(cause) = ctx.cause() {
                return Err(ApiError::Cancelled { cause });
            }

            let outcome = tokio::select! {
                cause = ctx.done() => return Err(ApiError::Cancelled { cause }),
                result = self.send_once(&method, &url, body.as_deref()) => result,
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if retry >= self.max_retries {
                return Err(ApiError::RetriesExhausted {
                    retries: self.max_retries,
                    last: Box::new(error),
                });
            }

            retry += 1;
            let delay = self.backoff_delay(retry);
            warn!(
                "{method} {path} failed: {error}; retry {retry}/{} in {delay:?}",
                self.max_retries
            );

            tokio::select! {
                cause = ctx.done() => return Err(ApiError::Cancelled { cause }),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Performs a single HTTP attempt.
    async fn send_once<T: DeserializeOwned>(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&[u8]>,
    ) -> Result<Option<T>, ApiError> {
        trace!("{method} {url}");

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .timeout(self.timeout)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.body(body.to_vec());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::transport(format!("failed to execute request: {e}")))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::transport(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(ApiError::Http {
                status_code: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        if bytes.is_empty() {
            return Ok(None);
        }

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ApiError::encoding(format!("failed to decode response: {e}")))
    }
}

fn required<T>(value: Option<T>, what: &str) -> Result<T, ApiError> {
    value.ok_or_else(|| ApiError::encoding(format!("empty response body for {what}")))
}

#[async_trait]
impl MotherGooseApi for MotherGooseClient {
    async fn get_egg_status(
        &self,
        ctx: &OperationContext,
        egg_name: &str,
    ) -> Result<EggStatus, ApiError> {
        debug!("Reading status of egg {egg_name}");
        let status = self
            .request(ctx, Method::GET, &["eggs", egg_name, "status"], None)
            .await?;
        required(status, "egg status")
    }

    async fn list_eggs(&self, ctx: &OperationContext) -> Result<Vec<EggConfig>, ApiError> {
        debug!("Listing eggs");
        let eggs = self.request(ctx, Method::GET, &["eggs"], None).await?;
        Ok(eggs.unwrap_or_default())
    }

    async fn create_or_update_egg(
        &self,
        ctx: &OperationContext,
        egg: &EggConfig,
    ) -> Result<(), ApiError> {
        let body = serde_json::to_vec(egg)
            .map_err(|e| ApiError::encoding(format!("failed to marshal request body: {e}")))?;

        debug!("Storing egg {}", egg.name);
        self.request::<IgnoredAny>(ctx, Method::POST, &["eggs"], Some(body))
            .await?;
        Ok(())
    }

    async fn get_deployment_plan(
        &self,
        ctx: &OperationContext,
        egg_name: &str,
        plan_id: &str,
    ) -> Result<DeploymentPlan, ApiError> {
        debug!("Reading plan {plan_id} of egg {egg_name}");
        let plan = self
            .request(ctx, Method::GET, &["eggs", egg_name, "plans", plan_id], None)
            .await?;
        required(plan, "deployment plan")
    }

    async fn list_deployment_plans(
        &self,
        ctx: &OperationContext,
        egg_name: &str,
    ) -> Result<Vec<DeploymentPlan>, ApiError> {
        debug!("Listing plans of egg {egg_name}");
        let plans = self
            .request(ctx, Method::GET, &["eggs", egg_name, "plans"], None)
            .await?;
        Ok(plans.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mothergoose::CancelCause;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_client(server: &MockServer) -> MotherGooseClient {
        MotherGooseClient::builder(&server.uri(), "secret")
            .backoff_base(Duration::from_millis(10))
            .build()
            .unwrap()
    }

    fn status_body() -> serde_json::Value {
        json!({
            "egg_name": "x",
            "latest_plan": null,
            "deployment_history": [],
            "active_runners": [],
            "config_hash": "abc"
        })
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.map_or(0, |r| r.len())
    }

    #[tokio::test]
    async fn test_retry_then_succeed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eggs/x/status"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/eggs/x/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(status_body()))
            .expect(1)
            .mount(&server)
            .await;

        let status = fast_client(&server)
            .get_egg_status(&OperationContext::new(), "x")
            .await
            .unwrap();

        assert_eq!(status.config_hash, "abc");
        assert_eq!(request_count(&server).await, 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eggs/x/status"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad egg"))
            .mount(&server)
            .await;

        let err = fast_client(&server)
            .get_egg_status(&OperationContext::new(), "x")
            .await
            .unwrap_err();

        assert_eq!(request_count(&server).await, 1);
        match err {
            ApiError::Http {
                status_code,
                status_text,
                body,
            } => {
                assert_eq!(status_code, 400);
                assert_eq!(status_text, "Bad Request");
                assert_eq!(body, "bad egg");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eggs"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/eggs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let eggs = fast_client(&server).list_eggs(&OperationContext::new()).await.unwrap();
        assert!(eggs.is_empty());
        assert_eq!(request_count(&server).await, 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = MotherGooseClient::builder(&server.uri(), "secret")
            .backoff_base(Duration::from_millis(1))
            .max_retries(2)
            .build()
            .unwrap();
        let err = client
            .list_deployment_plans(&OperationContext::new(), "x")
            .await
            .unwrap_err();

        assert_eq!(request_count(&server).await, 3);
        assert!(matches!(err, ApiError::RetriesExhausted { retries: 2, .. }));
        assert_eq!(err.status_code(), Some(503));
        assert!(err.to_string().starts_with("request failed after 2 retries"));
    }

    #[tokio::test]
    async fn test_create_sends_headers_and_body() {
        let server = MockServer::start().await;
        let config = crate::fly::FlyParser::parse_str(crate::fly::fixtures::CANONICAL_EGG, "t.fly").unwrap();
        let egg = crate::config::egg_from_block(&config.blocks[0]).unwrap();

        Mock::given(method("POST"))
            .and(path("/eggs"))
            .and(header("authorization", "Bearer secret"))
            .and(header("content-type", "application/json"))
            .and(header("accept", "application/json"))
            .and(body_json(serde_json::to_value(&egg).unwrap()))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        fast_client(&server)
            .create_or_update_egg(&OperationContext::new(), &egg)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eggs/x/plans"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/eggs/x/plans/p1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = fast_client(&server);
        let ctx = OperationContext::new();
        assert!(client.list_deployment_plans(&ctx, "x").await.unwrap().is_empty());

        let err = client.get_deployment_plan(&ctx, "x", "p1").await.unwrap_err();
        assert!(matches!(err, ApiError::Encoding { .. }));
    }

    #[tokio::test]
    async fn test_path_segments_are_escaped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eggs/a%2Fb%20c/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(status_body()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/eggs/a%2Fb%20c/plans/p%3F1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = fast_client(&server);
        let ctx = OperationContext::new();
        assert_eq!(client.get_egg_status(&ctx, "a/b c").await.unwrap().config_hash, "abc");

        // An empty body proves the escaped route was hit; a miss would be a 404.
        let err = client.get_deployment_plan(&ctx, "a/b c", "p?1").await.unwrap_err();
        assert!(matches!(err, ApiError::Encoding { .. }));
    }

    #[tokio::test]
    async fn test_base_url_path_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/eggs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = MotherGooseClient::new(&format!("{}/api/v1/", server.uri()), "k").unwrap();
        assert!(client.list_eggs(&OperationContext::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eggs/ghost/status"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fast_client(&server)
            .get_egg_status(&OperationContext::new(), "ghost")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_returns_promptly() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = MotherGooseClient::builder(&server.uri(), "secret")
            .backoff_base(Duration::from_secs(10))
            .build()
            .unwrap();
        let ctx = OperationContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), client.get_egg_status(&ctx, "x"))
            .await
            .expect("cancellation should end the call");

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Cancelled {
                cause: CancelCause::Cancelled
            }
        ));
        assert!(err.is_cancelled());
        assert_eq!(request_count(&server).await, 1);
    }

    #[tokio::test]
    async fn test_deadline_during_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = MotherGooseClient::builder(&server.uri(), "secret")
            .backoff_base(Duration::from_secs(10))
            .build()
            .unwrap();
        let ctx = OperationContext::new().with_timeout(Duration::from_millis(200));

        let err = client.list_eggs(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Cancelled {
                cause: CancelCause::DeadlineExceeded
            }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_context_sends_nothing() {
        let server = MockServer::start().await;
        let ctx = OperationContext::new();
        ctx.cancel();

        let err = fast_client(&server).list_eggs(&ctx).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(request_count(&server).await, 0);
    }

    #[test]
    fn test_backoff_doubles() {
        let client = MotherGooseClient::new("https://mothergoose.example.com/", "k").unwrap();
        assert_eq!(client.base_url(), "https://mothergoose.example.com");
        assert_eq!(client.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(client.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(client.backoff_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(
            MotherGooseClient::new("ftp://host", "k"),
            Err(ApiError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            MotherGooseClient::new("https://host", ""),
            Err(ApiError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            MotherGooseClient::new("http://", "k"),
            Err(ApiError::InvalidConfiguration { .. })
        ));
    }
}
