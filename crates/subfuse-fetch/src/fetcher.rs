//! Concurrent subscription fetcher
//!
//! Retrieval never errors outward: every failure is folded into a
//! `FetchResult` with `success = false`. A global semaphore bounds
//! concurrency, each host gets a token bucket and a circuit breaker, and
//! fetched bodies are served through the tiered cache.

use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use subfuse_cache::{fetch_key, fetch_tag, CacheOptions, TieredCache};
use subfuse_core::encoding::decode_base64_text;
use subfuse_core::FetchResult;

use crate::breakers::{BreakerConfig, HostBreakers};
use crate::error::FetchError;
use crate::limit::{HostRateLimiters, RateLimitConfig};
use crate::retry::RetryPolicy;

/// Fetcher tuning
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Global concurrent request bound
    pub max_concurrent: usize,
    /// Total per-request deadline
    pub request_timeout: Duration,
    /// Connect deadline
    pub connect_timeout: Duration,
    /// Retry policy for transient failures
    pub retry: RetryPolicy,
    /// Per-host politeness limits
    pub rate_limit: RateLimitConfig,
    /// Per-host circuit breaker parameters
    pub breaker: BreakerConfig,
    /// TTL for cached subscription bodies
    pub cache_ttl: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 50,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            breaker: BreakerConfig::default(),
            cache_ttl: Duration::from_secs(300),
        }
    }
}

/// The subscription fetcher
pub struct Fetcher {
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
    breakers: HostBreakers,
    limiters: HostRateLimiters,
    cache: Option<Arc<TieredCache>>,
    config: FetcherConfig,
}

impl Fetcher {
    /// Build a fetcher with the given tuning
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("subfuse/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            breakers: HostBreakers::new(config.breaker.clone()),
            limiters: HostRateLimiters::new(config.rate_limit.clone()),
            cache: None,
            config,
        })
    }

    /// Attach the tiered cache for read-through fetches
    pub fn with_cache(mut self, cache: Arc<TieredCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Fetch one URL
    pub async fn fetch(&self, url: &str) -> FetchResult {
        self.fetch_with_cancel(url, &CancellationToken::new()).await
    }

    /// Fetch one URL, observing the cancellation token at every await
    pub async fn fetch_with_cancel(&self, url: &str, cancel: &CancellationToken) -> FetchResult {
        let start = Instant::now();

        let _permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return FetchResult::failure("fetcher shut down", start.elapsed()),
            },
            _ = cancel.cancelled() => return FetchResult::cancelled(start.elapsed()),
        };

        if let Some(result) = self.try_cache(url, start).await {
            return result;
        }

        let host = match url::Url::parse(url) {
            Ok(parsed) => match parsed.host_str() {
                Some(host) => host.to_string(),
                None => return FetchResult::failure("invalid URL: missing host", start.elapsed()),
            },
            Err(e) => return FetchResult::failure(format!("invalid URL: {}", e), start.elapsed()),
        };

        if !self.breakers.allow(&host) {
            debug!(url = %url, host = %host, "circuit open, failing fast");
            return FetchResult::failure("CircuitOpen", start.elapsed());
        }

        tokio::select! {
            _ = self.limiters.acquire(&host) => {}
            _ = cancel.cancelled() => return FetchResult::cancelled(start.elapsed()),
        }

        match self.fetch_with_retry(url, cancel).await {
            Ok((body, status)) => {
                self.breakers.record_success(&host);
                let configs = extract_config_lines(&body);
                self.store_in_cache(url, &body).await;
                info!(url = %url, configs = configs.len(), "fetched source");
                FetchResult::success(configs, start.elapsed(), status)
            }
            Err(FetchError::Cancelled) => {
                // An aborted in-flight request still counts against the
                // source's history, not against the host breaker.
                FetchResult::cancelled(start.elapsed())
            }
            Err(e) => {
                self.breakers.record_failure(&host);
                let result = FetchResult::failure(e.to_string(), start.elapsed());
                match e {
                    FetchError::Status(code) => result.with_status(code),
                    _ => result,
                }
            }
        }
    }

    /// Fetch many URLs concurrently; results preserve input order
    pub async fn fetch_all(&self, urls: &[String], cancel: &CancellationToken) -> Vec<FetchResult> {
        let futures = urls.iter().map(|url| self.fetch_with_cancel(url, cancel));
        futures::future::join_all(futures).await
    }

    async fn try_cache(&self, url: &str, start: Instant) -> Option<FetchResult> {
        let cache = self.cache.as_ref()?;
        let entry = cache.get(&fetch_key(url)).await?;
        let body = String::from_utf8(entry.value.to_vec()).ok()?;
        let configs = extract_config_lines(&body);
        debug!(url = %url, configs = configs.len(), "cache hit");
        Some(
            FetchResult::success(configs, start.elapsed(), 200).with_cache_hit(),
        )
    }

    async fn store_in_cache(&self, url: &str, body: &str) {
        let Some(cache) = &self.cache else { return };
        let options = CacheOptions::with_ttl(self.config.cache_ttl)
            .with_tags(vec![fetch_tag(url)]);
        if let Err(e) = cache
            .set(&fetch_key(url), Bytes::from(body.to_string()), options)
            .await
        {
            warn!(url = %url, error = %e, "failed to cache fetched body");
        }
    }

    async fn fetch_with_retry(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, u16), FetchError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let outcome = tokio::select! {
                response = self.client.get(url).send() => self.read_response(response).await,
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            };

            match outcome {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retriable() => {
                    match self.config.retry.delay_for(attempt) {
                        Some(delay) => {
                            debug!(url = %url, attempt, error = %e, "retrying after backoff");
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                            }
                        }
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn read_response(
        &self,
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<(String, u16), FetchError> {
        let response = response?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        Ok((body, status.as_u16()))
    }

    /// Breaker state for a host, for diagnostics
    pub fn breaker_state(&self, host: &str) -> subfuse_cache::BreakerState {
        self.breakers.state(host)
    }
}

/// Split a subscription body into candidate configuration lines.
///
/// Bodies that arrive as one base64 blob are decoded first when the decoded
/// text actually contains share links.
pub fn extract_config_lines(body: &str) -> Vec<String> {
    let text = if body.contains("://") {
        body.to_string()
    } else {
        match decode_base64_text(body) {
            Some(decoded) if decoded.contains("://") => decoded,
            _ => body.to_string(),
        }
    };

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//") && line.contains("://"))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quick_config() -> FetcherConfig {
        FetcherConfig {
            retry: RetryPolicy {
                base_delay: Duration::from_millis(5),
                jitter: false,
                ..Default::default()
            },
            rate_limit: RateLimitConfig {
                period: Duration::from_millis(1),
                burst: nonzero_ext::nonzero!(50u32),
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sub"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("vmess://abc\nvless://uuid@h:443?security=tls\n"),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(quick_config()).unwrap();
        let result = fetcher.fetch(&format!("{}/sub", server.uri())).await;

        assert!(result.success);
        assert_eq!(result.configs.len(), 2);
        assert_eq!(result.status_code, Some(200));
        assert!(!result.cache_hit);
    }

    #[tokio::test]
    async fn test_retry_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sub"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sub"))
            .respond_with(ResponseTemplate::new(200).set_body_string("trojan://pw@h:443\n"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(quick_config()).unwrap();
        let result = fetcher.fetch(&format!("{}/sub", server.uri())).await;
        assert!(result.success);
        assert_eq!(result.configs.len(), 1);
    }

    #[tokio::test]
    async fn test_client_error_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sub"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(quick_config()).unwrap();
        let result = fetcher.fetch(&format!("{}/sub", server.uri())).await;

        assert!(!result.success);
        assert_eq!(result.status_code, Some(404));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_and_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sub"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut config = quick_config();
        config.retry = RetryPolicy::no_retry();
        config.breaker = BreakerConfig {
            failure_threshold: 5,
            recovery_timeout: Duration::from_millis(50),
        };
        let fetcher = Fetcher::new(config).unwrap();
        let url = format!("{}/sub", server.uri());

        for _ in 0..5 {
            let result = fetcher.fetch(&url).await;
            assert!(!result.success);
            assert_eq!(result.status_code, Some(500));
        }

        // Sixth call fails fast without reaching the network.
        let result = fetcher.fetch(&url).await;
        assert_eq!(result.error.as_deref(), Some("CircuitOpen"));
        assert_eq!(server.received_requests().await.unwrap().len(), 5);

        // After the recovery timeout one trial call goes out.
        tokio::time::sleep(Duration::from_millis(80)).await;
        let _ = fetcher.fetch(&url).await;
        assert_eq!(server.received_requests().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sub"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ss://YWVzOnB3@h:8388\n"))
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(TieredCache::memory_only(100));
        let fetcher = Fetcher::new(quick_config()).unwrap().with_cache(cache);
        let url = format!("{}/sub", server.uri());

        let first = fetcher.fetch(&url).await;
        assert!(first.success && !first.cache_hit);

        let second = fetcher.fetch(&url).await;
        assert!(second.success && second.cache_hit);
        assert_eq!(second.configs, first.configs);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_cancellation_before_request() {
        let fetcher = Fetcher::new(quick_config()).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = fetcher
            .fetch_with_cancel("http://127.0.0.1:9/never", &token)
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_fetch_all_preserves_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(200).set_body_string("vmess://a\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(quick_config()).unwrap();
        let urls = vec![
            format!("{}/a", server.uri()),
            format!("{}/b", server.uri()),
        ];
        let results = fetcher.fetch_all(&urls, &CancellationToken::new()).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(!results[1].success);
    }

    #[test]
    fn test_extract_plain_lines() {
        let lines = extract_config_lines("vmess://a\n\n  trojan://b  \nnot a link\n");
        assert_eq!(lines, vec!["vmess://a", "trojan://b"]);
    }

    #[test]
    fn test_extract_base64_body() {
        let encoded = BASE64.encode("vless://u@h:443\nss://x@h:8388\n");
        let lines = extract_config_lines(&encoded);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("vless://"));
    }
}
