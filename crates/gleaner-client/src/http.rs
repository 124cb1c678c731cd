//! Shared HTTP plumbing: browser-like headers, retry with backoff, and the
//! mapping of transport failures onto [`FetchError`].

use std::time::Duration;

use gleaner_core::config::HttpConfig;
use gleaner_core::error::{AppError, FetchError, FetchErrorKind};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::time::sleep;
use url::Url;

/// Bodies shorter than this are treated as empty responses.
pub const MIN_BODY_LEN: usize = 100;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// HTTP client wrapper shared by the page fetchers and the search client.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpConfig,
}

impl HttpClient {
    /// Builds a client sending browser-like headers, with an optional `Referer`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` for an unusable referer and
    /// `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new(config: HttpConfig, referer: Option<&str>) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        if let Some(referer) = referer {
            let value = HeaderValue::from_str(referer)
                .map_err(|_| AppError::InvalidUrl(referer.to_string()))?;
            headers.insert(REFERER, value);
        }

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// GETs a page and returns its body.
    ///
    /// 404 and 403 map to `HttpStatus` with a readable detail; a body
    /// shorter than [`MIN_BODY_LEN`] is an `EmptyResponse`.
    pub async fn get_text(&self, url: &Url) -> Result<String, FetchError> {
        let resp = self
            .request_with_retry(url, || self.client.get(url.clone()))
            .await?;
        let text = resp.text().await.map_err(|e| self.transport_error(&e))?;

        if text.len() < MIN_BODY_LEN {
            return Err(FetchError::new(
                FetchErrorKind::EmptyResponse,
                format!("Response too short or empty ({} bytes)", text.len()),
            ));
        }
        Ok(text)
    }

    /// POSTs a JSON body with extra headers and decodes the JSON answer.
    pub async fn post_json(
        &self,
        url: &Url,
        headers: &HeaderMap,
        body: &Value,
    ) -> Result<Value, FetchError> {
        let resp = self
            .request_with_retry(url, || {
                self.client
                    .post(url.clone())
                    .headers(headers.clone())
                    .json(body)
            })
            .await?;

        resp.json::<Value>().await.map_err(|e| {
            if e.is_decode() {
                FetchError::new(FetchErrorKind::Malformed, format!("Invalid JSON: {}", e))
            } else {
                self.transport_error(&e)
            }
        })
    }

    /// Sends the request built by `build`, retrying transient failures.
    ///
    /// Retries, up to `max_retries` attempts in total:
    /// - Rate limiting (429), exponential backoff
    /// - Server errors (5xx), linear backoff
    /// - Timeouts and connection failures, linear backoff
    async fn request_with_retry<B>(&self, url: &Url, build: B) -> Result<Response, FetchError>
    where
        B: Fn() -> RequestBuilder,
    {
        let max_retries = self.config.max_retries.max(1);
        let base = self.config.retry_base_delay;
        let mut last_error = FetchError::new(FetchErrorKind::Connection, "No attempts made");

        for attempt in 1..=max_retries {
            match build().send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        return Ok(resp);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = FetchError::status(429, "Rate limit exceeded (HTTP 429)");
                        if attempt < max_retries {
                            sleep(base * 2_u32.pow(attempt)).await;
                            continue;
                        }
                        return Err(last_error);
                    }

                    if status.is_server_error() {
                        last_error = FetchError::status(
                            status.as_u16(),
                            format!("Server error: HTTP {}", status.as_u16()),
                        );
                        if attempt < max_retries {
                            sleep(linear_backoff(base, attempt)).await;
                            continue;
                        }
                        return Err(last_error);
                    }

                    // Client error (4xx except 429) - don't retry
                    return Err(status_error(status, url));
                }
                Err(e) => {
                    last_error = self.transport_error(&e);
                    if attempt < max_retries && (e.is_timeout() || e.is_connect()) {
                        tracing::debug!(url = %url, attempt, error = %e, "Retrying request");
                        sleep(linear_backoff(base, attempt)).await;
                        continue;
                    }
                    return Err(last_error);
                }
            }
        }

        Err(last_error)
    }

    fn transport_error(&self, e: &reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::timeout(self.config.timeout.as_secs())
        } else if e.is_connect() {
            FetchError::new(
                FetchErrorKind::Connection,
                format!("Network connection error: {}", truncate(&e.to_string(), 100)),
            )
        } else {
            FetchError::new(
                FetchErrorKind::Connection,
                format!("Request exception: {}", truncate(&e.to_string(), 100)),
            )
        }
    }
}

fn linear_backoff(base: Duration, attempt: u32) -> Duration {
    base * attempt
}

fn status_error(status: StatusCode, url: &Url) -> FetchError {
    let code = status.as_u16();
    let detail = match code {
        404 => "Page not found (HTTP 404)".to_string(),
        403 => "Access forbidden (HTTP 403)".to_string(),
        _ => format!("HTTP {} from {}", code, url),
    };
    FetchError::status(code, detail)
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
