//! Shared HTTP plumbing for the remote adapters.
//!
//! - `build_client()` builds a reqwest client from `HttpConfig`
//! - `send_with_retry()` replaces `request.send()` and retries 429/5xx with
//!   exponential backoff plus jitter, honoring `Retry-After` in seconds
//! - `check_status()` / `map_send_error()` turn transport results into
//!   `ProviderError`s so every adapter reports failures the same way

use reqwest::{Client, Request, Response, StatusCode};
use std::time::Duration;

use super::ProviderError;
use crate::config::{HttpConfig, RetryConfig};

/// Build the HTTP client shared by one adapter instance
pub fn build_client(config: &HttpConfig) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .danger_accept_invalid_certs(!config.verify_cert)
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| ProviderError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Parse a numeric Retry-After header, capped at 5 minutes
fn parse_retry_after(response: &Response) -> Option<Duration> {
    let value = response.headers().get("retry-after")?.to_str().ok()?;
    let secs = value.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs.min(300)))
}

fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base = config.base_delay_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_delay_ms as f64);
    // 10-30% jitter
    let jitter = capped * (0.1 + rand::random::<f64>() * 0.2);
    Duration::from_millis((capped + jitter) as u64)
}

/// Send a request, retrying 429/5xx responses.
///
/// Requests with streaming bodies are sent once; only buffered bodies can be
/// replayed.
pub async fn send_with_retry(
    client: &Client,
    request: Request,
    config: &RetryConfig,
) -> Result<Response, reqwest::Error> {
    let method = request.method().clone();
    let url = request.url().clone();
    let headers = request.headers().clone();
    let body_bytes = request.body().and_then(|b| b.as_bytes()).map(|b| b.to_vec());
    let replayable = request.body().is_none() || body_bytes.is_some();

    let mut last_response = client.execute(request).await?;
    if !replayable {
        return Ok(last_response);
    }

    for attempt in 0..config.max_retries {
        if !is_retryable_status(last_response.status().as_u16()) {
            return Ok(last_response);
        }

        let delay = parse_retry_after(&last_response).unwrap_or_else(|| calculate_delay(attempt, config));

        tracing::debug!(
            "HTTP {} {} returned {}. Retry {}/{} after {:?}",
            method,
            url,
            last_response.status(),
            attempt + 1,
            config.max_retries,
            delay
        );

        tokio::time::sleep(delay).await;

        let mut retry_req = client.request(method.clone(), url.clone());
        for (key, value) in headers.iter() {
            retry_req = retry_req.header(key, value);
        }
        if let Some(ref body) = body_bytes {
            retry_req = retry_req.body(body.clone());
        }

        last_response = retry_req.send().await?;
    }

    Ok(last_response)
}

/// Map a transport failure (no HTTP response) to a provider error
pub fn map_send_error(error: reqwest::Error) -> ProviderError {
    if error.is_builder() {
        ProviderError::InvalidConfig(error.to_string())
    } else if error.is_decode() {
        ProviderError::ParseError(error.to_string())
    } else if error.is_status() {
        ProviderError::ServerError(error.to_string())
    } else {
        // connect, timeout, TLS, redirect and interrupted bodies
        ProviderError::Unreachable(error.to_string())
    }
}

/// Map an HTTP status outside 2xx to a provider error
pub fn status_error(status: StatusCode, context: &str, body: &str) -> ProviderError {
    let detail = if body.trim().is_empty() {
        context.to_string()
    } else {
        format!("{}: {}", context, truncate(body.trim(), 200))
    };
    match status.as_u16() {
        401 => ProviderError::auth_expired(detail),
        403 => ProviderError::PermissionDenied(detail),
        404 => ProviderError::NotFound(detail),
        405 | 409 | 412 => ProviderError::NameConflict(detail),
        501 => ProviderError::Unsupported(detail),
        _ => ProviderError::ServerError(format!("{} ({})", detail, status)),
    }
}

/// Pass 2xx responses through, convert everything else with `status_error`
pub async fn check_status(response: Response, context: &str) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, context, &body))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
