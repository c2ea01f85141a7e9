use std::time::Duration;

use reqwest::{Response, StatusCode};

use crate::common::error::{EnrichError, Result};

/// Shared HTTP client for the CDS services
pub fn build_client(user_agent: &str, timeout_secs: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .gzip(true)
        .build()?;
    Ok(client)
}

/// Turns transport errors and non-2xx statuses into `RemoteService` errors
/// tagged with the service name, returning the body on success.
pub async fn read_body(service: &str, sent: std::result::Result<Response, reqwest::Error>) -> Result<String> {
    let resp = sent.map_err(|e| EnrichError::remote(service, transport_message(&e)))?;
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| EnrichError::remote(service, transport_message(&e)))?;
    if !status.is_success() {
        return Err(status_error(service, status, &body));
    }
    Ok(body)
}

/// 4xx answers are refusals and are not retried, except timeouts and
/// throttling (408, 429).
pub(crate) fn status_error(service: &str, status: StatusCode, body: &str) -> EnrichError {
    let excerpt: String = body.chars().take(300).collect();
    let message = format!("HTTP {}: {}", status.as_u16(), excerpt.trim());
    let transient = matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS);
    if status.is_client_error() && !transient {
        EnrichError::rejected(service, message)
    } else {
        EnrichError::remote(service, message)
    }
}

fn transport_message(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else {
        e.to_string()
    }
}
