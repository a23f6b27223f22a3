//! Shared JSON-over-HTTP plumbing for the collaborator-service clients.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::error;

use crate::error::{RagError, Result};

/// Build a pooled client with a per-request timeout.
///
/// One client is built per service and reused for every request; cloning it
/// shares the pool.
pub(crate) fn build_client(service: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
        RagError::ConfigError(format!("failed to build {service} HTTP client: {e}"))
    })
}

/// Resolve `path` against a base URL. A base that already ends with `path`
/// is used as is.
pub(crate) fn endpoint_url(service: &str, base: &str, path: &str) -> Result<String> {
    let base = base.trim().trim_end_matches('/');
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(RagError::ConfigError(format!(
            "{service} endpoint must be an http(s) URL, got '{base}'"
        )));
    }
    let path = path.trim_start_matches('/');
    if base.ends_with(&format!("/{path}")) {
        return Ok(base.to_string());
    }
    Ok(format!("{base}/{path}"))
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// POST `body` as JSON and decode a JSON response.
///
/// Connection failures, timeouts, 408, 429 and 5xx map to
/// [`RagError::ServiceUnavailable`]; other statuses and undecodable bodies map
/// to [`RagError::InvalidResponse`].
pub(crate) async fn post_json<B, T>(
    client: &reqwest::Client,
    service: &str,
    url: &str,
    body: &B,
) -> Result<T>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = client.post(url).json(body).send().await.map_err(|e| {
        error!(service, error = %e, "request failed");
        RagError::unavailable(service, format!("request failed: {e}"))
    })?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        error!(service, %status, "service returned an error status");
        let message = format!("service returned {status}: {detail}");
        return Err(if is_transient(status) {
            RagError::unavailable(service, message)
        } else {
            RagError::invalid_response(service, message)
        });
    }

    response.json::<T>().await.map_err(|e| {
        error!(service, error = %e, "failed to read response");
        if e.is_timeout() {
            RagError::unavailable(service, format!("response timed out: {e}"))
        } else {
            RagError::invalid_response(service, format!("failed to parse response: {e}"))
        }
    })
}
