//! Shared HTTP request handling for the remote adapters.

use reqwest::RequestBuilder;

use paper_trail_core::error::{CoreError, CoreResult};

/// Maximum number of bytes of a body included in log output and errors.
const TRUNCATE_LIMIT: usize = 256;

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        s.len()
    } else {
        let mut i = index;
        while i > 0 && !s.is_char_boundary(i) {
            i -= 1;
        }
        i
    }
}

/// Truncate a response body for logging.
pub(crate) fn truncate_for_log(s: &str) -> String {
    if s.len() <= TRUNCATE_LIMIT {
        s.to_string()
    } else {
        format!(
            "{}... [truncated, total {} bytes]",
            &s[..floor_char_boundary(s, TRUNCATE_LIMIT)],
            s.len()
        )
    }
}

/// Send a request and read the status and body text
///
/// Transport failures become `CoreError::NetworkError`; HTTP error statuses
/// are returned to the caller.
pub(crate) async fn send(
    request: RequestBuilder,
    service: &str,
    target: &str,
) -> CoreResult<(u16, String)> {
    log::debug!("[{service}] {target}");

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            CoreError::NetworkError(format!("{service} request timed out: {e}"))
        } else {
            CoreError::NetworkError(format!("{service} request failed: {e}"))
        }
    })?;

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| CoreError::NetworkError(format!("Failed to read response body: {e}")))?;

    log::debug!("[{service}] Response {status}: {}", truncate_for_log(&body));
    Ok((status, body))
}
