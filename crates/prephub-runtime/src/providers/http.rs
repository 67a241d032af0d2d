//! Shared HTTP plumbing for the provider backends.

use std::time::Duration;

use super::ProviderError;

/// Map a transport failure.
pub(crate) fn transport_error(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::HttpError(err.to_string())
    }
}

/// Turn a non-success response into the matching [`ProviderError`].
///
/// Returns the response untouched when the status is 2xx.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(ProviderError::RateLimited { retry_after });
    }

    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(ProviderError::AuthError);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::ApiError {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Pull a readable message out of an error body.
///
/// Handles `{"error": {"message": ..}}`, `{"error": ".."}` and falls back
/// to a truncated copy of the raw body.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let error = &value["error"];
        if let Some(msg) = error["message"].as_str() {
            return msg.to_string();
        }
        if let Some(msg) = error.as_str() {
            return msg.to_string();
        }
    }
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(
            error_message(r#"{"error": {"message": "model overloaded", "code": 503}}"#),
            "model overloaded"
        );
        assert_eq!(
            error_message(r#"{"error": "Model is currently loading"}"#),
            "Model is currently loading"
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(error_message(&"x".repeat(500)).len(), 200);
    }
}
