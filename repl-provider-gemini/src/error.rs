//! Mapping of HTTP/reqwest errors to [`ProviderError`].

use repl_types::ProviderError;

/// Map a Gemini HTTP status code to a [`ProviderError`].
///
/// Reference: <https://ai.google.dev/gemini-api/docs/troubleshooting>
pub(crate) fn map_http_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        429 => ProviderError::Throttled(body.to_string()),
        401 | 403 => ProviderError::Unauthorized(body.to_string()),
        400 | 404 => ProviderError::BadRequest(body.to_string()),
        500..=599 => ProviderError::Transient(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {status}: {body}")),
    }
}

/// Map a [`reqwest::Error`] to a [`ProviderError`].
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() || err.is_connect() {
        ProviderError::Transient(err.to_string())
    } else {
        ProviderError::Unknown(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn status_classification() {
        assert!(matches!(
            map_http_status(StatusCode::TOO_MANY_REQUESTS, "RESOURCE_EXHAUSTED"),
            ProviderError::Throttled(_)
        ));
        assert!(matches!(
            map_http_status(StatusCode::UNAUTHORIZED, ""),
            ProviderError::Unauthorized(_)
        ));
        assert!(matches!(
            map_http_status(StatusCode::FORBIDDEN, ""),
            ProviderError::Unauthorized(_)
        ));
        assert!(matches!(
            map_http_status(StatusCode::BAD_REQUEST, ""),
            ProviderError::BadRequest(_)
        ));
        assert!(matches!(
            map_http_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            ProviderError::Transient(_)
        ));
        assert!(matches!(
            map_http_status(StatusCode::IM_A_TEAPOT, ""),
            ProviderError::Unknown(_)
        ));
    }
}
