use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Broker error taxonomy.
///
/// Every failure the broker can produce falls into one of these classes, and
/// each class maps to a stable HTTP status at the boundary. Retry policy is
/// keyed off the class: only [`Error::UpstreamUnavailable`] (one retry with
/// backoff) and a session-expiry [`Error::UpstreamAuth`] (one re-auth) are
/// ever retried, and never more than once.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed dashboard reference or RLS shape. Never contacts upstream.
    #[error("validation error: {0}")]
    Validation(String),

    /// Login or session failure against the upstream platform.
    #[error("upstream auth failure during {operation}: {detail}")]
    UpstreamAuth {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    /// Upstream rejected the business call (4xx other than session expiry).
    #[error("upstream rejected request ({status}): {detail}")]
    UpstreamRejected { status: u16, detail: String },

    /// Network-level failure (timeout, DNS, TLS) or upstream 5xx.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status for the externally visible error body.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamAuth { .. } => StatusCode::UNAUTHORIZED,
            Self::UpstreamRejected { .. } => StatusCode::FORBIDDEN,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable class name for the JSON error body.
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::UpstreamAuth { .. } => "upstream_auth_error",
            Self::UpstreamRejected { .. } => "upstream_rejected",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Config(_) => "configuration_error",
        }
    }

    /// True when an upstream 401 signalled that the admin session expired.
    pub(crate) fn is_session_expired(&self) -> bool {
        matches!(
            self,
            Self::UpstreamAuth {
                status: Some(401),
                ..
            }
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::UpstreamUnavailable(e.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = json!({
            "error": self.class(),
            "detail": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            Error::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::UpstreamAuth {
                operation: "login",
                status: Some(401),
                detail: "no".into()
            }
            .status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::UpstreamRejected {
                status: 403,
                detail: "denied".into()
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::UpstreamUnavailable("timeout".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::Config("missing".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn session_expiry_detection() {
        let expired = Error::UpstreamAuth {
            operation: "guest_token",
            status: Some(401),
            detail: "token expired".into(),
        };
        assert!(expired.is_session_expired());

        let bad_creds = Error::UpstreamAuth {
            operation: "login",
            status: Some(400),
            detail: "bad credentials".into(),
        };
        assert!(!bad_creds.is_session_expired());
        assert!(!Error::Validation("x".into()).is_session_expired());
    }
}
