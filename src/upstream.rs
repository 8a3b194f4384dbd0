use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::config::BrokerConfig;
use crate::error::Error;
use crate::types::{DashboardUuid, RlsRule};

/// Access + CSRF material for one authenticated admin session.
///
/// The CSRF token is required alongside the bearer token for mutating calls
/// (Superset checks `X-CSRFToken` and `Referer` on `POST`s).
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub csrf_token: String,
}

/// HTTP client for the four Superset endpoints the broker consumes:
/// login, CSRF token, dashboard lookup, and guest-token issuance.
///
/// Connect/read timeouts and the TLS verification toggle are fixed at
/// construction and apply identically to every call.
pub struct SupersetClient {
    http: reqwest::Client,
    base: String,
}

#[derive(Deserialize)]
struct LoginBody {
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct CsrfBody {
    result: Option<String>,
}

#[derive(Deserialize)]
struct DashboardBody {
    result: Option<DashboardResult>,
}

#[derive(Deserialize)]
struct DashboardResult {
    uuid: Option<String>,
}

#[derive(Deserialize)]
struct GuestTokenBody {
    token: Option<String>,
}

impl SupersetClient {
    /// Build a client for the given config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: &BrokerConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        if !config.verify_tls {
            tracing::warn!("TLS certificate verification is DISABLED for all upstream calls");
        }

        Ok(Self {
            http,
            base: base_string(&config.base_url),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// `POST /api/v1/security/login` — exchange service-account credentials
    /// for an access token.
    ///
    /// # Errors
    ///
    /// [`Error::UpstreamAuth`] on a login rejection, [`Error::UpstreamUnavailable`]
    /// on transport failure or upstream 5xx.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        provider: &str,
    ) -> Result<String, Error> {
        let response = self
            .http
            .post(self.endpoint("/api/v1/security/login"))
            .json(&json!({
                "username": username,
                "password": password,
                "provider": provider,
                "refresh": false,
            }))
            .send()
            .await?;

        let response = classify_auth(response, "login").await?;
        let body: LoginBody = response.json().await?;
        body.access_token.ok_or(Error::UpstreamAuth {
            operation: "login",
            status: None,
            detail: "login succeeded but no access_token returned".into(),
        })
    }

    /// `GET /api/v1/security/csrf_token/` — fetch the CSRF token required for
    /// subsequent mutating calls.
    ///
    /// # Errors
    ///
    /// Same classification as [`login`](Self::login).
    pub async fn csrf_token(&self, access_token: &str) -> Result<String, Error> {
        let response = self
            .http
            .get(self.endpoint("/api/v1/security/csrf_token/"))
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = classify_auth(response, "csrf_token").await?;
        let body: CsrfBody = response.json().await?;
        body.result.ok_or(Error::UpstreamAuth {
            operation: "csrf_token",
            status: None,
            detail: "CSRF response missing 'result'".into(),
        })
    }

    /// `GET /api/v1/dashboard/{id}` — translate a numeric dashboard id to its
    /// canonical UUID.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] when the id cannot be resolved (upstream 4xx),
    /// [`Error::UpstreamAuth`] on 401, [`Error::UpstreamUnavailable`] on
    /// transport failure or 5xx.
    pub async fn dashboard_uuid(
        &self,
        access_token: &str,
        numeric_id: &str,
    ) -> Result<DashboardUuid, Error> {
        let response = self
            .http
            .get(self.endpoint(&format!("/api/v1/dashboard/{numeric_id}")))
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => Error::UpstreamAuth {
                    operation: "dashboard_lookup",
                    status: Some(401),
                    detail,
                },
                s if status.is_client_error() => Error::Validation(format!(
                    "could not resolve dashboard '{numeric_id}' ({s}): {detail}"
                )),
                s => Error::UpstreamUnavailable(format!("dashboard lookup returned {s}: {detail}")),
            });
        }

        let body: DashboardBody = response.json().await?;
        body.result
            .and_then(|r| r.uuid)
            .map(DashboardUuid)
            .ok_or_else(|| {
                Error::Validation(format!("dashboard lookup returned no uuid for '{numeric_id}'"))
            })
    }

    /// `POST /api/v1/security/guest_token/` — exchange a resolved dashboard,
    /// requesting user, and RLS clauses for a guest token.
    ///
    /// RLS clause order is preserved exactly as supplied; it is significant
    /// to Superset's evaluation.
    ///
    /// # Errors
    ///
    /// [`Error::UpstreamAuth`] (status 401) when the session expired,
    /// [`Error::UpstreamRejected`] on any other 4xx,
    /// [`Error::UpstreamUnavailable`] on transport failure or 5xx.
    pub async fn guest_token(
        &self,
        tokens: &SessionTokens,
        dashboard: &DashboardUuid,
        username: &str,
        rls: &[RlsRule],
    ) -> Result<String, Error> {
        let payload = json!({
            "resources": [{"type": "dashboard", "id": dashboard.as_str()}],
            "user": {"username": username},
            "rls": rls,
        });

        let response = self
            .http
            .post(self.endpoint("/api/v1/security/guest_token/"))
            .bearer_auth(&tokens.access_token)
            .header("X-CSRFToken", &tokens.csrf_token)
            .header(reqwest::header::REFERER, &self.base)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => Error::UpstreamAuth {
                    operation: "guest_token",
                    status: Some(401),
                    detail,
                },
                s if status.is_client_error() => Error::UpstreamRejected { status: s, detail },
                s => Error::UpstreamUnavailable(format!("guest_token returned {s}: {detail}")),
            });
        }

        let body: GuestTokenBody = response.json().await?;
        body.token.ok_or(Error::UpstreamAuth {
            operation: "guest_token",
            status: None,
            detail: "guest_token response missing 'token'".into(),
        })
    }
}

/// Classification shared by login and CSRF: 401/4xx is an auth failure,
/// 5xx is unavailability.
async fn classify_auth(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        Err(Error::UpstreamUnavailable(format!(
            "{operation} returned {status}: {detail}"
        )))
    } else {
        Err(Error::UpstreamAuth {
            operation,
            status: Some(status.as_u16()),
            detail,
        })
    }
}

/// Base URL as a string without a trailing slash, for joining API paths and
/// for the `Referer` header.
fn base_string(base: &Url) -> String {
    base.as_str().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_trimmed() {
        let with_slash: Url = "https://superset.example.com/".parse().unwrap();
        assert_eq!(base_string(&with_slash), "https://superset.example.com");

        let with_path: Url = "https://host/superset/".parse().unwrap();
        assert_eq!(base_string(&with_path), "https://host/superset");
    }

    #[test]
    fn rls_serializes_in_order() {
        let rls = vec![RlsRule::new("a = 1"), RlsRule::new("b = 2")];
        let payload = json!({ "rls": rls });
        assert_eq!(
            payload["rls"],
            json!([{"clause": "a = 1"}, {"clause": "b = 2"}])
        );
    }
}
