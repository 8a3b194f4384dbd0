use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::session::SessionAuthenticator;
use crate::types::{DashboardUuid, RlsRule};
use crate::upstream::SupersetClient;

/// Delay before the single transport-level retry.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Issues guest tokens against the upstream guest-token endpoint.
///
/// Two bounded retry paths, never more than one retry each:
/// - upstream 401 (session expiry): mark the session stale, obtain exactly
///   one fresh session, retry once;
/// - transport failure / upstream 5xx: retry once after a short backoff.
///
/// Any other 4xx is surfaced immediately as [`Error::UpstreamRejected`].
pub struct GuestTokenIssuer {
    client: Arc<SupersetClient>,
    authenticator: Arc<SessionAuthenticator>,
}

impl GuestTokenIssuer {
    #[must_use]
    pub fn new(client: Arc<SupersetClient>, authenticator: Arc<SessionAuthenticator>) -> Self {
        Self {
            client,
            authenticator,
        }
    }

    /// Issue a guest token for an already-resolved dashboard.
    ///
    /// The session's freshness is validated (or refreshed) immediately before
    /// the issuing call; no call is made with a session known to be expired.
    ///
    /// # Errors
    ///
    /// See the error taxonomy on [`Error`]; a second failure on either retry
    /// path surfaces the underlying error unchanged.
    pub async fn issue(
        &self,
        dashboard: &DashboardUuid,
        username: &str,
        rls: &[RlsRule],
    ) -> Result<String, Error> {
        let session = self.authenticator.ensure_session().await?;

        match self
            .client
            .guest_token(&session.tokens, dashboard, username, rls)
            .await
        {
            Ok(token) => Ok(token),
            Err(e) if e.is_session_expired() => {
                tracing::warn!(
                    dashboard = %dashboard,
                    "guest token call reported session expiry, re-authenticating once"
                );
                self.authenticator.mark_stale(session.generation()).await;
                let fresh = self.authenticator.ensure_session().await?;
                self.client
                    .guest_token(&fresh.tokens, dashboard, username, rls)
                    .await
            }
            Err(Error::UpstreamUnavailable(detail)) => {
                tracing::warn!(
                    dashboard = %dashboard,
                    %detail,
                    "guest token call failed at transport level, retrying once"
                );
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.client
                    .guest_token(&session.tokens, dashboard, username, rls)
                    .await
            }
            Err(e) => Err(e),
        }
    }
}
