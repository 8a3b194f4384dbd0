use std::sync::Arc;

use crate::config::BrokerConfig;
use crate::error::Error;
use crate::issuer::GuestTokenIssuer;
use crate::resolver::DashboardResolver;
use crate::session::SessionAuthenticator;
use crate::types::{DashboardUuid, GuestTokenRequest, GuestTokenResponse, RlsRule};
use crate::upstream::SupersetClient;

/// The externally consumed facade: validate → resolve → ensure session →
/// issue, with every failure mapped into the [`Error`] taxonomy exactly once.
///
/// Construct one per process; it owns the shared admin session and the
/// dashboard resolution cache.
pub struct TokenBroker {
    resolver: DashboardResolver,
    issuer: GuestTokenIssuer,
    default_rls: Vec<RlsRule>,
    guest_username: String,
}

impl TokenBroker {
    /// Build the broker and its upstream client.
    ///
    /// Does not contact upstream; the first login happens lazily on the first
    /// operation that needs a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built.
    pub fn new(config: BrokerConfig) -> Result<Self, Error> {
        let client = Arc::new(SupersetClient::new(&config)?);
        let authenticator = Arc::new(SessionAuthenticator::new(Arc::clone(&client), &config));
        let resolver = DashboardResolver::new(Arc::clone(&client), Arc::clone(&authenticator));
        let issuer = GuestTokenIssuer::new(client, authenticator);

        Ok(Self {
            resolver,
            issuer,
            default_rls: config.default_rls,
            guest_username: config.guest_username,
        })
    }

    /// Issue a guest token for the requested dashboard.
    ///
    /// A request without `rls` gets the configured default rule set; an
    /// explicit empty list sends no clauses. Clause order is preserved
    /// verbatim through to upstream.
    ///
    /// # Errors
    ///
    /// One variant of the [`Error`] taxonomy; validation failures never
    /// contact upstream.
    pub async fn issue_guest_token(
        &self,
        request: GuestTokenRequest,
    ) -> Result<GuestTokenResponse, Error> {
        let rls = request.rls.unwrap_or_else(|| self.default_rls.clone());
        for rule in &rls {
            rule.validate()?;
        }

        let dashboard = self.resolver.resolve(&request.dashboard).await?;
        let username = request
            .username
            .as_deref()
            .unwrap_or(&self.guest_username);

        let token = self.issuer.issue(&dashboard, username, &rls).await?;
        tracing::info!(dashboard = %dashboard, username, rules = rls.len(), "guest token issued");

        Ok(GuestTokenResponse {
            token,
            dashboard_uuid: dashboard,
            message: "Guest token generated successfully".into(),
        })
    }

    /// Resolve a dashboard reference without issuing a token
    /// (backs `GET /dashboard/{id}`).
    ///
    /// # Errors
    ///
    /// Same classes as [`issue_guest_token`](Self::issue_guest_token) minus
    /// the issuing step.
    pub async fn resolve_dashboard(&self, reference: &str) -> Result<DashboardUuid, Error> {
        self.resolver.resolve(reference).await
    }
}
