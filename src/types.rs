use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Canonical Superset dashboard identifier (the dashboard's UUID).
///
/// Stable for the lifetime of the dashboard, as opposed to the numeric
/// shorthand id or a full dashboard URL. Safe to cache for the process
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct DashboardUuid(pub String);

impl DashboardUuid {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Maximum accepted RLS clause length in bytes.
pub const MAX_RLS_CLAUSE_LEN: usize = 2000;

/// Row-level-security rule attached to a guest token.
///
/// The clause is passed through to Superset verbatim; the broker makes no
/// semantic judgment about the SQL. Enforcement is Superset's responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RlsRule {
    pub clause: String,
}

impl RlsRule {
    #[must_use]
    pub fn new(clause: impl Into<String>) -> Self {
        Self {
            clause: clause.into(),
        }
    }

    /// Shape-only validation: non-empty and within the length cap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty or oversized clause.
    pub fn validate(&self) -> Result<(), Error> {
        if self.clause.trim().is_empty() {
            return Err(Error::Validation("RLS clause must not be empty".into()));
        }
        if self.clause.len() > MAX_RLS_CLAUSE_LEN {
            return Err(Error::Validation(format!(
                "RLS clause exceeds {MAX_RLS_CLAUSE_LEN} bytes"
            )));
        }
        Ok(())
    }
}

/// Inbound guest-token request.
#[derive(Debug, Clone, Deserialize)]
pub struct GuestTokenRequest {
    /// Dashboard UUID, numeric id, or full dashboard URL.
    pub dashboard: String,
    /// Requesting-user label embedded in the guest token.
    #[serde(default)]
    pub username: Option<String>,
    /// `None` applies the configured default rule set;
    /// `Some(vec![])` explicitly sends no clauses.
    #[serde(default)]
    pub rls: Option<Vec<RlsRule>>,
}

/// Result of a successful issuance. Returned to the caller, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct GuestTokenResponse {
    pub token: String,
    pub dashboard_uuid: DashboardUuid,
    pub message: String,
}
