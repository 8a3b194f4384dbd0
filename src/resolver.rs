use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use url::Url;

use crate::error::Error;
use crate::session::SessionAuthenticator;
use crate::types::DashboardUuid;
use crate::upstream::SupersetClient;

/// Normalizes a caller-supplied dashboard reference (canonical UUID, numeric
/// id, or full dashboard URL) into the canonical UUID.
///
/// Numeric/URL references cost one upstream lookup; the result is cached for
/// the process lifetime (dashboard UUIDs are stable, so entries are never
/// evicted and first-write races are harmless).
pub struct DashboardResolver {
    client: Arc<SupersetClient>,
    authenticator: Arc<SessionAuthenticator>,
    cache: RwLock<HashMap<String, DashboardUuid>>,
}

impl DashboardResolver {
    #[must_use]
    pub fn new(client: Arc<SupersetClient>, authenticator: Arc<SessionAuthenticator>) -> Self {
        Self {
            client,
            authenticator,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a dashboard reference to its canonical UUID.
    ///
    /// UUID-shaped references resolve locally with zero upstream calls.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a reference that is neither UUID-shaped nor
    /// numeric (no upstream contact), plus the upstream classes from the
    /// lookup call.
    pub async fn resolve(&self, reference: &str) -> Result<DashboardUuid, Error> {
        let candidate = extract_candidate(reference).trim().to_string();

        if is_uuid_shaped(&candidate) {
            return Ok(DashboardUuid(candidate));
        }
        if !is_numeric(&candidate) {
            return Err(Error::Validation(format!(
                "unrecognized dashboard reference '{reference}'"
            )));
        }

        if let Some(hit) = self.cache.read().await.get(&candidate) {
            return Ok(hit.clone());
        }

        let session = self.authenticator.ensure_session().await?;
        let uuid = self
            .client
            .dashboard_uuid(&session.tokens.access_token, &candidate)
            .await?;
        tracing::info!(numeric_id = %candidate, uuid = %uuid, "dashboard reference resolved");

        self.cache.write().await.insert(candidate, uuid.clone());
        Ok(uuid)
    }
}

/// If the reference is a full URL, return its last non-empty path segment;
/// otherwise return the reference unchanged.
fn extract_candidate(reference: &str) -> String {
    let Ok(url) = Url::parse(reference) else {
        return reference.to_string();
    };
    if !url.has_host() {
        return reference.to_string();
    }
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .map_or_else(|| reference.to_string(), ToString::to_string)
}

/// Canonical-id heuristic matching the upstream UUID format:
/// 36 characters with exactly four hyphens. Anything matching this shape is
/// forwarded unchanged and left for upstream to judge.
fn is_uuid_shaped(s: &str) -> bool {
    s.len() == 36 && s.bytes().filter(|b| *b == b'-').count() == 4
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "b713fcc3-167a-4961-ac21-2fa7e851b514";

    #[test]
    fn uuid_shape() {
        assert!(is_uuid_shaped(UUID));
        assert!(!is_uuid_shaped("42"));
        assert!(!is_uuid_shaped(""));
        // right length, wrong hyphen count
        assert!(!is_uuid_shaped("b713fcc3x167ax4961xac21x2fa7e851b514"));
    }

    #[test]
    fn numeric_shape() {
        assert!(is_numeric("42"));
        assert!(is_numeric("0"));
        assert!(!is_numeric(""));
        assert!(!is_numeric("4 2"));
        assert!(!is_numeric("abc"));
    }

    #[test]
    fn candidate_from_plain_reference() {
        assert_eq!(extract_candidate("42"), "42");
        assert_eq!(extract_candidate(UUID), UUID);
        assert_eq!(extract_candidate("not a url"), "not a url");
    }

    #[test]
    fn candidate_from_url() {
        assert_eq!(
            extract_candidate("https://superset.example.com/superset/dashboard/42/"),
            "42"
        );
        assert_eq!(
            extract_candidate(&format!("https://host/superset/dashboard/{UUID}")),
            UUID
        );
    }

    #[test]
    fn candidate_from_url_without_path() {
        let reference = "https://superset.example.com";
        assert_eq!(extract_candidate(reference), reference);
    }
}
