use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::types::RlsRule;

/// Broker configuration.
///
/// Required fields are constructor parameters — no runtime "missing field"
/// errors. Use [`from_env()`](BrokerConfig::from_env) for convention-based
/// setup, or [`new()`](BrokerConfig::new) with `with_*` methods for full
/// control.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub(crate) base_url: Url,
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) login_provider: String,
    pub(crate) verify_tls: bool,
    pub(crate) default_rls: Vec<RlsRule>,
    pub(crate) guest_username: String,
    pub(crate) session_ttl: Duration,
    pub(crate) connect_timeout: Duration,
    pub(crate) request_timeout: Duration,
}

impl BrokerConfig {
    /// Create a config with the required upstream URL and service-account
    /// credentials. All optional fields use defaults matching a stock
    /// Superset deployment.
    #[must_use]
    pub fn new(base_url: Url, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            base_url,
            username: username.into(),
            password: password.into(),
            login_provider: "db".into(),
            verify_tls: true,
            default_rls: Vec::new(),
            guest_username: "guest_via_api".into(),
            session_ttl: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(20),
        }
    }

    /// Create a config from environment variables.
    ///
    /// # Required env vars
    /// - `SUPERSET_URL`: base URL of the Superset instance
    /// - `SUPERSET_USERNAME` / `SUPERSET_PASSWORD`: service-account credentials
    ///
    /// # Optional env vars
    /// - `SUPERSET_LOGIN_PROVIDER`: auth backend (default `db`)
    /// - `VERIFY_SSL`: truthy values `1/true/yes/y/on` (default on)
    /// - `RLS_JSON`: JSON array of `{"clause": "..."}` default rules
    /// - `SESSION_TTL_SECS`: admin-session refresh margin in seconds
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required vars are missing or values are
    /// malformed.
    pub fn from_env() -> Result<Self, Error> {
        let base_url: Url = std::env::var("SUPERSET_URL")
            .map_err(|_| Error::Config("SUPERSET_URL is required".into()))?
            .parse()
            .map_err(|e| Error::Config(format!("SUPERSET_URL: {e}")))?;
        let username = std::env::var("SUPERSET_USERNAME")
            .map_err(|_| Error::Config("SUPERSET_USERNAME is required".into()))?;
        let password = std::env::var("SUPERSET_PASSWORD")
            .map_err(|_| Error::Config("SUPERSET_PASSWORD is required".into()))?;

        let mut config = Self::new(base_url, username, password);

        if let Ok(provider) = std::env::var("SUPERSET_LOGIN_PROVIDER") {
            config = config.with_login_provider(provider);
        }
        if let Ok(verify) = std::env::var("VERIFY_SSL") {
            config = config.with_verify_tls(parse_bool_flag(&verify));
        }
        if let Ok(rls_json) = std::env::var("RLS_JSON") {
            config = config.with_default_rls(parse_rls_json(&rls_json)?);
        }
        if let Ok(ttl) = std::env::var("SESSION_TTL_SECS") {
            let secs: u64 = ttl
                .parse()
                .map_err(|e| Error::Config(format!("SESSION_TTL_SECS: {e}")))?;
            config = config.with_session_ttl(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Override the Superset auth backend (`db`, `ldap`, ...).
    #[must_use]
    pub fn with_login_provider(mut self, provider: impl Into<String>) -> Self {
        self.login_provider = provider.into();
        self
    }

    /// Toggle TLS certificate verification for every outbound call.
    ///
    /// Disabling this is an explicit trust downgrade; it applies uniformly to
    /// login, CSRF, lookup, and guest-token calls.
    #[must_use]
    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Default RLS rules applied when a request supplies none.
    #[must_use]
    pub fn with_default_rls(mut self, rules: Vec<RlsRule>) -> Self {
        self.default_rls = rules;
        self
    }

    /// Requesting-user label used when a request supplies none
    /// (default `guest_via_api`).
    #[must_use]
    pub fn with_guest_username(mut self, username: impl Into<String>) -> Self {
        self.guest_username = username.into();
        self
    }

    /// Admin-session refresh margin. Must stay below the upstream-declared
    /// access-token lifetime (default 300 s).
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Truthy set accepted for boolean env flags: `1/true/yes/y/on`.
fn parse_bool_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

/// Parse the `RLS_JSON` env value into default rules.
fn parse_rls_json(value: &str) -> Result<Vec<RlsRule>, Error> {
    let rules: Vec<RlsRule> = serde_json::from_str(value).map_err(|e| {
        Error::Config(format!(
            "RLS_JSON must be a JSON array like [{{\"clause\":\"tenant_id='acme'\"}}]: {e}"
        ))
    })?;
    for rule in &rules {
        rule.validate()
            .map_err(|e| Error::Config(format!("RLS_JSON: {e}")))?;
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BrokerConfig {
        BrokerConfig::new(
            "https://superset.example.com".parse().unwrap(),
            "admin",
            "secret",
        )
    }

    #[test]
    fn defaults() {
        let config = test_config();
        assert_eq!(config.login_provider, "db");
        assert!(config.verify_tls);
        assert!(config.default_rls.is_empty());
        assert_eq!(config.guest_username, "guest_via_api");
        assert_eq!(config.session_ttl, Duration::from_secs(300));
    }

    #[test]
    fn builder_overrides() {
        let config = test_config()
            .with_login_provider("ldap")
            .with_verify_tls(false)
            .with_default_rls(vec![RlsRule::new("org = 1")])
            .with_session_ttl(Duration::from_secs(60));

        assert_eq!(config.login_provider, "ldap");
        assert!(!config.verify_tls);
        assert_eq!(config.default_rls.len(), 1);
        assert_eq!(config.session_ttl, Duration::from_secs(60));
    }

    #[test]
    fn bool_flag_truthy_set() {
        for truthy in ["1", "true", "TRUE", "yes", "Y", "on", " On "] {
            assert!(parse_bool_flag(truthy), "{truthy} should be truthy");
        }
        for falsy in ["0", "false", "no", "off", "", "anything"] {
            assert!(!parse_bool_flag(falsy), "{falsy} should be falsy");
        }
    }

    #[test]
    fn rls_json_parsing() {
        assert_eq!(parse_rls_json("[]").unwrap(), vec![]);
        assert_eq!(
            parse_rls_json(r#"[{"clause":"tenant_id='acme'"}]"#).unwrap(),
            vec![RlsRule::new("tenant_id='acme'")]
        );
        assert!(parse_rls_json("{}").is_err());
        assert!(parse_rls_json("not json").is_err());
        // shape validation applies to defaults too
        assert!(parse_rls_json(r#"[{"clause":""}]"#).is_err());
    }
}
