use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex, RwLock};

use crate::config::BrokerConfig;
use crate::error::Error;
use crate::upstream::{SessionTokens, SupersetClient};

/// Snapshot of the shared admin session handed to callers.
///
/// Cheap to clone; the authenticator keeps the authoritative copy. The
/// generation counter ties a snapshot to the refresh that produced it, so a
/// caller reporting expiry for an old snapshot cannot invalidate a newer one.
#[derive(Debug, Clone)]
pub struct Session {
    pub tokens: SessionTokens,
    obtained_at: Instant,
    generation: u64,
}

impl Session {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.obtained_at.elapsed() < ttl
    }
}

/// Outcome of an in-flight refresh, published to every attached waiter.
/// `None` until the refresh task finishes.
type RefreshOutcome = Option<Result<Session, Error>>;

struct SessionSlot {
    client: Arc<SupersetClient>,
    username: String,
    password: String,
    provider: String,
    current: RwLock<Option<Session>>,
    // Handle to the refresh in flight, if any. Callers that find one attach
    // to it instead of starting their own.
    pending: Mutex<Option<watch::Receiver<RefreshOutcome>>>,
    // Monotonic for the process lifetime. Never derived from `current`,
    // which is clearable and would let numbers repeat.
    generation: AtomicU64,
}

/// Owns the lifecycle of the single shared admin session:
/// unauthenticated → authenticating → authenticated → stale → authenticating.
///
/// Constructed once per process. Other components never touch the session
/// directly; they call [`ensure_session`](Self::ensure_session) and get a
/// snapshot whose freshness was just validated.
pub struct SessionAuthenticator {
    slot: Arc<SessionSlot>,
    ttl: Duration,
}

impl SessionAuthenticator {
    #[must_use]
    pub fn new(client: Arc<SupersetClient>, config: &BrokerConfig) -> Self {
        Self {
            slot: Arc::new(SessionSlot {
                client,
                username: config.username.clone(),
                password: config.password.clone(),
                provider: config.login_provider.clone(),
                current: RwLock::new(None),
                pending: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
            ttl: config.session_ttl,
        }
    }

    /// Return a session that is valid right now, logging in if needed.
    ///
    /// Single-flight: while one refresh is in flight, every concurrent caller
    /// attaches to it and receives its outcome, success or failure, instead
    /// of issuing its own login. Exactly one login hits upstream per refresh,
    /// regardless of how many callers raced into it.
    ///
    /// # Errors
    ///
    /// [`Error::UpstreamAuth`] on a login/CSRF rejection,
    /// [`Error::UpstreamUnavailable`] on transport failure.
    pub async fn ensure_session(&self) -> Result<Session, Error> {
        if let Some(session) = self.read_fresh().await {
            return Ok(session);
        }

        let mut outcome = {
            let mut pending = self.slot.pending.lock().await;
            match pending.as_ref() {
                Some(rx) => rx.clone(),
                None => {
                    // The refresh we raced against may have finished while we
                    // waited for the pending lock.
                    if let Some(session) = self.read_fresh().await {
                        return Ok(session);
                    }
                    let rx = self.spawn_refresh();
                    *pending = Some(rx.clone());
                    rx
                }
            }
        };

        loop {
            if let Some(result) = outcome.borrow_and_update().clone() {
                return result;
            }
            if outcome.changed().await.is_err() {
                return Err(Error::UpstreamUnavailable(
                    "session refresh task dropped before reporting".into(),
                ));
            }
        }
    }

    /// Invalidate the session a caller holds, if it is still the live one.
    ///
    /// Called by the issuer when an upstream 401 is attributable to session
    /// expiry. A no-op when the snapshot's generation is already superseded.
    pub async fn mark_stale(&self, generation: u64) {
        let mut current = self.slot.current.write().await;
        if current.as_ref().is_some_and(|s| s.generation == generation) {
            tracing::warn!(generation, "admin session reported expired by upstream");
            *current = None;
        }
    }

    async fn read_fresh(&self) -> Option<Session> {
        self.slot
            .current
            .read()
            .await
            .as_ref()
            .filter(|s| s.is_fresh(self.ttl))
            .cloned()
    }

    /// Start one login + CSRF fetch and hand back the receiver every
    /// concurrent caller attaches to.
    ///
    /// The upstream calls run in a spawned task so that a waiter cancelling
    /// its own request cannot abort a refresh other waiters depend on. The
    /// task stores the new session on success, clears the pending handle, and
    /// publishes its outcome (including failures) to all attached waiters.
    fn spawn_refresh(&self) -> watch::Receiver<RefreshOutcome> {
        let (tx, rx) = watch::channel(None);
        let slot = Arc::clone(&self.slot);
        let generation = slot.generation.fetch_add(1, Ordering::Relaxed) + 1;

        tokio::spawn(async move {
            tracing::info!(generation, "logging in to upstream");
            let result = async {
                let access_token = slot
                    .client
                    .login(&slot.username, &slot.password, &slot.provider)
                    .await?;
                let csrf_token = slot.client.csrf_token(&access_token).await?;
                Ok::<SessionTokens, Error>(SessionTokens {
                    access_token,
                    csrf_token,
                })
            }
            .await
            .map(|tokens| Session {
                tokens,
                obtained_at: Instant::now(),
                generation,
            });

            match &result {
                Ok(session) => {
                    *slot.current.write().await = Some(session.clone());
                    tracing::info!(generation, "admin session refreshed");
                }
                Err(e) => {
                    tracing::error!(generation, error = %e, "admin session refresh failed");
                }
            }

            // Clear the handle before publishing so that callers arriving
            // after a failure start a new refresh rather than receiving a
            // finished one's error.
            *slot.pending.lock().await = None;
            let _ = tx.send(Some(result));
        });

        rx
    }
}
