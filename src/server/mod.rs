//! HTTP boundary for the broker.
//!
//! Thin plumbing over [`TokenBroker`](crate::TokenBroker): the handlers
//! deserialize, delegate, and let the [`Error`](crate::Error) taxonomy map
//! itself to status codes. CORS is permissive so embedding demos can call the
//! broker directly from a browser.
//!
//! ```rust,ignore
//! let broker = Arc::new(TokenBroker::new(BrokerConfig::from_env()?)?);
//! let app = superset_token_broker::server::router(broker);
//! axum::serve(listener, app).await?;
//! ```

mod routes;
mod state;

pub use routes::router;
