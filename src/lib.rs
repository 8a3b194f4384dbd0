#![doc = include_str!("../README.md")]

pub mod broker;
pub mod config;
pub mod error;
pub mod issuer;
pub mod resolver;
pub mod server;
pub mod session;
pub mod types;
pub mod upstream;

// Re-exports for convenient access
pub use broker::TokenBroker;
pub use config::BrokerConfig;
pub use error::Error;
pub use types::{DashboardUuid, GuestTokenRequest, GuestTokenResponse, RlsRule};
