use std::sync::Arc;

use crate::broker::TokenBroker;

/// Shared state for the route handlers.
#[derive(Clone)]
pub(super) struct AppState {
    pub(super) broker: Arc<TokenBroker>,
}
