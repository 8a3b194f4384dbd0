use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::state::AppState;
use crate::broker::TokenBroker;
use crate::error::Error;
use crate::types::{GuestTokenRequest, GuestTokenResponse};

/// Create the broker router.
pub fn router(broker: Arc<TokenBroker>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/generate-token", post(generate_token))
        .route("/dashboard/{id}", get(dashboard_info))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { broker })
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Superset Guest Token Broker",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
    }))
}

/// Liveness only; never contacts upstream.
async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "message": "API is running" }))
}

async fn generate_token(
    State(state): State<AppState>,
    Json(request): Json<GuestTokenRequest>,
) -> Result<Json<GuestTokenResponse>, Error> {
    state.broker.issue_guest_token(request).await.map(Json)
}

async fn dashboard_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, Error> {
    let uuid = state.broker.resolve_dashboard(&id).await?;
    Ok(Json(json!({
        "dashboard_id": id,
        "dashboard_uuid": uuid,
        "message": "Dashboard UUID resolved successfully",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::BrokerConfig;

    /// Broker pointed at a closed port; fine for paths that fail validation
    /// before any upstream call.
    fn test_router() -> Router {
        let config = BrokerConfig::new("http://127.0.0.1:9".parse().unwrap(), "admin", "secret");
        router(Arc::new(TokenBroker::new(config).unwrap()))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_local() {
        let response = test_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn root_reports_metadata() {
        let response = test_router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn unrecognized_reference_is_400_with_json_body() {
        let request = Request::post("/generate-token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"dashboard": "definitely not a dashboard"}"#))
            .unwrap();

        let response = test_router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "validation_error");
        assert!(body["detail"].as_str().unwrap().contains("unrecognized"));
    }

    #[tokio::test]
    async fn empty_rls_clause_is_400() {
        let request = Request::post("/generate-token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"dashboard": "b713fcc3-167a-4961-ac21-2fa7e851b514", "rls": [{"clause": ""}]}"#,
            ))
            .unwrap();

        let response = test_router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "validation_error");
    }
}
