use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::trace::TraceLayer;

/// Build and configure the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // SSE Events endpoint
        .route("/events", get(handlers::stream_events))
        // Item lifecycle routes
        .route("/v1/users/{user_id}/items", post(handlers::get_or_create_items))
        .route(
            "/v1/users/{user_id}/items/{item_id}",
            get(handlers::get_or_create_item)
                .delete(handlers::dismiss_item)
                .post(handlers::restore_item),
        )
        // Admin routes
        .route(
            "/admin/users/{user_id}/items/{item_id}",
            delete(handlers::delete_item),
        )
        .route("/admin/items", delete(handlers::reset_items))
        // Middleware
        .layer(NormalizePathLayer::trim_trailing_slash())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use dismissible::clock::ManualClock;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use storage_engine::MemoryItemStore;
    use tower::ServiceExt;

    fn app() -> Router {
        let clock = Arc::new(ManualClock::at_epoch());
        let store = Arc::new(MemoryItemStore::new(100, Duration::from_secs(3600), clock.clone()));
        build_router(AppState::new(store, clock, 16))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "OK");
    }

    #[tokio::test]
    async fn test_get_or_create_reports_creation() {
        let app = app();

        let (status, body) = send(&app, Method::GET, "/v1/users/u1/items/banner", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["created"], true);
        assert_eq!(body["item"]["id"], "banner");
        assert_eq!(body["item"]["userId"], "u1");
        assert!(body["item"]["dismissedAt"].is_null());

        let (status, body) = send(&app, Method::GET, "/v1/users/u1/items/banner", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], false);
    }

    #[tokio::test]
    async fn test_dismiss_and_restore_flow() {
        let app = app();
        send(&app, Method::GET, "/v1/users/u1/items/banner", None).await;

        let (status, body) = send(&app, Method::DELETE, "/v1/users/u1/items/banner", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["item"]["dismissedAt"].is_null());
        assert!(body["previousItem"]["dismissedAt"].is_null());

        let (status, body) = send(&app, Method::DELETE, "/v1/users/u1/items/banner", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "item_already_dismissed");

        let (status, body) = send(&app, Method::POST, "/v1/users/u1/items/banner", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["item"]["dismissedAt"].is_null());

        let (status, body) = send(&app, Method::POST, "/v1/users/u1/items/banner", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "item_not_dismissed");
    }

    #[tokio::test]
    async fn test_transitions_on_unknown_item_are_not_found() {
        let app = app();

        let (status, body) = send(&app, Method::DELETE, "/v1/users/u1/items/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "item_not_found");

        let (status, _) = send(&app, Method::POST, "/v1/users/u1/items/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_ids_are_rejected_at_the_boundary() {
        let app = app();

        let (status, body) = send(&app, Method::GET, "/v1/users/u1/items/bad%20id", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_argument");

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/users/u1/items",
            Some(json!({ "itemIds": ["ok", "not:ok"] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected() {
        let app = app();
        let ids: Vec<String> = (0..=crate::validation::MAX_BATCH_ITEMS)
            .map(|i| format!("item-{}", i))
            .collect();

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/users/u1/items",
            Some(json!({ "itemIds": ids })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let app = app();
        send(&app, Method::GET, "/v1/users/u1/items/b", None).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/users/u1/items",
            Some(json!({ "itemIds": ["a", "b", "c"] })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let items = body["items"].as_array().unwrap();
        let ids: Vec<&str> = items
            .iter()
            .map(|r| r["item"]["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(items[0]["created"], true);
        assert_eq!(items[1]["created"], false);
        assert_eq!(items[2]["created"], true);

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/users/u1/items",
            Some(json!({ "itemIds": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["items"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admin_delete_and_reset() {
        let app = app();
        send(&app, Method::GET, "/v1/users/u1/items/a", None).await;
        send(&app, Method::GET, "/v1/users/u2/items/b", None).await;

        let (status, _) = send(&app, Method::DELETE, "/admin/users/u1/items/a", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, "/v1/users/u1/items/a", None).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(&app, Method::DELETE, "/admin/items", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, "/v1/users/u2/items/b", None).await;
        assert_eq!(status, StatusCode::CREATED);
    }
}
