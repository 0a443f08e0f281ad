mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use common::TestApp;
use std::sync::Arc;
use storefront_api::{
    auth::{AuthConfig, AuthService, Role},
    config::AppConfig,
    handlers::AppServices,
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

const TEST_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

async fn build_router(app: &TestApp) -> (Router, Arc<AuthService>) {
    let cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        TEST_SECRET.to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );

    let auth_service = Arc::new(AuthService::new(AuthConfig {
        jwt_secret: cfg.jwt_secret.clone(),
        jwt_issuer: cfg.auth_issuer.clone(),
        jwt_audience: cfg.auth_audience.clone(),
        token_expiration_secs: cfg.jwt_expiration,
    }));

    let services = AppServices::new(app.db.clone(), app.event_sender.clone(), &cfg)
        .expect("services build");

    let state = AppState {
        db: app.db.clone(),
        config: cfg,
        event_sender: (*app.event_sender).clone(),
        services,
    };

    let router = Router::new()
        .nest(
            "/api/v1",
            storefront_api::api_v1_routes(auth_service.clone()),
        )
        .with_state(state);

    (router, auth_service)
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn status_endpoint_is_public() {
    let app = TestApp::new().await;
    let (router, _) = build_router(&app).await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v1/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"]["service"], "storefront-api");
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn cart_requires_a_bearer_token() {
    let app = TestApp::new().await;
    let (router, auth_service) = build_router(&app).await;

    // Without a token
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/cart")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // With a valid token for an existing user
    let user_id = app.create_user(Role::Customer).await;
    let token = auth_service
        .issue_token(user_id, "user@example.com", Role::Customer)
        .unwrap();

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v1/cart")
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"], serde_json::json!({}));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn webhook_ack_is_public_and_writes_nothing() {
    let app = TestApp::new().await;
    let (router, _) = build_router(&app).await;

    let payload = serde_json::json!({
        "reference": format!("{}-1700000000", Uuid::new_v4()),
        "transaction_status": "settlement"
    });

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/payments/webhook")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn garbage_token_is_rejected() {
    let app = TestApp::new().await;
    let (router, _) = build_router(&app).await;

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v1/orders")
                .header("Authorization", "Bearer not-a-real-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
