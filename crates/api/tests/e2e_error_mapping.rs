use api::{build_app, AppState};
use axum::http::StatusCode;
use axum_test::TestServer;
use services::auth::{MockOAuthCallbackServiceTrait, OAuthError, Platform};
use std::sync::Arc;

fn server_returning(error: OAuthError) -> TestServer {
    let mut service = MockOAuthCallbackServiceTrait::new();
    service
        .expect_handle_callback()
        .returning(move |_, _| Err(error.clone()));

    let app = build_app(AppState {
        callback_service: Arc::new(service),
    });
    TestServer::new(app).unwrap()
}

#[tokio::test]
async fn test_internal_errors_map_to_500() {
    for error in [
        OAuthError::AllowListCheckFailed("pool timed out".to_string()),
        OAuthError::TokenGenerationFailed("no entropy".to_string()),
        OAuthError::StoreError("deadlock detected".to_string()),
    ] {
        let code = error.code();
        let server = server_returning(error);

        let response = server
            .get("/oauth/web")
            .add_query_param("code", "abc")
            .add_query_param("state", "x")
            .await;

        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.json::<serde_json::Value>();
        assert_eq!(body["error"], code);
        assert!(body["error_description"].as_str().is_some());
    }
}

#[tokio::test]
async fn test_input_errors_map_to_400() {
    let server = server_returning(OAuthError::MalformedState("bad escape".to_string()));

    let response = server
        .post("/oauth/mobile")
        .form(&[("code", "abc"), ("state", "%zz")])
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<serde_json::Value>()["error"],
        "malformed_state"
    );
}

#[tokio::test]
async fn test_platform_is_passed_through() {
    let mut service = MockOAuthCallbackServiceTrait::new();
    service
        .expect_handle_callback()
        .withf(|platform, request| {
            *platform == Platform::Desktop && request.code == "abc" && request.encoded_state == "s"
        })
        .times(1)
        .returning(|_, _| Err(OAuthError::EmailNotAllowed));

    let server = TestServer::new(build_app(AppState {
        callback_service: Arc::new(service),
    }))
    .unwrap();

    let response = server
        .get("/oauth/desktop")
        .add_query_param("code", "abc")
        .add_query_param("state", "s")
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

fn server_without_calls() -> TestServer {
    TestServer::new(build_app(AppState {
        callback_service: Arc::new(MockOAuthCallbackServiceTrait::new()),
    }))
    .unwrap()
}

#[tokio::test]
async fn test_non_form_post_gets_json_415() {
    let server = server_without_calls();

    let response = server
        .post("/oauth/web")
        .text("code=abc&state=s")
        .await;

    assert_eq!(response.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body = response.json::<serde_json::Value>();
    assert_eq!(body["error"], "invalid_request");
    assert!(body["error_description"].as_str().is_some());
}

#[tokio::test]
async fn test_undecodable_query_gets_json_400() {
    let server = server_without_calls();

    // A repeated field cannot be deserialized into the callback parameters
    let response = server
        .get("/oauth/web")
        .add_query_param("code", "a")
        .add_query_param("code", "b")
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<serde_json::Value>()["error"],
        "invalid_request"
    );

    let response = server
        .get("/oauth/web/authorize")
        .add_query_param("backend", "https://api.example")
        .add_query_param("backend", "https://other.example")
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.json::<serde_json::Value>()["error"],
        "invalid_request"
    );
}
