//! Token and provider listing endpoints, driven through the axum router.

mod common;

use assert_json_diff::assert_json_include;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use common::{MockIdp, broker};
use octofhir_broker::router;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn token_request(provider_id: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/auth/{provider_id}/token"))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_token_endpoint_success() {
    let idp = MockIdp::start().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "gho"})))
        .mount(&idp.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"login": "octocat", "teams": ["ops"]})),
        )
        .mount(&idp.server)
        .await;

    let app = router(broker(vec![
        idp.oauth2_provider("github", json!({"roleClaim": "teams"})),
    ]));
    let response = app
        .oneshot(token_request("github", "grant_type=authorization_code&code=abc"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let body = json_body(response).await;
    assert_json_include!(
        actual: body,
        expected: json!({
            "subject": "octocat",
            "username": "octocat",
            "roles": ["ops"],
            "organizations": [],
            "providerId": "github"
        })
    );
}

#[tokio::test]
async fn test_unknown_provider_is_not_found() {
    let app = router(broker(vec![]));
    let response = app
        .oneshot(token_request("nope", "grant_type=password&username=a&password=b"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let idp = MockIdp::start().await;
    let app = router(broker(vec![idp.oauth2_provider("github", json!({}))]));
    let response = app
        .oneshot(token_request("github", "grant_type=client_credentials"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn test_rejection_details_stay_out_of_response() {
    let idp = MockIdp::start().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "code expired at https://idp.internal/x"
        })))
        .mount(&idp.server)
        .await;

    let app = router(broker(vec![idp.oauth2_provider("github", json!({}))]));
    let response = app
        .oneshot(token_request("github", "grant_type=authorization_code&code=old"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(
        body,
        json!({
            "error": "invalid_grant",
            "error_description": "The provided credentials are invalid"
        })
    );
}

#[tokio::test]
async fn test_wrong_content_type_is_invalid_request() {
    let idp = MockIdp::start().await;
    let app = router(broker(vec![idp.oauth2_provider("github", json!({}))]));
    let request = Request::builder()
        .method("POST")
        .uri("/auth/github/token")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"grant_type":"password"}"#))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_provider_listing_hides_secrets() {
    let idp = MockIdp::start().await;
    let broker = broker(vec![
        idp.oidc_provider("corp", json!({"displayName": "Corporate SSO"})),
        idp.oauth2_provider("github", json!({})),
        idp.oauth2_provider("legacy", json!({"enabled": false})),
    ]);
    broker
        .registry()
        .set_default_provider(Some("corp"))
        .unwrap();

    let response = router(broker)
        .oneshot(
            Request::builder()
                .uri("/auth/providers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["defaultProvider"], "corp");
    let providers = body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 2);
    assert_json_include!(
        actual: providers[0].clone(),
        expected: json!({"id": "corp", "displayName": "Corporate SSO", "type": "oidc", "isDefault": true})
    );
    assert_json_include!(
        actual: providers[1].clone(),
        expected: json!({"id": "github", "type": "oauth2", "usernameClaim": "login", "isDefault": false})
    );
    assert!(!body.to_string().contains("console-secret"));
}
