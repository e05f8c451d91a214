//! Browser login start (PKCE), RP logout URLs and provider connection checks.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use common::{CLIENT_ID, MockIdp, RSA_KEY, broker, test_config};
use octofhir_broker::{
    AuthBroker, AuthError, NoteLevel, Pkce, ProviderConfig, ProviderRegistry, TokenRequest,
    router,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn query(url: &str) -> (String, HashMap<String, String>) {
    let url = Url::parse(url).unwrap();
    let base = format!("{}{}", url.origin().ascii_serialization(), url.path());
    (base, url.query_pairs().into_owned().collect())
}

async fn mount_status(idp: &MockIdp, verb: &str, route: &str, status: u16) {
    Mock::given(method(verb))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({"error": "invalid_request"})))
        .mount(&idp.server)
        .await;
}

#[tokio::test]
async fn test_oidc_login_redirect_with_pkce() {
    let idp = MockIdp::start().await;
    idp.mount_discovery(1).await;
    idp.mount_jwks(vec![RSA_KEY.jwk("k1")], 1).await;

    let broker = broker(vec![idp.oidc_provider("corp", json!({}))]);
    let login = broker
        .login_redirect("corp", Some("https://console.example.com/callback"), None)
        .await
        .unwrap();

    let (base, params) = query(&login.authorization_url);
    assert_eq!(base, idp.url("/authorize"));
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["client_id"], CLIENT_ID);
    assert_eq!(params["redirect_uri"], "https://console.example.com/callback");
    assert_eq!(params["scope"], "openid profile");
    assert_eq!(params["state"], login.state);
    assert_eq!(login.state.len(), 43);
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(
        params["code_challenge"],
        Pkce::from_verifier(login.code_verifier.clone()).challenge()
    );
    assert_eq!(login.provider_id, "corp");

    let again = broker
        .login_redirect("corp", None, Some("console-session-7"))
        .await
        .unwrap();
    let (_, params) = query(&again.authorization_url);
    assert_eq!(params["state"], "console-session-7");
    assert!(!params.contains_key("redirect_uri"));
    assert_ne!(again.code_verifier, login.code_verifier);
}

#[tokio::test]
async fn test_oauth2_login_redirect_uses_callback_url() {
    let idp = MockIdp::start().await;
    idp.mount_discovery(0).await;

    let registry = ProviderRegistry::new(true);
    registry
        .register(idp.oauth2_provider("github", json!({})))
        .unwrap();
    let broker = AuthBroker::new(
        test_config().with_callback_url("https://console.example.com/callback"),
        Arc::new(registry),
    )
    .unwrap();

    let login = broker.login_redirect("github", None, None).await.unwrap();
    let (base, params) = query(&login.authorization_url);
    assert_eq!(base, idp.url("/login/oauth/authorize"));
    assert_eq!(params["redirect_uri"], "https://console.example.com/callback");
    assert_eq!(params["scope"], "read:user");
}

#[tokio::test]
async fn test_login_redirect_requires_code_flow() {
    let idp = MockIdp::start().await;
    let mut document = idp.discovery_document();
    document["grant_types_supported"] = json!(["password"]);
    idp.mount_discovery_document(document, 1).await;
    idp.mount_jwks(vec![RSA_KEY.jwk("k1")], 1).await;

    let broker = broker(vec![idp.oidc_provider("corp", json!({}))]);
    let err = broker.login_redirect("corp", None, None).await.unwrap_err();
    assert!(matches!(err, AuthError::UnsupportedGrant { ref grant_type, .. } if grant_type == "authorization_code"));
}

#[tokio::test]
async fn test_code_exchange_forwards_verifier() {
    let idp = MockIdp::start().await;
    idp.mount_discovery(1).await;
    idp.mount_jwks(vec![RSA_KEY.jwk("k1")], 1).await;

    let broker = broker(vec![idp.oidc_provider(
        "corp",
        json!({"usernameClaim": "preferred_username"}),
    )]);
    let login = broker
        .login_redirect("corp", Some("https://console.example.com/callback"), None)
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains(format!("code_verifier={}", login.code_verifier)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at-1"})))
        .expect(1)
        .mount(&idp.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .and(header("authorization", "Bearer at-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"sub": "u-1", "preferred_username": "jane"})),
        )
        .expect(1)
        .mount(&idp.server)
        .await;

    let mut request = TokenRequest::authorization_code("code-1");
    request.redirect_uri = Some("https://console.example.com/callback".to_string());
    request.code_verifier = Some(login.code_verifier.clone());

    let identity = broker.authenticate("corp", &request).await.unwrap();
    assert_eq!(identity.username, "jane");
    assert_eq!(identity.subject, "u-1");
}

#[tokio::test]
async fn test_oidc_logout_url() {
    let idp = MockIdp::start().await;
    let mut document = idp.discovery_document();
    document["end_session_endpoint"] = json!(idp.url("/logout"));
    idp.mount_discovery_document(document, 1).await;
    idp.mount_jwks(vec![RSA_KEY.jwk("k1")], 1).await;

    let broker = broker(vec![idp.oidc_provider("corp", json!({}))]);
    let logout = broker
        .logout_url("corp", Some("https://console.example.com/"), Some("id-token-1"))
        .await
        .unwrap()
        .unwrap();

    let (base, params) = query(&logout);
    assert_eq!(base, idp.url("/logout"));
    assert_eq!(params["post_logout_redirect_uri"], "https://console.example.com/");
    assert_eq!(params["client_id"], CLIENT_ID);
    assert_eq!(params["id_token_hint"], "id-token-1");
}

#[tokio::test]
async fn test_logout_without_end_session_is_local() {
    let idp = MockIdp::start().await;
    idp.mount_discovery(1).await;
    idp.mount_jwks(vec![RSA_KEY.jwk("k1")], 1).await;

    let broker = broker(vec![
        idp.oidc_provider("corp", json!({})),
        idp.oauth2_provider("github", json!({})),
    ]);
    assert!(broker.logout_url("corp", None, None).await.unwrap().is_none());
    assert!(broker.logout_url("github", None, None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_login_and_logout_endpoints() {
    let idp = MockIdp::start().await;
    let app = router(broker(vec![idp.oauth2_provider("github", json!({}))]));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/github/login?redirect_uri=https%3A%2F%2Fconsole.example.com%2Fcb&state=s-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["cache-control"], "no-store");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["state"], "s-1");
    assert_eq!(body["providerId"], "github");
    let (_, params) = query(body["authorizationUrl"].as_str().unwrap());
    assert_eq!(params["redirect_uri"], "https://console.example.com/cb");
    assert_eq!(
        params["code_challenge"],
        Pkce::from_verifier(body["codeVerifier"].as_str().unwrap().to_string()).challenge()
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/github/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({"logoutUrl": null}));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/auth/nope/login")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_check_healthy_oidc_provider() {
    let idp = MockIdp::start().await;
    idp.mount_discovery(1).await;
    idp.mount_jwks(vec![RSA_KEY.jwk("k1")], 1).await;
    mount_status(&idp, "GET", "/authorize", 400).await;
    mount_status(&idp, "POST", "/token", 400).await;
    mount_status(&idp, "GET", "/userinfo", 401).await;

    let broker = broker(vec![]);
    let report = broker
        .check_provider(&idp.oidc_provider("corp", json!({})))
        .await;

    assert!(report.valid, "unexpected errors: {:?}", report.errors());
    assert!(report.discovery.as_ref().is_some_and(|d| d.reachable));
    assert_eq!(report.endpoints.len(), 3);
    assert!(report.endpoints.iter().all(|e| e.reachable));
    assert_eq!(
        report.supported_grant_types,
        vec!["authorization_code", "refresh_token", "password"]
    );
    assert_eq!(broker.discovery().cached_issuers(), 0);
}

#[tokio::test]
async fn test_check_reports_broken_oauth2_endpoints() {
    let idp = MockIdp::start().await;
    mount_status(&idp, "GET", "/login/oauth/authorize", 200).await;
    mount_status(&idp, "POST", "/login/oauth/access_token", 405).await;

    let broker = broker(vec![]);
    let report = broker
        .check_provider(&idp.oauth2_provider("github", json!({})))
        .await;

    assert!(!report.valid);
    assert!(report.discovery.is_none());
    assert!(report.endpoint("authorization_endpoint").is_some_and(|e| e.notes.is_empty()));

    let token = report.endpoint("token_endpoint").unwrap();
    assert!(token.reachable);
    assert_eq!(token.notes[0].level, NoteLevel::Error);
    assert!(token.notes[0].text.contains("POST"));

    let userinfo = report.endpoint("userinfo_endpoint").unwrap();
    assert!(userinfo.notes[0].text.contains("404"));
    assert_eq!(report.errors().len(), 2);
}

#[tokio::test]
async fn test_check_unreachable_issuer() {
    let provider: ProviderConfig = serde_json::from_value(json!({
        "providerType": "oidc",
        "id": "down",
        "issuer": "http://127.0.0.1:1",
        "clientId": CLIENT_ID,
        "clientSecret": "secret",
    }))
    .unwrap();

    let report = broker(vec![]).check_provider(&provider).await;
    assert!(!report.valid);
    let discovery = report.discovery.unwrap();
    assert!(!discovery.reachable);
    assert_eq!(
        discovery.url.as_deref(),
        Some("http://127.0.0.1:1/.well-known/openid-configuration")
    );
    assert!(report.endpoints.is_empty());
}

#[tokio::test]
async fn test_check_reports_invalid_configuration() {
    let idp = MockIdp::start().await;
    mount_status(&idp, "GET", "/login/oauth/authorize", 200).await;
    mount_status(&idp, "POST", "/login/oauth/access_token", 400).await;
    mount_status(&idp, "GET", "/user", 401).await;

    let provider = idp.oauth2_provider(
        "github",
        json!({"organizationAssignment": {"type": "roleNamespace", "separator": ""}}),
    );
    let report = broker(vec![]).check_provider(&provider).await;

    assert!(!report.valid);
    assert_eq!(report.notes.len(), 1);
    assert!(report.endpoints.iter().all(|e| e.notes.is_empty()));
}
