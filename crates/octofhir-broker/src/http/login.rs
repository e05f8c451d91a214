//! Login and logout redirect handlers.
//!
//! ```ignore
//! GET /auth/corp/login?redirect_uri=https://console.example.com/callback
//! GET /auth/corp/logout?post_logout_redirect_uri=https://console.example.com/
//! ```
//!
//! Both answer with JSON rather than a 302 so a browser client can store
//! `state` and `codeVerifier` before navigating.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::token::error_response;
use crate::broker::AuthBroker;
use crate::error::AuthError;

/// Query parameters of the login endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    /// Callback URL registered with the provider.
    pub redirect_uri: Option<String>,
    /// Caller-chosen state; generated when absent.
    pub state: Option<String>,
}

/// Query parameters of the logout endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct LogoutParams {
    /// Where the provider sends the browser after logout.
    pub post_logout_redirect_uri: Option<String>,
    /// The ID token of the session being ended.
    pub id_token_hint: Option<String>,
}

/// Logout endpoint response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutResponse {
    /// Provider logout URL, or `null` for local logout only.
    pub logout_url: Option<String>,
}

/// Starts an authorization code flow with the provider named in the path.
pub async fn login_handler(
    State(broker): State<Arc<AuthBroker>>,
    Path(provider_id): Path<String>,
    params: Result<Query<LoginParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => {
            return error_response(&AuthError::malformed_request(rejection.body_text()));
        }
    };

    match broker
        .login_redirect(
            &provider_id,
            params.redirect_uri.as_deref(),
            params.state.as_deref(),
        )
        .await
    {
        Ok(request) => no_store(Json(request)),
        Err(err) => error_response(&err),
    }
}

/// Builds the provider logout URL for the provider named in the path.
pub async fn logout_handler(
    State(broker): State<Arc<AuthBroker>>,
    Path(provider_id): Path<String>,
    params: Result<Query<LogoutParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => {
            return error_response(&AuthError::malformed_request(rejection.body_text()));
        }
    };

    match broker
        .logout_url(
            &provider_id,
            params.post_logout_redirect_uri.as_deref(),
            params.id_token_hint.as_deref(),
        )
        .await
    {
        Ok(logout_url) => no_store(Json(LogoutResponse { logout_url })),
        Err(err) => error_response(&err),
    }
}

fn no_store(body: impl IntoResponse) -> Response {
    (
        StatusCode::OK,
        [("Cache-Control", "no-store"), ("Pragma", "no-cache")],
        body,
    )
        .into_response()
}
