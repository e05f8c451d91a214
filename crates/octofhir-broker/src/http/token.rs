//! Token endpoint handler.
//!
//! ```ignore
//! POST /auth/corp/token
//! Content-Type: application/x-www-form-urlencoded
//!
//! grant_type=password&username=jane&password=s3cret
//! ```
//!
//! A successful exchange answers with the normalized identity. Failures use
//! the OAuth 2.0 error body (`error`, `error_description`) with a generic
//! description; detailed reasons only reach the logs.

use std::sync::Arc;

use axum::extract::rejection::FormRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::Serialize;
use tracing::debug;

use crate::broker::AuthBroker;
use crate::error::AuthError;
use crate::exchange::TokenRequest;
use crate::identity::NormalizedIdentity;

/// OAuth 2.0 error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// OAuth error code.
    pub error: &'static str,
    /// Caller-safe description.
    pub error_description: &'static str,
}

/// Exchanges a credential with the provider named in the path.
pub async fn token_handler(
    State(broker): State<Arc<AuthBroker>>,
    Path(provider_id): Path<String>,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let request = match form {
        Ok(Form(request)) => request,
        Err(rejection) => {
            debug!(provider_id = %provider_id, error = %rejection, "Rejected token request body");
            return error_response(&AuthError::malformed_request(rejection.body_text()));
        }
    };

    match broker.authenticate(&provider_id, &request).await {
        Ok(identity) => success_response(identity),
        Err(err) => error_response(&err),
    }
}

fn success_response(identity: NormalizedIdentity) -> Response {
    (
        StatusCode::OK,
        [("Cache-Control", "no-store"), ("Pragma", "no-cache")],
        Json(identity),
    )
        .into_response()
}

/// Builds the error response for `err`.
pub fn error_response(err: &AuthError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [("Cache-Control", "no-store"), ("Pragma", "no-cache")],
        Json(ErrorBody {
            error: err.oauth_error_code(),
            error_description: err.public_description(),
        }),
    )
        .into_response()
}
