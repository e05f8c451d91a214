//! HTTP surface of the broker.
//!
//! | Method | Path                          | Handler                    |
//! |--------|-------------------------------|----------------------------|
//! | POST   | `/auth/{provider_id}/token`   | [`token::token_handler`]   |
//! | GET    | `/auth/{provider_id}/login`   | [`login::login_handler`]   |
//! | GET    | `/auth/{provider_id}/logout`  | [`login::logout_handler`]  |
//! | GET    | `/auth/providers`             | [`providers::providers_handler`] |
//!
//! All handlers share an `Arc<AuthBroker>` as router state.

pub mod login;
pub mod providers;
pub mod token;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::broker::AuthBroker;

/// Builds the broker routes.
pub fn router(broker: Arc<AuthBroker>) -> Router {
    Router::new()
        .route("/auth/{provider_id}/token", post(token::token_handler))
        .route("/auth/{provider_id}/login", get(login::login_handler))
        .route("/auth/{provider_id}/logout", get(login::logout_handler))
        .route("/auth/providers", get(providers::providers_handler))
        .with_state(broker)
}
