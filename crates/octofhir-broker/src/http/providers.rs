//! Provider listing endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::broker::AuthBroker;
use crate::provider::ProviderSummary;

/// Response body of `GET /auth/providers`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersResponse {
    /// Enabled providers in registration order.
    pub providers: Vec<ProviderSummary>,
    /// Default provider id.
    pub default_provider: Option<String>,
}

/// Lists enabled providers for login pages. Never includes client secrets.
pub async fn providers_handler(State(broker): State<Arc<AuthBroker>>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: broker.providers(),
        default_provider: broker.default_provider(),
    })
}
