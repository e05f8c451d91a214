use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing::get};
use octofhir_broker::{AuthBroker, ProviderCheckReport, router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;

pub struct BrokerServer {
    addr: SocketAddr,
    app: Router,
}

/// Creates the broker and its provider registry from configuration.
pub fn build_broker(cfg: &AppConfig) -> anyhow::Result<Arc<AuthBroker>> {
    let registry = cfg
        .build_registry()
        .context("failed to register identity providers")?;
    let broker = AuthBroker::new(cfg.broker.clone(), Arc::new(registry))
        .context("failed to create authentication broker")?;
    Ok(Arc::new(broker))
}

/// Runs a connection check against every configured provider.
///
/// Reports are returned in registration order; disabled providers are
/// checked too.
pub async fn check_providers(cfg: &AppConfig) -> anyhow::Result<Vec<ProviderCheckReport>> {
    let broker = build_broker(cfg)?;
    let mut reports = Vec::new();
    for provider in broker.registry().list() {
        reports.push(broker.check_provider(&provider).await);
    }
    Ok(reports)
}

pub fn build_app(broker: Arc<AuthBroker>, cfg: &AppConfig) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .merge(router(broker))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(cfg.server.body_limit_bytes))
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

pub struct ServerBuilder {
    config: AppConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    pub fn build(self) -> anyhow::Result<BrokerServer> {
        let broker = build_broker(&self.config)?;
        tracing::info!(
            providers = broker.registry().len(),
            default_provider = ?broker.default_provider(),
            "Identity providers registered"
        );
        Ok(BrokerServer {
            addr: self.config.addr(),
            app: build_app(broker, &self.config),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(error = %err, "failed to listen for shutdown signal"),
    }
}
