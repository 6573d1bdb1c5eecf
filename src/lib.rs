//! Accounts provisions panel users.

#![forbid(unsafe_code)]
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod mail;
mod middleware;
mod router;
pub mod settings;
pub mod telemetry;
pub mod user;
pub mod webhook;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use error::ServerError;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::crypto::Crypto;
use crate::database::Database;
use crate::mail::MailManager;
use crate::settings::PgSettingsRepository;
use crate::user::{PgPasswordBroker, PgUserRepository, UserCreationService};
use crate::webhook::HttpWebhook;

/// Time limit of routes other than account creation.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    api_key: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = api_key {
        request =
            request.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub db: Database,
    pub crypto: Arc<Crypto>,
    pub users: Arc<UserCreationService<Database>>,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `GET /metrics` renders Prometheus metrics.
        .route("/metrics", get(render_metrics))
        // Set a timeout. Account creation is left out, it holds a
        // transaction until the webhook answers.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .nest("/users", router::users(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

async fn render_metrics(
    State(state): State<AppState>,
) -> Result<String, StatusCode> {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Wire collaborators into an [`AppState`].
pub fn build_state(
    config: Arc<config::Configuration>,
    db: Database,
    crypto: Arc<Crypto>,
    mail: MailManager,
    client: reqwest::Client,
    metrics: Option<PrometheusHandle>,
) -> error::Result<AppState> {
    let users = UserCreationService::new(
        db.clone(),
        Arc::new(crypto.pwd.clone()),
        Box::new(PgPasswordBroker::new(Arc::clone(&crypto))),
        Box::new(PgUserRepository::new()),
        Box::new(PgSettingsRepository::new(db.postgres.clone())),
        Box::new(HttpWebhook::new(client)),
        Box::new(mail),
        config.base_url()?,
    )
    .with_identity(config.webhook.clone())
    .with_app_name(&config.name);

    Ok(AppState {
        config,
        db,
        crypto,
        users: Arc::new(users),
        metrics,
    })
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file. let it in memory.
    let mut config = config::Configuration::default();
    if let Ok(path) = std::env::var("CONFIG_PATH") {
        config = config.path(PathBuf::from(path));
    }
    let config = config.read()?;

    let db = match config.postgres {
        Some(ref config) => {
            Database::new(
                &config.address,
                &config
                    .username
                    .clone()
                    .unwrap_or(database::DEFAULT_CREDENTIALS.into()),
                &config
                    .password
                    .clone()
                    .unwrap_or(database::DEFAULT_CREDENTIALS.into()),
                &config
                    .database
                    .clone()
                    .unwrap_or(database::DEFAULT_DATABASE_NAME.into()),
                config.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
            )
            .await?
        },
        None => {
            return Err(Box::new(ServerError::Internal {
                details: "missing `postgres` entry on `config.yaml` file"
                    .into(),
                source: None,
            }));
        },
    };

    // execute migrations scripts on start.
    sqlx::migrate!().run(&db.postgres).await?;

    let salt = std::env::var("SALT")
        .map_err(|_| "missing `SALT` environnement variable")?;
    let crypto = Arc::new(Crypto::new(config.argon2.clone(), salt)?);

    // handle mail sender.
    let base_url = config.base_url()?;
    let mail = if let Some(cfg) = &config.mail {
        MailManager::new(cfg, &config.name, base_url).await?
    } else {
        tracing::warn!("missing `mail` entry, notifications will be skipped");
        MailManager::disabled(&config.name, base_url)
    };

    let metrics = match telemetry::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "prometheus recorder not installed");
            None
        },
    };

    Ok(build_state(
        config,
        db,
        crypto,
        mail,
        reqwest::Client::new(),
        metrics,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use sqlx::{Pool, Postgres};

    #[sqlx::test]
    async fn test_status(pool: Pool<Postgres>) {
        let app = app(router::state(pool));

        let response =
            make_request(None, app, Method::GET, "/status.json", String::new())
                .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["name"], "Nebula");
    }

    #[sqlx::test]
    async fn test_metrics_without_recorder(pool: Pool<Postgres>) {
        let app = app(router::state(pool));

        let response =
            make_request(None, app, Method::GET, "/metrics", String::new())
                .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
