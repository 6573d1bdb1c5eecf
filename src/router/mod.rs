//! HTTP API.
pub mod create;
pub mod status;

use axum::Router;
use axum::middleware;
use axum::routing::post;

use crate::AppState;

/// Administrative user routes.
pub fn users(state: AppState) -> Router<AppState> {
    Router::new()
        // `POST /users` goes to `create`. API key required.
        .route("/", post(create::handler))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::require_api_key,
        ))
}

/// State backed by in-process collaborators, for route tests.
#[cfg(test)]
pub fn state(pool: sqlx::PgPool) -> AppState {
    use std::sync::Arc;

    use crate::config::Configuration;
    use crate::crypto::Crypto;
    use crate::crypto::tests::fast_config;
    use crate::database::Database;
    use crate::mail::MailManager;

    let config = Arc::new(Configuration {
        name: "Nebula".into(),
        url: "https://panel.nebula.gg/".into(),
        api_key: Some(TEST_API_KEY.into()),
        ..Default::default()
    });
    let crypto = Arc::new(Crypto::new(Some(fast_config()), "pepper").unwrap());
    let mail = MailManager::disabled(&config.name, config.base_url().unwrap());

    crate::build_state(
        config,
        Database::from_pool(pool),
        crypto,
        mail,
        reqwest::Client::new(),
        None,
    )
    .unwrap()
}

#[cfg(test)]
pub const TEST_API_KEY: &str = "test-api-key";
