use axum::extract::rejection::JsonRejection;
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::Result;
use crate::user::{User, UserData};

pub const OBJECT: &str = "user";

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub object: String,
    pub attributes: User,
}

/// Handler to create user.
pub async fn handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<UserData>, JsonRejection>,
) -> Result<(StatusCode, Json<Response>)> {
    let Json(data) = body?;
    let user = state.users.handle(data).await?;

    Ok((
        StatusCode::CREATED,
        Json(Response {
            object: OBJECT.to_owned(),
            attributes: user,
        }),
    ))
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use crate::crypto::PasswordHasher;
    use crate::router::TEST_API_KEY;
    use crate::settings::{APPROVALS_WEBHOOK, PgSettingsRepository};
    use crate::*;
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;
    use sqlx::{Pool, Postgres};

    #[sqlx::test]
    async fn test_create_handler(pool: Pool<Postgres>) {
        let state = router::state(pool.clone());
        let app = app(state.clone());

        let response = make_request(
            Some(TEST_API_KEY),
            app,
            Method::POST,
            "/users",
            json!({
                "username": "Ghost",
                "email": "ghost@nebula.gg",
                "password": "P$soW%920$n&",
                "name_first": "Casper",
            })
            .to_string(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["object"], OBJECT);
        assert_eq!(value["attributes"]["username"], "ghost");
        assert_eq!(value["attributes"]["name_first"], "Casper");
        assert!(value["attributes"].get("password").is_none());

        let password: String =
            sqlx::query_scalar("SELECT password FROM users WHERE email = $1")
                .bind("ghost@nebula.gg")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(state.crypto.pwd.check("P$soW%920$n&", &password));

        let tokens: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM password_resets")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(tokens, 0);
    }

    #[sqlx::test]
    async fn test_create_without_password(pool: Pool<Postgres>) {
        let app = app(router::state(pool.clone()));

        let response = make_request(
            Some(TEST_API_KEY),
            app,
            Method::POST,
            "/users",
            json!({ "username": "phantom", "email": "phantom@nebula.gg" })
                .to_string(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::CREATED);

        let tokens: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM password_resets WHERE email = $1",
        )
        .bind("phantom@nebula.gg")
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tokens, 1);
    }

    #[sqlx::test]
    async fn test_create_duplicate(pool: Pool<Postgres>) {
        let state = router::state(pool.clone());
        let body = json!({ "username": "ghost", "email": "ghost@nebula.gg" })
            .to_string();

        let first = make_request(
            Some(TEST_API_KEY),
            app(state.clone()),
            Method::POST,
            "/users",
            body,
        )
        .await;
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = make_request(
            Some(TEST_API_KEY),
            app(state),
            Method::POST,
            "/users",
            json!({ "username": "phantom", "email": "ghost@nebula.gg" })
                .to_string(),
        )
        .await;
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);

        let body = second.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["errors"][0]["field"], "email");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    async fn test_unreachable_webhook_rolls_back(pool: Pool<Postgres>) {
        let settings = PgSettingsRepository::new(pool.clone());
        settings.set(APPROVALS_WEBHOOK, "true").await.unwrap();
        settings
            .set(
                crate::settings::APPROVALS_WEBHOOK_URL,
                "http://127.0.0.1:9/hook",
            )
            .await
            .unwrap();
        let app = app(router::state(pool.clone()));

        let response = make_request(
            Some(TEST_API_KEY),
            app,
            Method::POST,
            "/users",
            json!({ "username": "ghost", "email": "ghost@nebula.gg" })
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[sqlx::test]
    async fn test_rejected_webhook_still_commits(pool: Pool<Postgres>) {
        let (url, received) =
            crate::webhook::tests::receiver(StatusCode::INTERNAL_SERVER_ERROR)
                .await;
        let settings = PgSettingsRepository::new(pool.clone());
        settings.set(APPROVALS_WEBHOOK, "true").await.unwrap();
        settings
            .set(crate::settings::APPROVALS_WEBHOOK_URL, &url)
            .await
            .unwrap();
        let app = app(router::state(pool.clone()));

        let response = make_request(
            Some(TEST_API_KEY),
            app,
            Method::POST,
            "/users",
            json!({ "username": "Ghost", "email": "ghost@nebula.gg" })
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        {
            let received = received.lock().unwrap();
            assert_eq!(received.len(), 1);
            let fields = &received[0].1["embeds"][0]["fields"];
            assert_eq!(fields[0]["value"], "Ghost");
            assert_eq!(fields[1]["value"], "ghost@nebula.gg");
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    async fn test_slow_webhook_is_awaited(pool: Pool<Postgres>) {
        let delay = REQUEST_TIMEOUT + std::time::Duration::from_secs(1);
        let (url, _) =
            crate::webhook::tests::slow_receiver(StatusCode::NO_CONTENT, delay)
                .await;
        let settings = PgSettingsRepository::new(pool.clone());
        settings.set(APPROVALS_WEBHOOK, "true").await.unwrap();
        settings
            .set(crate::settings::APPROVALS_WEBHOOK_URL, &url)
            .await
            .unwrap();
        let app = app(router::state(pool.clone()));

        let response = make_request(
            Some(TEST_API_KEY),
            app,
            Method::POST,
            "/users",
            json!({ "username": "ghost", "email": "ghost@nebula.gg" })
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[sqlx::test]
    async fn test_create_requires_api_key(pool: Pool<Postgres>) {
        let app = app(router::state(pool));

        let response = make_request(
            Some("wrong"),
            app,
            Method::POST,
            "/users",
            json!({ "username": "ghost", "email": "ghost@nebula.gg" })
                .to_string(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    async fn test_create_malformed_body(pool: Pool<Postgres>) {
        let app = app(router::state(pool));

        let response = make_request(
            Some(TEST_API_KEY),
            app,
            Method::POST,
            "/users",
            json!({ "email": "ghost@nebula.gg" }).to_string(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
