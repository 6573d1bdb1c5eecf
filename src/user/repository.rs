//! Handle database requests.

use async_trait::async_trait;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::database::PgTransaction;
use crate::error::{Result, ServerError};
use crate::user::{NewUser, User};

/// Port for user persistence.
#[async_trait]
pub trait UserRepository<Tx: Send>: Send + Sync {
    /// Validate and insert a new user inside `tx`.
    async fn create(&self, tx: &mut Tx, user: NewUser) -> Result<User>;
}

/// PostgreSQL user repository.
#[derive(Clone, Copy, Debug, Default)]
pub struct PgUserRepository;

impl PgUserRepository {
    /// Create a new [`PgUserRepository`].
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UserRepository<PgTransaction> for PgUserRepository {
    async fn create(
        &self,
        tx: &mut PgTransaction,
        user: NewUser,
    ) -> Result<User> {
        user.validate()?;

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                uuid, external_id, username, email, name_first, name_last,
                password, language, root_admin
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING
                id, uuid, external_id, username, email, name_first,
                name_last, password, language, root_admin, created_at
            "#,
        )
        .bind(user.uuid)
        .bind(&user.external_id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.name_first)
        .bind(&user.name_last)
        .bind(&user.password)
        .bind(&user.language)
        .bind(user.root_admin)
        .fetch_one(&mut **tx)
        .await
        .map_err(unique_violation)
    }
}

/// Turn a unique constraint failure into a field validation error.
fn unique_violation(err: sqlx::Error) -> ServerError {
    let field = err
        .as_database_error()
        .filter(|e| e.is_unique_violation())
        .and_then(|e| e.constraint())
        .and_then(constraint_field);

    match field {
        Some(field) => {
            let mut errors = ValidationErrors::new();
            errors.add(
                field,
                ValidationError::new("unique").with_message(
                    format!("The {field} has already been taken.").into(),
                ),
            );
            errors.into()
        },
        None => err.into(),
    }
}

fn constraint_field(constraint: &str) -> Option<&'static str> {
    match constraint {
        "users_uuid_key" => Some("uuid"),
        "users_external_id_key" => Some("external_id"),
        "users_username_key" => Some("username"),
        "users_email_key" => Some("email"),
        _ => None,
    }
}
