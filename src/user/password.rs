//! Password reset tokens.

use std::sync::Arc;

use async_trait::async_trait;

use crate::crypto::{Crypto, random_string};
use crate::database::PgTransaction;
use crate::error::Result;
use crate::user::User;

pub const TOKEN_LENGTH: usize = 64;

/// Port issuing reset tokens for account-recovery flows.
#[async_trait]
pub trait PasswordBroker<Tx: Send>: Send + Sync {
    /// Create a reset token for `user`, replacing any previous one.
    async fn create_token(&self, tx: &mut Tx, user: &User) -> Result<String>;
}

/// Broker storing peppered token digests on PostgreSQL.
#[derive(Clone)]
pub struct PgPasswordBroker {
    crypto: Arc<Crypto>,
}

impl PgPasswordBroker {
    /// Create a new [`PgPasswordBroker`].
    pub fn new(crypto: Arc<Crypto>) -> Self {
        Self { crypto }
    }
}

#[async_trait]
impl PasswordBroker<PgTransaction> for PgPasswordBroker {
    async fn create_token(
        &self,
        tx: &mut PgTransaction,
        user: &User,
    ) -> Result<String> {
        sqlx::query(r#"DELETE FROM password_resets WHERE email = $1"#)
            .bind(&user.email)
            .execute(&mut **tx)
            .await?;

        let token = random_string(TOKEN_LENGTH);

        sqlx::query(
            r#"INSERT INTO password_resets (email, token) VALUES ($1, $2)"#,
        )
        .bind(&user.email)
        .bind(self.crypto.hasher.digest(&token))
        .execute(&mut **tx)
        .await?;

        tracing::debug!(user = %user.uuid, "password reset token created");

        Ok(token)
    }
}
