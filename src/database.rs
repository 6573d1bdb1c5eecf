//! database (db) union structure.
use async_trait::async_trait;
use axum::extract::FromRef;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::AppState;
use crate::error::Result;

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "panel";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Open transaction on PostgreSQL.
pub type PgTransaction = sqlx::Transaction<'static, sqlx::Postgres>;

/// Connection able to group writes into one atomic unit.
///
/// Dropping a transaction without committing it rolls it back.
#[async_trait]
pub trait Transactional: Send + Sync {
    type Transaction: Send;

    /// Start a new transaction.
    async fn begin(&self) -> Result<Self::Transaction>;

    /// Commit every write made through `tx`.
    async fn commit(&self, tx: Self::Transaction) -> Result<()>;
}

/// Custom db structure to pass to Axum.
#[derive(Clone)]
pub struct Database {
    pub postgres: PgPool,
}

impl Database {
    /// Init database connections.
    pub async fn new(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> std::result::Result<Self, sqlx::Error> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new().max_connections(pool);
        let postgres = pool.connect(&addr).await?;

        tracing::info!(%hostname, %db, "postgres connected");

        Ok(Self { postgres })
    }

    /// Wrap an existing pool.
    pub fn from_pool(postgres: PgPool) -> Self {
        Self { postgres }
    }
}

#[async_trait]
impl Transactional for Database {
    type Transaction = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        Ok(self.postgres.begin().await?)
    }

    async fn commit(&self, tx: PgTransaction) -> Result<()> {
        Ok(tx.commit().await?)
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(app_state: &AppState) -> Database {
        app_state.db.clone()
    }
}
