/// PostgreSQL implementation of DirectoryStore
use crate::domain::store::{
    AuthorizeRow, DirectoryStore, ExtensionRow, ForwardRow, ProviderRow, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error};

pub struct PgDirectoryStore {
    pool: PgPool,
}

impl PgDirectoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_error(context: &str, e: sqlx::Error) -> StoreError {
    error!("Failed to {}: {}", context, e);
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::InvalidRow(e.to_string())
        }
        _ => StoreError::Database(e.to_string()),
    }
}

#[async_trait]
impl DirectoryStore for PgDirectoryStore {
    async fn extensions(&self) -> Result<Vec<ExtensionRow>, StoreError> {
        let rows = sqlx::query_as::<_, ExtensionRow>(
            r#"
            SELECT number, alias, display, type
            FROM extensions
            ORDER BY number
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list extensions", e))?;

        debug!("Fetched {} extension rows", rows.len());
        Ok(rows)
    }

    async fn authorize(&self, userid: &str) -> Result<Option<AuthorizeRow>, StoreError> {
        sqlx::query_as::<_, AuthorizeRow>(
            r#"
            SELECT userid, number, secret, digest, last
            FROM authorize
            WHERE userid = $1
            "#,
        )
        .bind(userid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get authorize row", e))
    }

    async fn touch_authorize(&self, userid: &str, when: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE authorize SET last = $2 WHERE userid = $1")
            .bind(userid)
            .bind(when)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("update authorize row", e))?;
        Ok(())
    }

    async fn providers(&self) -> Result<Vec<ProviderRow>, StoreError> {
        sqlx::query_as::<_, ProviderRow>(
            r#"
            SELECT contact, protocol, userid, passwd, display
            FROM providers
            ORDER BY contact
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list providers", e))
    }

    async fn forwards(&self, number: i64) -> Result<Vec<ForwardRow>, StoreError> {
        sqlx::query_as::<_, ForwardRow>(
            r#"
            SELECT number, type, target
            FROM forward
            WHERE number = $1
            "#,
        )
        .bind(number)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list forwards", e))
    }
}
