use std::{
    collections::HashSet,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use shared::DependencyError;
use sqlx::PgPool;

const SERVICE: &str = "record store";

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap();
}

/// Lookups behind the `exists` and `unique` rules.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn exists(&self, table: &str, column: &str, value: &str) -> Result<bool, DependencyError>;

    /// True when no row other than `excluding_id` holds `value` in `column`.
    async fn is_unique(
        &self,
        table: &str,
        column: &str,
        value: &str,
        excluding_id: Option<i64>,
    ) -> Result<bool, DependencyError>;
}

fn check_identifier(name: &str) -> Result<(), DependencyError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(DependencyError::rejected(
            SERVICE,
            format!("invalid identifier '{name}'"),
        ))
    }
}

pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn exists(&self, table: &str, column: &str, value: &str) -> Result<bool, DependencyError> {
        check_identifier(table)?;
        check_identifier(column)?;

        let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE {column}::text = $1)");
        sqlx::query_scalar::<_, bool>(&sql)
            .bind(value)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DependencyError::unavailable(SERVICE, e.to_string()))
    }

    async fn is_unique(
        &self,
        table: &str,
        column: &str,
        value: &str,
        excluding_id: Option<i64>,
    ) -> Result<bool, DependencyError> {
        check_identifier(table)?;
        check_identifier(column)?;

        let taken = match excluding_id {
            Some(id) => {
                let sql = format!(
                    "SELECT EXISTS(SELECT 1 FROM {table} WHERE {column}::text = $1 AND id <> $2)"
                );
                sqlx::query_scalar::<_, bool>(&sql)
                    .bind(value)
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                let sql = format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE {column}::text = $1)");
                sqlx::query_scalar::<_, bool>(&sql)
                    .bind(value)
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(|e| DependencyError::unavailable(SERVICE, e.to_string()))?;

        Ok(!taken)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StoredValue {
    table: String,
    column: String,
    value: String,
    id: i64,
}

/// Rows held in memory; used when no database is configured and in tests.
#[derive(Default)]
pub struct InMemoryRecordStore {
    rows: Mutex<HashSet<StoredValue>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, table: &str, column: &str, value: &str, id: i64) {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(StoredValue {
                table: table.to_string(),
                column: column.to_string(),
                value: value.to_string(),
                id,
            });
    }

    fn matching_ids(&self, table: &str, column: &str, value: &str) -> Vec<i64> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|row| row.table == table && row.column == column && row.value == value)
            .map(|row| row.id)
            .collect()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn exists(&self, table: &str, column: &str, value: &str) -> Result<bool, DependencyError> {
        check_identifier(table)?;
        check_identifier(column)?;
        Ok(!self.matching_ids(table, column, value).is_empty())
    }

    async fn is_unique(
        &self,
        table: &str,
        column: &str,
        value: &str,
        excluding_id: Option<i64>,
    ) -> Result<bool, DependencyError> {
        check_identifier(table)?;
        check_identifier(column)?;
        Ok(self
            .matching_ids(table, column, value)
            .into_iter()
            .all(|id| Some(id) == excluding_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exists_and_unique() {
        let store = InMemoryRecordStore::new();
        store.insert("users", "email", "jane@example.com", 7);

        assert!(store.exists("users", "email", "jane@example.com").await.unwrap());
        assert!(!store.exists("users", "email", "john@example.com").await.unwrap());

        assert!(!store.is_unique("users", "email", "jane@example.com", None).await.unwrap());
        assert!(store.is_unique("users", "email", "jane@example.com", Some(7)).await.unwrap());
        assert!(!store.is_unique("users", "email", "jane@example.com", Some(8)).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_unsafe_identifiers() {
        let store = InMemoryRecordStore::new();
        let err = store
            .exists("users; DROP TABLE users", "email", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, DependencyError::Rejected { .. }));
    }
}
