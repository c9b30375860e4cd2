//! In-memory backend
//!
//! Serves canned rows per table and records every statement it receives.
//! It does not evaluate predicates: a fetch returns every row registered for
//! the statement's `FROM` table.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::core::*;
use crate::error::{OrmError, OrmResult};

/// A statement as received by the pool
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub params: Vec<DatabaseValue>,
}

/// Recording pool backed by in-memory rows
#[derive(Debug, Default)]
pub struct MemoryPool {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    statements: Mutex<Vec<ExecutedStatement>>,
    failure: Mutex<Option<String>>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register rows for a table; non-object values are ignored
    pub fn with_rows(self, table: &str, rows: Vec<JsonValue>) -> Self {
        self.insert_rows(table, rows);
        self
    }

    pub fn insert_rows(&self, table: &str, rows: Vec<JsonValue>) {
        let rows = rows.into_iter().filter_map(|row| match row {
            JsonValue::Object(map) => Some(map),
            _ => None,
        });
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(table.to_lowercase())
            .or_default()
            .extend(rows);
    }

    /// Make every following call fail with a database error until cleared
    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = message.map(str::to_string);
    }

    /// Statements received so far, in order
    pub fn statements(&self) -> Vec<ExecutedStatement> {
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn statement_count(&self) -> usize {
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn record(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<()> {
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ExecutedStatement {
                sql: sql.to_string(),
                params: params.to_vec(),
            });

        match self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(message) => Err(OrmError::Database(message.clone())),
            None => Ok(()),
        }
    }

    fn rows_for(&self, sql: &str) -> Vec<Row> {
        let Some(table) = source_table(sql) else {
            return Vec::new();
        };
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }
}

/// Table named after the first `FROM` keyword
fn source_table(sql: &str) -> Option<String> {
    let mut tokens = sql.split_whitespace();
    while let Some(token) = tokens.next() {
        if token.eq_ignore_ascii_case("FROM") {
            return tokens
                .next()
                .map(|t| t.trim_matches('"').to_lowercase());
        }
    }
    None
}

#[async_trait]
impl DatabasePool for MemoryPool {
    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Row>> {
        self.record(sql, params)?;
        Ok(self.rows_for(sql))
    }

    async fn fetch_optional(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Option<Row>> {
        self.record(sql, params)?;
        Ok(self.rows_for(sql).into_iter().next())
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        self.record(sql, params)?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_table() {
        assert_eq!(
            source_table("SELECT * FROM invoices WHERE id = $1"),
            Some("invoices".to_string())
        );
        assert_eq!(source_table("DELETE FROM \"Bills\""), Some("bills".to_string()));
        assert_eq!(source_table("UPDATE invoices SET a = $1"), None);
    }

    #[tokio::test]
    async fn test_records_statements_and_serves_rows() {
        let pool = MemoryPool::new().with_rows("customers", vec![json!({"id": 1}), json!(7)]);

        let rows = pool
            .fetch_all("SELECT * FROM customers", &[DatabaseValue::Int64(1)])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let statements = pool.statements();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].params, vec![DatabaseValue::Int64(1)]);
    }

    #[tokio::test]
    async fn test_failure_mode() {
        let pool = MemoryPool::new();
        pool.set_failure(Some("connection reset"));

        let err = pool.fetch_all("SELECT * FROM customers", &[]).await.unwrap_err();
        assert_eq!(err, OrmError::Database("connection reset".to_string()));

        pool.set_failure(None);
        assert!(pool.fetch_all("SELECT * FROM customers", &[]).await.is_ok());
        assert_eq!(pool.statement_count(), 2);
    }
}
