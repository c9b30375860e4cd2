//! Table schema resolution
//!
//! The tenant guard asks a [`SchemaProvider`] whether a statement's table
//! carries the tenant column. Tables without it are shared and never scoped.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::postgres::PgPool;

use crate::error::{OrmError, OrmResult};
use crate::model::Model;

/// Column names of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<String>,
}

impl TableSchema {
    pub fn new<I, S>(table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.to_string(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Case-insensitive column lookup
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Source of table schemas
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Resolve a table; an unknown table is a [`OrmError::Schema`]
    async fn table_schema(&self, table: &str) -> OrmResult<TableSchema>;
}

/// Table reference of a statement target, without its alias
///
/// `invoices i`, `invoices AS i` and `invoices` all name `invoices`.
fn strip_alias(target: &str) -> &str {
    let target = target.trim();
    let mut quoted = false;
    for (at, ch) in target.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => return &target[..at],
            _ => {}
        }
    }
    target
}

/// Lowercased, unquoted, schema-qualified when the target is
fn qualified_key(target: &str) -> String {
    strip_alias(target)
        .split('.')
        .map(|part| part.trim_matches('"'))
        .collect::<Vec<_>>()
        .join(".")
        .to_lowercase()
}

/// Lowercased, unquoted table name with any schema qualifier dropped
fn table_key(target: &str) -> String {
    let key = qualified_key(target);
    match key.rsplit_once('.') {
        Some((_, table)) => table.to_string(),
        None => key,
    }
}

/// Schemas registered up front, keyed by bare table name
#[derive(Debug, Clone, Default)]
pub struct StaticSchema {
    tables: HashMap<String, TableSchema>,
}

impl StaticSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, schema: TableSchema) -> Self {
        self.register(schema);
        self
    }

    /// Register the table a model maps to, using [`Model::columns`]
    pub fn with_model<M: Model>(self) -> Self {
        self.with_table(TableSchema::new(M::table_name(), M::columns().iter().copied()))
    }

    pub fn register(&mut self, schema: TableSchema) {
        self.tables.insert(table_key(&schema.table), schema);
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[async_trait]
impl SchemaProvider for StaticSchema {
    async fn table_schema(&self, table: &str) -> OrmResult<TableSchema> {
        self.tables
            .get(&table_key(table))
            .cloned()
            .ok_or_else(|| OrmError::Schema(format!("Unknown table '{}'", table)))
    }
}

/// Introspects `information_schema.columns`, caching each table once found
#[derive(Debug, Clone)]
pub struct PostgresSchema {
    pool: PgPool,
    cache: DashMap<String, TableSchema>,
}

impl PostgresSchema {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: DashMap::new(),
        }
    }

    /// Drop cached schemas, e.g. after a migration
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    async fn introspect(&self, table: &str) -> OrmResult<TableSchema> {
        let key = qualified_key(table);
        let (namespace, name) = match key.split_once('.') {
            Some((namespace, name)) => (Some(namespace.to_string()), name.to_string()),
            None => (None, key.clone()),
        };

        let columns: Vec<String> = sqlx::query_scalar(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_name = $1 AND table_schema = COALESCE($2, current_schema()) \
             ORDER BY ordinal_position",
        )
        .bind(&name)
        .bind(namespace)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OrmError::Schema(format!("Failed to introspect '{}': {}", table, e)))?;

        if columns.is_empty() {
            return Err(OrmError::Schema(format!("Unknown table '{}'", table)));
        }

        Ok(TableSchema::new(&key, columns))
    }
}

#[async_trait]
impl SchemaProvider for PostgresSchema {
    async fn table_schema(&self, table: &str) -> OrmResult<TableSchema> {
        let key = qualified_key(table);
        if let Some(schema) = self.cache.get(&key) {
            return Ok(schema.clone());
        }

        let schema = self.introspect(table).await?;
        tracing::debug!(
            target: "tally::orm",
            table = %key,
            columns = schema.columns.len(),
            "Cached table schema"
        );
        self.cache.insert(key, schema.clone());
        Ok(schema)
    }
}
