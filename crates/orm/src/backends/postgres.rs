//! PostgreSQL Backend Implementation
//!
//! [`DatabasePool`] over sqlx, binding [`DatabaseValue`] parameters and
//! converting result rows to JSON objects by column type.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row as SqlxRow};

use super::core::*;
use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};

/// PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> OrmResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout))
            .connect(&config.url)
            .await
            .map_err(|e| OrmError::Database(format!("Failed to create PostgreSQL pool: {}", e)))?;

        tracing::info!(
            target: "tally::orm",
            max_connections = config.max_connections,
            "PostgreSQL pool established"
        );

        Ok(Self::new(pool))
    }

    /// Get the underlying sqlx pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[DatabaseValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            DatabaseValue::Null => query.bind(None::<String>),
            DatabaseValue::Bool(b) => query.bind(*b),
            DatabaseValue::Int64(i) => query.bind(*i),
            DatabaseValue::Float64(f) => query.bind(*f),
            DatabaseValue::String(s) => query.bind(s.clone()),
            DatabaseValue::Uuid(u) => query.bind(*u),
            DatabaseValue::DateTime(dt) => query.bind(*dt),
            DatabaseValue::Date(d) => query.bind(*d),
            DatabaseValue::Json(j) => query.bind(j.clone()),
        };
    }
    query
}

/// Convert a PostgreSQL row to a JSON object
fn row_to_json(row: &PgRow) -> Row {
    let mut map = serde_json::Map::new();

    for (i, column) in row.columns().iter().enumerate() {
        let json_value = if let Ok(value) = row.try_get::<Option<String>, _>(i) {
            value.map_or(JsonValue::Null, JsonValue::String)
        } else if let Ok(value) = row.try_get::<Option<i64>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()))
        } else if let Ok(value) = row.try_get::<Option<i32>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()))
        } else if let Ok(value) = row.try_get::<Option<i16>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::Number(v.into()))
        } else if let Ok(value) = row.try_get::<Option<f64>, _>(i) {
            value
                .and_then(serde_json::Number::from_f64)
                .map_or(JsonValue::Null, JsonValue::Number)
        } else if let Ok(value) = row.try_get::<Option<bool>, _>(i) {
            value.map_or(JsonValue::Null, JsonValue::Bool)
        } else if let Ok(value) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::String(v.to_rfc3339()))
        } else if let Ok(value) = row.try_get::<Option<chrono::NaiveDate>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::String(v.to_string()))
        } else if let Ok(value) = row.try_get::<Option<uuid::Uuid>, _>(i) {
            value.map_or(JsonValue::Null, |v| JsonValue::String(v.to_string()))
        } else if let Ok(value) = row.try_get::<Option<JsonValue>, _>(i) {
            value.unwrap_or(JsonValue::Null)
        } else {
            tracing::debug!(
                target: "tally::orm",
                column = column.name(),
                "Unsupported column type, reading as null"
            );
            JsonValue::Null
        };

        map.insert(column.name().to_string(), json_value);
    }

    map
}

#[async_trait]
impl DatabasePool for PostgresPool {
    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Row>> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn fetch_optional(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Option<Row>> {
        let row = bind_params(sqlx::query(sql), params)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_json))
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
