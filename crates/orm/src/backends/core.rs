//! Core Database Backend Traits
//!
//! Bound parameter values and the pool trait every backend implements.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::OrmResult;

/// A fetched row, keyed by column name
pub type Row = serde_json::Map<String, JsonValue>;

/// Abstract database pool trait
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Execute a query and return the result rows
    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Row>>;

    /// Execute a query and return the first result row
    async fn fetch_optional(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Option<Row>>;

    /// Execute a statement and return affected rows count
    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64>;
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Json(JsonValue),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }
}

macro_rules! database_value_from {
    ($($source:ty => |$v:ident| $convert:expr),* $(,)?) => {
        $(
            impl From<$source> for DatabaseValue {
                fn from($v: $source) -> Self {
                    $convert
                }
            }
        )*
    };
}

database_value_from! {
    bool => |v| DatabaseValue::Bool(v),
    i32 => |v| DatabaseValue::Int64(i64::from(v)),
    i64 => |v| DatabaseValue::Int64(v),
    u32 => |v| DatabaseValue::Int64(i64::from(v)),
    f64 => |v| DatabaseValue::Float64(v),
    String => |v| DatabaseValue::String(v),
    &str => |v| DatabaseValue::String(v.to_string()),
    &String => |v| DatabaseValue::String(v.clone()),
    uuid::Uuid => |v| DatabaseValue::Uuid(v),
    chrono::DateTime<chrono::Utc> => |v| DatabaseValue::DateTime(v),
    chrono::NaiveDate => |v| DatabaseValue::Date(v),
    JsonValue => |v| DatabaseValue::Json(v),
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}
