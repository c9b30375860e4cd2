//! Model trait - table metadata and row decoding for database entities

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::backends::Row;
use crate::error::OrmResult;
use crate::query::QueryBuilder;

/// A type stored one row per record in a table
pub trait Model: Send + Sync + Debug + DeserializeOwned + 'static {
    /// Table name for this model
    fn table_name() -> &'static str;

    /// Primary key column name
    fn primary_key_name() -> &'static str {
        "id"
    }

    /// Every column of the table, used to register static schemas
    fn columns() -> &'static [&'static str];

    /// Decode one fetched row
    fn from_row(row: Row) -> OrmResult<Self> {
        Ok(serde_json::from_value(JsonValue::Object(row))?)
    }

    /// Start a SELECT against this model's table
    fn query() -> QueryBuilder<Self>
    where
        Self: Sized,
    {
        QueryBuilder::new().from(Self::table_name())
    }
}
