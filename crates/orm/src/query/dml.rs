//! Write statements: INSERT, UPDATE and DELETE
//!
//! Only UPDATE and DELETE run through the guard's write hook points; an
//! INSERT carries its tenant column as an ordinary value.

use super::builder::QueryBuilder;
use super::types::{QueryType, SetClause};
use crate::backends::DatabaseValue;

impl<M> QueryBuilder<M> {
    pub fn insert_into(self, table: impl Into<String>) -> Self {
        self.target(QueryType::Insert, table)
    }

    pub fn update(self, table: impl Into<String>) -> Self {
        self.target(QueryType::Update, table)
    }

    pub fn delete_from(self, table: impl Into<String>) -> Self {
        self.target(QueryType::Delete, table)
    }

    fn target(mut self, kind: QueryType, table: impl Into<String>) -> Self {
        self.query_type = kind;
        self.table = Some(table.into());
        self
    }

    /// Assign `column` (INSERT values or UPDATE SET list)
    pub fn set(mut self, column: impl Into<String>, value: impl Into<DatabaseValue>) -> Self {
        self.set_clauses.push(SetClause {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn set_null(self, column: impl Into<String>) -> Self {
        self.set(column, DatabaseValue::Null)
    }
}
