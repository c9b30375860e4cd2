//! Query Builder Module - fluent statement builder with a filter clause tree

pub mod builder;
pub mod dml;
pub mod select;
pub mod sql_generation;
pub mod types;
pub mod where_clause;

pub use builder::QueryBuilder;
pub use types::{Clause, OrderDirection, QueryOperator, QueryType, SetClause, WhereCondition};
