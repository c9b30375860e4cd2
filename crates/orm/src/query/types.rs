//! Statement vocabulary: operators, the filter clause tree, ordering

use std::fmt;

use crate::backends::DatabaseValue;

/// Comparison operator of a [`WhereCondition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Between,
}

impl QueryOperator {
    pub fn as_sql(self) -> &'static str {
        use QueryOperator::*;
        match self {
            Equal => "=",
            NotEqual => "!=",
            GreaterThan => ">",
            GreaterThanOrEqual => ">=",
            LessThan => "<",
            LessThanOrEqual => "<=",
            Like => "LIKE",
            NotLike => "NOT LIKE",
            In => "IN",
            NotIn => "NOT IN",
            IsNull => "IS NULL",
            IsNotNull => "IS NOT NULL",
            Between => "BETWEEN",
        }
    }
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A single comparison against one column
#[derive(Debug, Clone, PartialEq)]
pub struct WhereCondition {
    pub column: String,
    pub operator: QueryOperator,
    pub value: Option<DatabaseValue>,
    /// Operands of IN, NOT IN and BETWEEN
    pub values: Vec<DatabaseValue>,
}

impl WhereCondition {
    pub fn new(column: impl Into<String>, operator: QueryOperator, value: Option<DatabaseValue>) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
            values: Vec::new(),
        }
    }

    pub fn with_values(
        column: impl Into<String>,
        operator: QueryOperator,
        values: Vec<DatabaseValue>,
    ) -> Self {
        Self {
            column: column.into(),
            operator,
            value: None,
            values,
        }
    }
}

/// Filter clause tree attached to a statement
///
/// Top-level clauses of a statement are joined with AND.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Condition(WhereCondition),
    And(Vec<Clause>),
    Or(Vec<Clause>),
    /// Opaque SQL fragment; `?` placeholders bind `params` in order
    Raw {
        sql: String,
        params: Vec<DatabaseValue>,
    },
}

impl Clause {
    /// `column = value`
    pub fn eq<T: Into<DatabaseValue>>(column: &str, value: T) -> Self {
        Clause::Condition(WhereCondition::new(
            column,
            QueryOperator::Equal,
            Some(value.into()),
        ))
    }

    pub fn raw(sql: &str) -> Self {
        Clause::Raw {
            sql: sql.to_string(),
            params: Vec::new(),
        }
    }
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        })
    }
}

/// Query types supported by the builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueryType::Select => "SELECT",
            QueryType::Insert => "INSERT",
            QueryType::Update => "UPDATE",
            QueryType::Delete => "DELETE",
        })
    }
}

/// Set clause for UPDATE and INSERT operations
#[derive(Debug, Clone, PartialEq)]
pub struct SetClause {
    pub column: String,
    pub value: DatabaseValue,
}
