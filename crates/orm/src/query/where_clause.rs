//! Filter clauses
//!
//! Every `where_*` call appends one top-level clause; top-level clauses are
//! joined with AND when rendered.

use super::builder::QueryBuilder;
use super::types::*;
use crate::backends::DatabaseValue;

macro_rules! comparisons {
    ($($(#[$doc:meta])* $name:ident => $operator:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $name<T: Into<DatabaseValue>>(self, column: &str, value: T) -> Self {
                self.compare(column, QueryOperator::$operator, value.into())
            }
        )*
    };
}

impl<M> QueryBuilder<M> {
    fn push_condition(mut self, condition: WhereCondition) -> Self {
        self.where_conditions.push(Clause::Condition(condition));
        self
    }

    fn compare(self, column: &str, operator: QueryOperator, value: DatabaseValue) -> Self {
        self.push_condition(WhereCondition::new(column, operator, Some(value)))
    }

    comparisons! {
        /// `column = value`; a null value renders `IS NULL`
        where_eq => Equal;
        where_ne => NotEqual;
        where_gt => GreaterThan;
        where_gte => GreaterThanOrEqual;
        where_lt => LessThan;
        where_lte => LessThanOrEqual;
    }

    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.compare(column, QueryOperator::Like, pattern.into())
    }

    /// `column IN (values)`; an empty list matches nothing
    pub fn where_in<T: Into<DatabaseValue>>(self, column: &str, values: Vec<T>) -> Self {
        self.list(column, QueryOperator::In, values)
    }

    /// `column NOT IN (values)`; an empty list matches everything
    pub fn where_not_in<T: Into<DatabaseValue>>(self, column: &str, values: Vec<T>) -> Self {
        self.list(column, QueryOperator::NotIn, values)
    }

    fn list<T: Into<DatabaseValue>>(self, column: &str, operator: QueryOperator, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.push_condition(WhereCondition::with_values(column, operator, values))
    }

    pub fn where_null(self, column: &str) -> Self {
        self.push_condition(WhereCondition::new(column, QueryOperator::IsNull, None))
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.push_condition(WhereCondition::new(column, QueryOperator::IsNotNull, None))
    }

    pub fn where_between<T: Into<DatabaseValue>>(self, column: &str, start: T, end: T) -> Self {
        self.push_condition(WhereCondition::with_values(
            column,
            QueryOperator::Between,
            vec![start.into(), end.into()],
        ))
    }

    /// Opaque SQL fragment, rendered in parentheses
    pub fn where_raw(mut self, raw_condition: &str) -> Self {
        self.where_conditions.push(Clause::raw(raw_condition));
        self
    }

    /// Opaque SQL fragment whose `?` placeholders bind `params` in order
    pub fn where_raw_with(mut self, raw_condition: &str, params: Vec<DatabaseValue>) -> Self {
        self.where_conditions.push(Clause::Raw {
            sql: raw_condition.to_string(),
            params,
        });
        self
    }

    /// Add a parenthesised AND group built by `build`
    pub fn where_group<F>(mut self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder<()>) -> QueryBuilder<()>,
    {
        let group = build(QueryBuilder::new());
        self.where_conditions.push(Clause::And(group.where_conditions));
        self
    }

    /// Add a parenthesised OR group: any of the conditions built by `build`
    pub fn where_any<F>(mut self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder<()>) -> QueryBuilder<()>,
    {
        let group = build(QueryBuilder::new());
        self.where_conditions.push(Clause::Or(group.where_conditions));
        self
    }
}
