//! Query Builder - Core builder implementation

use std::marker::PhantomData;

use tally_core::TenantContext;

use super::types::*;
use crate::hooks::{HookPoint, Statement};

/// Query builder for constructing database statements
#[derive(Debug)]
pub struct QueryBuilder<M = ()> {
    pub(crate) query_type: QueryType,
    pub(crate) select_fields: Vec<String>,
    pub(crate) table: Option<String>,
    pub(crate) set_clauses: Vec<SetClause>,
    pub(crate) where_conditions: Vec<Clause>,
    pub(crate) order_by: Vec<(String, OrderDirection)>,
    pub(crate) limit_count: Option<i64>,
    pub(crate) offset_value: Option<i64>,
    _phantom: PhantomData<M>,
}

impl<M> Clone for QueryBuilder<M> {
    fn clone(&self) -> Self {
        Self {
            query_type: self.query_type,
            select_fields: self.select_fields.clone(),
            table: self.table.clone(),
            set_clauses: self.set_clauses.clone(),
            where_conditions: self.where_conditions.clone(),
            order_by: self.order_by.clone(),
            limit_count: self.limit_count,
            offset_value: self.offset_value,
            _phantom: PhantomData,
        }
    }
}

impl<M> Default for QueryBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> QueryBuilder<M> {
    /// Create a new query builder
    pub fn new() -> Self {
        Self {
            query_type: QueryType::Select,
            select_fields: Vec::new(),
            table: None,
            set_clauses: Vec::new(),
            where_conditions: Vec::new(),
            order_by: Vec::new(),
            limit_count: None,
            offset_value: None,
            _phantom: PhantomData,
        }
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    /// Target table of the statement, whatever its type
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Top-level filter clauses, joined with AND
    pub fn clauses(&self) -> &[Clause] {
        &self.where_conditions
    }

    /// Append a prebuilt clause
    pub fn push_clause(mut self, clause: Clause) -> Self {
        self.where_conditions.push(clause);
        self
    }

    /// Borrow the parts statement hooks may inspect and rewrite
    pub(crate) fn statement<'a>(
        &'a mut self,
        point: HookPoint,
        context: Option<&'a TenantContext>,
    ) -> Statement<'a> {
        Statement {
            point,
            table: self.table.as_deref(),
            clauses: &mut self.where_conditions,
            context,
        }
    }
}
