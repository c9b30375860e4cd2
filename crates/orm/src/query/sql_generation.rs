//! Query Builder SQL generation
//!
//! Renders PostgreSQL with `$n` placeholders. Groups and raw fragments are
//! always parenthesised so an appended top-level predicate cannot be
//! absorbed by an `OR` inside them.

use super::builder::QueryBuilder;
use super::types::*;
use crate::backends::DatabaseValue;

impl<M> QueryBuilder<M> {
    /// Generate SQL with parameter placeholders and return the bound parameters
    pub fn to_sql_with_params(&self) -> (String, Vec<DatabaseValue>) {
        let mut params = Vec::new();
        let sql = match self.query_type {
            QueryType::Select => self.build_select_sql(&mut params),
            QueryType::Insert => self.build_insert_sql(&mut params),
            QueryType::Update => self.build_update_sql(&mut params),
            QueryType::Delete => self.build_delete_sql(&mut params),
        };
        (sql, params)
    }

    /// SQL text only, with placeholders
    pub fn to_sql(&self) -> String {
        self.to_sql_with_params().0
    }

    fn build_select_sql(&self, params: &mut Vec<DatabaseValue>) -> String {
        let mut sql = String::from("SELECT ");

        if self.select_fields.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.select_fields.join(", "));
        }

        if let Some(table) = &self.table {
            sql.push_str(" FROM ");
            sql.push_str(table);
        }

        self.build_where_clause(&mut sql, params);

        if !self.order_by.is_empty() {
            let order: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, direction)| format!("{} {}", column, direction))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if let Some(limit) = self.limit_count {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset_value {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }

    fn build_insert_sql(&self, params: &mut Vec<DatabaseValue>) -> String {
        let table = self.table.as_deref().unwrap_or_default();
        let columns: Vec<&str> = self.set_clauses.iter().map(|c| c.column.as_str()).collect();
        let values: Vec<String> = self
            .set_clauses
            .iter()
            .map(|clause| bind_value(params, &clause.value))
            .collect();

        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            values.join(", ")
        )
    }

    fn build_update_sql(&self, params: &mut Vec<DatabaseValue>) -> String {
        let table = self.table.as_deref().unwrap_or_default();
        let assignments: Vec<String> = self
            .set_clauses
            .iter()
            .map(|clause| format!("{} = {}", clause.column, bind_value(params, &clause.value)))
            .collect();

        let mut sql = format!("UPDATE {} SET {}", table, assignments.join(", "));
        self.build_where_clause(&mut sql, params);
        sql
    }

    fn build_delete_sql(&self, params: &mut Vec<DatabaseValue>) -> String {
        let table = self.table.as_deref().unwrap_or_default();
        let mut sql = format!("DELETE FROM {}", table);
        self.build_where_clause(&mut sql, params);
        sql
    }

    fn build_where_clause(&self, sql: &mut String, params: &mut Vec<DatabaseValue>) {
        if self.where_conditions.is_empty() {
            return;
        }

        let parts: Vec<String> = self
            .where_conditions
            .iter()
            .map(|clause| render_clause(clause, params))
            .collect();
        sql.push_str(" WHERE ");
        sql.push_str(&parts.join(" AND "));
    }
}

fn placeholder(params: &mut Vec<DatabaseValue>, value: DatabaseValue) -> String {
    params.push(value);
    format!("${}", params.len())
}

fn bind_value(params: &mut Vec<DatabaseValue>, value: &DatabaseValue) -> String {
    if value.is_null() {
        "NULL".to_string()
    } else {
        placeholder(params, value.clone())
    }
}

fn render_clause(clause: &Clause, params: &mut Vec<DatabaseValue>) -> String {
    match clause {
        Clause::Condition(condition) => render_condition(condition, params),
        Clause::And(children) => render_group(children, " AND ", "TRUE", params),
        Clause::Or(children) => render_group(children, " OR ", "FALSE", params),
        Clause::Raw { sql, params: bound } => format!("({})", render_raw(sql, bound, params)),
    }
}

fn render_group(
    children: &[Clause],
    separator: &str,
    empty: &str,
    params: &mut Vec<DatabaseValue>,
) -> String {
    if children.is_empty() {
        return empty.to_string();
    }
    let parts: Vec<String> = children
        .iter()
        .map(|child| render_clause(child, params))
        .collect();
    format!("({})", parts.join(separator))
}

fn render_condition(condition: &WhereCondition, params: &mut Vec<DatabaseValue>) -> String {
    let column = &condition.column;
    match condition.operator {
        QueryOperator::IsNull | QueryOperator::IsNotNull => {
            format!("{} {}", column, condition.operator)
        }
        QueryOperator::In | QueryOperator::NotIn => {
            if condition.values.is_empty() {
                // x IN () is invalid SQL; the empty set matches nothing
                return if condition.operator == QueryOperator::In {
                    "FALSE".to_string()
                } else {
                    "TRUE".to_string()
                };
            }
            let placeholders: Vec<String> = condition
                .values
                .iter()
                .map(|value| placeholder(params, value.clone()))
                .collect();
            format!("{} {} ({})", column, condition.operator, placeholders.join(", "))
        }
        QueryOperator::Between => match condition.values.as_slice() {
            [start, end] => {
                let start = placeholder(params, start.clone());
                let end = placeholder(params, end.clone());
                format!("{} BETWEEN {} AND {}", column, start, end)
            }
            _ => "FALSE".to_string(),
        },
        operator => match &condition.value {
            Some(value) if !value.is_null() => {
                format!("{} {} {}", column, operator, placeholder(params, value.clone()))
            }
            _ => match operator {
                QueryOperator::Equal => format!("{} IS NULL", column),
                QueryOperator::NotEqual => format!("{} IS NOT NULL", column),
                _ => "FALSE".to_string(),
            },
        },
    }
}

/// Replace `?` outside single-quoted literals with numbered placeholders
fn render_raw(sql: &str, bound: &[DatabaseValue], params: &mut Vec<DatabaseValue>) -> String {
    let mut rendered = String::with_capacity(sql.len());
    let mut pending = bound.iter();
    let mut in_literal = false;

    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_literal = !in_literal;
                rendered.push(ch);
            }
            '?' if !in_literal => match pending.next() {
                Some(value) => rendered.push_str(&placeholder(params, value.clone())),
                None => rendered.push(ch),
            },
            _ => rendered.push(ch),
        }
    }

    rendered
}
