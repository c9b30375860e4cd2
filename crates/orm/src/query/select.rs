//! Read shape: projection, target table, ordering and limits

use super::builder::QueryBuilder;
use super::types::{OrderDirection, QueryType};

impl<M> QueryBuilder<M> {
    /// Project `fields`, a comma separated list or `*`
    pub fn select(mut self, fields: &str) -> Self {
        let fields = fields.split(',').map(str::trim).filter(|f| !f.is_empty());
        self.select_fields.extend(fields.map(str::to_string));
        self
    }

    /// Read from `table`
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.query_type = QueryType::Select;
        self.table = Some(table.into());
        self
    }

    pub fn order_by(self, column: impl Into<String>) -> Self {
        self.order(column, OrderDirection::Asc)
    }

    pub fn order_by_desc(self, column: impl Into<String>) -> Self {
        self.order(column, OrderDirection::Desc)
    }

    fn order(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push((column.into(), direction));
        self
    }

    pub fn limit(mut self, count: i64) -> Self {
        self.limit_count = Some(count);
        self
    }

    pub fn offset(mut self, count: i64) -> Self {
        self.offset_value = Some(count);
        self
    }
}
