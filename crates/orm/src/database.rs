//! Database handle and per-context sessions
//!
//! A [`Database`] owns the pool, the schema provider and the hook chain. It
//! is configured once at startup, then shared behind an `Arc`. Every request
//! talks to it through a [`Session`] carrying that request's
//! [`TenantContext`], so hooks see who is asking.

use std::fmt;
use std::sync::Arc;

use tally_core::{AppConfigTrait, TenantContext};

use crate::backends::{DatabasePool, DatabaseValue, PostgresPool, Row};
use crate::config::{DatabaseConfig, TenantGuardConfig};
use crate::error::{OrmError, OrmResult};
use crate::hooks::{HookPoint, HookRegistry, StatementHook};
use crate::model::Model;
use crate::query::{QueryBuilder, QueryType};
use crate::schema::{PostgresSchema, SchemaProvider};
use crate::tenant::TenantGuard;

/// Process-wide database handle
pub struct Database {
    pool: Arc<dyn DatabasePool>,
    schema: Arc<dyn SchemaProvider>,
    hooks: HookRegistry,
}

impl Database {
    pub fn new(pool: Arc<dyn DatabasePool>, schema: Arc<dyn SchemaProvider>) -> Self {
        Self {
            pool,
            schema,
            hooks: HookRegistry::new(),
        }
    }

    /// Connect to PostgreSQL, resolving table schemas from the live database
    pub async fn connect(config: &DatabaseConfig) -> OrmResult<Self> {
        let pool = PostgresPool::connect(config).await?;
        let schema = PostgresSchema::new(pool.pool().clone());
        Ok(Self::new(Arc::new(pool), Arc::new(schema)))
    }

    /// Handle with the tenant guard already installed at every hook point
    pub fn guarded(
        pool: Arc<dyn DatabasePool>,
        schema: Arc<dyn SchemaProvider>,
        guard: &TenantGuardConfig,
    ) -> OrmResult<Self> {
        let mut db = Self::new(pool, schema);
        TenantGuard::install(&mut db, guard)?;
        Ok(db)
    }

    /// [`connect`](Self::connect), then install the tenant guard before the
    /// handle is returned
    pub async fn connect_guarded(
        config: &DatabaseConfig,
        guard: &TenantGuardConfig,
    ) -> OrmResult<Self> {
        guard.validate()?;
        let mut db = Self::connect(config).await?;
        TenantGuard::install(&mut db, guard)?;
        Ok(db)
    }

    /// Register a hook; only possible before the handle is shared
    pub fn register_hook(&mut self, point: HookPoint, hook: Arc<dyn StatementHook>) {
        self.hooks.register(point, hook);
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn schema(&self) -> Arc<dyn SchemaProvider> {
        Arc::clone(&self.schema)
    }

    pub fn pool(&self) -> Arc<dyn DatabasePool> {
        Arc::clone(&self.pool)
    }

    /// Session acting on behalf of `context`
    pub fn session(self: &Arc<Self>, context: Arc<TenantContext>) -> Session {
        Session {
            db: Arc::clone(self),
            context: Some(context),
        }
    }

    /// Session with no execution context; hooks see `context: None`
    pub fn detached(self: &Arc<Self>) -> Session {
        Session {
            db: Arc::clone(self),
            context: None,
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// Statement executor bound to one execution context
#[derive(Clone)]
pub struct Session {
    db: Arc<Database>,
    context: Option<Arc<TenantContext>>,
}

impl Session {
    pub fn context(&self) -> Option<&TenantContext> {
        self.context.as_deref()
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Run a multi-row query
    pub async fn fetch_all<M>(&self, query: QueryBuilder<M>) -> OrmResult<Vec<Row>> {
        expect_type(&query, QueryType::Select)?;
        let (sql, params) = self.prepare(query, HookPoint::PreQuery).await;
        self.db.pool.fetch_all(&sql, &params).await
    }

    /// Fetch at most one row
    pub async fn fetch_one<M>(&self, query: QueryBuilder<M>) -> OrmResult<Option<Row>> {
        expect_type(&query, QueryType::Select)?;
        let (sql, params) = self.prepare(query.limit(1), HookPoint::PreRowFetch).await;
        self.db.pool.fetch_optional(&sql, &params).await
    }

    /// Run an UPDATE, returning the affected row count
    pub async fn update<M>(&self, query: QueryBuilder<M>) -> OrmResult<u64> {
        expect_type(&query, QueryType::Update)?;
        expect_table(&query)?;
        let (sql, params) = self.prepare(query, HookPoint::PreUpdate).await;
        self.db.pool.execute(&sql, &params).await
    }

    /// Run a DELETE, returning the affected row count
    pub async fn delete<M>(&self, query: QueryBuilder<M>) -> OrmResult<u64> {
        expect_type(&query, QueryType::Delete)?;
        expect_table(&query)?;
        let (sql, params) = self.prepare(query, HookPoint::PreDelete).await;
        self.db.pool.execute(&sql, &params).await
    }

    /// Run a query and decode every row as `M`
    pub async fn get<M: Model>(&self, query: QueryBuilder<M>) -> OrmResult<Vec<M>> {
        self.fetch_all(query)
            .await?
            .into_iter()
            .map(M::from_row)
            .collect()
    }

    /// Fetch and decode the first matching row
    pub async fn first<M: Model>(&self, query: QueryBuilder<M>) -> OrmResult<Option<M>> {
        self.fetch_one(query).await?.map(M::from_row).transpose()
    }

    /// Run hand-written SQL. No hook sees it: the SQL must carry its own
    /// tenant filter.
    pub async fn raw_fetch(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Row>> {
        tracing::debug!(target: "tally::orm", sql, "Executing raw statement");
        self.db.pool.fetch_all(sql, params).await
    }

    async fn prepare<M>(
        &self,
        mut query: QueryBuilder<M>,
        point: HookPoint,
    ) -> (String, Vec<DatabaseValue>) {
        {
            let mut stmt = query.statement(point, self.context.as_deref());
            self.db.hooks.run(&mut stmt).await;
        }
        let (sql, params) = query.to_sql_with_params();
        tracing::debug!(
            target: "tally::orm",
            point = %point,
            sql = %sql,
            params = params.len(),
            "Executing statement"
        );
        (sql, params)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

fn expect_type<M>(query: &QueryBuilder<M>, expected: QueryType) -> OrmResult<()> {
    if query.query_type() == expected {
        Ok(())
    } else {
        Err(OrmError::Query(format!(
            "Expected a {} statement, got {}",
            expected,
            query.query_type()
        )))
    }
}

fn expect_table<M>(query: &QueryBuilder<M>) -> OrmResult<()> {
    match query.table() {
        Some(table) if !table.is_empty() => Ok(()),
        _ => Err(OrmError::Query(format!(
            "{} statement has no target table",
            query.query_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryPool;
    use crate::schema::StaticSchema;
    use crate::query::Clause;
    use crate::hooks::Statement;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Invoice {
        id: i64,
        status: String,
    }

    impl Model for Invoice {
        fn table_name() -> &'static str {
            "invoices"
        }

        fn columns() -> &'static [&'static str] {
            &["id", "business_id", "status"]
        }
    }

    struct Marker;

    #[async_trait]
    impl StatementHook for Marker {
        fn name(&self) -> &str {
            "marker"
        }

        async fn before(&self, stmt: &mut Statement<'_>) {
            stmt.clauses.push(Clause::eq("marked", stmt.point.to_string()));
        }
    }

    fn database(pool: Arc<MemoryPool>) -> Database {
        Database::new(pool, Arc::new(StaticSchema::new().with_model::<Invoice>()))
    }

    #[tokio::test]
    async fn test_guarded_handle_scopes_reads() {
        let pool = Arc::new(MemoryPool::new());
        let schema = Arc::new(StaticSchema::new().with_model::<Invoice>());
        let db = Arc::new(Database::guarded(pool.clone(), schema, &TenantGuardConfig::default()).unwrap());
        for point in HookPoint::ALL {
            assert_eq!(db.hooks().hook_count(point), 1);
        }

        let session = db.session(Arc::new(TenantContext::for_tenant("biz-5")));
        session.get(Invoice::query()).await.unwrap();
        assert_eq!(
            pool.statements()[0].sql,
            "SELECT * FROM invoices WHERE business_id = $1"
        );
    }

    #[tokio::test]
    async fn test_guarded_rejects_invalid_guard_config() {
        let config = TenantGuardConfig::default().with_column("");
        let result = Database::guarded(
            Arc::new(MemoryPool::new()),
            Arc::new(StaticSchema::new()),
            &config,
        );
        assert!(matches!(result, Err(OrmError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_connect_guarded_validates_before_connecting() {
        let config = DatabaseConfig::new("postgres://127.0.0.1:1/unused");
        let guard = TenantGuardConfig::default().with_column("business id");
        let result = Database::connect_guarded(&config, &guard).await;
        assert!(matches!(result, Err(OrmError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_each_operation_runs_its_hook_point() {
        let pool = Arc::new(MemoryPool::new());
        let mut db = database(pool.clone());
        for point in HookPoint::ALL {
            db.register_hook(point, Arc::new(Marker));
        }
        let session = Arc::new(db).detached();

        session.fetch_all(QueryBuilder::<()>::new().from("invoices")).await.unwrap();
        session.fetch_one(QueryBuilder::<()>::new().from("invoices")).await.unwrap();
        session
            .update(QueryBuilder::<()>::new().update("invoices").set("status", "void"))
            .await
            .unwrap();
        session
            .delete(QueryBuilder::<()>::new().delete_from("invoices"))
            .await
            .unwrap();

        let points: Vec<DatabaseValue> = pool
            .statements()
            .into_iter()
            .map(|s| s.params.last().cloned().unwrap())
            .collect();
        assert_eq!(
            points,
            vec![
                DatabaseValue::from("pre_query"),
                DatabaseValue::from("pre_row_fetch"),
                DatabaseValue::from("pre_update"),
                DatabaseValue::from("pre_delete"),
            ]
        );
        assert!(pool.statements()[1].sql.ends_with("LIMIT 1"));
    }

    #[tokio::test]
    async fn test_raw_fetch_skips_hooks() {
        let pool = Arc::new(MemoryPool::new());
        let mut db = database(pool.clone());
        db.register_hook(HookPoint::PreQuery, Arc::new(Marker));
        let session = Arc::new(db).detached();

        session
            .raw_fetch("SELECT * FROM invoices WHERE status = $1", &[DatabaseValue::from("open")])
            .await
            .unwrap();

        let statements = pool.statements();
        assert_eq!(statements[0].sql, "SELECT * FROM invoices WHERE status = $1");
        assert_eq!(statements[0].params.len(), 1);
    }

    #[tokio::test]
    async fn test_typed_fetch_decodes_rows() {
        let pool = Arc::new(MemoryPool::new().with_rows(
            "invoices",
            vec![
                json!({"id": 1, "status": "open", "business_id": "biz-1"}),
                json!({"id": 2, "status": "paid", "business_id": "biz-1"}),
            ],
        ));
        let session = Arc::new(database(pool)).session(Arc::new(TenantContext::system()));

        let invoices = session.get(Invoice::query()).await.unwrap();
        assert_eq!(invoices.len(), 2);

        let first = session.first(Invoice::query()).await.unwrap();
        assert_eq!(first, Some(Invoice { id: 1, status: "open".to_string() }));
    }

    #[tokio::test]
    async fn test_wrong_statement_type_is_rejected() {
        let pool = Arc::new(MemoryPool::new());
        let session = Arc::new(database(pool.clone())).detached();

        let err = session
            .update(QueryBuilder::<()>::new().from("invoices"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::Query(_)));

        let err = session
            .fetch_all(QueryBuilder::<()>::new().delete_from("invoices"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::Query(_)));
        assert_eq!(pool.statement_count(), 0);
    }

    #[tokio::test]
    async fn test_pool_failure_propagates() {
        let pool = Arc::new(MemoryPool::new());
        pool.set_failure(Some("connection reset"));
        let session = Arc::new(database(pool)).detached();

        let err = session
            .fetch_all(QueryBuilder::<()>::new().from("invoices"))
            .await
            .unwrap_err();
        assert_eq!(err, OrmError::Database("connection reset".to_string()));
    }
}
