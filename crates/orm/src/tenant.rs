//! Tenant isolation guard
//!
//! A [`StatementHook`] registered at every hook point that adds
//! `business_id = <tenant>` to statements against tenant-owned tables. It
//! never fails a statement. When it cannot decide, it leaves the statement
//! as it was and logs a warning under the `tally::tenant` target.
//!
//! Detection of a predicate the caller already wrote is best effort: inside
//! raw SQL fragments it is a plain substring match on the column name.

use std::sync::Arc;

use async_trait::async_trait;
use tally_core::{AppConfigTrait, TenantContext};

use crate::config::{MissingTenantPolicy, TenantGuardConfig};
use crate::database::Database;
use crate::error::OrmResult;
use crate::hooks::{HookPoint, Statement, StatementHook};
use crate::query::Clause;
use crate::schema::SchemaProvider;

pub const DEFAULT_TENANT_COLUMN: &str = "business_id";

/// Predicate injected when tenant-less statements are denied
const DENY_ALL: &str = "1 = 0";

/// What the guard did to one statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// The statement carries no execution context
    NoContext,
    /// Admin or skip-scope flag set
    Bypassed,
    /// No tenant and the policy allows it; statement left unfiltered
    NoTenant,
    /// No tenant and the policy denies it; a match-nothing predicate was added
    DeniedNoTenant,
    /// The table has no tenant column
    Unscoped,
    /// A tenant predicate is already present
    AlreadyScoped,
    Injected,
    /// The guard could not decide; statement left unfiltered
    Degraded(String),
}

impl GuardOutcome {
    /// Whether the guard changed the statement
    pub fn modified(&self) -> bool {
        matches!(self, GuardOutcome::Injected | GuardOutcome::DeniedNoTenant)
    }
}

/// Statement hook scoping every read and write to the caller's tenant
pub struct TenantGuard {
    column: String,
    missing_policy: MissingTenantPolicy,
    schema: Arc<dyn SchemaProvider>,
}

impl TenantGuard {
    pub fn new(schema: Arc<dyn SchemaProvider>, config: &TenantGuardConfig) -> Self {
        Self {
            column: config.column.clone(),
            missing_policy: config.missing_policy,
            schema,
        }
    }

    /// Register one shared guard at every hook point of `db`
    pub fn install(db: &mut Database, config: &TenantGuardConfig) -> OrmResult<Arc<Self>> {
        config.validate()?;
        let guard = Arc::new(Self::new(db.schema(), config));
        for point in HookPoint::ALL {
            db.register_hook(point, guard.clone());
        }
        tracing::info!(
            target: "tally::tenant",
            column = %guard.column,
            missing_policy = %guard.missing_policy,
            "Tenant guard installed"
        );
        Ok(guard)
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn missing_policy(&self) -> MissingTenantPolicy {
        self.missing_policy
    }

    /// Apply the guard to a statement and report what happened
    pub async fn evaluate(&self, stmt: &mut Statement<'_>) -> GuardOutcome {
        let Some(context) = stmt.context else {
            return GuardOutcome::NoContext;
        };
        if context.bypasses_scope() {
            return GuardOutcome::Bypassed;
        }

        let tenant = self.resolve_tenant(context);
        if tenant.is_none() && self.missing_policy == MissingTenantPolicy::Allow {
            return GuardOutcome::NoTenant;
        }

        let Some(table) = stmt.table else {
            return GuardOutcome::Degraded("statement has no target table".to_string());
        };
        let schema = match self.schema.table_schema(table).await {
            Ok(schema) => schema,
            Err(err) => return GuardOutcome::Degraded(err.to_string()),
        };
        if !schema.has_column(&self.column) {
            return GuardOutcome::Unscoped;
        }

        if let Some(problem) = find_malformed(stmt.clauses.as_slice()) {
            return GuardOutcome::Degraded(problem);
        }

        let Some(tenant) = tenant else {
            if !stmt.clauses.iter().any(is_deny_all) {
                stmt.clauses.push(Clause::raw(DENY_ALL));
            }
            return GuardOutcome::DeniedNoTenant;
        };

        if has_tenant_predicate(stmt.clauses.as_slice(), &self.column) {
            return GuardOutcome::AlreadyScoped;
        }

        stmt.clauses.push(Clause::eq(&self.column, tenant));
        GuardOutcome::Injected
    }

    fn resolve_tenant(&self, context: &TenantContext) -> Option<String> {
        context.tenant().map(str::to_string)
    }
}

impl std::fmt::Debug for TenantGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantGuard")
            .field("column", &self.column)
            .field("missing_policy", &self.missing_policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl StatementHook for TenantGuard {
    fn name(&self) -> &str {
        "tenant_guard"
    }

    async fn before(&self, stmt: &mut Statement<'_>) {
        let point = stmt.point;
        let table = stmt.table.unwrap_or("<none>").to_string();
        let outcome = self.evaluate(stmt).await;

        match &outcome {
            GuardOutcome::Degraded(reason) => tracing::warn!(
                target: "tally::tenant",
                point = %point,
                table = %table,
                reason = %reason,
                "Tenant guard could not scope statement; left unfiltered"
            ),
            GuardOutcome::DeniedNoTenant => tracing::warn!(
                target: "tally::tenant",
                point = %point,
                table = %table,
                "Statement on tenant table issued without a tenant; denied"
            ),
            GuardOutcome::NoTenant => tracing::debug!(
                target: "tally::tenant",
                point = %point,
                table = %table,
                "No tenant in context; statement left unfiltered"
            ),
            other => tracing::trace!(
                target: "tally::tenant",
                point = %point,
                table = %table,
                outcome = ?other,
                "Tenant guard evaluated"
            ),
        }
    }
}

/// Whether any clause already filters on `column`
///
/// Walks AND/OR groups. A condition matches when its column, without table
/// qualifier or identifier quotes, equals `column` ignoring case. A raw
/// fragment matches when it mentions `column` anywhere.
pub fn has_tenant_predicate(clauses: &[Clause], column: &str) -> bool {
    let needle = column.to_lowercase();
    clauses.iter().any(|clause| clause_mentions(clause, column, &needle))
}

fn clause_mentions(clause: &Clause, column: &str, needle: &str) -> bool {
    match clause {
        Clause::Condition(condition) => column_matches(&condition.column, column),
        Clause::And(children) | Clause::Or(children) => children
            .iter()
            .any(|child| clause_mentions(child, column, needle)),
        Clause::Raw { sql, .. } => sql.to_lowercase().contains(needle),
    }
}

fn column_matches(candidate: &str, column: &str) -> bool {
    let unqualified = candidate.rsplit('.').next().unwrap_or(candidate);
    unqualified
        .trim()
        .trim_matches(|c| c == '"' || c == '`')
        .eq_ignore_ascii_case(column)
}

fn find_malformed(clauses: &[Clause]) -> Option<String> {
    clauses.iter().find_map(|clause| match clause {
        Clause::Condition(condition) if condition.column.trim().is_empty() => {
            Some("condition with an empty column".to_string())
        }
        Clause::Condition(_) => None,
        Clause::And(children) | Clause::Or(children) if children.is_empty() => {
            Some("empty clause group".to_string())
        }
        Clause::And(children) | Clause::Or(children) => find_malformed(children),
        Clause::Raw { .. } => None,
    })
}

fn is_deny_all(clause: &Clause) -> bool {
    matches!(clause, Clause::Raw { sql, .. } if sql == DENY_ALL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::DatabaseValue;
    use crate::query::{QueryBuilder, WhereCondition, QueryOperator};
    use crate::schema::{StaticSchema, TableSchema};

    fn schema() -> Arc<dyn SchemaProvider> {
        Arc::new(
            StaticSchema::new()
                .with_table(TableSchema::new("invoices", ["id", "business_id", "status"]))
                .with_table(TableSchema::new("currencies", ["code", "name"])),
        )
    }

    fn guard() -> TenantGuard {
        TenantGuard::new(schema(), &TenantGuardConfig::default())
    }

    fn denying_guard() -> TenantGuard {
        TenantGuard::new(
            schema(),
            &TenantGuardConfig::default().with_missing_policy(MissingTenantPolicy::Deny),
        )
    }

    async fn run(
        guard: &TenantGuard,
        query: &mut QueryBuilder,
        context: Option<&TenantContext>,
    ) -> GuardOutcome {
        let mut stmt = query.statement(HookPoint::PreQuery, context);
        guard.evaluate(&mut stmt).await
    }

    #[tokio::test]
    async fn test_injects_tenant_predicate_once() {
        let guard = guard();
        let ctx = TenantContext::for_tenant("biz-42");
        let mut query = QueryBuilder::<()>::new().from("invoices").where_eq("status", "open");

        assert_eq!(run(&guard, &mut query, Some(&ctx)).await, GuardOutcome::Injected);
        let (sql, params) = query.to_sql_with_params();
        assert_eq!(sql, "SELECT * FROM invoices WHERE status = $1 AND business_id = $2");
        assert_eq!(
            params,
            vec![DatabaseValue::from("open"), DatabaseValue::from("biz-42")]
        );

        assert_eq!(
            run(&guard, &mut query, Some(&ctx)).await,
            GuardOutcome::AlreadyScoped
        );
        assert_eq!(query.to_sql(), sql);
    }

    #[tokio::test]
    async fn test_existing_predicate_is_respected() {
        let guard = guard();
        let ctx = TenantContext::for_tenant("biz-42");

        let mut flat = QueryBuilder::<()>::new()
            .from("invoices")
            .where_eq("business_id", "biz-42");
        assert_eq!(run(&guard, &mut flat, Some(&ctx)).await, GuardOutcome::AlreadyScoped);

        let mut nested = QueryBuilder::<()>::new().from("invoices").where_any(|q| {
            q.where_eq("status", "void")
                .where_group(|g| g.where_eq("invoices.\"Business_Id\"", "biz-42"))
        });
        assert_eq!(
            run(&guard, &mut nested, Some(&ctx)).await,
            GuardOutcome::AlreadyScoped
        );
        assert_eq!(nested.clauses().len(), 1);

        let mut raw = QueryBuilder::<()>::new()
            .from("invoices")
            .where_raw("i.BUSINESS_ID = 'biz-42'");
        assert_eq!(run(&guard, &mut raw, Some(&ctx)).await, GuardOutcome::AlreadyScoped);
    }

    #[tokio::test]
    async fn test_bypass_flags_add_nothing() {
        let guard = guard();
        for ctx in [
            TenantContext::admin(),
            TenantContext {
                tenant_id: Some("biz-42".to_string()),
                admin_bypass: true,
                skip_scope: false,
            },
            TenantContext::for_tenant("biz-42").skip_tenant_scope(),
        ] {
            let mut query = QueryBuilder::<()>::new().from("invoices");
            assert_eq!(run(&guard, &mut query, Some(&ctx)).await, GuardOutcome::Bypassed);
            assert!(query.clauses().is_empty());
        }
    }

    #[tokio::test]
    async fn test_shared_table_is_unscoped() {
        let guard = guard();
        let ctx = TenantContext::for_tenant("biz-42");
        let mut query = QueryBuilder::<()>::new().from("currencies");
        assert_eq!(run(&guard, &mut query, Some(&ctx)).await, GuardOutcome::Unscoped);
        assert!(query.clauses().is_empty());
    }

    #[tokio::test]
    async fn test_missing_context_and_tenant() {
        let guard = guard();
        let mut query = QueryBuilder::<()>::new().from("invoices");
        assert_eq!(run(&guard, &mut query, None).await, GuardOutcome::NoContext);

        let empty = TenantContext {
            tenant_id: Some(String::new()),
            ..TenantContext::default()
        };
        assert_eq!(run(&guard, &mut query, Some(&empty)).await, GuardOutcome::NoTenant);
        assert!(query.clauses().is_empty());
    }

    #[tokio::test]
    async fn test_deny_policy_blocks_tenantless_statements() {
        let guard = denying_guard();
        let ctx = TenantContext::system();

        let mut query = QueryBuilder::<()>::new().from("invoices");
        assert_eq!(
            run(&guard, &mut query, Some(&ctx)).await,
            GuardOutcome::DeniedNoTenant
        );
        assert_eq!(run(&guard, &mut query, Some(&ctx)).await, GuardOutcome::DeniedNoTenant);
        assert_eq!(query.to_sql(), "SELECT * FROM invoices WHERE (1 = 0)");

        let mut shared = QueryBuilder::<()>::new().from("currencies");
        assert_eq!(run(&guard, &mut shared, Some(&ctx)).await, GuardOutcome::Unscoped);

        let admin = TenantContext::admin();
        let mut bypassed = QueryBuilder::<()>::new().from("invoices");
        assert_eq!(
            run(&guard, &mut bypassed, Some(&admin)).await,
            GuardOutcome::Bypassed
        );
    }

    #[tokio::test]
    async fn test_failures_degrade_to_no_op() {
        let guard = guard();
        let ctx = TenantContext::for_tenant("biz-42");

        let mut unknown = QueryBuilder::<()>::new().from("ledgers");
        assert!(matches!(
            run(&guard, &mut unknown, Some(&ctx)).await,
            GuardOutcome::Degraded(_)
        ));
        assert!(unknown.clauses().is_empty());

        let mut empty_group = QueryBuilder::<()>::new()
            .from("invoices")
            .where_any(|q| q);
        assert_eq!(
            run(&guard, &mut empty_group, Some(&ctx)).await,
            GuardOutcome::Degraded("empty clause group".to_string())
        );
        assert_eq!(empty_group.clauses().len(), 1);

        let mut blank_column = QueryBuilder::<()>::new().from("invoices").push_clause(
            Clause::Condition(WhereCondition::new("", QueryOperator::Equal, None)),
        );
        assert!(matches!(
            run(&guard, &mut blank_column, Some(&ctx)).await,
            GuardOutcome::Degraded(_)
        ));

        let mut no_table = QueryBuilder::<()>::new();
        assert!(matches!(
            run(&guard, &mut no_table, Some(&ctx)).await,
            GuardOutcome::Degraded(_)
        ));
    }

    #[tokio::test]
    async fn test_aliased_and_qualified_tables_are_scoped() {
        let guard = guard();
        let ctx = TenantContext::for_tenant("biz-42");

        let mut aliased = QueryBuilder::<()>::new().from("invoices i").where_eq("i.status", "open");
        assert_eq!(run(&guard, &mut aliased, Some(&ctx)).await, GuardOutcome::Injected);
        assert_eq!(
            aliased.to_sql(),
            "SELECT * FROM invoices i WHERE i.status = $1 AND business_id = $2"
        );

        let mut qualified = QueryBuilder::<()>::new().from("public.invoices");
        assert_eq!(run(&guard, &mut qualified, Some(&ctx)).await, GuardOutcome::Injected);
        assert_eq!(
            qualified.to_sql(),
            "SELECT * FROM public.invoices WHERE business_id = $1"
        );

        let mut scoped = QueryBuilder::<()>::new()
            .from("invoices AS i")
            .where_eq("i.business_id", "biz-42");
        assert_eq!(
            run(&guard, &mut scoped, Some(&ctx)).await,
            GuardOutcome::AlreadyScoped
        );
    }

    #[tokio::test]
    async fn test_custom_tenant_column() {
        let schema: Arc<dyn SchemaProvider> = Arc::new(
            StaticSchema::new().with_table(TableSchema::new("orders", ["id", "org_id"])),
        );
        let guard = TenantGuard::new(schema, &TenantGuardConfig::default().with_column("org_id"));
        let ctx = TenantContext::for_tenant("org-7");

        let mut query = QueryBuilder::<()>::new().delete_from("orders").where_eq("id", 3);
        let mut stmt = query.statement(HookPoint::PreDelete, Some(&ctx));
        assert_eq!(guard.evaluate(&mut stmt).await, GuardOutcome::Injected);
        assert_eq!(query.to_sql(), "DELETE FROM orders WHERE id = $1 AND org_id = $2");
    }

    #[test]
    fn test_has_tenant_predicate() {
        let clauses = vec![
            Clause::eq("status", "open"),
            Clause::Or(vec![
                Clause::eq("kind", "sale"),
                Clause::And(vec![Clause::eq("t.business_id", "biz-1")]),
            ]),
        ];
        assert!(has_tenant_predicate(&clauses, "business_id"));
        assert!(!has_tenant_predicate(&clauses[..1], "business_id"));
        assert!(!has_tenant_predicate(&[Clause::eq("business_id_old", 1)], "business_id"));
    }
}
