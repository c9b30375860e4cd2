//! Statement hooks
//!
//! Hooks run in registration order immediately before a statement is
//! rendered to SQL, and may rewrite its filter clauses. They cannot fail the
//! statement: anything that goes wrong inside a hook is the hook's to log.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tally_core::TenantContext;

use crate::query::Clause;

/// Points in a statement's life where hooks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Before a multi-row query
    PreQuery,
    /// Before a single-row fetch
    PreRowFetch,
    PreUpdate,
    PreDelete,
}

impl HookPoint {
    pub const ALL: [HookPoint; 4] = [
        HookPoint::PreQuery,
        HookPoint::PreRowFetch,
        HookPoint::PreUpdate,
        HookPoint::PreDelete,
    ];
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPoint::PreQuery => write!(f, "pre_query"),
            HookPoint::PreRowFetch => write!(f, "pre_row_fetch"),
            HookPoint::PreUpdate => write!(f, "pre_update"),
            HookPoint::PreDelete => write!(f, "pre_delete"),
        }
    }
}

/// The part of a pending statement a hook may see and change
pub struct Statement<'a> {
    pub point: HookPoint,
    pub table: Option<&'a str>,
    pub clauses: &'a mut Vec<Clause>,
    /// Execution context of the issuing session, if it has one
    pub context: Option<&'a TenantContext>,
}

impl fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("point", &self.point)
            .field("table", &self.table)
            .field("clauses", &self.clauses.len())
            .field("context", &self.context)
            .finish()
    }
}

#[async_trait]
pub trait StatementHook: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn before(&self, stmt: &mut Statement<'_>);
}

/// Hooks per hook point
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: HashMap<HookPoint, Vec<Arc<dyn StatementHook>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, point: HookPoint, hook: Arc<dyn StatementHook>) {
        tracing::debug!(
            target: "tally::orm",
            hook = hook.name(),
            point = %point,
            "Registered statement hook"
        );
        self.hooks.entry(point).or_default().push(hook);
    }

    pub fn hook_count(&self, point: HookPoint) -> usize {
        self.hooks.get(&point).map_or(0, Vec::len)
    }

    /// Run every hook registered at the statement's point
    pub async fn run(&self, stmt: &mut Statement<'_>) {
        let Some(hooks) = self.hooks.get(&stmt.point) else {
            return;
        };
        for hook in hooks {
            hook.before(stmt).await;
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<String, usize> = self
            .hooks
            .iter()
            .map(|(point, hooks)| (point.to_string(), hooks.len()))
            .collect();
        f.debug_struct("HookRegistry").field("hooks", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Tagging {
        tag: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl StatementHook for Tagging {
        fn name(&self) -> &str {
            self.tag
        }

        async fn before(&self, stmt: &mut Statement<'_>) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.tag, stmt.point));
            stmt.clauses.push(Clause::eq("tag", self.tag));
        }
    }

    #[tokio::test]
    async fn test_hooks_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register(
            HookPoint::PreQuery,
            Arc::new(Tagging { tag: "first", seen: seen.clone() }),
        );
        registry.register(
            HookPoint::PreQuery,
            Arc::new(Tagging { tag: "second", seen: seen.clone() }),
        );

        let mut clauses = Vec::new();
        let mut stmt = Statement {
            point: HookPoint::PreQuery,
            table: Some("invoices"),
            clauses: &mut clauses,
            context: None,
        };
        registry.run(&mut stmt).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:pre_query".to_string(), "second:pre_query".to_string()]
        );
        assert_eq!(clauses.len(), 2);
    }

    #[tokio::test]
    async fn test_hooks_only_run_at_their_point() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        registry.register(
            HookPoint::PreDelete,
            Arc::new(Tagging { tag: "delete", seen: seen.clone() }),
        );

        assert_eq!(registry.hook_count(HookPoint::PreDelete), 1);
        assert_eq!(registry.hook_count(HookPoint::PreUpdate), 0);

        let mut clauses = Vec::new();
        let mut stmt = Statement {
            point: HookPoint::PreUpdate,
            table: Some("invoices"),
            clauses: &mut clauses,
            context: None,
        };
        registry.run(&mut stmt).await;

        assert!(seen.lock().unwrap().is_empty());
        assert!(clauses.is_empty());
    }
}
