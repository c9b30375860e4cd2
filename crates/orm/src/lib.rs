//! # tally-orm: Statement Layer for tally
//!
//! Structured statement builder with a filter clause tree, a hook chain that
//! runs before every read, row fetch, update and delete, and the tenant
//! isolation guard that plugs into that chain.
//!
//! Every statement issued through a [`Session`] passes through the hooks
//! registered on its [`Database`]. Raw SQL issued with
//! [`Session::raw_fetch`] does not, and must carry its own tenant filter.

pub mod backends;
pub mod config;
pub mod database;
pub mod error;
pub mod hooks;
pub mod model;
pub mod query;
pub mod schema;
pub mod tenant;

pub use backends::{DatabasePool, DatabaseValue, MemoryPool, PostgresPool, Row};
pub use config::{DatabaseConfig, MissingTenantPolicy, TenantGuardConfig};
pub use database::{Database, Session};
pub use error::{OrmError, OrmResult};
pub use hooks::{HookPoint, HookRegistry, Statement, StatementHook};
pub use model::Model;
pub use query::{Clause, QueryBuilder, QueryOperator, QueryType, WhereCondition};
pub use schema::{PostgresSchema, SchemaProvider, StaticSchema, TableSchema};
pub use tenant::{has_tenant_predicate, GuardOutcome, TenantGuard};

pub use tally_core::TenantContext;
