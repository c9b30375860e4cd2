//! Database Backend Abstractions
//!
//! The statement layer talks to storage only through [`DatabasePool`].
//! PostgreSQL is the production backend; [`MemoryPool`] records statements
//! and serves canned rows for tests and local tooling.

pub mod core;
pub mod memory;
pub mod postgres;

pub use self::core::*;
pub use memory::{ExecutedStatement, MemoryPool};
pub use postgres::PostgresPool;
