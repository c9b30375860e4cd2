//! Batch functions backed by the ORM
//!
//! Both issue a single `IN` query through a [`Session`](tally_orm::Session)
//! built from the batch's tenant context, so the tenant guard scopes them
//! like any other read.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tally_orm::{Database, DatabaseValue, Model};

use crate::error::LoadResult;
use crate::loader::BatchFn;
use crate::mapper::{map_one_to_many, map_one_to_one, Keyed, Owned};
use crate::registry::BatchContext;

/// Loads `M` by primary key, one record per key
///
/// Keys without a row resolve to [`Keyed::for_missing_key`].
pub struct ById<M, K = i64> {
    db: Arc<Database>,
    _marker: PhantomData<fn() -> (M, K)>,
}

impl<M, K> ById<M, K> {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            _marker: PhantomData,
        }
    }
}

impl<M, K> fmt::Debug for ById<M, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ById")
            .field("model", &std::any::type_name::<M>())
            .finish()
    }
}

#[async_trait]
impl<M, K> BatchFn for ById<M, K>
where
    M: Model + Keyed<K> + Clone,
    K: Eq + Hash + Clone + fmt::Debug + Into<DatabaseValue> + Send + Sync + 'static,
{
    type Key = K;
    type Value = M;

    async fn load(&self, ctx: &BatchContext, keys: &[K]) -> LoadResult<Vec<LoadResult<M>>> {
        let session = self.db.session(Arc::clone(&ctx.tenant));
        let query = M::query().where_in(M::primary_key_name(), keys.to_vec());
        let rows = session.get(query).await?;
        Ok(map_one_to_one(rows, keys).into_iter().map(Ok).collect())
    }
}

/// Loads every `M` owned by each key through the foreign key `column`
///
/// Owners without rows resolve to an empty list.
pub struct ByOwner<M, K = i64> {
    db: Arc<Database>,
    column: String,
    _marker: PhantomData<fn() -> (M, K)>,
}

impl<M, K> ByOwner<M, K> {
    pub fn new(db: Arc<Database>, column: impl Into<String>) -> Self {
        Self {
            db,
            column: column.into(),
            _marker: PhantomData,
        }
    }
}

impl<M, K> fmt::Debug for ByOwner<M, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByOwner")
            .field("model", &std::any::type_name::<M>())
            .field("column", &self.column)
            .finish()
    }
}

#[async_trait]
impl<M, K> BatchFn for ByOwner<M, K>
where
    M: Model + Owned<K> + Clone,
    K: Eq + Hash + Clone + fmt::Debug + Into<DatabaseValue> + Send + Sync + 'static,
{
    type Key = K;
    type Value = Vec<M>;

    async fn load(&self, ctx: &BatchContext, keys: &[K]) -> LoadResult<Vec<LoadResult<Vec<M>>>> {
        let session = self.db.session(Arc::clone(&ctx.tenant));
        let query = M::query().where_in(&self.column, keys.to_vec());
        let rows = session.get(query).await?;
        Ok(map_one_to_many(rows, keys).into_iter().map(Ok).collect())
    }
}
