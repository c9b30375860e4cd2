//! # tally-loader: request-scoped batched data loading
//!
//! Resolvers call [`Loader::load`] for one key at a time; loads issued within
//! a short window are fetched together by one [`BatchFn`] call and cached
//! for the rest of the request. Each request gets its own
//! [`LoaderRegistry`], attached by [`LoaderLayer`] and looked up with
//! [`loaders`].
//!
//! ```ignore
//! let invoice = loaders().get::<ById<Invoice>>().load(42).await?;
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod loader;
pub mod mapper;
pub mod middleware;
pub mod registry;

pub use config::LoaderConfig;
pub use entity::{ById, ByOwner};
pub use error::{LoadError, LoadResult};
pub use loader::{BatchFn, Loader};
pub use mapper::{map_one_to_many, map_one_to_many_by, map_one_to_one, map_one_to_one_by, Keyed, Owned};
pub use middleware::{LoaderLayer, LoaderService, RegistryFactory};
pub use registry::{loaders, try_loaders, BatchContext, LoaderRegistry, RegistryBuilder};

pub use tokio_util::sync::CancellationToken;
