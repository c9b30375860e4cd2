//! Per-request loader registry
//!
//! One [`LoaderRegistry`] is built when a request starts and holds one
//! [`Loader`] per batch function type. Downstream code finds it through the
//! request's task-local scope ([`loaders`]) or its `http::Extensions`
//! ([`LoaderRegistry::from_extensions`]). A missing registry is a wiring
//! defect and panics.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tally_core::TenantContext;
use tokio_util::sync::CancellationToken;

use crate::config::LoaderConfig;
use crate::loader::{BatchFn, Loader};

tokio::task_local! {
    static LOADERS: Arc<LoaderRegistry>;
}

/// What every batch function call of one request shares
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub tenant: Arc<TenantContext>,
    /// Cancelled when the owning request ends
    pub cancel: CancellationToken,
    pub config: LoaderConfig,
}

impl BatchContext {
    pub fn new(tenant: Arc<TenantContext>, config: LoaderConfig) -> Self {
        Self {
            tenant,
            cancel: CancellationToken::new(),
            config,
        }
    }

    /// Tie this context to an outer token; cancelling `parent` cancels it too
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }
}

type Factory = Box<dyn FnOnce(&BatchContext) -> (TypeId, Box<dyn Any + Send + Sync>) + Send>;

/// Builds a [`LoaderRegistry`]
pub struct RegistryBuilder {
    tenant: Arc<TenantContext>,
    config: LoaderConfig,
    parent: Option<CancellationToken>,
    factories: Vec<Factory>,
}

impl RegistryBuilder {
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Cancel the registry's loads whenever `token` is cancelled
    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.parent = Some(token);
        self
    }

    /// Register a loader for `batch_fn`, replacing any earlier one of the same type
    pub fn with<F: BatchFn>(mut self, batch_fn: F) -> Self {
        self.factories.push(Box::new(move |ctx: &BatchContext| {
            let loader: Box<dyn Any + Send + Sync> = Box::new(Loader::new(batch_fn, ctx.clone()));
            (TypeId::of::<F>(), loader)
        }));
        self
    }

    pub fn build(self) -> LoaderRegistry {
        let mut context = BatchContext::new(self.tenant, self.config);
        if let Some(parent) = &self.parent {
            context = context.with_parent(parent);
        }

        let loaders: HashMap<TypeId, Box<dyn Any + Send + Sync>> = self
            .factories
            .into_iter()
            .map(|factory| factory(&context))
            .collect();

        tracing::debug!(
            target: "tally::loader",
            loaders = loaders.len(),
            tenant = context.tenant.tenant().unwrap_or("-"),
            "Loader registry created"
        );

        LoaderRegistry { context, loaders }
    }
}

/// One loader per batch function type, scoped to a single request
pub struct LoaderRegistry {
    context: BatchContext,
    loaders: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl LoaderRegistry {
    pub fn builder(tenant: Arc<TenantContext>) -> RegistryBuilder {
        RegistryBuilder {
            tenant,
            config: LoaderConfig::default(),
            parent: None,
            factories: Vec::new(),
        }
    }

    /// The loader for `F`
    ///
    /// # Panics
    ///
    /// If no loader for `F` was registered.
    pub fn get<F: BatchFn>(&self) -> &Loader<F> {
        match self.try_get::<F>() {
            Some(loader) => loader,
            None => panic!(
                "no loader registered for {}; register it on the request's LoaderRegistry",
                type_name::<F>()
            ),
        }
    }

    pub fn try_get<F: BatchFn>(&self) -> Option<&Loader<F>> {
        self.loaders
            .get(&TypeId::of::<F>())
            .and_then(|loader| loader.downcast_ref::<Loader<F>>())
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    pub fn context(&self) -> &BatchContext {
        &self.context
    }

    pub fn tenant(&self) -> &Arc<TenantContext> {
        &self.context.tenant
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.context.cancel.clone()
    }

    /// Reject every pending and future load of this registry
    pub fn cancel(&self) {
        self.context.cancel.cancel();
    }

    /// Run `fut` with `registry` reachable through [`loaders`]
    pub async fn scope<Fut: Future>(registry: Arc<LoaderRegistry>, fut: Fut) -> Fut::Output {
        LOADERS.scope(registry, fut).await
    }

    /// The registry stored in request extensions
    ///
    /// # Panics
    ///
    /// If the extensions hold no registry.
    pub fn from_extensions(extensions: &http::Extensions) -> Arc<LoaderRegistry> {
        match extensions.get::<Arc<LoaderRegistry>>() {
            Some(registry) => Arc::clone(registry),
            None => panic!("no LoaderRegistry in request extensions; is LoaderLayer installed?"),
        }
    }
}

impl Drop for LoaderRegistry {
    fn drop(&mut self) {
        self.context.cancel.cancel();
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderRegistry")
            .field("context", &self.context)
            .field("loaders", &self.loaders.len())
            .finish()
    }
}

/// The registry of the current request
///
/// # Panics
///
/// Outside [`LoaderRegistry::scope`].
pub fn loaders() -> Arc<LoaderRegistry> {
    match try_loaders() {
        Some(registry) => registry,
        None => panic!("loaders() called outside a request scope; is LoaderLayer installed?"),
    }
}

pub fn try_loaders() -> Option<Arc<LoaderRegistry>> {
    LOADERS.try_with(Arc::clone).ok()
}
