//! Tower middleware attaching a fresh [`LoaderRegistry`] to every request
//!
//! The registry is built from the request's [`TenantContext`] extension
//! (a system context when absent), stored in the request extensions as
//! `Arc<LoaderRegistry>`, and made reachable through
//! [`loaders`](crate::loaders) while the inner service runs. Its token is
//! cancelled once the response future completes or is dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::Request;
use tally_core::TenantContext;
use tower::{Layer, Service};

use crate::registry::LoaderRegistry;

/// Builds the registry for one request
pub trait RegistryFactory: Send + Sync + 'static {
    fn build(&self, tenant: Arc<TenantContext>) -> LoaderRegistry;
}

impl<F> RegistryFactory for F
where
    F: Fn(Arc<TenantContext>) -> LoaderRegistry + Send + Sync + 'static,
{
    fn build(&self, tenant: Arc<TenantContext>) -> LoaderRegistry {
        self(tenant)
    }
}

/// Tower Layer creating one loader registry per request
#[derive(Clone)]
pub struct LoaderLayer {
    factory: Arc<dyn RegistryFactory>,
}

impl LoaderLayer {
    pub fn new<R: RegistryFactory>(factory: R) -> Self {
        Self {
            factory: Arc::new(factory),
        }
    }
}

impl<S> Layer<S> for LoaderLayer {
    type Service = LoaderService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoaderService {
            inner,
            factory: Arc::clone(&self.factory),
        }
    }
}

/// Service produced by [`LoaderLayer`]
#[derive(Clone)]
pub struct LoaderService<S> {
    inner: S,
    factory: Arc<dyn RegistryFactory>,
}

fn request_tenant<B>(req: &Request<B>) -> Arc<TenantContext> {
    let extensions = req.extensions();
    if let Some(tenant) = extensions.get::<Arc<TenantContext>>() {
        return Arc::clone(tenant);
    }
    match extensions.get::<TenantContext>() {
        Some(tenant) => Arc::new(tenant.clone()),
        None => Arc::new(TenantContext::system()),
    }
}

impl<S, B> Service<Request<B>> for LoaderService<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let registry = Arc::new(self.factory.build(request_tenant(&req)));
        req.extensions_mut().insert(Arc::clone(&registry));

        // The clone may not be ready; keep the instance poll_ready was called on
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let _cancel_on_exit = registry.cancellation_token().drop_guard();
            LoaderRegistry::scope(registry, inner.call(req)).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::try_loaders;
    use std::convert::Infallible;
    use tokio_util::sync::CancellationToken;
    use tower::{service_fn, ServiceExt};

    fn factory(tenant: Arc<TenantContext>) -> LoaderRegistry {
        LoaderRegistry::builder(tenant).build()
    }

    #[tokio::test]
    async fn test_registry_reaches_handler() {
        let service = LoaderLayer::new(factory).layer(service_fn(|req: Request<()>| async move {
            let from_scope = try_loaders().map(|r| r.tenant().tenant().map(str::to_string));
            let from_ext = LoaderRegistry::from_extensions(req.extensions());
            assert!(Arc::ptr_eq(&from_ext, &crate::loaders()));
            Ok::<_, Infallible>(from_scope)
        }));

        let mut req = Request::new(());
        req.extensions_mut()
            .insert(Arc::new(TenantContext::for_tenant("biz-3")));
        let tenant = service.oneshot(req).await.unwrap();
        assert_eq!(tenant, Some(Some("biz-3".to_string())));
    }

    #[tokio::test]
    async fn test_missing_tenant_uses_system_context() {
        let service = LoaderLayer::new(factory).layer(service_fn(|_req: Request<()>| async move {
            Ok::<_, Infallible>(crate::loaders().tenant().tenant().is_none())
        }));
        assert!(service.oneshot(Request::new(())).await.unwrap());
    }

    #[tokio::test]
    async fn test_token_cancelled_after_response() {
        let service = LoaderLayer::new(factory).layer(service_fn(|_req: Request<()>| async move {
            let token: CancellationToken = crate::loaders().cancellation_token();
            assert!(!token.is_cancelled());
            Ok::<_, Infallible>(token)
        }));

        let token = service.oneshot(Request::new(())).await.unwrap();
        assert!(token.is_cancelled());
    }
}
