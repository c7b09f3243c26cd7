use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::events::ObserverSubject;
use crate::services::{ResolvedServices, ServiceError, ServiceRegistry};
use crate::tenant::TenantService;

/// Module-scoped view of the application, handed to `Module::init`.
#[derive(Clone)]
pub struct ModuleCtx {
    module_name: Arc<str>,
    services: Arc<ServiceRegistry>,
    events: Arc<ObserverSubject>,
    tenants: Option<Arc<TenantService>>,
    resolved: Arc<ResolvedServices>,
    cancellation_token: CancellationToken,
}

/// Builds per-module contexts from the application-owned components.
pub(crate) struct ModuleContextBuilder {
    services: Arc<ServiceRegistry>,
    events: Arc<ObserverSubject>,
    tenants: Option<Arc<TenantService>>,
    root_token: CancellationToken,
}

impl ModuleContextBuilder {
    pub(crate) fn new(
        services: Arc<ServiceRegistry>,
        events: Arc<ObserverSubject>,
        tenants: Option<Arc<TenantService>>,
        root_token: CancellationToken,
    ) -> Self {
        Self {
            services,
            events,
            tenants,
            root_token,
        }
    }

    pub(crate) fn for_module(&self, module_name: &str, resolved: ResolvedServices) -> ModuleCtx {
        ModuleCtx {
            module_name: Arc::from(module_name),
            services: self.services.clone(),
            events: self.events.clone(),
            tenants: self.tenants.clone(),
            resolved: Arc::new(resolved),
            cancellation_token: self.root_token.child_token(),
        }
    }
}

impl ModuleCtx {
    #[inline]
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    #[inline]
    #[must_use]
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    #[inline]
    #[must_use]
    pub fn events(&self) -> &ObserverSubject {
        &self.events
    }

    /// The tenant service, when the application runs with tenants enabled.
    #[must_use]
    pub fn tenants(&self) -> Option<&Arc<TenantService>> {
        self.tenants.as_ref()
    }

    /// Services resolved from this module's declared dependencies, keyed by
    /// the local dependency name.
    #[inline]
    #[must_use]
    pub fn resolved(&self) -> &ResolvedServices {
        &self.resolved
    }

    /// Shortcut for `resolved().get::<T>(dep_name)`.
    ///
    /// # Errors
    /// See [`ResolvedServices::get`].
    pub fn service<T: ?Sized + Send + Sync + 'static>(
        &self,
        dep_name: &str,
    ) -> Result<Arc<T>, ServiceError> {
        self.resolved.get::<T>(dep_name)
    }

    #[inline]
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }
}
