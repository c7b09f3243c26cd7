use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigDiff, SectionScope};
use crate::events::ObserverSubject;
use crate::registry::CapabilitySet;
use crate::services::{ResolvedServices, ServiceDependency, ServicePublisher, ServiceProvision};
use crate::tenant::TenantId;

/// Core module contract: identity plus wiring.
///
/// `init` runs once, in resolved dependency order, with all required
/// services already verified against the module's declarations.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn init(&self, ctx: &crate::context::ModuleCtx) -> anyhow::Result<()>;
}

/// Contributes a configuration section during the configure phase.
///
/// Pure wiring; must be sync. Runs BEFORE dependency resolution, so the
/// module must not touch services here.
pub trait ConfigurableModule: Send + Sync {
    fn register_config(&self, sections: &SectionScope<'_>) -> anyhow::Result<()>;
}

/// Declares the services a module consumes and produces.
///
/// Declarations drive dependency resolution (implied edges) and pre-init
/// verification; actual instances are published in `publish_services`,
/// which runs right after the module's `init` succeeds.
pub trait ServiceAwareModule: Send + Sync {
    fn requires_services(&self) -> Vec<ServiceDependency> {
        Vec::new()
    }

    fn provides_services(&self) -> Vec<ServiceProvision> {
        Vec::new()
    }

    /// Publish the declared instances. Every name returned by
    /// `provides_services` must be registered here.
    fn publish_services(&self, services: &ServicePublisher<'_>) -> anyhow::Result<()> {
        let _ = services;
        Ok(())
    }
}

/// Long-running work started after all modules are initialized.
#[async_trait]
pub trait StartableModule: Send + Sync {
    async fn start(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Teardown hook, invoked in reverse init order with a bounded context.
#[async_trait]
pub trait StoppableModule: Send + Sync {
    async fn stop(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}

/// Replacement instance produced by a constructable module, together with
/// the capability set the replacement implements.
pub struct ConstructedModule {
    pub core: Arc<dyn Module>,
    pub caps: CapabilitySet,
}

/// Rebuilds the module from its resolved service dependencies.
///
/// Pure wiring; must be sync. The replacement must keep the same `name()`;
/// dropped capabilities are logged and tolerated.
pub trait ConstructableModule: Send + Sync {
    fn construct(&self, services: &ResolvedServices) -> anyhow::Result<ConstructedModule>;
}

/// Receives tenant lifecycle notifications, at most once per
/// (module, tenant) pair. Errors are logged by the tenant service and never
/// abort registration.
#[async_trait]
pub trait TenantAwareModule: Send + Sync {
    async fn on_tenant_registered(&self, tenant: &TenantId) -> anyhow::Result<()>;

    async fn on_tenant_removed(&self, tenant: &TenantId) -> anyhow::Result<()>;
}

/// Applies a configuration diff at runtime.
///
/// Modules without this capability are queued and pick the new values up
/// from their section handles on the next read.
#[async_trait]
pub trait ReloadableModule: Send + Sync {
    async fn on_config_reload(&self, diff: &ConfigDiff) -> anyhow::Result<()>;
}

/// Participates in the observer protocol; invoked before the module's own
/// `init` so the module never misses events it asked for.
pub trait ObservableModule: Send + Sync {
    fn register_observers(&self, subject: &ObserverSubject) -> anyhow::Result<()>;
}
