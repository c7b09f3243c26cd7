//! # modular — a modular application runtime
//!
//! Composes an application out of independently authored modules, wires
//! them together through a typed service registry with interface-based
//! dependency injection, feeds them validated multi-source configuration,
//! and drives them through a deterministic lifecycle
//! (register → configure → init → start → stop).
//!
//! ## Building blocks
//!
//! - [`contracts`]: the `Module` trait and the optional capability traits
//!   (configurable, service-aware, startable/stoppable, constructable,
//!   tenant-aware, reloadable, observable).
//! - [`services`]: the service registry — name lookup, interface
//!   satisfaction lookup, constructor-style injection.
//! - [`registry`]: dependency resolution — explicit and service-implied
//!   edges, cycle detection, deterministic topological order.
//! - [`config`]: feeders (env, files, `.env`, programmatic), the one-pass
//!   loader with defaults/required/validation, field provenance, diff and
//!   reload.
//! - [`events`]: CloudEvents-style envelopes and observer fan-out.
//! - [`tenant`]: per-tenant configuration overlays and the access guard.
//! - [`runtime`]: the application orchestrator and full-cycle runner.
//!
//! ## Example
//!
//! ```rust,ignore
//! use modular::{Application, EnvFeeder, RunOptions, ShutdownOptions};
//! use std::sync::Arc;
//!
//! let app = Application::builder("demo")
//!     .with_feeder(Arc::new(EnvFeeder::new()))
//!     .register_module(Arc::new(DatabaseModule::default()))
//!     .register_module_with_deps(Arc::new(ApiModule::default()), ["database"])
//!     .build();
//!
//! modular::runtime::run(app, RunOptions {
//!     shutdown: ShutdownOptions::Token(token),
//! }).await?;
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;

pub mod config;
pub mod context;
pub mod contracts;
pub mod events;
pub mod registry;
pub mod runtime;
pub mod secrets;
pub mod services;
pub mod tenant;

// Re-export the main types at the crate root.
pub use config::{
    ConfigDiff, ConfigError, ConfigLoader, ConfigSchema, DiffOptions, DotEnvFeeder, EnvFeeder,
    Feeder, FieldProvenance, FieldSpec, FileFeeder, InstanceSpec, MAIN_CONFIG_SECTION, MapFeeder,
    ReloadTrigger, SectionHandle, SectionRegistry, SectionSchema, SectionScope, ValueProvider,
};
pub use context::ModuleCtx;
pub use contracts::{
    ConfigurableModule, ConstructableModule, ConstructedModule, Module, ObservableModule,
    ReloadableModule, ServiceAwareModule, StartableModule, StoppableModule, TenantAwareModule,
};
pub use events::{CloudEvent, Observer, ObserverSubject};
pub use registry::{Capability, CapabilitySet, ModuleRegistry, RegistryBuilder, RegistryError};
pub use runtime::{AppBuilder, AppError, AppSettings, Application, RunOptions, ShutdownOptions, run};
pub use services::{
    ResolvedServices, ServiceDependency, ServiceError, ServiceKey, ServiceProvision,
    ServicePublisher, ServiceRegistry, ServiceSlot,
};
pub use tenant::{
    GuardConfig, GuardMode, TenantGuard, TenantId, TenantService, TenantViolation,
};
