//! Application runtime: owns all shared components and drives modules
//! through the full lifecycle.
//!
//! Phase order: configure → resolve → load config → init → tenant
//! configure → start → wait → stop. Init walks the resolved order; for
//! each module the declared services are gathered and verified, the
//! module is optionally reconstructed from them, `init` runs, and the
//! module's declared services are published. Stop walks the exact reverse
//! of the init order under a bounded shutdown deadline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::reload::affected_section_keys;
use crate::config::{
    ConfigError, ConfigLoader, ConfigSchema, DiffOptions, ConfigDiff, FieldSpec, Feeder,
    MAIN_CONFIG_SECTION, ProvenanceLog, ReloadError, ReloadReport, ReloadTrigger, SectionHandle,
    SectionRegistry, SectionSchema, SectionScope,
};
use crate::context::ModuleContextBuilder;
use crate::events::{ObserverSubject, types as event_types};
use crate::registry::{
    Capability, CapabilitySet, ConstructableCap, ModuleRegistry, ObservableCap, RegistryBuilder,
    RegistryError, ReloadableCap, ServiceAwareCap, StartableCap, StoppableCap, TenantAwareCap,
};
use crate::services::{ResolvedServices, ServiceError, ServicePublisher, ServiceRegistry};
use crate::tenant::{GuardConfig, TenantError, TenantGuard, TenantService, loader as tenant_loader};

/// Root application configuration, registered under the reserved
/// [`MAIN_CONFIG_SECTION`] key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppSettings {
    pub app_name: String,
    pub environment: String,
    /// Bound on the stop phase; modules still running at the deadline see
    /// their cancellation token cancelled.
    #[serde(with = "modular_utils::humantime_serde")]
    pub stop_timeout: Duration,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            environment: "development".to_owned(),
            stop_timeout: Duration::from_secs(30),
        }
    }
}

impl ConfigSchema for AppSettings {
    fn schema() -> SectionSchema {
        SectionSchema::new()
            .field(FieldSpec::new("app_name").env("APP_NAME").describe("application name"))
            .field(
                FieldSpec::new("environment")
                    .env("APP_ENV")
                    .default_value(json!("development")),
            )
            .field(
                FieldSpec::new("stop_timeout")
                    .env("APP_STOP_TIMEOUT")
                    .default_value(json!("30s"))
                    .describe("bound on the shutdown phase"),
            )
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error(transparent)]
    Reload(#[from] ReloadError),

    #[error("operation requires application state '{expected}', current state is '{actual}'")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AppState {
    Built,
    Initialized,
    Started,
    Stopped,
}

impl AppState {
    fn as_str(self) -> &'static str {
        match self {
            AppState::Built => "built",
            AppState::Initialized => "initialized",
            AppState::Started => "started",
            AppState::Stopped => "stopped",
        }
    }
}

/// Builder for [`Application`].
pub struct AppBuilder {
    name: String,
    registry: RegistryBuilder,
    feeders: Vec<Arc<dyn Feeder>>,
    tenant_config_dir: Option<PathBuf>,
    tenants_enabled: bool,
    guard: Option<GuardConfig>,
}

impl AppBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: RegistryBuilder::default(),
            feeders: Vec::new(),
            tenant_config_dir: None,
            tenants_enabled: false,
            guard: None,
        }
    }

    /// Register a module with no explicit dependencies.
    #[must_use]
    pub fn register_module(mut self, module: Arc<dyn crate::contracts::Module>) -> Self {
        self.registry.register(module);
        self
    }

    /// Register a module that explicitly depends on the named modules.
    #[must_use]
    pub fn register_module_with_deps(
        mut self,
        module: Arc<dyn crate::contracts::Module>,
        deps: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.registry
            .register_with_deps(module, deps.into_iter().map(Into::into).collect());
        self
    }

    /// Attach a capability to a registered module.
    #[must_use]
    pub fn add_capability(mut self, module: &str, cap: Capability) -> Self {
        self.registry.add_capability(module, cap);
        self
    }

    /// Append a feeder to the application-wide chain; later feeders
    /// override earlier ones.
    #[must_use]
    pub fn with_feeder(mut self, feeder: Arc<dyn Feeder>) -> Self {
        self.feeders.push(feeder);
        self
    }

    /// Enable the tenant service.
    #[must_use]
    pub fn with_tenants(mut self) -> Self {
        self.tenants_enabled = true;
        self
    }

    /// Enable the tenant service and load tenant overlays from `dir`
    /// during the tenant-configure phase.
    #[must_use]
    pub fn with_tenant_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tenants_enabled = true;
        self.tenant_config_dir = Some(dir.into());
        self
    }

    /// Install a tenant access guard.
    #[must_use]
    pub fn with_tenant_guard(mut self, config: GuardConfig) -> Self {
        self.guard = Some(config);
        self
    }

    /// Assemble the application. Resolution happens later, inside
    /// [`Application::init`].
    #[must_use]
    pub fn build(self) -> Application {
        let subject = Arc::new(ObserverSubject::new(self.name.clone()));
        let sections = Arc::new(SectionRegistry::new());
        let tenants = self
            .tenants_enabled
            .then(|| Arc::new(TenantService::with_events(subject.clone())));
        let guard = self.guard.map(|cfg| Arc::new(TenantGuard::new(cfg)));

        Application {
            name: Arc::from(self.name.as_str()),
            builder: Some(self.registry),
            registry: None,
            services: Arc::new(ServiceRegistry::new()),
            sections,
            subject,
            provenance: Arc::new(ProvenanceLog::new()),
            loader: ConfigLoader::new(self.feeders),
            tenants,
            guard,
            tenant_config_dir: self.tenant_config_dir,
            cancel: CancellationToken::new(),
            main_section: None,
            init_order: Vec::new(),
            started: Vec::new(),
            pending_reload: Vec::new(),
            state: AppState::Built,
        }
    }
}

/// A composed application: modules, services, configuration, events and
/// tenants, driven through a deterministic lifecycle.
pub struct Application {
    name: Arc<str>,
    builder: Option<RegistryBuilder>,
    registry: Option<ModuleRegistry>,
    services: Arc<ServiceRegistry>,
    sections: Arc<SectionRegistry>,
    subject: Arc<ObserverSubject>,
    provenance: Arc<ProvenanceLog>,
    loader: ConfigLoader,
    tenants: Option<Arc<TenantService>>,
    guard: Option<Arc<TenantGuard>>,
    tenant_config_dir: Option<PathBuf>,
    cancel: CancellationToken,
    main_section: Option<Arc<SectionHandle<AppSettings>>>,
    /// Registry indices that completed init, in init order.
    init_order: Vec<usize>,
    /// Registry indices that completed start, in start order.
    started: Vec<usize>,
    /// Modules with changed config but no reload hook.
    pending_reload: Vec<String>,
    state: AppState,
}

impl Application {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> AppBuilder {
        AppBuilder::new(name)
    }

    // ---- accessors ----

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    #[must_use]
    pub fn sections(&self) -> &Arc<SectionRegistry> {
        &self.sections
    }

    #[must_use]
    pub fn events(&self) -> &Arc<ObserverSubject> {
        &self.subject
    }

    #[must_use]
    pub fn provenance(&self) -> &Arc<ProvenanceLog> {
        &self.provenance
    }

    #[must_use]
    pub fn tenants(&self) -> Option<&Arc<TenantService>> {
        self.tenants.as_ref()
    }

    #[must_use]
    pub fn tenant_guard(&self) -> Option<&Arc<TenantGuard>> {
        self.guard.as_ref()
    }

    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Main application settings; available after `init`.
    #[must_use]
    pub fn main_config(&self) -> Option<Arc<AppSettings>> {
        self.main_section.as_ref().map(|h| h.get())
    }

    /// Resolved module order; available after `init`.
    #[must_use]
    pub fn module_order(&self) -> Vec<String> {
        self.registry
            .as_ref()
            .map(|r| r.order().iter().map(|s| (*s).to_owned()).collect())
            .unwrap_or_default()
    }

    /// Modules whose configuration changed in a reload but that have no
    /// reload hook.
    #[must_use]
    pub fn pending_reload_modules(&self) -> &[String] {
        &self.pending_reload
    }

    fn expect_state(&self, expected: AppState) -> Result<(), AppError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AppError::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            })
        }
    }

    // ---- lifecycle ----

    /// Configure → resolve → load config → init modules → tenant
    /// configure.
    ///
    /// # Errors
    /// Fails fast on resolution errors; init errors abort the phase and
    /// name the failing module. Already-initialized modules receive their
    /// stop on an explicit [`stop`](Self::stop).
    pub async fn init(&mut self) -> Result<(), AppError> {
        self.expect_state(AppState::Built)?;

        let Some(builder) = self.builder.take() else {
            return Err(AppError::InvalidState {
                expected: "built",
                actual: "consumed",
            });
        };

        // CONFIGURE: modules contribute their sections. No cross-module
        // observation happens here, so builder registration order is fine.
        tracing::info!("Phase: configure");
        let main = self.sections.register::<AppSettings>(
            MAIN_CONFIG_SECTION,
            AppSettings {
                app_name: self.name.to_string(),
                ..AppSettings::default()
            },
            None,
        )?;
        self.main_section = Some(main);
        for (name, configurable) in builder.configurables() {
            let scope = SectionScope::new(&self.sections, &name);
            configurable
                .register_config(&scope)
                .map_err(|source| RegistryError::Configure {
                    module: name.clone(),
                    source,
                })?;
        }

        // RESOLVE
        tracing::info!("Phase: resolve");
        let registry = builder.build()?;
        for entry in registry.modules() {
            self.subject
                .emit(
                    event_types::MODULE_REGISTERED,
                    json!({"module": entry.name(), "capabilities": entry.caps().labels()}),
                )
                .await;
        }
        self.registry = Some(registry);

        // LOAD CONFIG
        tracing::info!("Phase: load-config");
        let report = self.loader.load(&self.sections)?;
        self.provenance.replace(report.provenance);

        // INIT
        tracing::info!("Phase: init");
        self.run_init_phase().await?;

        // TENANT CONFIGURE
        if self.tenants.is_some() {
            tracing::info!("Phase: tenant-configure");
            self.run_tenant_phase().await?;
        }

        self.state = AppState::Initialized;
        Ok(())
    }

    async fn run_init_phase(&mut self) -> Result<(), AppError> {
        // Take the registry out for the duration of the phase: the
        // constructable step mutates entries while the rest of the
        // application stays borrowable.
        let Some(mut registry) = self.registry.take() else {
            return Err(AppError::InvalidState {
                expected: "resolved",
                actual: "unresolved",
            });
        };
        let result = self.init_modules(&mut registry).await;
        self.registry = Some(registry);
        result
    }

    async fn init_modules(&mut self, registry: &mut ModuleRegistry) -> Result<(), AppError> {
        let ctx_builder = ModuleContextBuilder::new(
            self.services.clone(),
            self.subject.clone(),
            self.tenants.clone(),
            self.cancel.clone(),
        );

        for idx in 0..registry.len() {
            let name = registry.entry(idx).name().to_owned();

            // 1. Gather and verify declared services.
            let mut resolved = ResolvedServices::new(self.services.clone());
            if let Some(aware) = registry.entry(idx).caps().query::<ServiceAwareCap>() {
                for dep in aware.requires_services() {
                    match self.services.verify(&dep) {
                        Ok(service_name) => resolved.insert(dep.name.clone(), service_name),
                        Err(
                            err @ (ServiceError::NotFound { .. }
                            | ServiceError::InterfaceNotFound { .. }),
                        ) => {
                            if dep.required {
                                let err = RegistryError::RequiredServiceNotFound {
                                    module: name.clone(),
                                    service: dep.name.clone(),
                                    source: err,
                                };
                                self.emit_module_failed(&name, &err).await;
                                return Err(err.into());
                            }
                            tracing::debug!(module = %name, service = %dep.name, "optional service absent");
                        }
                        Err(err) => {
                            let err = RegistryError::ServiceVerification {
                                module: name.clone(),
                                source: err,
                            };
                            self.emit_module_failed(&name, &err).await;
                            return Err(err.into());
                        }
                    }
                }
            }

            // 2. Constructor-based replacement.
            if let Some(constructable) = registry.entry(idx).caps().query::<ConstructableCap>() {
                let constructed =
                    constructable
                        .construct(&resolved)
                        .map_err(|source| RegistryError::Construct {
                            module: name.clone(),
                            source,
                        })?;
                if constructed.core.name() != name {
                    return Err(RegistryError::ConstructRenamed {
                        module: name,
                        renamed: constructed.core.name().to_owned(),
                    }
                    .into());
                }
                warn_on_capability_downgrade(&name, registry.entry(idx).caps(), &constructed.caps);
                registry.replace_module(idx, constructed.core, constructed.caps);
            }

            // 3. Observer registration, before the module's own init.
            if let Some(observable) = registry.entry(idx).caps().query::<ObservableCap>() {
                observable
                    .register_observers(&self.subject)
                    .map_err(|source| RegistryError::Init {
                        module: name.clone(),
                        source,
                    })?;
            }

            // 4. Init.
            let ctx = ctx_builder.for_module(&name, resolved);
            if let Err(source) = registry.entry(idx).core().init(&ctx).await {
                let err = RegistryError::Init {
                    module: name.clone(),
                    source,
                };
                self.emit_module_failed(&name, &err).await;
                return Err(err.into());
            }
            self.init_order.push(idx);
            self.subject
                .emit(event_types::MODULE_INITIALIZED, json!({"module": name}))
                .await;

            // 5. Publish declared services.
            if let Some(aware) = registry.entry(idx).caps().query::<ServiceAwareCap>() {
                let publisher = ServicePublisher::new(&self.services, &name);
                aware
                    .publish_services(&publisher)
                    .map_err(|source| RegistryError::Publish {
                        module: name.clone(),
                        source,
                    })?;
                for provision in aware.provides_services() {
                    if !self.services.contains(&provision.name) {
                        return Err(RegistryError::Publish {
                            module: name.clone(),
                            source: ServiceError::DeclaredNotPublished {
                                module: name.clone(),
                                name: provision.name.clone(),
                            }
                            .into(),
                        }
                        .into());
                    }
                    self.subject
                        .emit(
                            event_types::SERVICE_REGISTERED,
                            json!({"service": provision.name, "module": name}),
                        )
                        .await;
                }
            }
        }

        Ok(())
    }

    async fn run_tenant_phase(&mut self) -> Result<(), AppError> {
        let (Some(tenants), Some(registry)) = (self.tenants.as_ref(), self.registry.as_ref())
        else {
            return Ok(());
        };

        for entry in registry.modules() {
            if let Some(aware) = entry.caps().query::<TenantAwareCap>() {
                tenants
                    .register_tenant_aware_module(entry.name(), aware)
                    .await;
            }
        }

        if let Some(dir) = &self.tenant_config_dir {
            let loaded = tenant_loader::load_tenants_from_directory(tenants, dir).await?;
            tracing::info!(count = loaded, dir = %dir.display(), "tenant configurations loaded");
        }

        Ok(())
    }

    /// Start every startable module in resolved order. On the first
    /// failure, already-started modules are stopped in reverse
    /// (best-effort) and the start error is returned.
    ///
    /// # Errors
    /// `RegistryError::Start` naming the failing module.
    pub async fn start(&mut self) -> Result<(), AppError> {
        self.expect_state(AppState::Initialized)?;
        let Some(registry) = self.registry.as_ref() else {
            return Err(AppError::InvalidState {
                expected: "initialized",
                actual: "unresolved",
            });
        };

        tracing::info!("Phase: start");
        for idx in 0..registry.len() {
            let entry = registry.entry(idx);
            let Some(startable) = entry.caps().query::<StartableCap>() else {
                continue;
            };
            let name = entry.name().to_owned();
            if let Err(source) = startable.start(self.cancel.clone()).await {
                let err = RegistryError::Start {
                    module: name.clone(),
                    source,
                };
                self.emit_module_failed(&name, &err).await;
                self.subject
                    .emit(
                        event_types::APPLICATION_FAILED,
                        json!({"app": &*self.name, "module": name, "phase": "start"}),
                    )
                    .await;
                self.unwind_started().await;
                return Err(err.into());
            }
            self.started.push(idx);
            self.subject
                .emit(event_types::MODULE_STARTED, json!({"module": name}))
                .await;
            tracing::info!(module = %name, "module started");
        }

        self.subject
            .emit(event_types::APPLICATION_STARTED, json!({"app": &*self.name}))
            .await;
        self.state = AppState::Started;
        Ok(())
    }

    /// Best-effort reverse stop of everything started so far; errors are
    /// logged and collected, never propagated.
    async fn unwind_started(&mut self) {
        let Some(registry) = self.registry.as_ref() else {
            return;
        };
        for idx in self.started.drain(..).rev() {
            let entry = registry.entry(idx);
            if let Some(stoppable) = entry.caps().query::<StoppableCap>() {
                if let Err(err) = stoppable.stop(self.cancel.clone()).await {
                    tracing::warn!(module = entry.name(), error = %err, "unwind stop failed");
                }
            }
        }
    }

    /// Stop every stoppable module that was initialized, in exact reverse
    /// init order, bounded by the configured stop timeout. All stops are
    /// attempted; the last error is returned.
    ///
    /// Also callable after a failed `init`: modules that completed their
    /// init before the failure receive their stop here.
    ///
    /// # Errors
    /// The last per-module stop error, or `StopTimeout` for modules that
    /// exceeded the deadline.
    pub async fn stop(&mut self) -> Result<(), AppError> {
        if self.state == AppState::Stopped {
            return Err(AppError::InvalidState {
                expected: "started",
                actual: self.state.as_str(),
            });
        }
        let Some(registry) = self.registry.as_ref() else {
            return Err(AppError::InvalidState {
                expected: "initialized",
                actual: self.state.as_str(),
            });
        };

        tracing::info!("Phase: stop");
        self.cancel.cancel();

        let timeout = self
            .main_section
            .as_ref()
            .map_or(Duration::from_secs(30), |h| h.get().stop_timeout);
        let deadline = tokio::time::Instant::now() + timeout;

        // The stop context: cancelled once the deadline passes, so late
        // modules observe an already-cancelled token.
        let stop_token = CancellationToken::new();
        let watchdog = {
            let token = stop_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                token.cancel();
            })
        };

        let mut last_error: Option<RegistryError> = None;
        for idx in self.init_order.iter().rev().copied() {
            let entry = registry.entry(idx);
            let Some(stoppable) = entry.caps().query::<StoppableCap>() else {
                continue;
            };
            let name = entry.name().to_owned();

            let result = if tokio::time::Instant::now() < deadline {
                match tokio::time::timeout_at(deadline, stoppable.stop(stop_token.clone())).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(module = %name, "stop exceeded the shutdown deadline");
                        last_error = Some(RegistryError::StopTimeout {
                            module: name.clone(),
                        });
                        self.subject
                            .emit(
                                event_types::MODULE_FAILED,
                                json!({"module": name, "phase": "stop", "error": "deadline exceeded"}),
                            )
                            .await;
                        continue;
                    }
                }
            } else {
                stoppable.stop(stop_token.clone()).await
            };

            match result {
                Ok(()) => {
                    self.subject
                        .emit(event_types::MODULE_STOPPED, json!({"module": name}))
                        .await;
                    tracing::info!(module = %name, "module stopped");
                }
                Err(source) => {
                    tracing::warn!(module = %name, error = %source, "module stop failed");
                    self.subject
                        .emit(
                            event_types::MODULE_FAILED,
                            json!({"module": name, "phase": "stop", "error": source.to_string()}),
                        )
                        .await;
                    last_error = Some(RegistryError::Stop {
                        module: name,
                        source,
                    });
                }
            }
        }

        watchdog.abort();
        self.started.clear();
        self.subject
            .emit(event_types::APPLICATION_STOPPED, json!({"app": &*self.name}))
            .await;
        self.state = AppState::Stopped;

        match last_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    async fn emit_module_failed(&self, module: &str, err: &RegistryError) {
        self.subject
            .emit(
                event_types::MODULE_FAILED,
                json!({"module": module, "error": err.to_string()}),
            )
            .await;
    }

    // ---- dynamic reload ----

    /// Re-run the configuration pipeline, diff against the committed
    /// state, commit the new values and notify reload-aware modules.
    /// Exactly one terminal event (`completed` / `failed` / `noop`) is
    /// emitted per reload id.
    ///
    /// # Errors
    /// Recomputation failures (`ReloadError::Load`) before anything is
    /// committed; `ReloadError::ModuleReload` when a module hook rejects
    /// the new configuration (the values remain committed).
    pub async fn reload_config(&mut self, trigger: ReloadTrigger) -> Result<ReloadReport, AppError> {
        if self.state != AppState::Initialized && self.state != AppState::Started {
            return Err(AppError::InvalidState {
                expected: "initialized",
                actual: self.state.as_str(),
            });
        }

        let reload_id = Uuid::now_v7().to_string();
        let started_at = std::time::Instant::now();

        let old = self
            .sections
            .combined_value()
            .map_err(|source| ReloadError::Load { source })?;

        let computed = self
            .loader
            .compute(&self.sections)
            .map_err(|source| ReloadError::Load { source })?;
        if !computed.missing.is_empty() {
            return Err(ReloadError::Load {
                source: ConfigError::RequiredFieldMissing {
                    paths: computed.missing,
                },
            }
            .into());
        }
        let mut validation_errors = Vec::new();
        let mut new_root = serde_json::Map::new();
        for section in &computed.sections {
            if let Err(message) = section.target.validate_value(&section.value) {
                validation_errors.push(message);
            }
            new_root.insert(section.key.to_string(), section.value.clone());
        }
        if !validation_errors.is_empty() {
            return Err(ReloadError::Load {
                source: ConfigError::ValidationFailed {
                    errors: validation_errors,
                },
            }
            .into());
        }
        let new = serde_json::Value::Object(new_root);

        let diff = ConfigDiff::compute(&old, &new, &self.diff_options());

        // Every reload opens with a started event; the terminal event
        // (noop / completed / failed) shares its reload id.
        self.subject
            .emit(
                event_types::CONFIG_RELOAD_STARTED,
                json!({
                    "reload_id": reload_id,
                    "trigger": trigger.as_str(),
                    "summary": diff.summary(),
                }),
            )
            .await;

        if diff.is_empty() {
            self.subject
                .emit(
                    event_types::CONFIG_RELOAD_NOOP,
                    json!({"reload_id": reload_id, "trigger": trigger.as_str()}),
                )
                .await;
            return Ok(ReloadReport {
                reload_id,
                trigger,
                diff,
                affected: Vec::new(),
                pending: Vec::new(),
                duration: started_at.elapsed(),
                noop: true,
            });
        }

        // Commit first so reload hooks and section handles observe the
        // new values.
        let provenance = computed.provenance;
        for section in computed.sections {
            if let Err(source) = section.target.commit(section.value) {
                self.subject
                    .emit(
                        event_types::CONFIG_RELOAD_FAILED,
                        json!({
                            "reload_id": reload_id,
                            "trigger": trigger.as_str(),
                            "error": source.to_string(),
                        }),
                    )
                    .await;
                return Err(ReloadError::Load { source }.into());
            }
        }
        self.provenance.replace(provenance);

        // Route the diff to owners of changed sections.
        let mut affected = Vec::new();
        let mut pending = Vec::new();
        let changed_keys = affected_section_keys(&diff);
        if let Some(registry) = self.registry.as_ref() {
            for entry in registry.modules() {
                let owns_changed = changed_keys.iter().any(|key| {
                    self.sections.owner_of(key).as_deref() == Some(entry.name())
                });
                if !owns_changed {
                    continue;
                }
                let name = entry.name().to_owned();
                if let Some(reloadable) = entry.caps().query::<ReloadableCap>() {
                    if let Err(source) = reloadable.on_config_reload(&diff).await {
                        self.subject
                            .emit(
                                event_types::CONFIG_RELOAD_FAILED,
                                json!({
                                    "reload_id": reload_id,
                                    "trigger": trigger.as_str(),
                                    "module": name,
                                    "error": source.to_string(),
                                }),
                            )
                            .await;
                        return Err(ReloadError::ModuleReload {
                            module: name,
                            source,
                        }
                        .into());
                    }
                    affected.push(name);
                } else {
                    pending.push(name);
                }
            }
        }
        self.pending_reload = pending.clone();

        let duration = started_at.elapsed();
        self.subject
            .emit(
                event_types::CONFIG_RELOAD_COMPLETED,
                json!({
                    "reload_id": reload_id,
                    "trigger": trigger.as_str(),
                    "duration_ms": u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                    "affected": affected,
                }),
            )
            .await;

        Ok(ReloadReport {
            reload_id,
            trigger,
            diff,
            affected,
            pending,
            duration,
            noop: false,
        })
    }

    /// Effective configuration of all sections with sensitive values
    /// redacted; for diagnostics and `--print-config` style output.
    ///
    /// # Errors
    /// Propagates section encode failures.
    pub fn effective_config(&self) -> Result<serde_json::Value, ConfigError> {
        crate::config::render_effective_config(&self.sections)
    }

    /// Diff options derived from the registered section schemas:
    /// sensitive fields are redacted under their fully-qualified paths.
    fn diff_options(&self) -> DiffOptions {
        let mut options = DiffOptions::default().redacted();
        for entry in self.sections.snapshot() {
            for path in entry.schema.sensitive_paths() {
                options = options.sensitive(format!("{}.{path}", entry.key));
            }
        }
        options
    }
}

fn warn_on_capability_downgrade(module: &str, old: &CapabilitySet, new: &CapabilitySet) {
    for label in old.labels() {
        if !new.labels().contains(&label) {
            tracing::warn!(
                module,
                capability = label,
                "reconstructed module dropped a capability; later phases will skip it"
            );
        }
    }
}
