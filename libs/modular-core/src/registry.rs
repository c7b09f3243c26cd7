//! Module registry: capability bookkeeping and dependency resolution.
//!
//! Modules are registered into a [`RegistryBuilder`] together with their
//! explicit dependencies and optional capabilities. `build()` derives the
//! full dependency graph (explicit edges plus edges implied by service
//! requirements), rejects cycles and unknown dependencies, and produces a
//! [`ModuleRegistry`] whose order drives init/start (forward) and stop
//! (reverse).

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::contracts::{
    ConfigurableModule, ConstructableModule, Module, ObservableModule, ReloadableModule,
    ServiceAwareModule, StartableModule, StoppableModule, TenantAwareModule,
};
use crate::services::{ServiceDependency, ServiceProvision};

// ============================================================================
// Capability system
// ============================================================================

/// A single capability variant a module can provide.
#[derive(Clone)]
pub enum Capability {
    Configurable(Arc<dyn ConfigurableModule>),
    ServiceAware(Arc<dyn ServiceAwareModule>),
    Startable(Arc<dyn StartableModule>),
    Stoppable(Arc<dyn StoppableModule>),
    Constructable(Arc<dyn ConstructableModule>),
    TenantAware(Arc<dyn TenantAwareModule>),
    Reloadable(Arc<dyn ReloadableModule>),
    Observable(Arc<dyn ObservableModule>),
}

impl Capability {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Capability::Configurable(_) => "config",
            Capability::ServiceAware(_) => "services",
            Capability::Startable(_) => "startable",
            Capability::Stoppable(_) => "stoppable",
            Capability::Constructable(_) => "constructable",
            Capability::TenantAware(_) => "tenant",
            Capability::Reloadable(_) => "reload",
            Capability::Observable(_) => "observer",
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Capability({})", self.label())
    }
}

/// Trait for capability tags that allow type-safe querying.
pub trait CapTag {
    type Out: ?Sized + 'static;
    fn try_get(cap: &Capability) -> Option<&Arc<Self::Out>>;
}

macro_rules! cap_tag {
    ($tag:ident, $variant:ident, $out:ident) => {
        pub struct $tag;
        impl CapTag for $tag {
            type Out = dyn $out;
            fn try_get(cap: &Capability) -> Option<&Arc<Self::Out>> {
                match cap {
                    Capability::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

cap_tag!(ConfigurableCap, Configurable, ConfigurableModule);
cap_tag!(ServiceAwareCap, ServiceAware, ServiceAwareModule);
cap_tag!(StartableCap, Startable, StartableModule);
cap_tag!(StoppableCap, Stoppable, StoppableModule);
cap_tag!(ConstructableCap, Constructable, ConstructableModule);
cap_tag!(TenantAwareCap, TenantAware, TenantAwareModule);
cap_tag!(ReloadableCap, Reloadable, ReloadableModule);
cap_tag!(ObservableCap, Observable, ObservableModule);

/// The set of capabilities a module provides.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    caps: Vec<Capability>,
}

impl CapabilitySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cap: Capability) {
        self.caps.push(cap);
    }

    #[must_use]
    pub fn with(mut self, cap: Capability) -> Self {
        self.push(cap);
        self
    }

    #[must_use]
    pub fn has<T: CapTag>(&self) -> bool {
        self.caps.iter().any(|cap| T::try_get(cap).is_some())
    }

    #[must_use]
    pub fn query<T: CapTag>(&self) -> Option<Arc<T::Out>> {
        self.caps.iter().find_map(|cap| T::try_get(cap).cloned())
    }

    /// Human-readable capability labels, in declaration order.
    #[must_use]
    pub fn labels(&self) -> Vec<&'static str> {
        self.caps.iter().map(Capability::label).collect()
    }
}

impl std::fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CapabilitySet").field(&self.labels()).finish()
    }
}

// ============================================================================
// Entries and registry
// ============================================================================

pub struct ModuleEntry {
    pub(crate) name: Arc<str>,
    pub(crate) deps: Vec<String>,
    pub(crate) core: Arc<dyn Module>,
    pub(crate) caps: CapabilitySet,
}

impl ModuleEntry {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    #[must_use]
    pub fn core(&self) -> &Arc<dyn Module> {
        &self.core
    }

    #[must_use]
    pub fn caps(&self) -> &CapabilitySet {
        &self.caps
    }
}

impl std::fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleEntry")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .field("caps", &self.caps.labels())
            .finish()
    }
}

/// The final, topologically ordered module registry.
pub struct ModuleRegistry {
    modules: Vec<ModuleEntry>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn modules(&self) -> &[ModuleEntry] {
        &self.modules
    }

    #[must_use]
    pub fn order(&self) -> Vec<&str> {
        self.modules.iter().map(|e| &*e.name).collect()
    }

    #[must_use]
    pub fn get_module(&self, name: &str) -> Option<&ModuleEntry> {
        self.modules.iter().find(|e| &*e.name == name)
    }

    /// Swap the implementation of a module in place, preserving its
    /// position in the resolved order. Used by the constructable phase.
    pub(crate) fn replace_module(&mut self, idx: usize, core: Arc<dyn Module>, caps: CapabilitySet) {
        let entry = &mut self.modules[idx];
        entry.core = core;
        entry.caps = caps;
    }

    pub(crate) fn entry(&self, idx: usize) -> &ModuleEntry {
        &self.modules[idx]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.order())
            .finish()
    }
}

// ============================================================================
// Builder and resolution
// ============================================================================

/// Builder collecting modules, dependencies and capabilities before
/// resolution. Keys are module names; uniqueness enforced at build time.
#[derive(Default)]
pub struct RegistryBuilder {
    order: Vec<String>,
    core: HashMap<String, Arc<dyn Module>>,
    deps: HashMap<String, Vec<String>>,
    capabilities: HashMap<String, Vec<Capability>>,
    errors: Vec<String>,
}

impl RegistryBuilder {
    /// Register a module with no explicit dependencies.
    pub fn register(&mut self, module: Arc<dyn Module>) {
        self.register_with_deps(module, Vec::new());
    }

    /// Register a module with explicit dependency names.
    pub fn register_with_deps(&mut self, module: Arc<dyn Module>, deps: Vec<String>) {
        let name = module.name().to_owned();
        if self.core.contains_key(&name) {
            self.errors.push(format!("module '{name}' is already registered"));
            return;
        }
        self.order.push(name.clone());
        self.deps.insert(name.clone(), deps);
        self.core.insert(name, module);
    }

    /// Attach a capability to a previously registered module.
    pub fn add_capability(&mut self, module: &str, cap: Capability) {
        self.capabilities.entry(module.to_owned()).or_default().push(cap);
    }

    /// Configurable capabilities in registration order; the configure
    /// phase runs before resolution, so this works off the raw builder.
    pub(crate) fn configurables(&self) -> Vec<(String, Arc<dyn ConfigurableModule>)> {
        let mut out = Vec::new();
        for name in &self.order {
            if let Some(caps) = self.capabilities.get(name) {
                for cap in caps {
                    if let Capability::Configurable(c) = cap {
                        out.push((name.clone(), c.clone()));
                    }
                }
            }
        }
        out
    }

    fn validate(&self) -> Result<(), RegistryError> {
        if !self.errors.is_empty() {
            return Err(RegistryError::InvalidRegistryConfiguration {
                errors: self.errors.clone(),
            });
        }
        for name in self.capabilities.keys() {
            if !self.core.contains_key(name) {
                return Err(RegistryError::UnknownModule(name.clone()));
            }
        }
        Ok(())
    }

    fn service_declarations(
        &self,
    ) -> Result<(HashMap<String, Vec<ServiceDependency>>, HashMap<String, Vec<ServiceProvision>>), RegistryError>
    {
        let mut requires: HashMap<String, Vec<ServiceDependency>> = HashMap::new();
        let mut provides: HashMap<String, Vec<ServiceProvision>> = HashMap::new();

        for name in &self.order {
            let Some(caps) = self.capabilities.get(name) else {
                continue;
            };
            for cap in caps {
                if let Capability::ServiceAware(sa) = cap {
                    let reqs = sa.requires_services();
                    for dep in &reqs {
                        if dep.match_by_interface && dep.interface.is_none() {
                            return Err(RegistryError::InvalidServiceDependency {
                                module: name.clone(),
                                dependency: dep.name.clone(),
                            });
                        }
                    }
                    requires.entry(name.clone()).or_default().extend(reqs);
                    provides.entry(name.clone()).or_default().extend(sa.provides_services());
                }
            }
        }

        // Duplicate provision names are a wiring bug, caught before any
        // module runs.
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for name in &self.order {
            if let Some(provs) = provides.get(name) {
                for p in provs {
                    if let Some(first) = seen.insert(p.name.as_str(), name.as_str()) {
                        return Err(RegistryError::DuplicateServiceProvision {
                            service: p.name.clone(),
                            first: first.to_owned(),
                            second: name.clone(),
                        });
                    }
                }
            }
        }

        Ok((requires, provides))
    }

    /// Compute prerequisite adjacency: `prereq[u]` holds every module that
    /// must be initialized before `u`.
    fn build_prereqs(
        &self,
        requires: &HashMap<String, Vec<ServiceDependency>>,
        provides: &HashMap<String, Vec<ServiceProvision>>,
    ) -> Result<HashMap<String, Vec<String>>, RegistryError> {
        let mut prereqs: HashMap<String, Vec<String>> = HashMap::new();

        for name in &self.order {
            let mut pre: Vec<String> = Vec::new();

            for dep in &self.deps[name] {
                if !self.core.contains_key(dep) {
                    return Err(RegistryError::UnknownDependency {
                        module: name.clone(),
                        depends_on: dep.clone(),
                    });
                }
                pre.push(dep.clone());
            }

            if let Some(reqs) = requires.get(name) {
                for req in reqs {
                    let provider = if req.match_by_interface {
                        let interface = req.interface.as_ref().copied();
                        self.order.iter().find(|m| {
                            provides.get(*m).is_some_and(|ps| {
                                ps.iter().any(|p| {
                                    interface.is_some_and(|i| p.interfaces.contains(&i))
                                })
                            })
                        })
                    } else {
                        self.order.iter().find(|m| {
                            provides
                                .get(*m)
                                .is_some_and(|ps| ps.iter().any(|p| p.name == req.name))
                        })
                    };
                    // A missing provider is not an error here: the service
                    // may be registered externally before init.
                    if let Some(p) = provider {
                        if p != name {
                            pre.push(p.clone());
                        }
                    }
                }
            }

            pre.sort();
            pre.dedup();
            prereqs.insert(name.clone(), pre);
        }

        Ok(prereqs)
    }

    /// Depth-first topological sort with White/Gray/Black coloring.
    /// Deterministic: roots and prerequisites are visited in module-name
    /// ascending order; a back edge yields the cycle path.
    fn topo_sort(
        &self,
        prereqs: &HashMap<String, Vec<String>>,
    ) -> Result<Vec<String>, RegistryError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn visit(
            node: &str,
            prereqs: &HashMap<String, Vec<String>>,
            colors: &mut HashMap<String, Color>,
            path: &mut Vec<String>,
            out: &mut Vec<String>,
        ) -> Result<(), RegistryError> {
            colors.insert(node.to_owned(), Color::Gray);
            path.push(node.to_owned());

            for pre in &prereqs[node] {
                match colors.get(pre.as_str()).copied().unwrap_or(Color::White) {
                    Color::Gray => {
                        let start = path.iter().position(|n| n == pre).unwrap_or(0);
                        let mut cycle: Vec<String> = path[start..].to_vec();
                        cycle.push(pre.clone());
                        return Err(RegistryError::CircularDependency { path: cycle });
                    }
                    Color::White => visit(pre, prereqs, colors, path, out)?,
                    Color::Black => {}
                }
            }

            path.pop();
            colors.insert(node.to_owned(), Color::Black);
            out.push(node.to_owned());
            Ok(())
        }

        let mut names: Vec<String> = self.order.clone();
        names.sort();

        let mut colors: HashMap<String, Color> = HashMap::new();
        let mut path = Vec::new();
        let mut out = Vec::with_capacity(names.len());

        for name in &names {
            if colors.get(name.as_str()).copied().unwrap_or(Color::White) == Color::White {
                visit(name, prereqs, &mut colors, &mut path, &mut out)?;
            }
        }

        Ok(out)
    }

    /// Finalize: verify wiring, derive the graph and produce the ordered
    /// registry.
    ///
    /// # Errors
    /// Returns `RegistryError` on duplicate modules or provisions, unknown
    /// dependencies, invalid service declarations, or dependency cycles.
    pub fn build(self) -> Result<ModuleRegistry, RegistryError> {
        self.validate()?;

        let (requires, provides) = self.service_declarations()?;
        let prereqs = self.build_prereqs(&requires, &provides)?;
        let order = self.topo_sort(&prereqs)?;

        let mut builder = self;
        let mut entries = Vec::with_capacity(order.len());
        for name in &order {
            let core = builder
                .core
                .remove(name)
                .ok_or_else(|| RegistryError::UnknownModule(name.clone()))?;
            let deps = builder.deps.remove(name).unwrap_or_default();
            let caps = CapabilitySet {
                caps: builder.capabilities.remove(name).unwrap_or_default(),
            };
            entries.push(ModuleEntry {
                name: Arc::from(name.as_str()),
                deps,
                core,
                caps,
            });
        }

        tracing::info!(modules = ?order, "module dependency order resolved");

        Ok(ModuleRegistry { modules: entries })
    }
}

/// Structured errors for registry construction and lifecycle phases.
#[derive(Debug, Error)]
pub enum RegistryError {
    // Build/resolution errors
    #[error("unknown module '{0}'")]
    UnknownModule(String),

    #[error("module '{module}' depends on unknown '{depends_on}'")]
    UnknownDependency { module: String, depends_on: String },

    #[error("circular dependency detected: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("service '{service}' is provided by both '{first}' and '{second}'")]
    DuplicateServiceProvision {
        service: String,
        first: String,
        second: String,
    },

    #[error("module '{module}' dependency '{dependency}' matches by interface but declares none")]
    InvalidServiceDependency { module: String, dependency: String },

    #[error("invalid registry configuration:\n{errors:#?}")]
    InvalidRegistryConfiguration { errors: Vec<String> },

    // Phase errors with module context
    #[error("configuration registration failed for module '{module}'")]
    Configure {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("required service '{service}' not found for module '{module}'")]
    RequiredServiceNotFound {
        module: String,
        service: String,
        #[source]
        source: crate::services::ServiceError,
    },

    #[error("service verification failed for module '{module}'")]
    ServiceVerification {
        module: String,
        #[source]
        source: crate::services::ServiceError,
    },

    #[error("constructor failed for module '{module}'")]
    Construct {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("constructor for module '{module}' changed its name to '{renamed}'")]
    ConstructRenamed { module: String, renamed: String },

    #[error("initialization failed for module '{module}'")]
    Init {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("service publication failed for module '{module}'")]
    Publish {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("start failed for module '{module}'")]
    Start {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("stop failed for module '{module}'")]
    Stop {
        module: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("stop for module '{module}' exceeded the shutdown deadline")]
    StopTimeout { module: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ModuleCtx;
    use crate::services::{ServiceDependency, ServiceProvision};
    use async_trait::async_trait;

    struct Dummy {
        name: &'static str,
    }

    impl Dummy {
        fn arc(name: &'static str) -> Arc<Self> {
            Arc::new(Self { name })
        }
    }

    #[async_trait]
    impl Module for Dummy {
        fn name(&self) -> &str {
            self.name
        }
        async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Provider {
        name: &'static str,
        service: &'static str,
    }

    #[async_trait]
    impl Module for Provider {
        fn name(&self) -> &str {
            self.name
        }
        async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl ServiceAwareModule for Provider {
        fn provides_services(&self) -> Vec<ServiceProvision> {
            vec![ServiceProvision::new(self.service)]
        }
    }

    struct Consumer {
        name: &'static str,
        wants: ServiceDependency,
    }

    #[async_trait]
    impl Module for Consumer {
        fn name(&self) -> &str {
            self.name
        }
        async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl ServiceAwareModule for Consumer {
        fn requires_services(&self) -> Vec<ServiceDependency> {
            vec![self.wants.clone()]
        }
    }

    #[test]
    fn topo_sort_happy_path() {
        let mut b = RegistryBuilder::default();
        b.register(Dummy::arc("core_a"));
        b.register_with_deps(Dummy::arc("core_b"), vec!["core_a".to_owned()]);

        let reg = b.build().unwrap();
        assert_eq!(reg.order(), vec!["core_a", "core_b"]);
    }

    #[test]
    fn independent_modules_order_by_name() {
        let mut b = RegistryBuilder::default();
        b.register(Dummy::arc("zeta"));
        b.register(Dummy::arc("alpha"));
        b.register(Dummy::arc("mid"));

        let reg = b.build().unwrap();
        assert_eq!(reg.order(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn service_name_requirement_implies_edge() {
        // a provides "db"; b requires "db" by name; c explicitly depends on b.
        let mut b = RegistryBuilder::default();

        let provider = Arc::new(Provider {
            name: "a",
            service: "db",
        });
        b.register(provider.clone());
        b.add_capability("a", Capability::ServiceAware(provider));

        let consumer = Arc::new(Consumer {
            name: "b",
            wants: ServiceDependency::named("db").required(),
        });
        b.register(consumer.clone());
        b.add_capability("b", Capability::ServiceAware(consumer));

        b.register_with_deps(Dummy::arc("c"), vec!["b".to_owned()]);

        let reg = b.build().unwrap();
        assert_eq!(reg.order(), vec!["a", "b", "c"]);
    }

    #[test]
    fn interface_requirement_implies_edge_without_explicit_dep() {
        trait Router: Send + Sync {}

        let provider = Arc::new(Provider {
            name: "b",
            service: "chi.router",
        });
        // Declare the interface on the provision.
        struct RouterProvider(Arc<Provider>);
        impl ServiceAwareModule for RouterProvider {
            fn provides_services(&self) -> Vec<ServiceProvision> {
                vec![ServiceProvision::new("chi.router").implements::<dyn Router>()]
            }
        }

        let consumer = Arc::new(Consumer {
            name: "a",
            wants: ServiceDependency::named("router")
                .required()
                .by_interface::<dyn Router>(),
        });

        let mut builder = RegistryBuilder::default();
        builder.register(consumer.clone());
        builder.add_capability("a", Capability::ServiceAware(consumer));
        builder.register(provider.clone());
        builder.add_capability(
            "b",
            Capability::ServiceAware(Arc::new(RouterProvider(provider))),
        );

        let reg = builder.build().unwrap();
        assert_eq!(reg.order(), vec!["b", "a"]);
    }

    #[test]
    fn cyclic_dependency_detected_with_path() {
        let mut b = RegistryBuilder::default();
        b.register_with_deps(Dummy::arc("a"), vec!["b".to_owned()]);
        b.register_with_deps(Dummy::arc("b"), vec!["c".to_owned()]);
        b.register_with_deps(Dummy::arc("c"), vec!["a".to_owned()]);
        b.register(Dummy::arc("d"));

        let err = b.build().unwrap_err();
        match err {
            RegistryError::CircularDependency { path } => {
                assert!(path.contains(&"a".to_owned()));
                assert!(path.contains(&"b".to_owned()));
                assert!(path.contains(&"c".to_owned()));
                assert!(!path.contains(&"d".to_owned()));
                assert!(path.len() >= 4);
                assert_eq!(path.first(), path.last());
            }
            other => panic!("expected CircularDependency, got: {other:?}"),
        }
    }

    #[test]
    fn unknown_dependency_error() {
        let mut b = RegistryBuilder::default();
        b.register_with_deps(Dummy::arc("core_a"), vec!["missing_dep".to_owned()]);

        let err = b.build().unwrap_err();
        match err {
            RegistryError::UnknownDependency { module, depends_on } => {
                assert_eq!(module, "core_a");
                assert_eq!(depends_on, "missing_dep");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_module_reported() {
        let mut b = RegistryBuilder::default();
        b.register(Dummy::arc("a"));
        b.register(Dummy::arc("a"));

        let err = b.build().unwrap_err();
        match err {
            RegistryError::InvalidRegistryConfiguration { errors } => {
                assert!(errors.iter().any(|e| e.contains("already registered")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn duplicate_service_provision_rejected() {
        let mut b = RegistryBuilder::default();
        for name in ["a", "b"] {
            let p = Arc::new(Provider {
                name: if name == "a" { "a" } else { "b" },
                service: "db",
            });
            b.register(p.clone());
            b.add_capability(name, Capability::ServiceAware(p));
        }

        let err = b.build().unwrap_err();
        assert!(matches!(
            err,
            RegistryError::DuplicateServiceProvision { ref service, .. } if service == "db"
        ));
    }

    #[test]
    fn interface_match_without_interface_is_invalid() {
        let consumer = Arc::new(Consumer {
            name: "a",
            wants: ServiceDependency {
                name: "x".to_owned(),
                required: true,
                concrete: None,
                interface: None,
                match_by_interface: true,
            },
        });
        let mut b = RegistryBuilder::default();
        b.register(consumer.clone());
        b.add_capability("a", Capability::ServiceAware(consumer));

        let err = b.build().unwrap_err();
        assert!(matches!(err, RegistryError::InvalidServiceDependency { .. }));
    }

    #[test]
    fn capability_for_unknown_module_fails() {
        let provider = Arc::new(Provider {
            name: "ghost",
            service: "db",
        });
        let mut b = RegistryBuilder::default();
        b.register(Dummy::arc("real"));
        b.add_capability("ghost", Capability::ServiceAware(provider));

        let err = b.build().unwrap_err();
        assert!(matches!(err, RegistryError::UnknownModule(ref m) if m == "ghost"));
    }

    #[test]
    fn capability_set_query_and_labels() {
        let provider = Arc::new(Provider {
            name: "a",
            service: "db",
        });
        let set = CapabilitySet::new().with(Capability::ServiceAware(provider));
        assert!(set.has::<ServiceAwareCap>());
        assert!(!set.has::<StartableCap>());
        assert!(set.query::<ServiceAwareCap>().is_some());
        assert_eq!(set.labels(), vec!["services"]);
    }
}
