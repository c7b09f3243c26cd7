//! Type-safe service registry with name- and interface-based lookup.
//!
//! Providers register an implementation once under a unique name; consumers
//! fetch it by name, by concrete type, or by *interface type* (trait object)
//! without knowing who provided it.
//!
//! Implementation details:
//! - Interface key = fully-qualified `type_name::<T>()`, which works for
//!   `T = dyn Trait`.
//! - Values are `Arc<T>` stored as `Box<dyn Any + Send + Sync>` and
//!   downcast on read.
//! - Lookups are constant-time by name and linear by interface.
//! - No lock is ever held across caller code: reads clone the `Arc` and
//!   release the lock before returning.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::{any::Any, collections::HashMap, fmt, sync::Arc};

/// Stable key for a concrete or trait-object type.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct ServiceKey(&'static str);

impl ServiceKey {
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        ServiceKey(std::any::type_name::<T>())
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service '{name}' is already registered (provided by '{provided_by}')")]
    AlreadyRegistered { name: String, provided_by: String },

    #[error("service not found: '{name}'")]
    NotFound { name: String },

    #[error("no registered service satisfies interface {interface}")]
    InterfaceNotFound { interface: ServiceKey },

    #[error("service '{name}' cannot be resolved as {requested}")]
    Incompatible { name: String, requested: ServiceKey },

    #[error("service '{name}' has concrete type {actual}, expected {expected}")]
    WrongType {
        name: String,
        expected: ServiceKey,
        actual: &'static str,
    },

    #[error("service '{name}' does not expose interface {interface}")]
    WrongInterface { name: String, interface: ServiceKey },

    #[error("injection target for '{name}' is already filled")]
    TargetInvalid { name: String },

    #[error("dependency '{name}' matches by interface but declares no interface type")]
    InvalidDependency { name: String },

    #[error("module '{module}' declared service '{name}' but did not publish an instance")]
    DeclaredNotPublished { module: String, name: String },
}

/// A service a module consumes, resolved before the module initializes.
#[derive(Clone, Debug)]
pub struct ServiceDependency {
    /// Local dependency name. In name mode this is also the registry name.
    pub name: String,
    pub required: bool,
    /// Expected concrete type of the instance, if declared.
    pub concrete: Option<ServiceKey>,
    /// Interface the instance must expose, if declared.
    pub interface: Option<ServiceKey>,
    /// Match any provider exposing `interface` instead of matching by name.
    pub match_by_interface: bool,
}

impl ServiceDependency {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            concrete: None,
            interface: None,
            match_by_interface: false,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Require the registered instance to be exactly `T`.
    #[must_use]
    pub fn with_concrete<T: 'static>(mut self) -> Self {
        self.concrete = Some(ServiceKey::of::<T>());
        self
    }

    /// Require the instance to expose interface `I` (name lookup still).
    #[must_use]
    pub fn with_interface<I: ?Sized + 'static>(mut self) -> Self {
        self.interface = Some(ServiceKey::of::<I>());
        self
    }

    /// Resolve by interface satisfaction instead of by name; the first
    /// provider in registration order wins.
    #[must_use]
    pub fn by_interface<I: ?Sized + 'static>(mut self) -> Self {
        self.interface = Some(ServiceKey::of::<I>());
        self.match_by_interface = true;
        self
    }
}

/// A service a module declares it will publish after init.
#[derive(Clone, Debug)]
pub struct ServiceProvision {
    pub name: String,
    pub description: String,
    /// Interfaces the published instance will expose; used for implied
    /// dependency edges during resolution.
    pub interfaces: Vec<ServiceKey>,
}

impl ServiceProvision {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            interfaces: Vec::new(),
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn implements<I: ?Sized + 'static>(mut self) -> Self {
        self.interfaces.push(ServiceKey::of::<I>());
        self
    }
}

/// Public metadata of a registry entry.
#[derive(Clone, Debug)]
pub struct ServiceEntryMeta {
    pub name: Arc<str>,
    pub provided_by: Option<Arc<str>>,
    pub registered_at: DateTime<Utc>,
    /// Concrete type name of the registered instance.
    pub type_name: &'static str,
}

type Boxed = Box<dyn Any + Send + Sync>;

struct EntryRecord {
    meta: ServiceEntryMeta,
    concrete_key: ServiceKey,
    concrete: Boxed,
    /// Interface bindings in attach order.
    interfaces: Vec<(ServiceKey, Boxed)>,
}

#[derive(Default)]
struct Inner {
    /// Registration order is part of the contract: interface lookups walk
    /// entries in this order.
    entries: Vec<EntryRecord>,
    index: HashMap<Arc<str>, usize>,
}

/// Registry of published services, shared by the whole application.
#[derive(Default)]
pub struct ServiceRegistry {
    inner: RwLock<Inner>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `instance` under `name`.
    ///
    /// # Errors
    /// `AlreadyRegistered` when the name is taken; the existing entry is
    /// left untouched.
    pub fn register<T: Send + Sync + 'static>(
        &self,
        name: &str,
        instance: Arc<T>,
        provided_by: Option<&str>,
    ) -> Result<(), ServiceError> {
        let mut w = self.inner.write();
        if let Some(&idx) = w.index.get(name) {
            let owner = w.entries[idx]
                .meta
                .provided_by
                .as_deref()
                .unwrap_or("<external>")
                .to_owned();
            return Err(ServiceError::AlreadyRegistered {
                name: name.to_owned(),
                provided_by: owner,
            });
        }
        let name: Arc<str> = Arc::from(name);
        let record = EntryRecord {
            meta: ServiceEntryMeta {
                name: name.clone(),
                provided_by: provided_by.map(Arc::from),
                registered_at: Utc::now(),
                type_name: std::any::type_name::<T>(),
            },
            concrete_key: ServiceKey::of::<T>(),
            concrete: Box::new(instance),
            interfaces: Vec::new(),
        };
        let idx = w.entries.len();
        w.entries.push(record);
        w.index.insert(name, idx);
        Ok(())
    }

    /// Attach an interface binding to an existing entry. Re-exposing the
    /// same interface overwrites the previous binding.
    ///
    /// # Errors
    /// `NotFound` when no entry exists under `name`.
    pub fn expose_interface<I: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
        instance: Arc<I>,
    ) -> Result<(), ServiceError> {
        let key = ServiceKey::of::<I>();
        let mut w = self.inner.write();
        let idx = *w.index.get(name).ok_or_else(|| ServiceError::NotFound {
            name: name.to_owned(),
        })?;
        let entry = &mut w.entries[idx];
        let boxed: Boxed = Box::new(instance);
        if let Some(slot) = entry.interfaces.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = boxed;
        } else {
            entry.interfaces.push((key, boxed));
        }
        Ok(())
    }

    /// Fetch by name as either the concrete type or an exposed interface.
    ///
    /// # Errors
    /// `NotFound` for unknown names, `Incompatible` when the entry cannot
    /// be resolved as `T`.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ServiceError> {
        let r = self.inner.read();
        let idx = *r.index.get(name).ok_or_else(|| ServiceError::NotFound {
            name: name.to_owned(),
        })?;
        let entry = &r.entries[idx];
        if let Some(arc) = entry.concrete.downcast_ref::<Arc<T>>() {
            return Ok(arc.clone());
        }
        let key = ServiceKey::of::<T>();
        for (k, boxed) in &entry.interfaces {
            if *k == key {
                if let Some(arc) = boxed.downcast_ref::<Arc<T>>() {
                    return Ok(arc.clone());
                }
            }
        }
        Err(ServiceError::Incompatible {
            name: name.to_owned(),
            requested: key,
        })
    }

    /// All entries exposing interface `I`, in registration order.
    #[must_use]
    pub fn by_interface<I: ?Sized + Send + Sync + 'static>(&self) -> Vec<(Arc<str>, Arc<I>)> {
        let key = ServiceKey::of::<I>();
        let r = self.inner.read();
        let mut out = Vec::new();
        for entry in &r.entries {
            for (k, boxed) in &entry.interfaces {
                if *k == key {
                    if let Some(arc) = boxed.downcast_ref::<Arc<I>>() {
                        out.push((entry.meta.name.clone(), arc.clone()));
                    }
                }
            }
        }
        out
    }

    /// First entry exposing interface `I`, deterministic by registration
    /// order.
    #[must_use]
    pub fn first_by_interface<I: ?Sized + Send + Sync + 'static>(&self) -> Option<(Arc<str>, Arc<I>)> {
        self.by_interface::<I>().into_iter().next()
    }

    /// Assign the service into a constructor-style slot.
    ///
    /// # Errors
    /// `TargetInvalid` when the slot is already filled, plus the `get`
    /// failure modes.
    pub fn inject<T: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
        slot: &mut ServiceSlot<T>,
    ) -> Result<(), ServiceError> {
        if slot.is_filled() {
            return Err(ServiceError::TargetInvalid {
                name: name.to_owned(),
            });
        }
        slot.inner = Some(self.get::<T>(name)?);
        Ok(())
    }

    /// Check a declared dependency against the current registry state and
    /// return the registry name of the matching service.
    ///
    /// # Errors
    /// `InterfaceNotFound` / `NotFound` when nothing matches, `WrongType` /
    /// `WrongInterface` when the match violates the declaration.
    pub fn verify(&self, dep: &ServiceDependency) -> Result<Arc<str>, ServiceError> {
        let r = self.inner.read();
        if dep.match_by_interface {
            // Invariant checked at registry build time; guard anyway.
            let interface = dep.interface.ok_or_else(|| ServiceError::InvalidDependency {
                name: dep.name.clone(),
            })?;
            return r
                .entries
                .iter()
                .find(|e| e.interfaces.iter().any(|(k, _)| *k == interface))
                .map(|e| e.meta.name.clone())
                .ok_or(ServiceError::InterfaceNotFound { interface });
        }

        let idx = *r
            .index
            .get(dep.name.as_str())
            .ok_or_else(|| ServiceError::NotFound {
                name: dep.name.clone(),
            })?;
        let entry = &r.entries[idx];
        if let Some(expected) = dep.concrete {
            if entry.concrete_key != expected {
                return Err(ServiceError::WrongType {
                    name: dep.name.clone(),
                    expected,
                    actual: entry.meta.type_name,
                });
            }
        }
        if let Some(interface) = dep.interface {
            if !entry.interfaces.iter().any(|(k, _)| *k == interface) {
                return Err(ServiceError::WrongInterface {
                    name: dep.name.clone(),
                    interface,
                });
            }
        }
        Ok(entry.meta.name.clone())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().index.contains_key(name)
    }

    /// Metadata for one entry.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<ServiceEntryMeta> {
        let r = self.inner.read();
        r.index.get(name).map(|&idx| r.entries[idx].meta.clone())
    }

    /// Metadata for all entries, in registration order.
    #[must_use]
    pub fn entries(&self) -> Vec<ServiceEntryMeta> {
        self.inner.read().entries.iter().map(|e| e.meta.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    // Names only, never instances.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<Arc<str>> = self
            .inner
            .read()
            .entries
            .iter()
            .map(|e| e.meta.name.clone())
            .collect();
        f.debug_struct("ServiceRegistry")
            .field("services", &names)
            .finish()
    }
}

/// Constructor-style injection target: an optional `Arc<T>` that may be
/// filled exactly once.
pub struct ServiceSlot<T: ?Sized> {
    inner: Option<Arc<T>>,
}

impl<T: ?Sized> ServiceSlot<T> {
    #[must_use]
    pub const fn empty() -> Self {
        Self { inner: None }
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.inner.is_some()
    }

    #[must_use]
    pub fn get(&self) -> Option<&Arc<T>> {
        self.inner.as_ref()
    }

    pub fn take(&mut self) -> Option<Arc<T>> {
        self.inner.take()
    }
}

impl<T: ?Sized> Default for ServiceSlot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Registry view handed to a module's `publish_services`; attributes every
/// registration to the publishing module.
pub struct ServicePublisher<'a> {
    registry: &'a ServiceRegistry,
    module: &'a str,
}

impl<'a> ServicePublisher<'a> {
    pub(crate) fn new(registry: &'a ServiceRegistry, module: &'a str) -> Self {
        Self { registry, module }
    }

    /// # Errors
    /// See [`ServiceRegistry::register`].
    pub fn register<T: Send + Sync + 'static>(
        &self,
        name: &str,
        instance: Arc<T>,
    ) -> Result<(), ServiceError> {
        self.registry.register(name, instance, Some(self.module))
    }

    /// # Errors
    /// See [`ServiceRegistry::expose_interface`].
    pub fn expose_interface<I: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
        instance: Arc<I>,
    ) -> Result<(), ServiceError> {
        self.registry.expose_interface(name, instance)
    }

    #[must_use]
    pub fn module(&self) -> &str {
        self.module
    }
}

/// Services resolved for one module before its init, keyed by the local
/// dependency name.
pub struct ResolvedServices {
    registry: Arc<ServiceRegistry>,
    by_dep: std::collections::BTreeMap<String, Arc<str>>,
}

impl ResolvedServices {
    pub(crate) fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            by_dep: std::collections::BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, dep_name: impl Into<String>, service_name: Arc<str>) {
        self.by_dep.insert(dep_name.into(), service_name);
    }

    /// Fetch a resolved dependency as `T`.
    ///
    /// # Errors
    /// `NotFound` when the dependency was not resolved (e.g. optional and
    /// absent), plus the registry `get` failure modes.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, dep_name: &str) -> Result<Arc<T>, ServiceError> {
        let service = self
            .by_dep
            .get(dep_name)
            .ok_or_else(|| ServiceError::NotFound {
                name: dep_name.to_owned(),
            })?;
        self.registry.get::<T>(service)
    }

    /// Registry name the dependency resolved to.
    #[must_use]
    pub fn service_name(&self, dep_name: &str) -> Option<&str> {
        self.by_dep.get(dep_name).map(|s| &**s)
    }

    #[must_use]
    pub fn dependency_names(&self) -> Vec<&str> {
        self.by_dep.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_dep.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_dep.is_empty()
    }
}

impl fmt::Debug for ResolvedServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedServices")
            .field("dependencies", &self.by_dep)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    #[derive(Debug)]
    struct English;
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_owned()
        }
    }

    #[derive(Debug)]
    struct French;
    impl Greeter for French {
        fn greet(&self) -> String {
            "bonjour".to_owned()
        }
    }

    #[test]
    fn register_then_get_concrete() {
        let reg = ServiceRegistry::new();
        reg.register("greeter.en", Arc::new(English), Some("lang")).unwrap();

        let got = reg.get::<English>("greeter.en").unwrap();
        assert_eq!(got.greet(), "hello");
    }

    #[test]
    fn duplicate_registration_fails_and_keeps_original() {
        let reg = ServiceRegistry::new();
        reg.register("svc", Arc::new(English), Some("a")).unwrap();

        let err = reg.register("svc", Arc::new(French), Some("b")).unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyRegistered { .. }));

        let got = reg.get::<English>("svc").unwrap();
        assert_eq!(got.greet(), "hello");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn interface_lookup_is_registration_ordered() {
        let reg = ServiceRegistry::new();
        let en: Arc<dyn Greeter> = Arc::new(English);
        let fr: Arc<dyn Greeter> = Arc::new(French);

        reg.register("greeter.en", Arc::new(English), None).unwrap();
        reg.expose_interface::<dyn Greeter>("greeter.en", en).unwrap();
        reg.register("greeter.fr", Arc::new(French), None).unwrap();
        reg.expose_interface::<dyn Greeter>("greeter.fr", fr).unwrap();

        let all = reg.by_interface::<dyn Greeter>();
        let names: Vec<&str> = all.iter().map(|(n, _)| &**n).collect();
        assert_eq!(names, vec!["greeter.en", "greeter.fr"]);

        let (first, svc) = reg.first_by_interface::<dyn Greeter>().unwrap();
        assert_eq!(&*first, "greeter.en");
        assert_eq!(svc.greet(), "hello");
    }

    #[test]
    fn get_resolves_interface_binding_by_name() {
        let reg = ServiceRegistry::new();
        reg.register("svc", Arc::new(English), None).unwrap();
        reg.expose_interface::<dyn Greeter>("svc", Arc::new(English)).unwrap();

        let as_iface = reg.get::<dyn Greeter>("svc").unwrap();
        assert_eq!(as_iface.greet(), "hello");
    }

    #[test]
    fn get_unknown_name_is_not_found() {
        let reg = ServiceRegistry::new();
        let err = reg.get::<English>("missing").unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { name } if name == "missing"));
    }

    #[test]
    fn get_wrong_type_is_incompatible() {
        let reg = ServiceRegistry::new();
        reg.register("svc", Arc::new(English), None).unwrap();

        let err = reg.get::<French>("svc").unwrap_err();
        assert!(matches!(err, ServiceError::Incompatible { .. }));
    }

    #[test]
    fn inject_fills_slot_once() {
        let reg = ServiceRegistry::new();
        reg.register("svc", Arc::new(English), None).unwrap();

        let mut slot: ServiceSlot<English> = ServiceSlot::empty();
        reg.inject("svc", &mut slot).unwrap();
        assert!(slot.is_filled());
        assert_eq!(slot.get().unwrap().greet(), "hello");

        let err = reg.inject("svc", &mut slot).unwrap_err();
        assert!(matches!(err, ServiceError::TargetInvalid { .. }));
    }

    #[test]
    fn verify_name_mode_checks_types() {
        let reg = ServiceRegistry::new();
        reg.register("svc", Arc::new(English), None).unwrap();
        reg.expose_interface::<dyn Greeter>("svc", Arc::new(English)).unwrap();

        let ok = ServiceDependency::named("svc")
            .with_concrete::<English>()
            .with_interface::<dyn Greeter>();
        assert_eq!(&*reg.verify(&ok).unwrap(), "svc");

        let wrong_type = ServiceDependency::named("svc").with_concrete::<French>();
        assert!(matches!(reg.verify(&wrong_type), Err(ServiceError::WrongType { .. })));

        trait Other: Send + Sync {}
        let wrong_iface = ServiceDependency::named("svc").with_interface::<dyn Other>();
        assert!(matches!(
            reg.verify(&wrong_iface),
            Err(ServiceError::WrongInterface { .. })
        ));
    }

    #[test]
    fn verify_interface_mode_picks_first_provider() {
        let reg = ServiceRegistry::new();
        reg.register("b.svc", Arc::new(French), None).unwrap();
        reg.expose_interface::<dyn Greeter>("b.svc", Arc::new(French)).unwrap();
        reg.register("a.svc", Arc::new(English), None).unwrap();
        reg.expose_interface::<dyn Greeter>("a.svc", Arc::new(English)).unwrap();

        let dep = ServiceDependency::named("greeter").by_interface::<dyn Greeter>();
        // Registration order, not name order.
        assert_eq!(&*reg.verify(&dep).unwrap(), "b.svc");
    }

    #[test]
    fn entry_metadata_records_provider() {
        let reg = ServiceRegistry::new();
        reg.register("svc", Arc::new(English), Some("lang")).unwrap();

        let meta = reg.entry("svc").unwrap();
        assert_eq!(&*meta.name, "svc");
        assert_eq!(meta.provided_by.as_deref(), Some("lang"));
        assert!(meta.type_name.contains("English"));
        assert!(meta.registered_at <= Utc::now());
    }

    #[test]
    fn resolved_services_lookup_by_dep_name() {
        let registry = Arc::new(ServiceRegistry::new());
        registry.register("greeter.en", Arc::new(English), None).unwrap();

        let mut resolved = ResolvedServices::new(registry);
        resolved.insert("greeter", Arc::from("greeter.en"));

        assert_eq!(resolved.service_name("greeter"), Some("greeter.en"));
        let svc = resolved.get::<English>("greeter").unwrap();
        assert_eq!(svc.greet(), "hello");
        assert!(matches!(
            resolved.get::<English>("unknown"),
            Err(ServiceError::NotFound { .. })
        ));
    }
}
