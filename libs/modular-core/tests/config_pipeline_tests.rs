//! End-to-end configuration pipeline tests: environment and file feeding,
//! instance-aware expansion, provenance, dynamic reload and tenant
//! overlays.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use modular::{
    AppError, Application, Capability, CloudEvent, ConfigDiff, ConfigSchema, EnvFeeder, Feeder,
    FieldSpec, FileFeeder, GuardConfig, GuardMode, InstanceSpec, MapFeeder, Module, ModuleCtx,
    Observer, ReloadTrigger, SectionHandle, SectionSchema, SectionScope, TenantAwareModule,
    TenantId, TenantViolation,
};

fn rt() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Database module with an instance-aware section
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
struct ConnConfig {
    dsn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
struct DbConfig {
    connections: BTreeMap<String, ConnConfig>,
}

impl ConfigSchema for DbConfig {
    fn schema() -> SectionSchema {
        SectionSchema::new().instances(InstanceSpec::new(
            "connections",
            |key| format!("DB_{}_", key.to_uppercase()),
            SectionSchema::new().field(FieldSpec::new("dsn").env("DSN").sensitive()),
        ))
    }
}

#[derive(Default)]
struct DatabaseModule {
    cfg: OnceLock<Arc<SectionHandle<DbConfig>>>,
}

#[async_trait]
impl Module for DatabaseModule {
    fn name(&self) -> &str {
        "database"
    }
    async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }
}

impl modular::ConfigurableModule for DatabaseModule {
    fn register_config(&self, sections: &SectionScope<'_>) -> anyhow::Result<()> {
        let mut initial = DbConfig::default();
        initial
            .connections
            .insert("primary".to_owned(), ConnConfig::default());
        let handle = sections.register("database", initial)?;
        let _ = self.cfg.set(handle);
        Ok(())
    }
}

#[test]
fn env_feeds_main_and_instance_sections_with_provenance() {
    temp_env::with_vars(
        [
            ("APP_NAME", Some("demo")),
            ("DB_PRIMARY_DSN", Some("postgres://x")),
        ],
        || {
            rt().block_on(async {
                let db = Arc::new(DatabaseModule::default());
                let mut app = Application::builder("config-app")
                    .with_feeder(Arc::new(EnvFeeder::new()))
                    .register_module(db.clone())
                    .add_capability("database", Capability::Configurable(db.clone()))
                    .build();

                app.init().await.unwrap();

                let main = app.main_config().unwrap();
                assert_eq!(main.app_name, "demo");

                let cfg = db.cfg.get().unwrap().get();
                assert_eq!(cfg.connections["primary"].dsn, "postgres://x");

                let prov = app.provenance().effective("_main.app_name").unwrap();
                assert_eq!(prov.source, "env");
                assert_eq!(prov.source_detail, "APP_NAME");

                let prov = app
                    .provenance()
                    .effective("database.connections.primary.dsn")
                    .unwrap();
                assert_eq!(prov.source_detail, "DB_PRIMARY_DSN");

                // The diagnostic dump redacts the sensitive dsn field.
                let dump = app.effective_config().unwrap();
                assert_eq!(dump["_main"]["app_name"], "demo");
                assert_eq!(
                    dump["database"]["connections"]["primary"]["dsn"],
                    "[REDACTED]"
                );
            });
        },
    );
}

// ---------------------------------------------------------------------------
// File + env layering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
struct WebConfig {
    host: String,
    port: u16,
}

impl ConfigSchema for WebConfig {
    fn schema() -> SectionSchema {
        SectionSchema::new()
            .field(FieldSpec::new("host").env("HOST").default_value(json!("127.0.0.1")))
            .field(FieldSpec::new("port").env("PORT").default_value(json!(8080)))
    }
}

#[derive(Default)]
struct WebModule {
    cfg: OnceLock<Arc<SectionHandle<WebConfig>>>,
}

#[async_trait]
impl Module for WebModule {
    fn name(&self) -> &str {
        "web"
    }
    async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }
}

impl modular::ConfigurableModule for WebModule {
    fn register_config(&self, sections: &SectionScope<'_>) -> anyhow::Result<()> {
        let handle = sections.register("web", WebConfig::default())?;
        let _ = self.cfg.set(handle);
        Ok(())
    }
}

#[test]
fn env_overrides_file_which_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("app.yaml");
    let mut f = std::fs::File::create(&file).unwrap();
    f.write_all(b"web:\n  host: file-host\n  port: 7000\n").unwrap();

    temp_env::with_vars(
        [
            ("WEB_PORT", Some("9000")),
            // Isolate from ambient variables that would match the host tag.
            ("WEB_HOST", None),
            ("HOST_WEB", None),
            ("HOST", None),
        ],
        || {
            rt().block_on(async {
                let web = Arc::new(WebModule::default());
                let mut app = Application::builder("layering")
                    .with_feeder(Arc::new(FileFeeder::new(&file)))
                    .with_feeder(Arc::new(EnvFeeder::new()))
                    .register_module(web.clone())
                    .add_capability("web", Capability::Configurable(web.clone()))
                    .build();

                app.init().await.unwrap();

                let cfg = web.cfg.get().unwrap().get();
                // File beat the default, env beat the file.
                assert_eq!(cfg.host, "file-host");
                assert_eq!(cfg.port, 9000);
            });
        },
    );
}

// ---------------------------------------------------------------------------
// Dynamic reload
// ---------------------------------------------------------------------------

/// Programmatic feeder whose payload can be swapped between load passes.
struct DynFeeder {
    inner: Mutex<MapFeeder>,
}

impl DynFeeder {
    fn new(sections: serde_json::Value) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(MapFeeder::new(sections)),
        })
    }

    fn set(&self, sections: serde_json::Value) {
        *self.inner.lock().unwrap() = MapFeeder::new(sections);
    }
}

impl Feeder for DynFeeder {
    fn name(&self) -> &str {
        "dynamic"
    }
    fn feed(
        &self,
        view: &modular::config::SectionView<'_>,
    ) -> Result<Vec<modular::config::FieldWrite>, modular::ConfigError> {
        self.inner.lock().unwrap().feed(view)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
struct CacheConfig {
    ttl_seconds: u64,
}

impl ConfigSchema for CacheConfig {
    fn schema() -> SectionSchema {
        SectionSchema::new().field(FieldSpec::new("ttl_seconds"))
    }
}

#[derive(Default)]
struct CacheModule {
    cfg: OnceLock<Arc<SectionHandle<CacheConfig>>>,
    diffs: Mutex<Vec<ConfigDiff>>,
}

#[async_trait]
impl Module for CacheModule {
    fn name(&self) -> &str {
        "cache"
    }
    async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }
}

impl modular::ConfigurableModule for CacheModule {
    fn register_config(&self, sections: &SectionScope<'_>) -> anyhow::Result<()> {
        let handle = sections.register("cache", CacheConfig::default())?;
        let _ = self.cfg.set(handle);
        Ok(())
    }
}

#[async_trait]
impl modular::ReloadableModule for CacheModule {
    async fn on_config_reload(&self, diff: &ConfigDiff) -> anyhow::Result<()> {
        self.diffs.lock().unwrap().push(diff.clone());
        Ok(())
    }
}

struct ReloadEventRecorder {
    events: Mutex<Vec<CloudEvent>>,
}

#[async_trait]
impl Observer for ReloadEventRecorder {
    fn id(&self) -> &str {
        "reload-recorder"
    }
    async fn on_event(&self, event: &CloudEvent) -> anyhow::Result<()> {
        if event.event_type.starts_with("com.modular.config.reload") {
            self.events.lock().unwrap().push(event.clone());
        }
        Ok(())
    }
}

#[tokio::test]
async fn reload_commits_new_values_and_correlates_events() {
    let feeder = DynFeeder::new(json!({"cache": {"ttl_seconds": 60}}));
    let cache = Arc::new(CacheModule::default());

    let mut app = Application::builder("reload")
        .with_feeder(feeder.clone())
        .register_module(cache.clone())
        .add_capability("cache", Capability::Configurable(cache.clone()))
        .add_capability("cache", Capability::Reloadable(cache.clone()))
        .build();

    let recorder = Arc::new(ReloadEventRecorder {
        events: Mutex::new(Vec::new()),
    });
    app.events()
        .register_observer(recorder.clone(), Vec::<String>::new());

    app.init().await.unwrap();
    assert_eq!(cache.cfg.get().unwrap().get().ttl_seconds, 60);

    feeder.set(json!({"cache": {"ttl_seconds": 120}}));
    let report = app.reload_config(ReloadTrigger::FileChange).await.unwrap();

    assert!(!report.noop);
    assert_eq!(report.affected, vec!["cache".to_owned()]);
    assert_eq!(cache.cfg.get().unwrap().get().ttl_seconds, 120);

    // The module's hook saw the change.
    let diffs = cache.diffs.lock().unwrap();
    assert_eq!(diffs.len(), 1);
    assert!(diffs[0].changed.contains_key("cache.ttl_seconds"));

    // started + completed share the reload id; started comes first.
    let events = recorder.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, "com.modular.config.reload.started");
    assert_eq!(events[1].event_type, "com.modular.config.reload.completed");
    assert_eq!(events[0].data["reload_id"], events[1].data["reload_id"]);
    assert_eq!(events[0].data["trigger"], "file_change");
    assert!(events[1].time >= events[0].time);
}

#[tokio::test]
async fn reload_without_changes_is_a_noop() {
    let feeder = DynFeeder::new(json!({"cache": {"ttl_seconds": 60}}));
    let cache = Arc::new(CacheModule::default());

    let mut app = Application::builder("reload-noop")
        .with_feeder(feeder.clone())
        .register_module(cache.clone())
        .add_capability("cache", Capability::Configurable(cache.clone()))
        .add_capability("cache", Capability::Reloadable(cache.clone()))
        .build();

    let recorder = Arc::new(ReloadEventRecorder {
        events: Mutex::new(Vec::new()),
    });
    app.events()
        .register_observer(recorder.clone(), Vec::<String>::new());

    app.init().await.unwrap();
    let report = app.reload_config(ReloadTrigger::Manual).await.unwrap();

    assert!(report.noop);
    assert!(report.affected.is_empty());
    assert!(cache.diffs.lock().unwrap().is_empty());

    // started + exactly one terminal event, correlated by reload id.
    let events = recorder.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, "com.modular.config.reload.started");
    assert_eq!(events[1].event_type, "com.modular.config.reload.noop");
    assert_eq!(events[0].data["reload_id"], events[1].data["reload_id"]);
    assert!(events[1].time >= events[0].time);
}

#[tokio::test]
async fn reload_without_hook_queues_the_module() {
    let feeder = DynFeeder::new(json!({"web": {"host": "a", "port": 1}}));
    let web = Arc::new(WebModule::default());

    let mut app = Application::builder("reload-pending")
        .with_feeder(feeder.clone())
        .register_module(web.clone())
        .add_capability("web", Capability::Configurable(web.clone()))
        .build();

    app.init().await.unwrap();
    feeder.set(json!({"web": {"host": "b", "port": 1}}));
    let report = app.reload_config(ReloadTrigger::ApiRequest).await.unwrap();

    assert!(report.affected.is_empty());
    assert_eq!(report.pending, vec!["web".to_owned()]);
    assert_eq!(app.pending_reload_modules(), &["web".to_owned()]);
    // Values are committed regardless; the module reads them lazily.
    assert_eq!(web.cfg.get().unwrap().get().host, "b");
}

// ---------------------------------------------------------------------------
// Tenants
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TenantTracker {
    seen: Mutex<Vec<TenantId>>,
}

struct TenantModule {
    tracker: Arc<TenantTracker>,
}

#[async_trait]
impl Module for TenantModule {
    fn name(&self) -> &str {
        "tenant-watcher"
    }
    async fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl TenantAwareModule for TenantModule {
    async fn on_tenant_registered(&self, tenant: &TenantId) -> anyhow::Result<()> {
        self.tracker.seen.lock().unwrap().push(tenant.clone());
        Ok(())
    }
    async fn on_tenant_removed(&self, _tenant: &TenantId) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn tenant_directory_is_loaded_and_modules_notified() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("tenant-acme.yaml"),
        "web:\n  host: acme.example\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("tenant-globex.json"),
        r#"{"web": {"host": "globex.example"}}"#,
    )
    .unwrap();

    let tracker = Arc::new(TenantTracker::default());
    let module = Arc::new(TenantModule {
        tracker: tracker.clone(),
    });

    let mut app = Application::builder("tenants")
        .with_tenant_config_dir(dir.path())
        .register_module(module.clone())
        .add_capability("tenant-watcher", Capability::TenantAware(module.clone()))
        .build();

    app.init().await.unwrap();

    let mut seen = tracker.seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(
        seen,
        vec![TenantId::from("tenant-acme"), TenantId::from("tenant-globex")]
    );

    let tenants = app.tenants().unwrap();
    let overlay = tenants
        .get_tenant_config(&TenantId::from("tenant-acme"), "web")
        .unwrap();
    assert_eq!(overlay.raw()["host"], "acme.example");
}

#[tokio::test]
async fn missing_tenant_directory_fails_init() {
    let mut app = Application::builder("tenants-missing")
        .with_tenant_config_dir("/nonexistent/tenants")
        .build();

    let err = app.init().await.unwrap_err();
    assert!(matches!(err, AppError::Tenant(_)), "got: {err:?}");
}

#[tokio::test]
async fn strict_guard_enforces_whitelist_end_to_end() {
    let mut whitelist = std::collections::HashMap::new();
    whitelist.insert("reporting".to_owned(), vec!["analytics".to_owned()]);

    let app = Application::builder("guarded")
        .with_tenants()
        .with_tenant_guard(GuardConfig {
            mode: GuardMode::Strict,
            whitelist,
            max_recorded_violations: 16,
        })
        .build();

    let guard = app.tenant_guard().unwrap();
    assert!(guard.validate_access(TenantViolation::cross_tenant(
        "reporting",
        "analytics/report.csv"
    )));
    assert!(!guard.validate_access(TenantViolation::cross_tenant("reporting", "billing/x")));

    let violations = guard.recent_violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].accessed_resource, "billing/x");
}
