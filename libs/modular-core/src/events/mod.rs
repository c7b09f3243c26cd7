//! Framework eventing: CloudEvents-style envelopes and observer fan-out.

pub mod cloudevent;
pub mod observer;

pub use cloudevent::CloudEvent;
pub use observer::{Observer, ObserverSubject};

/// Event types emitted by the runtime itself, reverse-domain notation.
pub mod types {
    pub const MODULE_REGISTERED: &str = "com.modular.module.registered";
    pub const MODULE_INITIALIZED: &str = "com.modular.module.initialized";
    pub const MODULE_STARTED: &str = "com.modular.module.started";
    pub const MODULE_STOPPED: &str = "com.modular.module.stopped";
    pub const MODULE_FAILED: &str = "com.modular.module.failed";

    pub const SERVICE_REGISTERED: &str = "com.modular.service.registered";

    pub const APPLICATION_STARTED: &str = "com.modular.application.started";
    pub const APPLICATION_STOPPED: &str = "com.modular.application.stopped";
    pub const APPLICATION_FAILED: &str = "com.modular.application.failed";

    pub const CONFIG_RELOAD_STARTED: &str = "com.modular.config.reload.started";
    pub const CONFIG_RELOAD_COMPLETED: &str = "com.modular.config.reload.completed";
    pub const CONFIG_RELOAD_FAILED: &str = "com.modular.config.reload.failed";
    pub const CONFIG_RELOAD_NOOP: &str = "com.modular.config.reload.noop";

    pub const TENANT_REGISTERED: &str = "com.modular.tenant.registered";
    pub const TENANT_REMOVED: &str = "com.modular.tenant.removed";
}
