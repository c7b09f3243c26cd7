//! Application runtime: lifecycle orchestration and the convenience
//! runner.

pub mod host_runtime;
pub mod runner;

pub use host_runtime::{AppBuilder, AppError, AppSettings, Application};
pub use runner::{RunOptions, ShutdownOptions, run};
