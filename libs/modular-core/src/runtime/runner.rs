//! Full-cycle runner: init → start → wait → stop.
//!
//! Shutdown can be driven by an external `CancellationToken` or an
//! arbitrary future. OS signal handling is deliberately left to the host
//! binary; wire it in via [`ShutdownOptions::Future`].

use std::{future::Future, pin::Pin};

use tokio_util::sync::CancellationToken;

use super::host_runtime::Application;

/// How the runner decides when to stop.
pub enum ShutdownOptions {
    /// An external `CancellationToken` controls the lifecycle.
    Token(CancellationToken),
    /// An arbitrary future; when it completes, shutdown begins.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

/// Options for running an application to completion.
pub struct RunOptions {
    pub shutdown: ShutdownOptions,
}

/// Drive the application through its full cycle.
///
/// # Errors
/// Propagates init/start failures immediately and stop errors after the
/// shutdown signal.
pub async fn run(mut app: Application, opts: RunOptions) -> anyhow::Result<()> {
    let shutdown = match opts.shutdown {
        ShutdownOptions::Token(token) => token,
        ShutdownOptions::Future(waiter) => {
            let token = CancellationToken::new();
            let child = token.clone();
            tokio::spawn(async move {
                waiter.await;
                tracing::info!("shutdown: external future completed");
                child.cancel();
            });
            token
        }
    };

    app.init().await?;
    app.start().await?;

    shutdown.cancelled().await;

    app.stop().await?;
    Ok(())
}
