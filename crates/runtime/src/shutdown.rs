//! Termination signal handling.
use std::{future::Future, io};

use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::debug;

/// Listener for SIGINT and SIGTERM.
#[derive(Debug)]
pub struct ShutdownSignal {
    term: Signal,
}

impl ShutdownSignal {
    /// Installs the SIGTERM handler. Must be called within a tokio runtime.
    pub fn new() -> io::Result<Self> {
        Ok(Self { term: signal(SignalKind::terminate())? })
    }

    /// Waits for the first SIGINT or SIGTERM.
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => debug!("Received SIGINT signal"),
            _ = self.term.recv() => debug!("Received SIGTERM signal"),
        }
    }
}

/// Drives `fut` until it completes or a termination signal arrives.
///
/// Returns `None` when interrupted, after running `on_shutdown`.
pub async fn run_until_shutdown<F, O, C>(
    fut: F,
    mut shutdown: ShutdownSignal,
    on_shutdown: C,
) -> Option<O>
where
    F: Future<Output = O>,
    C: FnOnce(),
{
    tokio::select! {
        // boxed so the driver's state machine stays off the stack
        result = Box::pin(fut) => Some(result),
        () = shutdown.recv() => {
            on_shutdown();
            None
        }
    }
}
