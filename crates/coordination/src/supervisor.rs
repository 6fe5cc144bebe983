use crate::signal::{ServiceExit, StopHandle, StopSignal};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info};

/// Runs a service forever, restarting it with fresh state after every run.
///
/// Each run gets its own [`StopHandle`], a child of `shutdown`. A run that ends with
/// [`ServiceExit::UniverseChanged`] restarts immediately; one that fails restarts after
/// `restart_delay`; [`ServiceExit::Shutdown`] or a fired `shutdown` signal ends the loop.
pub async fn run_forever<F, Fut>(
    name: &str,
    shutdown: StopSignal,
    restart_delay: Duration,
    mut factory: F,
) where
    F: FnMut(StopHandle) -> Fut,
    Fut: Future<Output = anyhow::Result<ServiceExit>>,
{
    let mut runs: u64 = 0;
    loop {
        if shutdown.is_stopped() {
            info!(service = name, "Service stopped");
            return;
        }

        runs += 1;
        info!(service = name, run = runs, "Starting service");
        let (handle, _signal) = shutdown.child();

        match factory(handle).await {
            Ok(ServiceExit::Shutdown) => {
                info!(service = name, "Service shut down");
                return;
            }
            Ok(ServiceExit::UniverseChanged) => {
                info!(service = name, "Universe changed, restarting service");
            }
            Err(e) => {
                error!(service = name, error = %e, "Service failed, restarting");
                tokio::select! {
                    _ = tokio::time::sleep(restart_delay) => {}
                    _ = shutdown.stopped() => {
                        info!(service = name, "Service stopped");
                        return;
                    }
                }
            }
        }
    }
}
