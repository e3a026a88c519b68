use crate::registry::NeighRegistry;
use futures::future::{self, Either};
use futures::pin_mut;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

///
/// Drives every table of a registry on a fixed tick: entry timers, the periodic sweep and the
/// proxy queues all fire from `NeighRegistry::poll`.
///
/// The tick bounds how late a timer may fire. Must be spawned from inside a Tokio runtime.
///
pub struct NeighDaemon {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl NeighDaemon {
    pub fn spawn(registry: Arc<NeighRegistry>, tick: Duration) -> Self {
        let (shutdown, mut stop) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            info!(tick = ?tick, "neighbour daemon started");
            let mut ticks = time::interval(tick);
            loop {
                let next = ticks.tick();
                pin_mut!(next);
                match future::select(next, &mut stop).await {
                    Either::Left(_) => {
                        if let Some(deadline) = registry.poll() {
                            debug!(deadline = ?deadline, "neighbour tables polled");
                        }
                    }
                    Either::Right(_) => break,
                }
            }
            info!("neighbour daemon stopped");
        });

        NeighDaemon {
            shutdown: Some(shutdown),
            handle,
        }
    }

    /// Stops the loop and waits for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = self.handle.await {
            warn!(error = %e, "neighbour daemon did not stop cleanly");
        }
    }
}
