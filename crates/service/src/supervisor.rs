use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Owns the long-running component tasks and the shared shutdown signal.
/// Components receive a watch receiver and exit at their next suspension
/// point once `shutdown` fires.
pub struct Supervisor {
    shutdown: watch::Sender<bool>,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn spawn<F>(&mut self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(component = name, "starting component");
        self.handles.push((name.to_string(), tokio::spawn(future)));
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Await every component task. Panicked or cancelled tasks are
    /// logged; the others are still drained.
    pub async fn wait(self) {
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                error!(component = %name, error = %e, "component task failed");
            }
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
