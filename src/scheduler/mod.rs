//! Background task scheduler (§4.K).
//!
//! The interval-tick/shutdown-signal `tokio::select!` shape is grounded on
//! `main.rs`'s original main loop; generalized here from one inline loop
//! into a named, restartable task registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Hard ceiling on a single task run, §4.K. A run exceeding this is logged
/// and abandoned; the next tick still fires on schedule.
const MAX_RUN_SECS: u64 = 300;

type TaskFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct Registration {
    handle: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
}

/// A registry of named, interval-driven background tasks.
///
/// Registering under a name that's already running cancels the previous
/// instance first, so re-registering a task never leaves two copies alive.
#[derive(Default)]
pub struct Scheduler {
    tasks: HashMap<String, Registration>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    /// Register a named task. `task()` runs once immediately (the first
    /// `tokio::time::interval` tick fires without delay) and then every
    /// `interval`, until [`Scheduler::stop`] is called.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, interval: Duration, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if let Some(previous) = self.tasks.remove(&name) {
            let _ = previous.stop_tx.send(true);
            previous.handle.abort();
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task: TaskFn = Arc::new(move || Box::pin(task()));
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let run = (task)();
                        if tokio::time::timeout(Duration::from_secs(MAX_RUN_SECS), run).await.is_err() {
                            warn!(task = %task_name, "run exceeded {MAX_RUN_SECS}s, abandoning");
                        }
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            info!(task = %task_name, "stopping");
                            break;
                        }
                    }
                }
            }
        });

        self.tasks.insert(name, Registration { handle, stop_tx });
    }

    /// Cancel every registered task and wait for all of them to finish.
    pub async fn stop(mut self) {
        for (name, reg) in self.tasks.drain() {
            let _ = reg.stop_tx.send(true);
            if let Err(e) = reg.handle.await {
                if !e.is_cancelled() {
                    error!(task = %name, error = %e, "task panicked during shutdown");
                }
            }
        }
    }
}
