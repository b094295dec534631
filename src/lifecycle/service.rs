//! Coordinated run and drain of every network listener.
//!
//! ```text
//! Initializing ──run_until──▶ Running ──signal / stop / listener exit──▶ Draining ──▶ Stopped
//! ```
//!
//! Listeners drain concurrently under one shared deadline, so total shutdown
//! latency is bounded by the deadline rather than the sum of drains. A
//! listener still busy at the deadline is aborted and reported as forced.
//! Each listener owns its connection tasks, so aborting it abandons every
//! request it was still serving.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::lifecycle::shutdown::{Shutdown, ShutdownSignal};
use crate::observability::metrics;

/// A bound, network-facing server driven by one protocol adapter.
pub trait Listener: Send {
    /// Short name used in logs and reports (e.g. "http").
    fn name(&self) -> &'static str;

    /// Address the listener is bound to.
    fn local_addr(&self) -> SocketAddr;

    /// Serve until `shutdown` fires, then stop accepting and finish in-flight
    /// work before returning.
    fn serve(self: Box<Self>, shutdown: ShutdownSignal) -> BoxFuture<'static, std::io::Result<()>>;
}

/// Where the service is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Initializing,
    Running,
    Draining,
    Stopped,
}

/// How one listener stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Finished in-flight work before the deadline.
    Clean,
    /// Still busy at the deadline; remaining work was abandoned.
    Forced,
    /// Exited with an error or panicked.
    Failed(String),
}

impl DrainOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrainOutcome::Clean => "clean",
            DrainOutcome::Forced => "forced",
            DrainOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerReport {
    pub name: &'static str,
    pub outcome: DrainOutcome,
}

/// Result of a full shutdown, one entry per listener.
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub listeners: Vec<ListenerReport>,
    /// Time from the start of the drain until every listener stopped.
    pub elapsed: Duration,
}

impl ShutdownReport {
    /// True when every listener drained cleanly.
    pub fn is_clean(&self) -> bool {
        self.listeners
            .iter()
            .all(|report| report.outcome == DrainOutcome::Clean)
    }

    pub fn outcome(&self, name: &str) -> Option<&DrainOutcome> {
        self.listeners
            .iter()
            .find(|report| report.name == name)
            .map(|report| &report.outcome)
    }
}

/// Runs a set of bound listeners and stops them together.
pub struct ServiceLifecycle {
    listeners: Vec<Box<dyn Listener>>,
    drain_timeout: Duration,
    shutdown: Shutdown,
    state: watch::Sender<LifecycleState>,
}

struct ListenerTask {
    name: &'static str,
    handle: JoinHandle<std::io::Result<()>>,
}

impl ServiceLifecycle {
    pub fn new(drain_timeout: Duration) -> Self {
        let (state, _) = watch::channel(LifecycleState::Initializing);
        Self {
            listeners: Vec::new(),
            drain_timeout,
            shutdown: Shutdown::new(),
            state,
        }
    }

    pub fn add_listener<L>(&mut self, listener: L)
    where
        L: Listener + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Bound address of the named listener.
    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.listeners
            .iter()
            .find(|listener| listener.name() == name)
            .map(|listener| listener.local_addr())
    }

    /// Handle that stops the service when triggered, as a signal would.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Observe lifecycle state transitions.
    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Run until SIGINT/SIGTERM, then drain.
    pub async fn run(self) -> ShutdownReport {
        self.run_until(crate::lifecycle::signals::termination()).await
    }

    /// Run every listener until `signal` resolves, the shutdown handle is
    /// triggered, or any listener exits on its own. Then drain all of them.
    pub async fn run_until<F>(self, signal: F) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        let ServiceLifecycle {
            listeners,
            drain_timeout,
            shutdown,
            state,
        } = self;

        let (exited_tx, mut exited_rx) = mpsc::unbounded_channel();
        let tasks: Vec<ListenerTask> = listeners
            .into_iter()
            .map(|listener| {
                let name = listener.name();
                tracing::info!(listener = name, address = %listener.local_addr(), "Listener starting");
                let serving = listener.serve(shutdown.subscribe());
                let exited_tx = exited_tx.clone();
                let handle = tokio::spawn(async move {
                    let result = serving.await;
                    let _ = exited_tx.send(name);
                    result
                });
                ListenerTask { name, handle }
            })
            .collect();
        drop(exited_tx);
        state.send_replace(LifecycleState::Running);

        let mut stop = shutdown.subscribe();
        tokio::select! {
            _ = signal => {}
            _ = stop.recv() => tracing::info!("Stop requested"),
            Some(name) = exited_rx.recv() => {
                tracing::error!(listener = name, "Listener exited while running");
            }
        }

        let started = Instant::now();
        state.send_replace(LifecycleState::Draining);
        shutdown.trigger();
        tracing::info!(
            listeners = tasks.len(),
            drain_timeout_ms = drain_timeout.as_millis() as u64,
            "Draining listeners"
        );

        let deadline = started + drain_timeout;
        let listeners = join_all(tasks.into_iter().map(|task| drain(task, deadline))).await;

        state.send_replace(LifecycleState::Stopped);
        let report = ShutdownReport {
            listeners,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            clean = report.is_clean(),
            "All listeners stopped"
        );
        report
    }
}

async fn drain(task: ListenerTask, deadline: Instant) -> ListenerReport {
    let ListenerTask { name, mut handle } = task;

    let outcome = match tokio::time::timeout_at(deadline, &mut handle).await {
        Ok(Ok(Ok(()))) => DrainOutcome::Clean,
        Ok(Ok(Err(e))) => DrainOutcome::Failed(e.to_string()),
        Ok(Err(join_error)) => DrainOutcome::Failed(join_error.to_string()),
        Err(_) => {
            // Wait for the cancelled task to be dropped so none of its work
            // outlives the report.
            handle.abort();
            let _ = handle.await;
            DrainOutcome::Forced
        }
    };

    match &outcome {
        DrainOutcome::Clean => tracing::info!(listener = name, "Listener drained"),
        DrainOutcome::Forced => {
            tracing::warn!(listener = name, "Drain deadline exceeded, forcing stop")
        }
        DrainOutcome::Failed(error) => {
            tracing::error!(listener = name, error = %error, "Listener failed")
        }
    }
    metrics::record_drain(name, outcome.as_str());

    ListenerReport { name, outcome }
}
