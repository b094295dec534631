//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Build store → Bind listeners → ServiceLifecycle
//!
//! Run (service.rs):
//!     Spawn one task per listener → wait for signal/stop/listener exit
//!
//! Shutdown (service.rs, shutdown.rs):
//!     Trigger → every listener stops accepting → concurrent drain under one
//!     deadline → abort stragglers → report → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```

pub mod service;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use service::{
    DrainOutcome, LifecycleState, Listener, ListenerReport, ServiceLifecycle, ShutdownReport,
};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use startup::{bind_service, StartupError};
