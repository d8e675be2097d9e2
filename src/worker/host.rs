//! Host-side lifecycle and event dispatch
//!
//! [`WorkerHost`] stands in for the runtime that owns one worker version:
//! handlers are registered against it once at start-up, then it delivers
//! the install signal and fetch events. [`WorkerContainer`] tracks which
//! version is active and routes requests to it.
//!
//! # Lifecycle
//!
//! | From | Event | To |
//! |------|-------|----|
//! | parsed | install dispatched | installing |
//! | installing | handler succeeded | installed |
//! | installing | handler failed | redundant |
//! | installed | activate | activated |
//! | activated | replaced by newer version | redundant |

use crate::error::{PrecacheError, PrecacheResult};
use crate::network::{Fetcher, Request, Response};
use futures_util::future::BoxFuture;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Lifecycle state of one worker version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activated,
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsed => write!(f, "parsed"),
            Self::Installing => write!(f, "installing"),
            Self::Installed => write!(f, "installed"),
            Self::Activated => write!(f, "activated"),
            Self::Redundant => write!(f, "redundant"),
        }
    }
}

/// Install handler; the install is not finished until its future resolves
pub type InstallHandler = Arc<dyn Fn() -> BoxFuture<'static, PrecacheResult<()>> + Send + Sync>;

/// Fetch handler; answers one intercepted request
pub type FetchHandler =
    Arc<dyn Fn(Request) -> BoxFuture<'static, PrecacheResult<Response>> + Send + Sync>;

/// One worker version as seen by the host runtime
pub struct WorkerHost {
    id: u64,
    label: String,
    state: Mutex<WorkerState>,
    install_handler: Option<InstallHandler>,
    fetch_handler: Option<FetchHandler>,
    network: Arc<dyn Fetcher>,
}

impl WorkerHost {
    /// Create a host for a worker version; `network` serves requests the worker does not handle
    pub fn new(label: impl Into<String>, network: Arc<dyn Fetcher>) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            label: label.into(),
            state: Mutex::new(WorkerState::Parsed),
            install_handler: None,
            fetch_handler: None,
            network,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> WorkerState {
        *self.lock_state()
    }

    /// Register the install handler
    pub fn on_install(&mut self, handler: InstallHandler) {
        if self.install_handler.replace(handler).is_some() {
            debug!("Replaced install handler for worker {}", self.label);
        }
    }

    /// Register the fetch handler
    pub fn on_fetch(&mut self, handler: FetchHandler) {
        if self.fetch_handler.replace(handler).is_some() {
            debug!("Replaced fetch handler for worker {}", self.label);
        }
    }

    /// Deliver the install signal and wait for the handler to settle
    pub async fn install(&self) -> PrecacheResult<()> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)?;
        debug!("Worker {} installing", self.label);

        let outcome = match &self.install_handler {
            Some(handler) => handler().await,
            None => Ok(()),
        };

        match outcome {
            Ok(()) => {
                self.set_state(WorkerState::Installed);
                info!("Worker {} installed", self.label);
                Ok(())
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant);
                warn!("Worker {} failed to install: {}", self.label, e);
                Err(e)
            }
        }
    }

    /// Make an installed worker the one that intercepts fetches
    pub fn activate(&self) -> PrecacheResult<()> {
        self.transition(WorkerState::Installed, WorkerState::Activated)?;
        debug!("Worker {} activated", self.label);
        Ok(())
    }

    /// Retire the worker; it stops intercepting
    pub fn mark_redundant(&self) {
        self.set_state(WorkerState::Redundant);
    }

    /// Deliver a fetch event.
    ///
    /// Only an activated worker with a fetch handler intercepts; anything
    /// else goes straight to the network.
    pub async fn dispatch_fetch(&self, request: Request) -> PrecacheResult<Response> {
        match (&self.fetch_handler, self.state()) {
            (Some(handler), WorkerState::Activated) => handler(request).await,
            _ => self.network.fetch(&request).await,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: WorkerState) {
        *self.lock_state() = next;
    }

    fn transition(&self, expected: WorkerState, next: WorkerState) -> PrecacheResult<()> {
        let mut state = self.lock_state();
        if *state != expected {
            return Err(PrecacheError::InvalidState {
                expected: expected.to_string(),
                actual: state.to_string(),
            });
        }
        *state = next;
        Ok(())
    }
}

impl fmt::Debug for WorkerHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHost")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("state", &self.state())
            .finish()
    }
}

/// Tracks the active worker version for a scope
pub struct WorkerContainer {
    active: RwLock<Option<Arc<WorkerHost>>>,
    network: Arc<dyn Fetcher>,
}

impl WorkerContainer {
    pub fn new(network: Arc<dyn Fetcher>) -> Self {
        Self {
            active: RwLock::new(None),
            network,
        }
    }

    /// The worker currently intercepting fetches, if any
    pub fn active(&self) -> Option<Arc<WorkerHost>> {
        self.active
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Install a new worker version and activate it.
    ///
    /// On install failure the new version is redundant and the previously
    /// active version keeps serving.
    pub async fn register(&self, worker: Arc<WorkerHost>) -> PrecacheResult<()> {
        worker.install().await?;
        worker.activate()?;

        let previous = self
            .active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(Arc::clone(&worker));

        if let Some(previous) = previous {
            info!(
                "Worker {} replaced by {}",
                previous.label(),
                worker.label()
            );
            previous.mark_redundant();
        }
        Ok(())
    }

    /// Route a request through the active worker, or to the network when none is active
    pub async fn fetch(&self, request: Request) -> PrecacheResult<Response> {
        match self.active() {
            Some(worker) => worker.dispatch_fetch(request).await,
            None => self.network.fetch(&request).await,
        }
    }
}
