//! Cooperative shutdown.
//!
//! Every long-running activity is spawned through a [`ShutdownCoordinator`]
//! and receives a child of its root [`CancellationToken`]. The coordinator
//! waits for a trigger (normally SIGINT/SIGTERM), cancels the root, and
//! joins every activity before returning. Nothing is aborted: activities
//! observe cancellation at their blocking points and return on their own.
//!
//! An activity that hits an unrecoverable error, or loses the hub
//! connection it serves, escalates through a [`ShutdownHandle`], which
//! records the reason and cancels the root the same way a signal would.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::CoreError;

/// Why the coordinator stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A termination signal (or other external trigger) fired.
    Signal(String),
    /// An activity escalated an unrecoverable error.
    Fatal(String),
    /// The connection to the sink was lost and is not coming back.
    Disconnected(String),
}

// ── ShutdownHandle ───────────────────────────────────────────────────

/// Cloneable handle for escalating a fatal error from inside an activity.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    root: CancellationToken,
    escalated: Arc<Mutex<Option<ShutdownReason>>>,
}

impl ShutdownHandle {
    /// Record an unrecoverable error and shut everything down.
    ///
    /// Only the first escalation is kept.
    pub fn fail(&self, reason: impl Into<String>) {
        self.escalate(ShutdownReason::Fatal(reason.into()));
    }

    /// Record that the sink connection is gone and shut everything down.
    pub fn disconnected(&self, reason: impl Into<String>) {
        self.escalate(ShutdownReason::Disconnected(reason.into()));
    }

    fn escalate(&self, reason: ShutdownReason) {
        {
            let mut escalated = self.escalated.lock().unwrap_or_else(PoisonError::into_inner);
            if escalated.is_none() {
                error!(?reason, "shutting down");
                *escalated = Some(reason);
            } else {
                debug!(?reason, "additional escalation during shutdown");
            }
        }
        self.root.cancel();
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// The first escalation recorded, if any.
    pub fn escalation(&self) -> Option<ShutdownReason> {
        self.escalated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ── ShutdownCoordinator ──────────────────────────────────────────────

/// Owns the root cancellation token and every spawned activity.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    root: CancellationToken,
    escalated: Arc<Mutex<Option<ShutdownReason>>>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            escalated: Arc::new(Mutex::new(None)),
            tasks: Vec::new(),
        }
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            root: self.root.clone(),
            escalated: Arc::clone(&self.escalated),
        }
    }

    /// A fresh child of the root token, for resources that are not
    /// spawned through [`spawn`](Self::spawn) but must stop with them.
    pub fn child_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Spawn an activity. `f` receives the token it must watch.
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, f: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(f(self.root.child_token()));
        debug!(task = %name, "activity spawned");
        self.tasks.push((name, handle));
    }

    /// Number of activities spawned so far.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for SIGINT/SIGTERM (Ctrl-C off unix), then shut down.
    pub async fn run(self) -> Result<ShutdownReason, CoreError> {
        let signals = TerminationSignals::install()?;
        Ok(self.run_until(signals.recv()).await)
    }

    /// Wait for `trigger` (or an escalation), cancel every activity
    /// and join them all.
    pub async fn run_until<F>(self, trigger: F) -> ShutdownReason
    where
        F: Future<Output = String>,
    {
        let signal = tokio::select! {
            biased;
            () = self.root.cancelled() => None,
            name = trigger => Some(name),
        };
        if let Some(ref name) = signal {
            info!(signal = %name, "received signal, cancelling tasks");
        }
        self.root.cancel();

        for (name, handle) in self.tasks {
            match handle.await {
                Ok(()) => debug!(task = %name, "activity finished"),
                Err(e) if e.is_panic() => error!(task = %name, "activity panicked"),
                Err(e) => warn!(task = %name, error = %e, "activity did not finish"),
            }
        }

        let escalated = self
            .escalated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match (escalated, signal) {
            (Some(reason), _) => reason,
            (None, Some(name)) => ShutdownReason::Signal(name),
            (None, None) => ShutdownReason::Signal("cancelled".into()),
        }
    }
}

// ── Termination signals ──────────────────────────────────────────────

/// Installed SIGINT/SIGTERM listeners.
///
/// Install early so a signal arriving during startup is not lost to the
/// default handler.
pub struct TerminationSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    #[cfg(unix)]
    pub fn install() -> Result<Self, CoreError> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).map_err(CoreError::Signal)?,
            terminate: signal(SignalKind::terminate()).map_err(CoreError::Signal)?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> Result<Self, CoreError> {
        Ok(Self {})
    }

    /// Wait for the first signal and return its name.
    #[cfg(unix)]
    pub async fn recv(mut self) -> String {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT".into(),
            _ = self.terminate.recv() => "SIGTERM".into(),
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(self) -> String {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        "Ctrl-C".into()
    }
}
