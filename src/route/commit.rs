//! Mixer commit engine.
//!
//! A single background worker owns all mixer-control writes. Route
//! transitions are submitted as [`MixerUpdate`]s and committed in
//! submission order per direction; rapid-fire submissions for one
//! direction are coalesced so only the newest pending target is
//! honored. Each commit is bounded by the engine's timeout - a
//! straggling write is abandoned (the worker moves on), never
//! cancelled mid-operation, and the last-committed triple is left as
//! last-known.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::ProxyError;
use crate::event::{EventCallback, ProxyEvent};
use crate::mixer::{self, MixerBackend, RouteMap, RoutePath};
use crate::types::{Direction, RouteTriple};

/// Bound on a single mixer commit.
pub const MIXER_COMMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A desired path transition, consumed exactly once by the engine.
#[derive(Debug, Clone)]
pub struct MixerUpdate {
    /// Direction whose active triple is being replaced.
    pub direction: Direction,
    /// The new target triple.
    pub triple: RouteTriple,
    /// Additional control writes committed with the path (e.g. the
    /// encoded call-parameter key).
    pub extra_controls: Vec<(String, i32)>,
}

/// Final result of one submitted mixer update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The path was fully applied to the hardware.
    Applied,
    /// A newer request for the same direction arrived before this one
    /// was dequeued; only the final target was committed.
    Superseded,
    /// The commit exceeded the engine's bound and was abandoned. The
    /// last-committed triple is unchanged; retry requires a fresh
    /// route request.
    TimedOut,
    /// The commit failed (backend error, missing control, or unmapped
    /// path).
    Failed(String),
}

impl CommitOutcome {
    /// Converts the outcome into a `Result`. `Superseded` counts as
    /// success: the direction reached a target at least as new as the
    /// request's.
    ///
    /// # Errors
    ///
    /// Maps `TimedOut` to [`ProxyError::MixerTimeout`] and `Failed` to
    /// [`ProxyError::DeviceIo`].
    pub fn into_result(self, direction: Direction) -> Result<(), ProxyError> {
        match self {
            Self::Applied | Self::Superseded => Ok(()),
            Self::TimedOut => Err(ProxyError::MixerTimeout { direction }),
            Self::Failed(reason) => Err(ProxyError::io(reason)),
        }
    }
}

/// Completion signal for one submitted update.
///
/// Every submitted request eventually resolves - including requests
/// still queued when the engine shuts down, which resolve as `Failed`.
pub struct CommitToken {
    rx: oneshot::Receiver<CommitOutcome>,
}

impl CommitToken {
    /// Waits for the commit to resolve.
    pub async fn wait(self) -> CommitOutcome {
        self.rx
            .await
            .unwrap_or_else(|_| CommitOutcome::Failed("commit engine stopped".to_string()))
    }

    /// Waits for the commit to resolve, up to `limit`. Returns `None`
    /// if the caller's wait (not the commit itself) timed out.
    pub async fn wait_for(self, limit: Duration) -> Option<CommitOutcome> {
        tokio::time::timeout(limit, self.wait()).await.ok()
    }
}

enum EngineCommand {
    Submit(MixerUpdate, oneshot::Sender<CommitOutcome>),
    Stop,
}

/// Handle to the commit worker. Cheap to clone; the worker stops when
/// [`stop`](Self::stop) is called.
#[derive(Clone)]
pub struct MixerCommitEngine {
    tx: mpsc::UnboundedSender<EngineCommand>,
    committed: Arc<Mutex<[Option<RouteTriple>; 2]>>,
}

impl MixerCommitEngine {
    /// Spawns the worker task. Must be called within a tokio runtime.
    pub(crate) fn spawn(
        backend: Arc<dyn MixerBackend>,
        routes: Arc<RouteMap>,
        timeout: Duration,
        events: Option<EventCallback>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let committed = Arc::new(Mutex::new([None, None]));

        let worker = Worker {
            backend,
            routes,
            timeout,
            events,
            committed: Arc::clone(&committed),
            last_path: [None, None],
        };
        let handle = tokio::spawn(worker.run(rx));

        (Self { tx, committed }, handle)
    }

    /// Submits an update and returns its completion token.
    pub fn submit(&self, update: MixerUpdate) -> CommitToken {
        let (done, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(EngineCommand::Submit(_, done))) =
            self.tx.send(EngineCommand::Submit(update, done))
        {
            let _ = done.send(CommitOutcome::Failed("commit engine stopped".to_string()));
        }
        CommitToken { rx }
    }

    /// The triple last fully applied to the hardware for a direction.
    ///
    /// Lags the routing state's active triple while a commit is in
    /// flight, and stays at last-known after a timeout or failure.
    pub fn last_committed(&self, direction: Direction) -> Option<RouteTriple> {
        self.committed.lock()[direction.index()]
    }

    /// Asks the worker to stop after finishing the current batch.
    pub(crate) fn stop(&self) {
        let _ = self.tx.send(EngineCommand::Stop);
    }
}

struct Worker {
    backend: Arc<dyn MixerBackend>,
    routes: Arc<RouteMap>,
    timeout: Duration,
    events: Option<EventCallback>,
    committed: Arc<Mutex<[Option<RouteTriple>; 2]>>,
    last_path: [Option<RoutePath>; 2],
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<EngineCommand>) {
        let mut stopping = false;
        while !stopping {
            let Some(command) = rx.recv().await else {
                break;
            };

            // Drain whatever else is already queued so stale requests
            // for the same direction can be elided.
            let mut batch = Vec::new();
            match command {
                EngineCommand::Submit(update, done) => batch.push((update, done)),
                EngineCommand::Stop => stopping = true,
            }
            while let Ok(cmd) = rx.try_recv() {
                match cmd {
                    EngineCommand::Submit(update, done) => batch.push((update, done)),
                    EngineCommand::Stop => stopping = true,
                }
            }

            // Last pending request per direction wins; earlier ones are
            // superseded without touching the hardware.
            let mut newest = [None, None];
            for (i, (update, _)) in batch.iter().enumerate() {
                newest[update.direction.index()] = Some(i);
            }
            for (i, (update, done)) in batch.into_iter().enumerate() {
                if newest[update.direction.index()] != Some(i) {
                    tracing::debug!(
                        direction = ?update.direction,
                        triple = ?update.triple,
                        "route request superseded before commit"
                    );
                    let _ = done.send(CommitOutcome::Superseded);
                    continue;
                }
                let outcome = self.commit(update).await;
                let _ = done.send(outcome);
            }
        }

        // Requests still queued at shutdown resolve as failed rather
        // than disappearing.
        rx.close();
        while let Ok(cmd) = rx.try_recv() {
            if let EngineCommand::Submit(_, done) = cmd {
                let _ = done.send(CommitOutcome::Failed("commit engine stopped".to_string()));
            }
        }
    }

    async fn commit(&mut self, update: MixerUpdate) -> CommitOutcome {
        let direction = update.direction;
        let triple = update.triple;

        let Some(path) = self.routes.lookup(&triple).cloned() else {
            let reason = format!("no mixer path for {triple:?}");
            tracing::error!(?direction, ?triple, "route commit failed: unmapped path");
            self.emit(ProxyEvent::RouteCommitFailed {
                direction,
                triple,
                reason: reason.clone(),
            });
            return CommitOutcome::Failed(reason);
        };

        let backend = Arc::clone(&self.backend);
        let previous = self.last_path[direction.index()].clone();
        let next = path.clone();
        let work = tokio::task::spawn_blocking(move || -> Result<(), ProxyError> {
            mixer::apply_path(&*backend, previous.as_ref(), &next)?;
            for (name, value) in &update.extra_controls {
                backend.set_control(name, *value)?;
            }
            Ok(())
        });

        match tokio::time::timeout(self.timeout, work).await {
            Ok(Ok(Ok(()))) => {
                self.committed.lock()[direction.index()] = Some(triple);
                self.last_path[direction.index()] = Some(path);
                tracing::debug!(?direction, ?triple, "route committed");
                self.emit(ProxyEvent::RouteCommitted { direction, triple });
                CommitOutcome::Applied
            }
            Ok(Ok(Err(e))) => {
                tracing::error!(?direction, ?triple, error = %e, "route commit failed");
                self.emit(ProxyEvent::RouteCommitFailed {
                    direction,
                    triple,
                    reason: e.to_string(),
                });
                CommitOutcome::Failed(e.to_string())
            }
            Ok(Err(join)) => {
                let reason = format!("commit task panicked: {join}");
                tracing::error!(?direction, ?triple, "route commit panicked");
                self.emit(ProxyEvent::RouteCommitFailed {
                    direction,
                    triple,
                    reason: reason.clone(),
                });
                CommitOutcome::Failed(reason)
            }
            Err(_) => {
                tracing::warn!(
                    ?direction,
                    ?triple,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "mixer commit exceeded bound, abandoning"
                );
                self.emit(ProxyEvent::RouteCommitTimedOut { direction, triple });
                CommitOutcome::TimedOut
            }
        }
    }

    fn emit(&self, event: ProxyEvent) {
        if let Some(callback) = &self.events {
            callback(event);
        }
    }
}
