//! Routing state: active use-case -> device -> modifier bindings.
//!
//! Playback and capture are tracked independently and never block each
//! other. Policy is last-writer-wins per direction: a new request fully
//! replaces the prior active triple, with no queuing or merging. The
//! active triple is updated optimistically at submit time; callers that
//! need hardware confirmation wait on the returned
//! [`CommitToken`](super::CommitToken).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::auxiliary::AuxRegistry;
use crate::event::{EventCallback, ProxyEvent};
use crate::route::{CommitToken, MixerCommitEngine, MixerUpdate};
use crate::types::{DeviceType, Direction, RouteTriple};

#[derive(Default)]
struct ActiveRoutes {
    playback: Option<RouteTriple>,
    capture: Option<RouteTriple>,
}

impl ActiveRoutes {
    fn slot(&mut self, direction: Direction) -> &mut Option<RouteTriple> {
        match direction {
            Direction::Playback => &mut self.playback,
            Direction::Capture => &mut self.capture,
        }
    }
}

/// Shared routing state for the whole proxy.
pub struct RoutingState {
    active: RwLock<ActiveRoutes>,
    engine: MixerCommitEngine,
    aux: Arc<AuxRegistry>,
    playback_fallback: DeviceType,
    capture_fallback: DeviceType,
    base_latency: Duration,
    events: Option<EventCallback>,
}

impl RoutingState {
    pub(crate) fn new(
        engine: MixerCommitEngine,
        aux: Arc<AuxRegistry>,
        playback_fallback: DeviceType,
        capture_fallback: DeviceType,
        base_latency: Duration,
        events: Option<EventCallback>,
    ) -> Self {
        Self {
            active: RwLock::new(ActiveRoutes::default()),
            engine,
            aux,
            playback_fallback,
            capture_fallback,
            base_latency,
            events,
        }
    }

    /// The active (possibly not yet committed) triple for a direction.
    pub fn active(&self, direction: Direction) -> Option<RouteTriple> {
        let guard = self.active.read();
        match direction {
            Direction::Playback => guard.playback,
            Direction::Capture => guard.capture,
        }
    }

    /// Requests a path change for one direction.
    ///
    /// Returns `None` when the target equals the active triple (nothing
    /// to do), otherwise the token for the submitted commit. If the
    /// target device needs an auxiliary path that cannot be activated,
    /// the route degrades to the direction's fallback device - reported
    /// via [`ProxyEvent::AuxPathDegraded`], never a hard failure.
    pub fn request_route(
        &self,
        direction: Direction,
        triple: RouteTriple,
        extra_controls: Vec<(String, i32)>,
    ) -> Option<CommitToken> {
        let triple = self.resolve_aux(direction, triple);

        // Lock covers the in-memory update and the queue submit only;
        // mixer I/O happens on the engine worker.
        let mut guard = self.active.write();
        let slot = guard.slot(direction);
        if *slot == Some(triple) {
            return None;
        }
        *slot = Some(triple);
        tracing::debug!(?direction, ?triple, "route target updated");
        Some(self.engine.submit(MixerUpdate {
            direction,
            triple,
            extra_controls,
        }))
    }

    /// Recommits the active triple with fresh extra controls, bypassing
    /// the no-change elision. Used for mid-call parameter updates where
    /// the path is unchanged but the key control must move.
    pub(crate) fn resubmit(
        &self,
        direction: Direction,
        extra_controls: Vec<(String, i32)>,
    ) -> Option<CommitToken> {
        let triple = self.active(direction)?;
        Some(self.engine.submit(MixerUpdate {
            direction,
            triple,
            extra_controls,
        }))
    }

    /// Drops the active triple for a direction without touching the
    /// hardware. Used at teardown.
    pub(crate) fn clear(&self, direction: Direction) {
        *self.active.write().slot(direction) = None;
    }

    /// End-to-end path latency for a device: the base internal latency
    /// plus whatever the backing auxiliary path reports.
    pub fn path_latency(&self, device: DeviceType) -> Duration {
        let aux = self
            .aux
            .adapter_for(device)
            .map(|a| a.latency())
            .unwrap_or(Duration::ZERO);
        self.base_latency + aux
    }

    fn resolve_aux(&self, direction: Direction, triple: RouteTriple) -> RouteTriple {
        let Some(adapter) = self.aux.adapter_for(triple.device) else {
            return triple;
        };

        let failure = if !adapter.is_available() {
            Some("path unavailable".to_string())
        } else {
            adapter.activate().err().map(|e| e.to_string())
        };
        let Some(reason) = failure else {
            return triple;
        };

        let fallback = match direction {
            Direction::Playback => self.playback_fallback,
            Direction::Capture => self.capture_fallback,
        };
        tracing::warn!(
            path = adapter.name(),
            requested = ?triple.device,
            ?fallback,
            %reason,
            "auxiliary path activation failed, degrading route"
        );
        if let Some(callback) = &self.events {
            callback(ProxyEvent::AuxPathDegraded {
                path: adapter.name(),
                requested: triple.device,
                fallback,
                reason,
            });
        }
        RouteTriple {
            device: fallback,
            ..triple
        }
    }
}
