//! Runtime events for monitoring routing health.
//!
//! Events are non-fatal notifications. The proxy keeps running after any
//! event is emitted - they exist for logging and metrics, not control flow.
//! Commit results additionally reach the submitter through its
//! [`CommitToken`](crate::route::CommitToken); the event stream is the
//! process-wide view.

use std::sync::Arc;

use crate::types::{Direction, DeviceType, RouteTriple};

/// Runtime events emitted by the routing core.
#[derive(Debug, Clone)]
pub enum ProxyEvent {
    /// A mixer path transition was fully applied.
    RouteCommitted {
        /// Direction the commit applied to.
        direction: Direction,
        /// The triple now active on the hardware.
        triple: RouteTriple,
    },

    /// A mixer commit exceeded the bounded latency and was abandoned.
    ///
    /// The last-committed triple is left as last-known; the route is not
    /// retried automatically.
    RouteCommitTimedOut {
        /// Direction whose commit timed out.
        direction: Direction,
        /// The triple that failed to commit.
        triple: RouteTriple,
    },

    /// A mixer commit failed (backend error or missing control).
    RouteCommitFailed {
        /// Direction whose commit failed.
        direction: Direction,
        /// The triple that failed to commit.
        triple: RouteTriple,
        /// Description of the failure.
        reason: String,
    },

    /// An auxiliary path could not be activated; the route degraded to
    /// the direction's fallback device instead of failing.
    AuxPathDegraded {
        /// Name of the auxiliary path (e.g. `a2dp`).
        path: &'static str,
        /// Device the caller asked for.
        requested: DeviceType,
        /// Device the route fell back to.
        fallback: DeviceType,
        /// Why activation failed.
        reason: String,
    },

    /// Call audio started or stopped.
    CallStateChanged {
        /// `true` while a call is active.
        active: bool,
    },
}

/// Callback type for receiving runtime events.
pub type EventCallback = Arc<dyn Fn(ProxyEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use audio_proxy::{event_callback, ProxyEvent};
///
/// let callback = event_callback(|event| {
///     tracing::info!(?event, "proxy event");
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(ProxyEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AudioUsage;

    #[test]
    fn test_event_debug() {
        let event = ProxyEvent::RouteCommitted {
            direction: Direction::Playback,
            triple: RouteTriple::new(AudioUsage::Media, DeviceType::Speaker),
        };
        let debug = format!("{event:?}");
        assert!(debug.contains("RouteCommitted"));
        assert!(debug.contains("Speaker"));
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        callback(ProxyEvent::CallStateChanged { active: true });
        assert!(called.load(Ordering::SeqCst));
    }
}
