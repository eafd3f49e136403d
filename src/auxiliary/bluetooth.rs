//! Bluetooth A2DP offload path.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use super::AuxPath;
use crate::error::ProxyError;

/// A2DP offload state: enable/suspend flags and the sink delay.
///
/// The reported latency is the board's default delay plus whatever the
/// stack negotiates with the remote sink at runtime.
pub struct A2dpPath {
    supported: bool,
    enabled: AtomicBool,
    suspended: AtomicBool,
    default_delay_ms: u32,
    negotiated_delay_ms: AtomicU32,
}

impl A2dpPath {
    pub(crate) fn new(supported: bool, default_delay_ms: u32) -> Self {
        Self {
            supported,
            enabled: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
            default_delay_ms,
            negotiated_delay_ms: AtomicU32::new(0),
        }
    }

    /// Whether the offload path is currently up.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Whether the stack has suspended the path (e.g. during a call).
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Suspends or resumes the path. While suspended the path reports
    /// itself unavailable, so the next route request degrades.
    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.store(suspended, Ordering::SeqCst);
    }

    /// Installs the delay negotiated with the remote sink.
    pub fn set_negotiated_delay(&self, delay_ms: u32) {
        self.negotiated_delay_ms.store(delay_ms, Ordering::SeqCst);
    }
}

impl AuxPath for A2dpPath {
    fn name(&self) -> &'static str {
        "a2dp"
    }

    fn is_available(&self) -> bool {
        self.supported && !self.is_suspended()
    }

    fn activate(&self) -> Result<(), ProxyError> {
        if !self.supported {
            return Err(ProxyError::unavailable("a2dp", "not supported on this board"));
        }
        if self.is_suspended() {
            return Err(ProxyError::unavailable("a2dp", "suspended"));
        }
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn deactivate(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    fn latency(&self) -> Duration {
        Duration::from_millis(u64::from(
            self.default_delay_ms + self.negotiated_delay_ms.load(Ordering::SeqCst),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_path_rejects_activation() {
        let path = A2dpPath::new(false, 0);
        assert!(!path.is_available());
        assert!(path.activate().is_err());
    }

    #[test]
    fn test_activation_and_suspend_cycle() {
        let path = A2dpPath::new(true, 100);
        path.activate().unwrap();
        assert!(path.is_enabled());

        path.set_suspended(true);
        assert!(!path.is_available());
        assert!(path.activate().is_err());

        path.set_suspended(false);
        assert!(path.is_available());
    }

    #[test]
    fn test_latency_adds_negotiated_delay() {
        let path = A2dpPath::new(true, 100);
        assert_eq!(path.latency(), Duration::from_millis(100));
        path.set_negotiated_delay(80);
        assert_eq!(path.latency(), Duration::from_millis(180));
    }
}
