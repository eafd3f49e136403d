//! USB loopback path.

use std::sync::atomic::{AtomicBool, Ordering};

use super::AuxPath;
use crate::error::ProxyError;

/// USB audio loopback, tracked independently per direction.
pub struct UsbLoopbackPath {
    out_supported: bool,
    in_supported: bool,
    out_active: AtomicBool,
    in_active: AtomicBool,
}

impl UsbLoopbackPath {
    pub(crate) fn new(out_supported: bool, in_supported: bool) -> Self {
        Self {
            out_supported,
            in_supported,
            out_active: AtomicBool::new(false),
            in_active: AtomicBool::new(false),
        }
    }

    /// Whether the output loopback is currently up.
    pub fn is_out_active(&self) -> bool {
        self.out_active.load(Ordering::SeqCst)
    }

    /// Whether the input loopback is currently up.
    pub fn is_in_active(&self) -> bool {
        self.in_active.load(Ordering::SeqCst)
    }
}

impl AuxPath for UsbLoopbackPath {
    fn name(&self) -> &'static str {
        "usb-loopback"
    }

    fn is_available(&self) -> bool {
        self.out_supported || self.in_supported
    }

    fn activate(&self) -> Result<(), ProxyError> {
        if !self.is_available() {
            return Err(ProxyError::unavailable(
                "usb-loopback",
                "not supported on this board",
            ));
        }
        if self.out_supported {
            self.out_active.store(true, Ordering::SeqCst);
        }
        if self.in_supported {
            self.in_active.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn deactivate(&self) {
        self.out_active.store(false, Ordering::SeqCst);
        self.in_active.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_loopback() {
        let path = UsbLoopbackPath::new(false, false);
        assert!(!path.is_available());
        assert!(path.activate().is_err());
    }

    #[test]
    fn test_activates_supported_directions_only() {
        let path = UsbLoopbackPath::new(true, false);
        path.activate().unwrap();
        assert!(path.is_out_active());
        assert!(!path.is_in_active());
        path.deactivate();
        assert!(!path.is_out_active());
    }
}
