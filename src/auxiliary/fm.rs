//! FM radio path.

use std::sync::atomic::{AtomicBool, Ordering};

use super::AuxPath;
use crate::error::ProxyError;

/// How the FM tuner is wired into the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmWiring {
    /// Tuner audio loops through the A-Box internally.
    Internal,
    /// Tuner audio enters through an external analog input.
    External,
}

/// FM radio playback path.
pub struct FmPath {
    wiring: Option<FmWiring>,
    active: AtomicBool,
}

impl FmPath {
    pub(crate) fn new(wiring: Option<FmWiring>) -> Self {
        Self {
            wiring,
            active: AtomicBool::new(false),
        }
    }

    /// The configured wiring, if the board has a tuner at all.
    pub fn wiring(&self) -> Option<FmWiring> {
        self.wiring
    }

    /// Whether FM audio is currently flowing.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl AuxPath for FmPath {
    fn name(&self) -> &'static str {
        "fm"
    }

    fn is_available(&self) -> bool {
        self.wiring.is_some()
    }

    fn activate(&self) -> Result<(), ProxyError> {
        if self.wiring.is_none() {
            return Err(ProxyError::unavailable("fm", "no tuner on this board"));
        }
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_tuner_is_unavailable() {
        let path = FmPath::new(None);
        assert!(!path.is_available());
        assert!(path.activate().is_err());
        assert!(!path.is_active());
    }

    #[test]
    fn test_activation_cycle() {
        let path = FmPath::new(Some(FmWiring::Internal));
        assert!(path.is_available());
        path.activate().unwrap();
        assert!(path.is_active());
        path.deactivate();
        assert!(!path.is_active());
    }
}
