//! Voice-trigger (wake word) capture path.
//!
//! The vendor soundtrigger library is modeled as a capability interface
//! instead of raw function pointers: a board without the library gets
//! [`NoopVoiceTrigger`], so call sites never branch on its presence.

use std::time::Duration;

use parking_lot::Mutex;

use super::AuxPath;
use crate::error::ProxyError;

/// State of the vendor trigger engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerStatus {
    /// No vendor library on this board.
    Unavailable,
    /// Armed but not streaming.
    Idle,
    /// A capture stream is open.
    Streaming,
}

/// Capability interface over the vendor soundtrigger library.
pub trait VoiceTriggerLib: Send + Sync {
    /// Opens a capture stream, returning the vendor handle.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::DeviceUnavailable`] if the engine cannot
    /// stream right now.
    fn open_stream(&self) -> Result<i32, ProxyError>;

    /// Reads triggered samples from an open stream. May return 0 when
    /// the engine has nothing buffered.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::DeviceIo`] on engine failure.
    fn read(&self, handle: i32, buf: &mut [i16]) -> Result<usize, ProxyError>;

    /// Closes a capture stream.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::DeviceIo`] on engine failure.
    fn close_stream(&self, handle: i32) -> Result<(), ProxyError>;

    /// Current engine state.
    fn status(&self) -> TriggerStatus;
}

/// Stand-in for an absent vendor library.
#[derive(Debug, Default)]
pub struct NoopVoiceTrigger;

impl VoiceTriggerLib for NoopVoiceTrigger {
    fn open_stream(&self) -> Result<i32, ProxyError> {
        Err(ProxyError::unavailable(
            "voice-trigger",
            "no vendor library on this board",
        ))
    }

    fn read(&self, _handle: i32, _buf: &mut [i16]) -> Result<usize, ProxyError> {
        Ok(0)
    }

    fn close_stream(&self, _handle: i32) -> Result<(), ProxyError> {
        Ok(())
    }

    fn status(&self) -> TriggerStatus {
        TriggerStatus::Unavailable
    }
}

/// Factory: the installed vendor library, or the no-op stand-in.
pub fn voice_trigger_or_noop(lib: Option<Box<dyn VoiceTriggerLib>>) -> Box<dyn VoiceTriggerLib> {
    lib.unwrap_or_else(|| Box::new(NoopVoiceTrigger))
}

/// Voice-trigger capture path over the capability interface.
pub struct VoiceTriggerPath {
    lib: Box<dyn VoiceTriggerLib>,
    handle: Mutex<Option<i32>>,
}

impl VoiceTriggerPath {
    pub(crate) fn new(lib: Box<dyn VoiceTriggerLib>) -> Self {
        Self {
            lib,
            handle: Mutex::new(None),
        }
    }

    /// Reads triggered samples from the open stream.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidState`] if no stream is open, or the
    /// library's I/O error.
    pub fn read(&self, buf: &mut [i16]) -> Result<usize, ProxyError> {
        let guard = self.handle.lock();
        let Some(handle) = *guard else {
            return Err(ProxyError::invalid_state(
                "voice-trigger read",
                "no stream open",
            ));
        };
        self.lib.read(handle, buf)
    }

    /// The vendor engine's state.
    pub fn status(&self) -> TriggerStatus {
        self.lib.status()
    }
}

impl AuxPath for VoiceTriggerPath {
    fn name(&self) -> &'static str {
        "voice-trigger"
    }

    fn is_available(&self) -> bool {
        self.lib.status() != TriggerStatus::Unavailable
    }

    fn activate(&self) -> Result<(), ProxyError> {
        let mut guard = self.handle.lock();
        if guard.is_some() {
            return Ok(());
        }
        *guard = Some(self.lib.open_stream()?);
        Ok(())
    }

    fn deactivate(&self) {
        let mut guard = self.handle.lock();
        if let Some(handle) = guard.take() {
            if let Err(e) = self.lib.close_stream(handle) {
                tracing::warn!(error = %e, "voice-trigger stream close failed");
            }
        }
    }

    fn latency(&self) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeTriggerLib {
        open: AtomicBool,
        reads: AtomicUsize,
    }

    impl VoiceTriggerLib for FakeTriggerLib {
        fn open_stream(&self) -> Result<i32, ProxyError> {
            self.open.store(true, Ordering::SeqCst);
            Ok(7)
        }

        fn read(&self, handle: i32, buf: &mut [i16]) -> Result<usize, ProxyError> {
            assert_eq!(handle, 7);
            self.reads.fetch_add(1, Ordering::SeqCst);
            buf.fill(1);
            Ok(buf.len())
        }

        fn close_stream(&self, _handle: i32) -> Result<(), ProxyError> {
            self.open.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn status(&self) -> TriggerStatus {
            if self.open.load(Ordering::SeqCst) {
                TriggerStatus::Streaming
            } else {
                TriggerStatus::Idle
            }
        }
    }

    #[test]
    fn test_noop_library() {
        let path = VoiceTriggerPath::new(voice_trigger_or_noop(None));
        assert!(!path.is_available());
        assert!(path.activate().is_err());
        assert_eq!(path.status(), TriggerStatus::Unavailable);
    }

    #[test]
    fn test_vendor_library_stream_cycle() {
        let lib = Arc::new(FakeTriggerLib {
            open: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
        });
        struct Shim(Arc<FakeTriggerLib>);
        impl VoiceTriggerLib for Shim {
            fn open_stream(&self) -> Result<i32, ProxyError> {
                self.0.open_stream()
            }
            fn read(&self, handle: i32, buf: &mut [i16]) -> Result<usize, ProxyError> {
                self.0.read(handle, buf)
            }
            fn close_stream(&self, handle: i32) -> Result<(), ProxyError> {
                self.0.close_stream(handle)
            }
            fn status(&self) -> TriggerStatus {
                self.0.status()
            }
        }

        let path = VoiceTriggerPath::new(Box::new(Shim(Arc::clone(&lib))));
        assert!(path.is_available());

        // Read before activation is rejected.
        let mut buf = vec![0i16; 8];
        assert!(path.read(&mut buf).is_err());

        path.activate().unwrap();
        assert_eq!(path.status(), TriggerStatus::Streaming);
        assert_eq!(path.read(&mut buf).unwrap(), 8);
        assert_eq!(lib.reads.load(Ordering::SeqCst), 1);

        path.deactivate();
        assert_eq!(path.status(), TriggerStatus::Idle);
    }
}
