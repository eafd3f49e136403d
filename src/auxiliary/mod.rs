//! Auxiliary path adapters.
//!
//! FM, USB loopback, Bluetooth A2DP and voice-trigger capture are thin
//! state holders the routing state consults when composing a path. Each
//! capability present on the board backs one adapter, resolved at proxy
//! start - the routing logic has a single code path regardless of which
//! variants exist. Failing to activate an auxiliary path never fails
//! the primary route; it degrades to the next best device.

mod bluetooth;
mod fm;
mod trigger;
mod usb;

pub use bluetooth::A2dpPath;
pub use fm::{FmPath, FmWiring};
pub use trigger::{
    voice_trigger_or_noop, NoopVoiceTrigger, TriggerStatus, VoiceTriggerLib, VoiceTriggerPath,
};
pub use usb::UsbLoopbackPath;

use std::sync::Arc;
use std::time::Duration;

use crate::error::ProxyError;
use crate::types::DeviceType;

/// One auxiliary path's contract towards the routing state.
///
/// Implementations use interior mutability (atomics, narrow mutexes):
/// they are mutated from call-control and routing paths concurrently.
pub trait AuxPath: Send + Sync {
    /// Short name for logs and events.
    fn name(&self) -> &'static str;

    /// Whether the path can currently carry audio.
    fn is_available(&self) -> bool;

    /// Brings the path up.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::DeviceUnavailable`] when the capability is
    /// absent or suspended. The routing state treats this as a degrade
    /// signal, not a failure.
    fn activate(&self) -> Result<(), ProxyError>;

    /// Takes the path down. Idempotent.
    fn deactivate(&self);

    /// This path's contribution to end-to-end latency.
    fn latency(&self) -> Duration {
        Duration::ZERO
    }
}

/// The board's auxiliary paths, resolved once at proxy start.
pub struct AuxRegistry {
    a2dp: Arc<A2dpPath>,
    fm: Arc<FmPath>,
    usb: Arc<UsbLoopbackPath>,
    trigger: Arc<VoiceTriggerPath>,
}

impl AuxRegistry {
    /// Starts building a registry.
    pub fn builder() -> AuxRegistryBuilder {
        AuxRegistryBuilder::default()
    }

    /// A registry with every capability absent.
    pub fn disabled() -> Self {
        Self::builder().build()
    }

    /// The Bluetooth A2DP path.
    pub fn a2dp(&self) -> &A2dpPath {
        &self.a2dp
    }

    /// The FM radio path.
    pub fn fm(&self) -> &FmPath {
        &self.fm
    }

    /// The USB loopback path.
    pub fn usb(&self) -> &UsbLoopbackPath {
        &self.usb
    }

    /// The voice-trigger capture path.
    pub fn trigger(&self) -> &VoiceTriggerPath {
        &self.trigger
    }

    /// The adapter backing a device, if that device rides an auxiliary
    /// path at all.
    pub fn adapter_for(&self, device: DeviceType) -> Option<Arc<dyn AuxPath>> {
        match device {
            DeviceType::BtA2dp => Some(Arc::clone(&self.a2dp) as Arc<dyn AuxPath>),
            DeviceType::FmTuner => Some(Arc::clone(&self.fm) as Arc<dyn AuxPath>),
            DeviceType::UsbHeadset | DeviceType::UsbMic => {
                Some(Arc::clone(&self.usb) as Arc<dyn AuxPath>)
            }
            _ => None,
        }
    }

    /// Takes every path down. Used at proxy teardown.
    pub fn deactivate_all(&self) {
        self.a2dp.deactivate();
        self.fm.deactivate();
        self.usb.deactivate();
        self.trigger.deactivate();
    }
}

/// Configures which auxiliary capabilities the board carries.
#[derive(Default)]
pub struct AuxRegistryBuilder {
    a2dp_supported: bool,
    a2dp_default_delay_ms: u32,
    fm_wiring: Option<FmWiring>,
    usb_out_loopback: bool,
    usb_in_loopback: bool,
    trigger_lib: Option<Box<dyn VoiceTriggerLib>>,
}

impl AuxRegistryBuilder {
    /// Declares A2DP offload support with its default delay.
    #[must_use]
    pub fn a2dp(mut self, supported: bool, default_delay_ms: u32) -> Self {
        self.a2dp_supported = supported;
        self.a2dp_default_delay_ms = default_delay_ms;
        self
    }

    /// Declares FM radio wiring.
    #[must_use]
    pub fn fm(mut self, wiring: FmWiring) -> Self {
        self.fm_wiring = Some(wiring);
        self
    }

    /// Declares USB loopback support per direction.
    #[must_use]
    pub fn usb_loopback(mut self, out_supported: bool, in_supported: bool) -> Self {
        self.usb_out_loopback = out_supported;
        self.usb_in_loopback = in_supported;
        self
    }

    /// Installs the vendor voice-trigger library.
    #[must_use]
    pub fn voice_trigger(mut self, lib: Box<dyn VoiceTriggerLib>) -> Self {
        self.trigger_lib = Some(lib);
        self
    }

    /// Resolves the adapters.
    pub fn build(self) -> AuxRegistry {
        AuxRegistry {
            a2dp: Arc::new(A2dpPath::new(
                self.a2dp_supported,
                self.a2dp_default_delay_ms,
            )),
            fm: Arc::new(FmPath::new(self.fm_wiring)),
            usb: Arc::new(UsbLoopbackPath::new(
                self.usb_out_loopback,
                self.usb_in_loopback,
            )),
            trigger: Arc::new(VoiceTriggerPath::new(voice_trigger_or_noop(
                self.trigger_lib,
            ))),
        }
    }
}
