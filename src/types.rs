//! Core routing vocabulary: directions, use-cases, devices, modifiers.

use serde::Deserialize;

/// Direction of audio flow for a stream or route.
///
/// Playback and capture routes are independent: each direction holds its
/// own active triple and neither blocks the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Audio flowing out of the device (output streams).
    Playback,
    /// Audio flowing into the device (input streams).
    Capture,
}

impl Direction {
    /// Stable index for per-direction tables.
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Playback => 0,
            Self::Capture => 1,
        }
    }
}

/// Semantic audio purpose that selects a routing profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudioUsage {
    /// Ordinary media playback or recording.
    Media,
    /// CP (cellular processor) voice call audio.
    VoiceCall,
    /// Short notification/alert sounds.
    Notification,
    /// FM radio playback through the A-Box loopback.
    FmRadio,
    /// Low-power voice-trigger (wake word) capture.
    VoiceTrigger,
    /// USB loopback paths.
    Loopback,
}

/// Physical transducer or endpoint a route terminates at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    /// Built-in earpiece receiver.
    Earpiece,
    /// Built-in loudspeaker.
    Speaker,
    /// Wired headset (mic + speakers).
    Headset,
    /// Wired headphones (no mic).
    Headphone,
    /// Bluetooth SCO headset (call audio).
    BtSco,
    /// Bluetooth A2DP sink.
    BtA2dp,
    /// USB audio device.
    UsbHeadset,
    /// FM tuner endpoint.
    FmTuner,
    /// Built-in microphone.
    BuiltinMic,
    /// Wired headset microphone.
    HeadsetMic,
    /// USB microphone.
    UsbMic,
}

impl DeviceType {
    /// 6-bit device code used by the call parameter encoding.
    ///
    /// Returns `None` for devices that never carry call audio.
    pub fn call_code(self) -> Option<u8> {
        match self {
            Self::Earpiece => Some(1),
            Self::Speaker => Some(2),
            Self::BtSco => Some(3),
            Self::UsbHeadset => Some(4),
            Self::Headset => Some(5),
            _ => None,
        }
    }

    /// Whether this endpoint captures audio (as opposed to rendering it).
    pub fn is_input(self) -> bool {
        matches!(self, Self::BuiltinMic | Self::HeadsetMic | Self::UsbMic)
    }
}

/// Routing variant applied on top of a base device.
///
/// A modifier selects an alternate mixer path for the same use-case and
/// device, typically to engage an extra DSP chain or amplifier layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Modifier {
    /// Drive both speaker amplifiers.
    DualSpeaker,
    /// Route incall music to the receiver path.
    IncallMusic,
    /// Engage the noise-reduction pre-processing chain.
    NoiseReduction,
}

/// The active binding for one direction: use-case, device, and optional
/// modifier. Replaced as a unit whenever routing changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteTriple {
    /// Use-case this route serves.
    pub usage: AudioUsage,
    /// Endpoint the route terminates at.
    pub device: DeviceType,
    /// Optional routing variant.
    pub modifier: Option<Modifier>,
}

impl RouteTriple {
    /// Creates a triple with no modifier.
    pub fn new(usage: AudioUsage, device: DeviceType) -> Self {
        Self {
            usage,
            device,
            modifier: None,
        }
    }

    /// Creates a triple with a modifier.
    pub fn with_modifier(usage: AudioUsage, device: DeviceType, modifier: Modifier) -> Self {
        Self {
            usage,
            device,
            modifier: Some(modifier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_index() {
        assert_eq!(Direction::Playback.index(), 0);
        assert_eq!(Direction::Capture.index(), 1);
    }

    #[test]
    fn test_call_codes() {
        assert_eq!(DeviceType::Earpiece.call_code(), Some(1));
        assert_eq!(DeviceType::Speaker.call_code(), Some(2));
        assert_eq!(DeviceType::BtSco.call_code(), Some(3));
        assert_eq!(DeviceType::BuiltinMic.call_code(), None);
    }

    #[test]
    fn test_input_devices() {
        assert!(DeviceType::BuiltinMic.is_input());
        assert!(!DeviceType::Speaker.is_input());
    }

    #[test]
    fn test_triple_equality() {
        let a = RouteTriple::new(AudioUsage::Media, DeviceType::Speaker);
        let b = RouteTriple::new(AudioUsage::Media, DeviceType::Speaker);
        let c = RouteTriple::with_modifier(
            AudioUsage::Media,
            DeviceType::Speaker,
            Modifier::DualSpeaker,
        );
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
