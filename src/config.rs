//! Stream and proxy configuration types.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::route::MIXER_COMMIT_TIMEOUT;
use crate::types::{AudioUsage, DeviceType, Direction};

/// PCM sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleFormat {
    /// Signed 16-bit little-endian. The native format of the pipeline.
    #[default]
    S16Le,
    /// Signed 24-bit (in 32-bit container). No conversion path exists.
    S24Le,
    /// 32-bit float. Converted to/from S16 at the stream edge.
    F32Le,
}

impl SampleFormat {
    /// Bytes occupied by one sample of this format.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::S16Le => 2,
            Self::S24Le | Self::F32Le => 4,
        }
    }
}

/// Configuration of a PCM endpoint: the requested client format or the
/// device-native format, depending on which side of the adapter it
/// describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Sample encoding.
    pub format: SampleFormat,
    /// Frames moved per I/O call. Scratch buffers are sized from this
    /// once, at negotiation.
    pub period_frames: usize,
}

impl Default for PcmConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            format: SampleFormat::S16Le,
            // 20ms at 48kHz
            period_frames: 960,
        }
    }
}

impl PcmConfig {
    /// Creates a config with the default period and S16 samples.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            ..Self::default()
        }
    }

    /// Interleaved samples per period.
    pub fn period_samples(&self) -> usize {
        self.period_frames * self.channels as usize
    }
}

/// Sound-card/device index pair identifying one physical PCM node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DeviceSlot {
    /// ALSA card index.
    pub card: u32,
    /// PCM device index on that card.
    pub device: u32,
}

impl DeviceSlot {
    /// Device name used in logs and errors, e.g. `pcm0:3`.
    pub fn name(&self) -> String {
        format!("pcm{}:{}", self.card, self.device)
    }
}

/// Mapping from (use-case, direction) to the physical PCM slot that
/// serves it. Read-only after proxy start.
#[derive(Debug, Clone)]
pub struct DeviceSlots {
    map: HashMap<(AudioUsage, Direction), DeviceSlot>,
}

impl Default for DeviceSlots {
    fn default() -> Self {
        let mut map = HashMap::new();
        map.insert(
            (AudioUsage::Media, Direction::Playback),
            DeviceSlot { card: 0, device: 0 },
        );
        map.insert(
            (AudioUsage::Media, Direction::Capture),
            DeviceSlot { card: 0, device: 1 },
        );
        map.insert(
            (AudioUsage::Notification, Direction::Playback),
            DeviceSlot { card: 0, device: 0 },
        );
        map.insert(
            (AudioUsage::VoiceCall, Direction::Playback),
            DeviceSlot { card: 0, device: 2 },
        );
        map.insert(
            (AudioUsage::VoiceCall, Direction::Capture),
            DeviceSlot { card: 0, device: 3 },
        );
        map.insert(
            (AudioUsage::FmRadio, Direction::Playback),
            DeviceSlot { card: 0, device: 4 },
        );
        map.insert(
            (AudioUsage::VoiceTrigger, Direction::Capture),
            DeviceSlot { card: 0, device: 5 },
        );
        map.insert(
            (AudioUsage::Loopback, Direction::Playback),
            DeviceSlot { card: 0, device: 6 },
        );
        map.insert(
            (AudioUsage::Loopback, Direction::Capture),
            DeviceSlot { card: 0, device: 7 },
        );
        Self { map }
    }
}

impl DeviceSlots {
    /// Looks up the slot serving a use-case in one direction.
    pub fn slot(&self, usage: AudioUsage, direction: Direction) -> Option<DeviceSlot> {
        self.map.get(&(usage, direction)).copied()
    }

    /// Overrides the slot for one (use-case, direction) pair.
    pub fn set(&mut self, usage: AudioUsage, direction: Direction, slot: DeviceSlot) {
        self.map.insert((usage, direction), slot);
    }
}

/// Proxy-wide tunables.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Bound on a single mixer commit. A commit exceeding this surfaces
    /// `MixerTimeout` and is abandoned, not retried.
    ///
    /// Default: 5 seconds.
    pub commit_timeout: Duration,

    /// Device a playback route degrades to when its auxiliary path
    /// cannot be activated. Default: speaker.
    pub playback_fallback: DeviceType,

    /// Device a capture route degrades to. Default: built-in mic.
    pub capture_fallback: DeviceType,

    /// Base latency of the internal path, before any auxiliary
    /// contribution. Default: 20ms.
    pub base_path_latency: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            commit_timeout: MIXER_COMMIT_TIMEOUT,
            playback_fallback: DeviceType::Speaker,
            capture_fallback: DeviceType::BuiltinMic,
            base_path_latency: Duration::from_millis(20),
        }
    }
}
