//! Mock backends for testing without hardware.
//!
//! These allow exercising the full proxy - routing, commits, stream I/O -
//! in CI environments with no sound card. The mixer records every write
//! so tests can assert on the exact control sequence.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::PcmConfig;
use crate::device::{CompressDevice, CompressDriver, GaplessMetadata, PcmDevice, PcmDriver};
use crate::error::ProxyError;
use crate::mixer::MixerBackend;

/// A mixer backend backed by an in-memory control table.
#[derive(Default)]
pub struct MockMixer {
    controls: Mutex<HashMap<String, i32>>,
    known: Option<HashSet<String>>,
    writes: Mutex<Vec<(String, i32)>>,
    write_delay: Mutex<Duration>,
}

impl MockMixer {
    /// Creates a mixer that accepts any control name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mixer that only knows the given controls; anything else
    /// surfaces `ControlNotFound`.
    pub fn with_controls<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: Some(names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Makes every subsequent write sleep, to provoke commit timeouts.
    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock() = delay;
    }

    /// Current value of a control, if it was ever written.
    pub fn value(&self, name: &str) -> Option<i32> {
        self.controls.lock().get(name).copied()
    }

    /// Every write in order, including rewrites.
    pub fn writes(&self) -> Vec<(String, i32)> {
        self.writes.lock().clone()
    }

    /// Total writes performed.
    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    fn check_known(&self, name: &str) -> Result<(), ProxyError> {
        if let Some(known) = &self.known {
            if !known.contains(name) {
                return Err(ProxyError::ControlNotFound {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl MixerBackend for MockMixer {
    fn set_control(&self, name: &str, value: i32) -> Result<(), ProxyError> {
        self.check_known(name)?;
        let delay = *self.write_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.controls.lock().insert(name.to_string(), value);
        self.writes.lock().push((name.to_string(), value));
        Ok(())
    }

    fn get_control(&self, name: &str) -> Result<i32, ProxyError> {
        self.check_known(name)?;
        Ok(self.controls.lock().get(name).copied().unwrap_or(0))
    }
}

/// Shared state between a [`MockPcmDriver`] and the devices it opens.
#[derive(Default)]
struct PcmState {
    written: Mutex<Vec<i16>>,
    capture: Mutex<VecDeque<i16>>,
    io_error: AtomicBool,
}

/// A PCM driver serving in-memory devices.
pub struct MockPcmDriver {
    native: Mutex<HashMap<(u32, u32), PcmConfig>>,
    default_native: PcmConfig,
    state: Arc<PcmState>,
    opens: AtomicUsize,
    native_queries: AtomicUsize,
    fail_open: AtomicBool,
}

impl MockPcmDriver {
    /// Creates a driver whose nodes all report the given native config.
    pub fn new(default_native: PcmConfig) -> Self {
        Self {
            native: Mutex::new(HashMap::new()),
            default_native,
            state: Arc::new(PcmState::default()),
            opens: AtomicUsize::new(0),
            native_queries: AtomicUsize::new(0),
            fail_open: AtomicBool::new(false),
        }
    }

    /// Overrides the native config of one node.
    pub fn set_native(&self, card: u32, device: u32, config: PcmConfig) {
        self.native.lock().insert((card, device), config);
    }

    /// Makes every subsequent open fail with `DeviceUnavailable`.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent device read/write fail with `DeviceIo`.
    pub fn set_io_error(&self, fail: bool) {
        self.state.io_error.store(fail, Ordering::SeqCst);
    }

    /// Samples written to any opened playback node, in order.
    pub fn written(&self) -> Vec<i16> {
        self.state.written.lock().clone()
    }

    /// Queues samples for capture nodes to deliver.
    pub fn push_capture(&self, samples: &[i16]) {
        self.state.capture.lock().extend(samples);
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of native-config queries (format negotiations).
    pub fn native_query_count(&self) -> usize {
        self.native_queries.load(Ordering::SeqCst)
    }
}

impl PcmDriver for MockPcmDriver {
    fn native_config(&self, card: u32, device: u32) -> Result<PcmConfig, ProxyError> {
        self.native_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .native
            .lock()
            .get(&(card, device))
            .copied()
            .unwrap_or(self.default_native))
    }

    fn open(
        &self,
        card: u32,
        device: u32,
        config: &PcmConfig,
    ) -> Result<Box<dyn PcmDevice>, ProxyError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ProxyError::unavailable(
                format!("pcm{card}:{device}"),
                "mock open failure",
            ));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPcmDevice {
            channels: config.channels,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockPcmDevice {
    channels: u16,
    state: Arc<PcmState>,
}

impl PcmDevice for MockPcmDevice {
    fn write(&mut self, samples: &[i16]) -> Result<usize, ProxyError> {
        if self.state.io_error.load(Ordering::SeqCst) {
            return Err(ProxyError::io("mock write failure"));
        }
        self.state.written.lock().extend_from_slice(samples);
        Ok(samples.len() / self.channels as usize)
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<usize, ProxyError> {
        if self.state.io_error.load(Ordering::SeqCst) {
            return Err(ProxyError::io("mock read failure"));
        }
        let mut capture = self.state.capture.lock();
        let channels = self.channels as usize;
        let want = buf.len() - buf.len() % channels;
        let available = capture.len() - capture.len() % channels;
        let take = want.min(available);
        for slot in &mut buf[..take] {
            // take <= capture.len(), so the queue cannot run dry here
            *slot = capture.pop_front().unwrap_or(0);
        }
        Ok(take / channels)
    }
}

/// Shared state between a [`MockCompressDriver`] and its devices.
#[derive(Default)]
struct CompressState {
    written: Mutex<Vec<u8>>,
    metadata: Mutex<Option<GaplessMetadata>>,
}

/// A compress (offload) driver serving in-memory devices.
#[derive(Default)]
pub struct MockCompressDriver {
    state: Arc<CompressState>,
}

impl MockCompressDriver {
    /// Creates the driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoded bytes written to any opened node.
    pub fn written(&self) -> Vec<u8> {
        self.state.written.lock().clone()
    }

    /// Last gapless metadata installed, if any.
    pub fn metadata(&self) -> Option<GaplessMetadata> {
        *self.state.metadata.lock()
    }
}

impl CompressDriver for MockCompressDriver {
    fn open(&self, _card: u32, _device: u32) -> Result<Box<dyn CompressDevice>, ProxyError> {
        Ok(Box::new(MockCompressDevice {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockCompressDevice {
    state: Arc<CompressState>,
}

impl CompressDevice for MockCompressDevice {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, ProxyError> {
        self.state.written.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn set_metadata(&mut self, metadata: GaplessMetadata) -> Result<(), ProxyError> {
        *self.state.metadata.lock() = Some(metadata);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_mixer_records_writes() {
        let mixer = MockMixer::new();
        mixer.set_control("SPK Switch", 1).unwrap();
        mixer.set_control("SPK Switch", 0).unwrap();
        assert_eq!(mixer.value("SPK Switch"), Some(0));
        assert_eq!(mixer.write_count(), 2);
    }

    #[test]
    fn test_mock_mixer_strict_controls() {
        let mixer = MockMixer::with_controls(["Known"]);
        assert!(mixer.set_control("Known", 1).is_ok());
        assert!(matches!(
            mixer.set_control("Unknown", 1),
            Err(ProxyError::ControlNotFound { .. })
        ));
        assert!(mixer.get_control("Unknown").is_err());
    }

    #[test]
    fn test_mock_pcm_roundtrip() {
        let driver = MockPcmDriver::new(PcmConfig::default());
        let mut device = driver.open(0, 0, &PcmConfig::new(48_000, 2)).unwrap();

        assert_eq!(device.write(&[1, 2, 3, 4]).unwrap(), 2);
        assert_eq!(driver.written(), vec![1, 2, 3, 4]);

        driver.push_capture(&[5, 6, 7, 8]);
        let mut buf = vec![0i16; 4];
        assert_eq!(device.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_mock_pcm_short_read() {
        let driver = MockPcmDriver::new(PcmConfig::default());
        let mut device = driver.open(0, 1, &PcmConfig::new(16_000, 1)).unwrap();
        let mut buf = vec![0i16; 16];
        assert_eq!(device.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_mock_pcm_fail_open() {
        let driver = MockPcmDriver::new(PcmConfig::default());
        driver.set_fail_open(true);
        assert!(matches!(
            driver.open(0, 0, &PcmConfig::default()),
            Err(ProxyError::DeviceUnavailable { .. })
        ));
    }

    #[test]
    fn test_mock_compress_records() {
        let driver = MockCompressDriver::new();
        let mut device = driver.open(0, 8).unwrap();
        device.write_bytes(&[0xAA, 0xBB]).unwrap();
        device
            .set_metadata(GaplessMetadata {
                encoder_delay: 576,
                encoder_padding: 1152,
            })
            .unwrap();
        assert_eq!(driver.written(), vec![0xAA, 0xBB]);
        assert_eq!(driver.metadata().unwrap().encoder_delay, 576);
    }
}
