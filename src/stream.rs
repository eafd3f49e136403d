//! Stream lifecycle control.
//!
//! A [`StreamController`] owns one logical audio stream:
//!
//! ```text
//! Created -> Configured -> Active <-> Standby -> Closed
//! ```
//!
//! Standby releases the physical device but keeps the negotiated format
//! and conversion plan, so `start()` after `standby()` rebinds the same
//! device slot without renegotiating. All per-stream state (adapter
//! scratch, counters) is owned by the caller's thread; no locking.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{DeviceSlot, PcmConfig, SampleFormat};
use crate::device::{CompressDevice, GaplessMetadata, PcmDevice};
use crate::error::ProxyError;
use crate::format::{self, ConversionPlan, FormatAdapter};
use crate::proxy::ProxyShared;
use crate::types::{AudioUsage, DeviceType, Direction, Modifier, RouteTriple};

/// Position of a stream in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Allocated, format not yet negotiated.
    Created,
    /// Format negotiated, conversion plan derived.
    Configured,
    /// Device bound, path routed, I/O legal.
    Active,
    /// Device released, configuration retained.
    Standby,
    /// All resources released. Terminal.
    Closed,
}

enum DeviceBinding {
    Pcm {
        slot: DeviceSlot,
        handle: Box<dyn PcmDevice>,
    },
    Compress {
        slot: DeviceSlot,
        handle: Box<dyn CompressDevice>,
    },
}

/// One logical audio stream bound to a physical device slot.
pub struct StreamController {
    shared: Arc<ProxyShared>,
    id: u64,
    direction: Direction,
    usage: AudioUsage,
    offload: bool,
    primary: bool,
    state: StreamState,
    requested: Option<PcmConfig>,
    native: Option<PcmConfig>,
    adapter: Option<FormatAdapter>,
    binding: Option<DeviceBinding>,
    /// Total frames moved, in the client format. Never reset on standby.
    frames: u64,
    vol: (f32, f32),
    gain_buf: Vec<i16>,
}

impl StreamController {
    pub(crate) fn new(
        shared: Arc<ProxyShared>,
        id: u64,
        direction: Direction,
        usage: AudioUsage,
        offload: bool,
        primary: bool,
    ) -> Self {
        Self {
            shared,
            id,
            direction,
            usage,
            offload,
            primary,
            state: StreamState::Created,
            requested: None,
            native: None,
            adapter: None,
            binding: None,
            frames: 0,
            vol: (1.0, 1.0),
            gain_buf: Vec::new(),
        }
    }

    /// Negotiates the client format against the device-native format and
    /// derives the conversion flags.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::UnsupportedFormat`] when no conversion path
    /// exists; the stream stays in its previous state.
    pub fn configure(&mut self, requested: PcmConfig) -> Result<(), ProxyError> {
        if !matches!(self.state, StreamState::Created | StreamState::Configured) {
            return Err(ProxyError::invalid_state(
                "configure",
                format!("stream is {:?}", self.state),
            ));
        }

        let slot = self.slot()?;
        let native = self.shared.driver.native_config(slot.card, slot.device)?;

        let adapter = if self.offload {
            None
        } else {
            let (source, target) = match self.direction {
                Direction::Playback => (&requested, &native),
                Direction::Capture => (&native, &requested),
            };
            Some(FormatAdapter::negotiate(source, target)?)
        };

        self.gain_buf = Vec::with_capacity(requested.period_samples());
        self.requested = Some(requested);
        self.native = Some(native);
        self.adapter = adapter;
        self.state = StreamState::Configured;
        Ok(())
    }

    /// Routes the stream's use-case and opens the physical device.
    ///
    /// The route request is optimistic: the stream proceeds while the
    /// mixer commit runs on the engine worker.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::DeviceUnavailable`] when no device slot can
    /// be bound; the stream stays in its previous state.
    pub fn start(&mut self) -> Result<(), ProxyError> {
        if !matches!(self.state, StreamState::Configured | StreamState::Standby) {
            return Err(ProxyError::invalid_state(
                "start",
                format!("stream is {:?}", self.state),
            ));
        }

        let device = self
            .shared
            .routing
            .active(self.direction)
            .map(|t| t.device)
            .unwrap_or(self.fallback_device());
        let modifier = self.modifier_for(device);
        let triple = RouteTriple {
            usage: self.usage,
            device,
            modifier,
        };
        // Fire-and-forget: callers needing commit confirmation use
        // AudioProxy::set_route and wait on its token.
        let _ = self
            .shared
            .routing
            .request_route(self.direction, triple, Vec::new());

        let slot = self.slot()?;
        let binding = if self.offload {
            let Some(compress) = &self.shared.compress else {
                return Err(ProxyError::unavailable(
                    slot.name(),
                    "no compress driver on this board",
                ));
            };
            DeviceBinding::Compress {
                slot,
                handle: compress.open(slot.card, slot.device)?,
            }
        } else {
            // Safe: configure() populated native before Configured.
            let native = self.native.ok_or_else(|| {
                ProxyError::invalid_state("start", "stream was never configured")
            })?;
            DeviceBinding::Pcm {
                slot,
                handle: self.shared.driver.open(slot.card, slot.device, &native)?,
            }
        };

        if self.state == StreamState::Standby {
            if let Some(adapter) = self.adapter.as_mut() {
                adapter.flush();
            }
        }

        self.binding = Some(binding);
        self.state = StreamState::Active;
        tracing::debug!(
            stream = self.id,
            usage = ?self.usage,
            direction = ?self.direction,
            ?device,
            "stream active"
        );
        Ok(())
    }

    /// Writes client frames through the format adapter to the device.
    /// Returns the client frames consumed.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidState`] outside `Active`, or
    /// [`ProxyError::DeviceIo`] on hardware failure (the state machine
    /// does not move; retry or call [`standby`](Self::standby)).
    pub fn write(&mut self, samples: &[i16]) -> Result<u64, ProxyError> {
        self.check_io("write", Direction::Playback, SampleFormat::S16Le)?;

        let requested = self.client_config("write")?;
        let client_frames = (samples.len() / requested.channels as usize) as u64;

        let use_gain = self.vol != (1.0, 1.0);
        if use_gain {
            self.gain_buf.clear();
            self.gain_buf.extend_from_slice(samples);
            format::apply_gain(&mut self.gain_buf, requested.channels, self.vol.0, self.vol.1);
        }

        let adapter = self
            .adapter
            .as_mut()
            .ok_or_else(|| ProxyError::invalid_state("write", "no conversion plan"))?;
        let binding = self
            .binding
            .as_mut()
            .ok_or_else(|| ProxyError::invalid_state("write", "no device binding"))?;
        let DeviceBinding::Pcm { handle, .. } = binding else {
            return Err(ProxyError::invalid_state("write", "offload stream takes bytes"));
        };

        let native_ch = adapter.plan().target.channels as usize;
        let input: &[i16] = if use_gain { &self.gain_buf } else { samples };
        let converted = adapter.push(input);

        let mut sent = 0;
        while sent < converted.len() {
            let frames = handle.write(&converted[sent..])?;
            if frames == 0 {
                break;
            }
            sent += frames * native_ch;
        }

        self.frames += client_frames;
        Ok(client_frames)
    }

    /// Writes F32 client frames; only legal when the stream was
    /// configured with [`SampleFormat::F32Le`].
    ///
    /// # Errors
    ///
    /// As [`write`](Self::write).
    pub fn write_f32(&mut self, samples: &[f32]) -> Result<u64, ProxyError> {
        self.check_io("write", Direction::Playback, SampleFormat::F32Le)?;

        let requested = self.client_config("write")?;
        let client_frames = (samples.len() / requested.channels as usize) as u64;

        self.gain_buf.clear();
        format::f32_slice_to_i16(samples, &mut self.gain_buf);
        if self.vol != (1.0, 1.0) {
            format::apply_gain(&mut self.gain_buf, requested.channels, self.vol.0, self.vol.1);
        }

        let adapter = self
            .adapter
            .as_mut()
            .ok_or_else(|| ProxyError::invalid_state("write", "no conversion plan"))?;
        let binding = self
            .binding
            .as_mut()
            .ok_or_else(|| ProxyError::invalid_state("write", "no device binding"))?;
        let DeviceBinding::Pcm { handle, .. } = binding else {
            return Err(ProxyError::invalid_state("write", "offload stream takes bytes"));
        };

        let native_ch = adapter.plan().target.channels as usize;
        let converted = adapter.push(&self.gain_buf);

        let mut sent = 0;
        while sent < converted.len() {
            let frames = handle.write(&converted[sent..])?;
            if frames == 0 {
                break;
            }
            sent += frames * native_ch;
        }

        self.frames += client_frames;
        Ok(client_frames)
    }

    /// Reads converted frames from the device into `out`. Returns the
    /// client frames delivered, which may be short when the device has
    /// no data buffered.
    ///
    /// # Errors
    ///
    /// As [`write`](Self::write).
    pub fn read(&mut self, out: &mut [i16]) -> Result<u64, ProxyError> {
        self.check_io("read", Direction::Capture, SampleFormat::S16Le)?;

        let adapter = self
            .adapter
            .as_mut()
            .ok_or_else(|| ProxyError::invalid_state("read", "no conversion plan"))?;
        let binding = self
            .binding
            .as_mut()
            .ok_or_else(|| ProxyError::invalid_state("read", "no device binding"))?;
        let DeviceBinding::Pcm { handle, .. } = binding else {
            return Err(ProxyError::invalid_state("read", "offload stream takes bytes"));
        };

        let mut provider = |buf: &mut [i16]| handle.read(buf);
        let frames = adapter.pull(out, &mut provider)? as u64;

        self.frames += frames;
        Ok(frames)
    }

    /// Reads converted F32 frames; only legal when the stream was
    /// configured with [`SampleFormat::F32Le`].
    ///
    /// # Errors
    ///
    /// As [`read`](Self::read).
    pub fn read_f32(&mut self, out: &mut [f32]) -> Result<u64, ProxyError> {
        self.check_io("read", Direction::Capture, SampleFormat::F32Le)?;

        let channels = self.client_config("read")?.channels as usize;
        self.gain_buf.resize(out.len(), 0);

        let adapter = self
            .adapter
            .as_mut()
            .ok_or_else(|| ProxyError::invalid_state("read", "no conversion plan"))?;
        let binding = self
            .binding
            .as_mut()
            .ok_or_else(|| ProxyError::invalid_state("read", "no device binding"))?;
        let DeviceBinding::Pcm { handle, .. } = binding else {
            return Err(ProxyError::invalid_state("read", "offload stream takes bytes"));
        };

        let mut provider = |buf: &mut [i16]| handle.read(buf);
        let frames = adapter.pull(&mut self.gain_buf, &mut provider)? as u64;
        format::i16_slice_to_f32(&self.gain_buf[..frames as usize * channels], out);

        self.frames += frames;
        Ok(frames)
    }

    /// Writes encoded bytes to a compressed (offload) stream. Returns
    /// the bytes accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidState`] outside `Active` or on a PCM
    /// stream, or [`ProxyError::DeviceIo`] on hardware failure.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<usize, ProxyError> {
        if self.state != StreamState::Active {
            return Err(ProxyError::invalid_state(
                "write_bytes",
                format!("stream is {:?}", self.state),
            ));
        }
        let Some(DeviceBinding::Compress { handle, .. }) = self.binding.as_mut() else {
            return Err(ProxyError::invalid_state(
                "write_bytes",
                "not an offload stream",
            ));
        };
        handle.write_bytes(data)
    }

    /// Installs gapless metadata on a compressed stream for the next
    /// track boundary.
    ///
    /// # Errors
    ///
    /// As [`write_bytes`](Self::write_bytes).
    pub fn set_gapless_metadata(&mut self, metadata: GaplessMetadata) -> Result<(), ProxyError> {
        if self.state != StreamState::Active {
            return Err(ProxyError::invalid_state(
                "set_gapless_metadata",
                format!("stream is {:?}", self.state),
            ));
        }
        let Some(DeviceBinding::Compress { handle, .. }) = self.binding.as_mut() else {
            return Err(ProxyError::invalid_state(
                "set_gapless_metadata",
                "not an offload stream",
            ));
        };
        handle.set_metadata(metadata)
    }

    /// Releases the physical device, retaining the negotiated format and
    /// conversion plan. Idempotent; routing is retained.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidState`] only on a closed stream.
    pub fn standby(&mut self) -> Result<(), ProxyError> {
        match self.state {
            StreamState::Closed => Err(ProxyError::invalid_state("standby", "stream is closed")),
            StreamState::Active => {
                self.binding = None;
                self.state = StreamState::Standby;
                tracing::debug!(stream = self.id, "stream standby");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Releases every resource, including the routing reservation held
    /// for this stream's use-case. Idempotent; reachable from any state.
    pub fn close(&mut self) {
        if self.state == StreamState::Closed {
            return;
        }
        self.binding = None;
        self.release_reservations();
        self.state = StreamState::Closed;
        tracing::debug!(stream = self.id, "stream closed");
    }

    /// Sets per-channel gain, clamped to [0.0, 1.0].
    pub fn set_volume(&mut self, left: f32, right: f32) {
        self.vol = (left.clamp(0.0, 1.0), right.clamp(0.0, 1.0));
    }

    /// Current per-channel gain.
    pub fn volume(&self) -> (f32, f32) {
        self.vol
    }

    /// Lifecycle position.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Cumulative client frames moved. Not reset on standby.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// The stream's use-case.
    pub fn usage(&self) -> AudioUsage {
        self.usage
    }

    /// The stream's direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Whether this is the proxy's primary output stream.
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// The format the client negotiated, once configured.
    pub fn requested_config(&self) -> Option<PcmConfig> {
        self.requested
    }

    /// The device-native format, once configured.
    pub fn native_config(&self) -> Option<PcmConfig> {
        self.native
    }

    /// Conversion flags derived at configure time.
    pub fn plan(&self) -> Option<&ConversionPlan> {
        self.adapter.as_ref().map(FormatAdapter::plan)
    }

    /// The device slot currently bound, while `Active`.
    pub fn bound_slot(&self) -> Option<DeviceSlot> {
        match self.binding.as_ref()? {
            DeviceBinding::Pcm { slot, .. } | DeviceBinding::Compress { slot, .. } => Some(*slot),
        }
    }

    /// End-to-end latency of the path currently serving this stream.
    pub fn latency(&self) -> Duration {
        let device = self
            .shared
            .routing
            .active(self.direction)
            .map(|t| t.device)
            .unwrap_or(self.fallback_device());
        self.shared.routing.path_latency(device)
    }

    fn slot(&self) -> Result<DeviceSlot, ProxyError> {
        self.shared
            .slots
            .slot(self.usage, self.direction)
            .ok_or_else(|| {
                ProxyError::unavailable(
                    format!("{:?}/{:?}", self.usage, self.direction),
                    "no device slot mapped for this use-case",
                )
            })
    }

    fn fallback_device(&self) -> DeviceType {
        match self.direction {
            Direction::Playback => self.shared.config.playback_fallback,
            Direction::Capture => self.shared.config.capture_fallback,
        }
    }

    fn modifier_for(&self, device: DeviceType) -> Option<Modifier> {
        (device == DeviceType::Speaker && self.shared.board.dual_speaker)
            .then_some(Modifier::DualSpeaker)
    }

    fn check_io(
        &self,
        operation: &'static str,
        direction: Direction,
        format: SampleFormat,
    ) -> Result<(), ProxyError> {
        if self.state != StreamState::Active {
            return Err(ProxyError::invalid_state(
                operation,
                format!("stream is {:?}", self.state),
            ));
        }
        if self.direction != direction {
            return Err(ProxyError::invalid_state(
                operation,
                format!("stream direction is {:?}", self.direction),
            ));
        }
        match self.requested {
            Some(config) if config.format == format => Ok(()),
            Some(config) => Err(ProxyError::invalid_state(
                operation,
                format!("stream carries {:?} samples", config.format),
            )),
            None => Err(ProxyError::invalid_state(operation, "not configured")),
        }
    }

    fn client_config(&self, operation: &'static str) -> Result<PcmConfig, ProxyError> {
        self.requested
            .ok_or_else(|| ProxyError::invalid_state(operation, "not configured"))
    }

    fn release_reservations(&mut self) {
        if self.primary {
            let mut primary = self.shared.primary_out.lock();
            if *primary == Some(self.id) {
                *primary = None;
            }
        }
        if self
            .shared
            .routing
            .active(self.direction)
            .is_some_and(|t| t.usage == self.usage)
        {
            self.shared.routing.clear(self.direction);
        }
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        if self.state != StreamState::Closed {
            self.close();
        }
    }
}
