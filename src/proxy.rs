//! Process-wide routing context.
//!
//! [`AudioProxy`] is constructed once at module initialization via its
//! builder, owns the mixer commit worker and the shared routing state,
//! and hands out [`StreamController`]s. Teardown through
//! [`shutdown`](AudioProxy::shutdown) stops the worker and releases all
//! device handles deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::auxiliary::{AuxRegistry, FmWiring, VoiceTriggerLib};
use crate::call::CallParams;
use crate::config::{DeviceSlots, ProxyConfig};
use crate::device::{CompressDriver, PcmDriver};
use crate::error::ProxyError;
use crate::event::{EventCallback, ProxyEvent};
use crate::mixer::{MixerBackend, RouteMap};
use crate::route::{CommitToken, MixerCommitEngine, RoutingState};
use crate::stream::StreamController;
use crate::types::{AudioUsage, DeviceType, Direction, Modifier, RouteTriple};

/// Hardware bound on built-in microphone descriptors.
pub const MAX_MIC_COUNT: usize = 32;

/// Where a built-in microphone sits on the device body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicLocation {
    /// Bottom edge, primary voice mic.
    Bottom,
    /// Top edge, usually the noise reference.
    Top,
    /// Back face, camcorder mic.
    Back,
}

/// Capability descriptor for one built-in microphone.
#[derive(Debug, Clone, PartialEq)]
pub struct MicrophoneInfo {
    /// Stable identifier, e.g. `mic_bottom`.
    pub id: String,
    /// Physical placement.
    pub location: MicLocation,
    /// Channels the mic delivers.
    pub channel_count: u16,
}

/// Built-in transducer inventory. Read-only after proxy start.
#[derive(Debug, Clone)]
pub struct BoardInfo {
    /// Earpiece receivers on the board.
    pub num_earpiece: u32,
    /// Loudspeakers on the board.
    pub num_speaker: u32,
    /// Proximity sensors wired into the audio path.
    pub num_proximity: u32,
    /// Whether both speaker amplifiers can be driven together.
    pub dual_speaker: bool,
    /// Built-in microphone descriptors, at most [`MAX_MIC_COUNT`].
    pub microphones: Vec<MicrophoneInfo>,
}

impl Default for BoardInfo {
    fn default() -> Self {
        Self {
            num_earpiece: 1,
            num_speaker: 1,
            num_proximity: 1,
            dual_speaker: false,
            microphones: vec![MicrophoneInfo {
                id: "mic_bottom".to_string(),
                location: MicLocation::Bottom,
                channel_count: 1,
            }],
        }
    }
}

#[derive(Default)]
struct CallState {
    active: bool,
    params: Option<CallParams>,
    prev_playback: Option<RouteTriple>,
    prev_capture: Option<RouteTriple>,
}

/// Commit tokens for the two call directions (CP downlink and uplink).
pub struct CallTokens {
    /// Playback-side commit (CP to output devices), if a path change
    /// was needed.
    pub rx: Option<CommitToken>,
    /// Capture-side commit (input devices to CP), if a path change was
    /// needed.
    pub tx: Option<CommitToken>,
}

pub(crate) struct ProxyShared {
    pub(crate) routing: RoutingState,
    pub(crate) driver: Arc<dyn PcmDriver>,
    pub(crate) compress: Option<Arc<dyn CompressDriver>>,
    pub(crate) slots: DeviceSlots,
    pub(crate) config: ProxyConfig,
    pub(crate) board: BoardInfo,
    pub(crate) primary_out: Mutex<Option<u64>>,
    routes: Arc<RouteMap>,
    aux: Arc<AuxRegistry>,
    call: Mutex<CallState>,
    events: Option<EventCallback>,
    next_stream_id: AtomicU64,
}

/// The audio proxy: singleton scope for the device, alive for the
/// process lifetime of the audio module.
pub struct AudioProxy {
    shared: Arc<ProxyShared>,
    engine: MixerCommitEngine,
    worker: Option<JoinHandle<()>>,
}

impl AudioProxy {
    /// Starts building a proxy.
    pub fn builder() -> AudioProxyBuilder {
        AudioProxyBuilder::default()
    }

    /// Opens a playback stream for a use-case. The first playback
    /// stream becomes the proxy's primary output.
    pub fn open_playback(&self, usage: AudioUsage) -> StreamController {
        let id = self.shared.next_stream_id.fetch_add(1, Ordering::SeqCst);
        let mut primary = self.shared.primary_out.lock();
        let is_primary = primary.is_none();
        if is_primary {
            *primary = Some(id);
        }
        drop(primary);
        StreamController::new(
            Arc::clone(&self.shared),
            id,
            Direction::Playback,
            usage,
            false,
            is_primary,
        )
    }

    /// Opens a capture stream for a use-case.
    pub fn open_capture(&self, usage: AudioUsage) -> StreamController {
        let id = self.shared.next_stream_id.fetch_add(1, Ordering::SeqCst);
        StreamController::new(
            Arc::clone(&self.shared),
            id,
            Direction::Capture,
            usage,
            false,
            false,
        )
    }

    /// Opens a compressed (offload) playback stream.
    pub fn open_offload(&self, usage: AudioUsage) -> StreamController {
        let id = self.shared.next_stream_id.fetch_add(1, Ordering::SeqCst);
        StreamController::new(
            Arc::clone(&self.shared),
            id,
            Direction::Playback,
            usage,
            true,
            false,
        )
    }

    /// Requests a route for a use-case. Returns `None` when the target
    /// is already active, otherwise the commit token.
    pub fn set_route(
        &self,
        direction: Direction,
        usage: AudioUsage,
        device: DeviceType,
        modifier: Option<Modifier>,
    ) -> Option<CommitToken> {
        self.shared.routing.request_route(
            direction,
            RouteTriple {
                usage,
                device,
                modifier,
            },
            Vec::new(),
        )
    }

    /// The active (optimistic) triple for a direction.
    pub fn active_route(&self, direction: Direction) -> Option<RouteTriple> {
        self.shared.routing.active(direction)
    }

    /// The triple last confirmed on the hardware for a direction.
    pub fn last_committed_route(&self, direction: Direction) -> Option<RouteTriple> {
        self.engine.last_committed(direction)
    }

    /// End-to-end path latency for a device, auxiliary contribution
    /// included.
    pub fn path_latency(&self, device: DeviceType) -> Duration {
        self.shared.routing.path_latency(device)
    }

    /// Starts call audio: routes both directions to the call profile
    /// and pushes the encoded parameter key to its mixer control.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidState`] if a call is already active,
    /// or [`ProxyError::InvalidCallParameter`] if `device` cannot carry
    /// call audio.
    pub fn call_start(
        &self,
        device: DeviceType,
        params: CallParams,
    ) -> Result<CallTokens, ProxyError> {
        if device.call_code().is_none() {
            return Err(ProxyError::invalid_state(
                "call_start",
                format!("{device:?} cannot carry call audio"),
            ));
        }

        let key = params.encode();
        {
            let mut call = self.shared.call.lock();
            if call.active {
                return Err(ProxyError::invalid_state("call_start", "call already active"));
            }
            call.active = true;
            call.params = Some(params);
            call.prev_playback = self.shared.routing.active(Direction::Playback);
            call.prev_capture = self.shared.routing.active(Direction::Capture);
        }
        self.emit(ProxyEvent::CallStateChanged { active: true });
        tracing::info!(?device, key, "call audio started");

        let extra = vec![(
            self.shared.routes.call_param_control().to_string(),
            key as i32,
        )];
        let rx = self.shared.routing.request_route(
            Direction::Playback,
            RouteTriple::new(AudioUsage::VoiceCall, device),
            extra,
        );
        let tx = self.shared.routing.request_route(
            Direction::Capture,
            RouteTriple::new(AudioUsage::VoiceCall, call_tx_device(device)),
            Vec::new(),
        );
        Ok(CallTokens { rx, tx })
    }

    /// Stops call audio and restores the routes active before the call.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidState`] if no call is active.
    pub fn call_stop(&self) -> Result<CallTokens, ProxyError> {
        let (prev_playback, prev_capture) = {
            let mut call = self.shared.call.lock();
            if !call.active {
                return Err(ProxyError::invalid_state("call_stop", "no call active"));
            }
            call.active = false;
            call.params = None;
            (call.prev_playback.take(), call.prev_capture.take())
        };
        self.emit(ProxyEvent::CallStateChanged { active: false });
        tracing::info!("call audio stopped");

        let clear_key = vec![(self.shared.routes.call_param_control().to_string(), 0)];
        let rx = match prev_playback {
            Some(triple) => {
                self.shared
                    .routing
                    .request_route(Direction::Playback, triple, clear_key)
            }
            None => {
                self.shared.routing.clear(Direction::Playback);
                None
            }
        };
        let tx = match prev_capture {
            Some(triple) => {
                self.shared
                    .routing
                    .request_route(Direction::Capture, triple, Vec::new())
            }
            None => {
                self.shared.routing.clear(Direction::Capture);
                None
            }
        };
        Ok(CallTokens { rx, tx })
    }

    /// Re-encodes the call parameters mid-call (band change, TTY toggle,
    /// mic count change) and recommits the call path with the new key.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidState`] if no call is active.
    pub fn call_parameter_update(
        &self,
        params: CallParams,
    ) -> Result<Option<CommitToken>, ProxyError> {
        let key = {
            let mut call = self.shared.call.lock();
            if !call.active {
                return Err(ProxyError::invalid_state(
                    "call_parameter_update",
                    "no call active",
                ));
            }
            call.params = Some(params);
            params.encode()
        };
        tracing::info!(key, "call parameters updated");

        // The triple is unchanged, so this bypasses the no-change elision
        // and recommits with the new key.
        Ok(self.shared.routing.resubmit(
            Direction::Playback,
            vec![(
                self.shared.routes.call_param_control().to_string(),
                key as i32,
            )],
        ))
    }

    /// Whether call audio is active.
    pub fn call_active(&self) -> bool {
        self.shared.call.lock().active
    }

    /// The call parameters last installed, while a call is active.
    pub fn call_params(&self) -> Option<CallParams> {
        self.shared.call.lock().params
    }

    /// Built-in microphone descriptors.
    pub fn microphones(&self) -> &[MicrophoneInfo] {
        &self.shared.board.microphones
    }

    /// Built-in transducer inventory.
    pub fn board(&self) -> &BoardInfo {
        &self.shared.board
    }

    /// The board's auxiliary paths.
    pub fn aux(&self) -> &AuxRegistry {
        &self.shared.aux
    }

    /// Stops the commit worker, resolves outstanding tokens, and takes
    /// every auxiliary path down.
    pub async fn shutdown(mut self) {
        self.engine.stop();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
        self.shared.aux.deactivate_all();
        self.shared.routing.clear(Direction::Playback);
        self.shared.routing.clear(Direction::Capture);
        tracing::debug!("audio proxy shut down");
    }

    fn emit(&self, event: ProxyEvent) {
        if let Some(callback) = &self.shared.events {
            callback(event);
        }
    }
}

impl Drop for AudioProxy {
    fn drop(&mut self) {
        if self.worker.is_some() {
            // Dropped without explicit shutdown() - stop the worker in
            // the background.
            self.engine.stop();
        }
    }
}

/// Uplink device paired with a call's output device.
fn call_tx_device(rx: DeviceType) -> DeviceType {
    match rx {
        DeviceType::Headset => DeviceType::HeadsetMic,
        DeviceType::BtSco => DeviceType::BtSco,
        DeviceType::UsbHeadset => DeviceType::UsbMic,
        _ => DeviceType::BuiltinMic,
    }
}

/// Configures and starts an [`AudioProxy`].
#[derive(Default)]
pub struct AudioProxyBuilder {
    mixer: Option<Arc<dyn MixerBackend>>,
    driver: Option<Arc<dyn PcmDriver>>,
    compress: Option<Arc<dyn CompressDriver>>,
    routes: Option<RouteMap>,
    board: Option<BoardInfo>,
    slots: Option<DeviceSlots>,
    config: ProxyConfig,
    events: Option<EventCallback>,
    a2dp: Option<(bool, u32)>,
    fm: Option<FmWiring>,
    usb_loopback: Option<(bool, bool)>,
    trigger_lib: Option<Box<dyn VoiceTriggerLib>>,
}

impl AudioProxyBuilder {
    /// Sets the mixer-control backend. Required.
    #[must_use]
    pub fn mixer(mut self, mixer: Arc<dyn MixerBackend>) -> Self {
        self.mixer = Some(mixer);
        self
    }

    /// Sets the PCM driver. Required.
    #[must_use]
    pub fn pcm_driver(mut self, driver: Arc<dyn PcmDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Sets the compressed-audio driver for offload streams.
    #[must_use]
    pub fn compress_driver(mut self, driver: Arc<dyn CompressDriver>) -> Self {
        self.compress = Some(driver);
        self
    }

    /// Loads the routing descriptor. Required.
    #[must_use]
    pub fn route_map(mut self, routes: RouteMap) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Sets the transducer inventory.
    #[must_use]
    pub fn board_info(mut self, board: BoardInfo) -> Self {
        self.board = Some(board);
        self
    }

    /// Sets the use-case to device-slot mapping.
    #[must_use]
    pub fn device_slots(mut self, slots: DeviceSlots) -> Self {
        self.slots = Some(slots);
        self
    }

    /// Sets proxy-wide tunables.
    #[must_use]
    pub fn config(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the mixer commit bound.
    #[must_use]
    pub fn commit_timeout(mut self, timeout: Duration) -> Self {
        self.config.commit_timeout = timeout;
        self
    }

    /// Registers the runtime event callback.
    #[must_use]
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProxyEvent) + Send + Sync + 'static,
    {
        self.events = Some(Arc::new(callback));
        self
    }

    /// Declares A2DP offload support with its default delay.
    #[must_use]
    pub fn a2dp(mut self, supported: bool, default_delay_ms: u32) -> Self {
        self.a2dp = Some((supported, default_delay_ms));
        self
    }

    /// Declares FM radio wiring.
    #[must_use]
    pub fn fm(mut self, wiring: FmWiring) -> Self {
        self.fm = Some(wiring);
        self
    }

    /// Declares USB loopback support per direction.
    #[must_use]
    pub fn usb_loopback(mut self, out_supported: bool, in_supported: bool) -> Self {
        self.usb_loopback = Some((out_supported, in_supported));
        self
    }

    /// Installs the vendor voice-trigger library.
    #[must_use]
    pub fn voice_trigger(mut self, lib: Box<dyn VoiceTriggerLib>) -> Self {
        self.trigger_lib = Some(lib);
        self
    }

    /// Spawns the commit worker and assembles the proxy. Must be called
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidState`] when a required backend is
    /// missing or the board declares more than [`MAX_MIC_COUNT`] mics.
    pub fn start(self) -> Result<AudioProxy, ProxyError> {
        let mixer = self
            .mixer
            .ok_or_else(|| ProxyError::invalid_state("proxy start", "no mixer backend"))?;
        let driver = self
            .driver
            .ok_or_else(|| ProxyError::invalid_state("proxy start", "no PCM driver"))?;
        let routes = Arc::new(
            self.routes
                .ok_or_else(|| ProxyError::invalid_state("proxy start", "no route map loaded"))?,
        );
        let board = self.board.unwrap_or_default();
        if board.microphones.len() > MAX_MIC_COUNT {
            return Err(ProxyError::invalid_state(
                "proxy start",
                format!(
                    "{} microphones exceed the hardware maximum {MAX_MIC_COUNT}",
                    board.microphones.len()
                ),
            ));
        }

        let mut aux = AuxRegistry::builder();
        if let Some((supported, delay)) = self.a2dp {
            aux = aux.a2dp(supported, delay);
        }
        if let Some(wiring) = self.fm {
            aux = aux.fm(wiring);
        }
        if let Some((out, inp)) = self.usb_loopback {
            aux = aux.usb_loopback(out, inp);
        }
        if let Some(lib) = self.trigger_lib {
            aux = aux.voice_trigger(lib);
        }
        let aux = Arc::new(aux.build());

        let (engine, worker) = MixerCommitEngine::spawn(
            mixer,
            Arc::clone(&routes),
            self.config.commit_timeout,
            self.events.clone(),
        );
        let routing = RoutingState::new(
            engine.clone(),
            Arc::clone(&aux),
            self.config.playback_fallback,
            self.config.capture_fallback,
            self.config.base_path_latency,
            self.events.clone(),
        );

        let shared = Arc::new(ProxyShared {
            routing,
            driver,
            compress: self.compress,
            slots: self.slots.unwrap_or_default(),
            config: self.config,
            board,
            primary_out: Mutex::new(None),
            routes,
            aux,
            call: Mutex::new(CallState::default()),
            events: self.events,
            next_stream_id: AtomicU64::new(1),
        });

        tracing::info!("audio proxy started");
        Ok(AudioProxy {
            shared,
            engine,
            worker: Some(worker),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::RateBand;
    use crate::call::TtyMode;
    use crate::config::PcmConfig;
    use crate::mock::{MockMixer, MockPcmDriver};
    use crate::route::CommitOutcome;

    const ROUTES: &str = r#"
        call-param-control = "CP Call Param"

        [[path]]
        usage = "media"
        device = "speaker"
        controls = { "SPK Switch" = 1 }

        [[path]]
        usage = "voice-call"
        device = "earpiece"
        controls = { "RCV Switch" = 1, "CP Call Param" = 0 }

        [[path]]
        usage = "voice-call"
        device = "builtin-mic"
        controls = { "CP TX Switch" = 1 }

        [[path]]
        usage = "media"
        device = "builtin-mic"
        controls = { "MIC Switch" = 1 }
    "#;

    fn proxy_with(mixer: Arc<MockMixer>) -> AudioProxy {
        AudioProxy::builder()
            .mixer(mixer)
            .pcm_driver(Arc::new(MockPcmDriver::new(PcmConfig::default())))
            .route_map(RouteMap::from_toml_str(ROUTES).unwrap())
            .start()
            .unwrap()
    }

    fn call_params() -> CallParams {
        CallParams::new(1, RateBand::Wideband, 3, TtyMode::Off, 2, 1).unwrap()
    }

    #[tokio::test]
    async fn test_builder_requires_backends() {
        assert!(AudioProxy::builder().start().is_err());
        assert!(AudioProxy::builder()
            .mixer(Arc::new(MockMixer::new()))
            .start()
            .is_err());
    }

    #[tokio::test]
    async fn test_builder_bounds_mic_count() {
        let mics = (0..MAX_MIC_COUNT + 1)
            .map(|i| MicrophoneInfo {
                id: format!("mic_{i}"),
                location: MicLocation::Bottom,
                channel_count: 1,
            })
            .collect();
        let result = AudioProxy::builder()
            .mixer(Arc::new(MockMixer::new()))
            .pcm_driver(Arc::new(MockPcmDriver::new(PcmConfig::default())))
            .route_map(RouteMap::default())
            .board_info(BoardInfo {
                microphones: mics,
                ..BoardInfo::default()
            })
            .start();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_primary_stream_tracking() {
        let proxy = proxy_with(Arc::new(MockMixer::new()));

        let first = proxy.open_playback(AudioUsage::Media);
        let second = proxy.open_playback(AudioUsage::Notification);
        assert!(first.is_primary());
        assert!(!second.is_primary());

        // Closing the primary frees the slot for the next open.
        drop(first);
        let third = proxy.open_playback(AudioUsage::Media);
        assert!(third.is_primary());

        proxy.shutdown().await;
    }

    #[tokio::test]
    async fn test_call_lifecycle_routes_and_key() {
        let mixer = Arc::new(MockMixer::new());
        let proxy = proxy_with(Arc::clone(&mixer));

        let tokens = proxy
            .call_start(DeviceType::Earpiece, call_params())
            .unwrap();
        assert!(proxy.call_active());
        assert_eq!(tokens.rx.unwrap().wait().await, CommitOutcome::Applied);
        assert_eq!(tokens.tx.unwrap().wait().await, CommitOutcome::Applied);

        assert_eq!(mixer.value("RCV Switch"), Some(1));
        assert_eq!(mixer.value("CP TX Switch"), Some(1));
        assert_eq!(
            mixer.value("CP Call Param"),
            Some(call_params().encode() as i32)
        );

        // Starting again while active is rejected.
        assert!(proxy.call_start(DeviceType::Speaker, call_params()).is_err());

        proxy.call_stop().unwrap();
        assert!(!proxy.call_active());
        assert!(proxy.call_stop().is_err());

        proxy.shutdown().await;
    }

    #[tokio::test]
    async fn test_call_parameter_update_recommits_key() {
        let mixer = Arc::new(MockMixer::new());
        let proxy = proxy_with(Arc::clone(&mixer));

        let tokens = proxy
            .call_start(DeviceType::Earpiece, call_params())
            .unwrap();
        tokens.rx.unwrap().wait().await;

        let updated = CallParams::new(1, RateBand::SuperWideband, 3, TtyMode::Off, 2, 1).unwrap();
        let token = proxy.call_parameter_update(updated).unwrap().unwrap();
        assert_eq!(token.wait().await, CommitOutcome::Applied);
        assert_eq!(mixer.value("CP Call Param"), Some(updated.encode() as i32));
        assert_eq!(proxy.call_params(), Some(updated));

        proxy.shutdown().await;
    }

    #[tokio::test]
    async fn test_call_stop_restores_previous_route() {
        let mixer = Arc::new(MockMixer::new());
        let proxy = proxy_with(Arc::clone(&mixer));

        proxy
            .set_route(
                Direction::Playback,
                AudioUsage::Media,
                DeviceType::Speaker,
                None,
            )
            .unwrap()
            .wait()
            .await;

        proxy
            .call_start(DeviceType::Earpiece, call_params())
            .unwrap();
        assert_eq!(
            proxy.active_route(Direction::Playback).unwrap().usage,
            AudioUsage::VoiceCall
        );

        let tokens = proxy.call_stop().unwrap();
        assert_eq!(tokens.rx.unwrap().wait().await, CommitOutcome::Applied);
        assert_eq!(
            proxy.active_route(Direction::Playback),
            Some(RouteTriple::new(AudioUsage::Media, DeviceType::Speaker))
        );

        proxy.shutdown().await;
    }

    #[tokio::test]
    async fn test_call_start_rejects_non_call_device() {
        let proxy = proxy_with(Arc::new(MockMixer::new()));
        assert!(proxy
            .call_start(DeviceType::FmTuner, call_params())
            .is_err());
        assert!(!proxy.call_active());
        proxy.shutdown().await;
    }

    #[tokio::test]
    async fn test_microphone_inventory() {
        let proxy = proxy_with(Arc::new(MockMixer::new()));
        assert_eq!(proxy.microphones().len(), 1);
        assert_eq!(proxy.microphones()[0].location, MicLocation::Bottom);
        assert_eq!(proxy.board().num_speaker, 1);
        proxy.shutdown().await;
    }
}
