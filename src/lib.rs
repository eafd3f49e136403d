//! # audio-proxy
//!
//! Routing and stream-management core for a low-level audio hardware
//! proxy.
//!
//! `audio-proxy` multiplexes logical audio use-cases (media playback,
//! voice call, FM radio, USB/Bluetooth offload, voice-trigger capture)
//! onto a small set of physical PCM/compressed-audio endpoints, and
//! keeps a hardware mixer's routing graph consistent with the active
//! use-cases under concurrent access.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use audio_proxy::{AudioProxy, AudioUsage, PcmConfig, RouteMap};
//!
//! let proxy = AudioProxy::builder()
//!     .mixer(mixer_backend)
//!     .pcm_driver(pcm_driver)
//!     .route_map(RouteMap::from_toml_str(&descriptor)?)
//!     .a2dp(true, 150)
//!     .on_event(|e| tracing::warn!(?e, "proxy event"))
//!     .start()?;
//!
//! let mut stream = proxy.open_playback(AudioUsage::Media);
//! stream.configure(PcmConfig::new(48_000, 2))?;
//! stream.start()?;
//! stream.write(&pcm_frames)?;
//! stream.standby()?;
//!
//! proxy.shutdown().await;
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict ownership boundary:
//!
//! - **Caller threads**: own their stream's format adapter, counters and
//!   device handle; stream I/O never takes a shared lock
//! - **Routing state**: active use-case/device/modifier triple per
//!   direction behind a reader/writer lock, last-writer-wins
//! - **Commit worker**: a single background task owns every
//!   mixer-control write, coalesces rapid route changes, and bounds
//!   commit latency
//!
//! Hardware is consumed through trait seams ([`device`], [`mixer`]), so
//! the whole core runs against the in-crate [`mock`] backends in CI.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod auxiliary;
mod call;
mod config;
pub mod device;
mod error;
mod event;
pub mod format;
pub mod mixer;
pub mod mock;
mod proxy;
mod route;
mod stream;
mod types;

pub use call::{CallParams, RateBand, TtyMode};
pub use config::{DeviceSlot, DeviceSlots, PcmConfig, ProxyConfig, SampleFormat};
pub use device::{CompressDevice, CompressDriver, GaplessMetadata, PcmDevice, PcmDriver};
pub use error::ProxyError;
pub use event::{event_callback, EventCallback, ProxyEvent};
pub use proxy::{
    AudioProxy, AudioProxyBuilder, BoardInfo, CallTokens, MicLocation, MicrophoneInfo,
    MAX_MIC_COUNT,
};
pub use route::{
    CommitOutcome, CommitToken, MixerCommitEngine, MixerUpdate, RoutingState,
    MIXER_COMMIT_TIMEOUT,
};
pub use stream::{StreamController, StreamState};
pub use types::{AudioUsage, DeviceType, Direction, Modifier, RouteTriple};
