//! Error types for the audio proxy.
//!
//! Format and parameter errors are rejected synchronously, before any
//! hardware effect. I/O and commit errors surface per call or through a
//! [`CommitToken`](crate::route::CommitToken); none of them are fatal to
//! the proxy — the worst case is a stream staying unroutable until the
//! next successful request.

use crate::types::Direction;

/// Errors surfaced by the proxy core.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No viable conversion plan exists between the requested and the
    /// device-native format. The stream configuration is rejected and the
    /// stream stays in its previous state.
    #[error("unsupported format: {reason}")]
    UnsupportedFormat {
        /// Why negotiation failed.
        reason: String,
    },

    /// The physical device is busy or absent. The stream stays in its
    /// previous state; the caller may retry.
    #[error("device unavailable: {name} - {reason}")]
    DeviceUnavailable {
        /// Name of the unavailable device (e.g. `pcm0:3`).
        name: String,
        /// Reason the device is unavailable.
        reason: String,
    },

    /// Transient hardware I/O failure. Surfaced per call; the stream state
    /// machine does not move, the caller decides retry vs. standby.
    #[error("device I/O error: {reason}")]
    DeviceIo {
        /// Description of the failure.
        reason: String,
    },

    /// A mixer commit exceeded its bounded latency. The last-committed
    /// triple is left as last-known; retry requires a fresh route request.
    #[error("mixer commit timed out for {direction:?} path")]
    MixerTimeout {
        /// Direction whose commit timed out.
        direction: Direction,
    },

    /// A call parameter exceeds its declared bit width. Rejected before
    /// any hardware effect; nothing is silently truncated.
    #[error("invalid call parameter: {field} = {value} (max {max})")]
    InvalidCallParameter {
        /// Name of the offending field.
        field: &'static str,
        /// Value that was passed.
        value: u32,
        /// Largest value the field can carry.
        max: u32,
    },

    /// The mixer backend is missing an expected control. A configuration
    /// defect: surfaced, never crashes the routing engine.
    #[error("mixer control not found: {name}")]
    ControlNotFound {
        /// Name of the missing control.
        name: String,
    },

    /// The persisted routing descriptor could not be parsed.
    #[error("invalid route map: {reason}")]
    InvalidRouteMap {
        /// Parse failure description.
        reason: String,
    },

    /// An operation was issued outside its legal state.
    #[error("invalid state for {operation}: {detail}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// Why the operation is not legal right now.
        detail: String,
    },
}

impl ProxyError {
    /// Creates an [`UnsupportedFormat`](Self::UnsupportedFormat) error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            reason: reason.into(),
        }
    }

    /// Creates a [`DeviceIo`](Self::DeviceIo) error.
    pub fn io(reason: impl Into<String>) -> Self {
        Self::DeviceIo {
            reason: reason.into(),
        }
    }

    /// Creates a [`DeviceUnavailable`](Self::DeviceUnavailable) error.
    pub fn unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an [`InvalidState`](Self::InvalidState) error.
    pub fn invalid_state(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidState {
            operation,
            detail: detail.into(),
        }
    }
}
