//! Mixer backend seam and the persisted routing descriptor.
//!
//! The descriptor maps each (use-case, device, modifier) triple to the
//! mixer-control values realizing that path. It is loaded once at proxy
//! start and read-only afterwards; commits write the differential
//! control set on the engine's worker.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ProxyError;
use crate::types::{AudioUsage, DeviceType, Modifier, RouteTriple};

/// Mixer-control backend, implemented by the platform layer.
///
/// All writes happen on the commit engine's worker, outside every lock.
pub trait MixerBackend: Send + Sync {
    /// Sets a named control.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::ControlNotFound`] for an unknown control.
    fn set_control(&self, name: &str, value: i32) -> Result<(), ProxyError>;

    /// Reads a named control.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::ControlNotFound`] for an unknown control.
    fn get_control(&self, name: &str) -> Result<i32, ProxyError>;
}

/// One routing path: the control values realizing a triple.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutePath {
    /// Use-case the path serves.
    pub usage: AudioUsage,
    /// Endpoint the path terminates at.
    pub device: DeviceType,
    /// Optional routing variant.
    #[serde(default)]
    pub modifier: Option<Modifier>,
    /// Control values to apply, in name order.
    #[serde(default)]
    pub controls: BTreeMap<String, i32>,
}

/// The persisted routing descriptor.
///
/// # Example
///
/// ```
/// use audio_proxy::mixer::RouteMap;
///
/// let map = RouteMap::from_toml_str(
///     r#"
///     call-param-control = "CP Call Param"
///
///     [[path]]
///     usage = "media"
///     device = "speaker"
///     controls = { "SPK Switch" = 1, "SPK Mixer" = 2 }
///     "#,
/// )
/// .unwrap();
/// assert_eq!(map.paths().len(), 1);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RouteMap {
    /// Name of the control receiving the encoded call-parameter key.
    #[serde(default = "default_call_param_control")]
    call_param_control: String,
    #[serde(default, rename = "path")]
    paths: Vec<RoutePath>,
}

fn default_call_param_control() -> String {
    "CP Call Param".to_string()
}

impl Default for RouteMap {
    fn default() -> Self {
        Self {
            call_param_control: default_call_param_control(),
            paths: Vec::new(),
        }
    }
}

impl RouteMap {
    /// Parses a descriptor from its TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidRouteMap`] on malformed input.
    pub fn from_toml_str(text: &str) -> Result<Self, ProxyError> {
        toml::from_str(text).map_err(|e| ProxyError::InvalidRouteMap {
            reason: e.to_string(),
        })
    }

    /// Loads the descriptor from its configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidRouteMap`] when the file cannot be
    /// read or parsed.
    pub fn load(path: &std::path::Path) -> Result<Self, ProxyError> {
        let text = std::fs::read_to_string(path).map_err(|e| ProxyError::InvalidRouteMap {
            reason: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&text)
    }

    /// All configured paths.
    pub fn paths(&self) -> &[RoutePath] {
        &self.paths
    }

    /// Control that receives the encoded call-parameter key.
    pub fn call_param_control(&self) -> &str {
        &self.call_param_control
    }

    /// Finds the path for a triple: exact match first, then the same
    /// usage/device without modifier.
    pub fn lookup(&self, triple: &RouteTriple) -> Option<&RoutePath> {
        let exact = self.paths.iter().find(|p| {
            p.usage == triple.usage && p.device == triple.device && p.modifier == triple.modifier
        });
        exact.or_else(|| {
            self.paths.iter().find(|p| {
                p.usage == triple.usage && p.device == triple.device && p.modifier.is_none()
            })
        })
    }
}

/// Applies the differential control set moving the mixer from `previous`
/// to `next`: controls no longer referenced are reset to 0, and values
/// the backend already reports are not rewritten.
pub(crate) fn apply_path(
    backend: &dyn MixerBackend,
    previous: Option<&RoutePath>,
    next: &RoutePath,
) -> Result<(), ProxyError> {
    if let Some(previous) = previous {
        for name in previous.controls.keys() {
            if !next.controls.contains_key(name) {
                backend.set_control(name, 0)?;
            }
        }
    }
    for (name, &value) in &next.controls {
        if backend.get_control(name)? != value {
            backend.set_control(name, value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockMixer;

    const DESCRIPTOR: &str = r#"
        call-param-control = "CP Call Param"

        [[path]]
        usage = "media"
        device = "speaker"
        controls = { "SPK Switch" = 1, "SPK Mixer" = 2 }

        [[path]]
        usage = "media"
        device = "speaker"
        modifier = "dual-speaker"
        controls = { "SPK Switch" = 1, "SPK AmpL" = 1 }

        [[path]]
        usage = "voice-call"
        device = "earpiece"
        controls = { "RCV Switch" = 1 }
    "#;

    #[test]
    fn test_parse_descriptor() {
        let map = RouteMap::from_toml_str(DESCRIPTOR).unwrap();
        assert_eq!(map.paths().len(), 3);
        assert_eq!(map.call_param_control(), "CP Call Param");
    }

    #[test]
    fn test_parse_failure() {
        let err = RouteMap::from_toml_str("[[path]]\nusage = 3").unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRouteMap { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixer_paths.toml");
        std::fs::write(&path, DESCRIPTOR).unwrap();

        let map = RouteMap::load(&path).unwrap();
        assert_eq!(map.paths().len(), 3);

        let err = RouteMap::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidRouteMap { .. }));
    }

    #[test]
    fn test_lookup_exact_and_fallback() {
        let map = RouteMap::from_toml_str(DESCRIPTOR).unwrap();

        let exact = map
            .lookup(&RouteTriple::with_modifier(
                AudioUsage::Media,
                DeviceType::Speaker,
                Modifier::DualSpeaker,
            ))
            .unwrap();
        assert!(exact.controls.contains_key("SPK AmpL"));

        // Unconfigured modifier falls back to the base path.
        let fallback = map
            .lookup(&RouteTriple::with_modifier(
                AudioUsage::Media,
                DeviceType::Speaker,
                Modifier::NoiseReduction,
            ))
            .unwrap();
        assert!(fallback.modifier.is_none());

        assert!(map
            .lookup(&RouteTriple::new(AudioUsage::FmRadio, DeviceType::Speaker))
            .is_none());
    }

    #[test]
    fn test_apply_path_resets_stale_controls() {
        let map = RouteMap::from_toml_str(DESCRIPTOR).unwrap();
        let mixer = MockMixer::new();

        let media = map
            .lookup(&RouteTriple::new(AudioUsage::Media, DeviceType::Speaker))
            .unwrap();
        apply_path(&mixer, None, media).unwrap();
        assert_eq!(mixer.value("SPK Switch"), Some(1));
        assert_eq!(mixer.value("SPK Mixer"), Some(2));

        let call = map
            .lookup(&RouteTriple::new(
                AudioUsage::VoiceCall,
                DeviceType::Earpiece,
            ))
            .unwrap();
        apply_path(&mixer, Some(media), call).unwrap();
        assert_eq!(mixer.value("SPK Switch"), Some(0));
        assert_eq!(mixer.value("SPK Mixer"), Some(0));
        assert_eq!(mixer.value("RCV Switch"), Some(1));
    }

    #[test]
    fn test_apply_path_skips_unchanged_values() {
        let map = RouteMap::from_toml_str(DESCRIPTOR).unwrap();
        let mixer = MockMixer::new();
        let media = map
            .lookup(&RouteTriple::new(AudioUsage::Media, DeviceType::Speaker))
            .unwrap();

        apply_path(&mixer, None, media).unwrap();
        let writes = mixer.write_count();
        apply_path(&mixer, Some(media), media).unwrap();
        assert_eq!(mixer.write_count(), writes);
    }

    #[test]
    fn test_apply_path_surfaces_missing_control() {
        let mixer = MockMixer::with_controls(["SPK Switch"]);
        let path = RoutePath {
            usage: AudioUsage::Media,
            device: DeviceType::Speaker,
            modifier: None,
            controls: [("Ghost Control".to_string(), 1)].into_iter().collect(),
        };
        let err = apply_path(&mixer, None, &path).unwrap_err();
        assert!(matches!(err, ProxyError::ControlNotFound { .. }));
    }
}
