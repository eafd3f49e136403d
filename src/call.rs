//! Call-audio parameter encoding.
//!
//! Call attributes are packed into one 32-bit routing-profile key that
//! selects the matching call-audio mixer path. The packing is a pure,
//! injective mapping; decode is its exact inverse. Out-of-range fields
//! are rejected on construction, never silently truncated.
//!
//! Layout (LSB first): device 6 bits, rate band 2, call type 5, TTY
//! mode 2, mic count 3, channel count 4, reserved 7, vendor-special 3.

use crate::error::ProxyError;

const DEVICE_SHIFT: u32 = 0;
const DEVICE_MAX: u32 = (1 << 6) - 1;
const RATE_BAND_SHIFT: u32 = 6;
const RATE_BAND_MAX: u32 = (1 << 2) - 1;
const CALL_TYPE_SHIFT: u32 = 8;
const CALL_TYPE_MAX: u32 = (1 << 5) - 1;
const TTY_MODE_SHIFT: u32 = 13;
const TTY_MODE_MAX: u32 = (1 << 2) - 1;
const MIC_NUM_SHIFT: u32 = 15;
const MIC_NUM_MAX: u32 = (1 << 3) - 1;
const CHANNEL_SHIFT: u32 = 18;
const CHANNEL_MAX: u32 = (1 << 4) - 1;
const RESERVED_SHIFT: u32 = 22;
const RESERVED_MAX: u32 = (1 << 7) - 1;
const SPECIAL_SHIFT: u32 = 29;
const SPECIAL_MAX: u32 = (1 << 3) - 1;

/// Voice-call audio bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateBand {
    /// 8kHz narrowband.
    #[default]
    Narrowband,
    /// 16kHz wideband.
    Wideband,
    /// 32kHz super-wideband.
    SuperWideband,
}

impl RateBand {
    fn as_bits(self) -> u32 {
        match self {
            Self::Narrowband => 0,
            Self::Wideband => 1,
            Self::SuperWideband => 2,
        }
    }

    fn from_bits(bits: u32) -> Result<Self, ProxyError> {
        match bits {
            0 => Ok(Self::Narrowband),
            1 => Ok(Self::Wideband),
            2 => Ok(Self::SuperWideband),
            _ => Err(ProxyError::InvalidCallParameter {
                field: "rate_band",
                value: bits,
                max: 2,
            }),
        }
    }
}

/// TTY (teletypewriter) accessibility mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtyMode {
    /// TTY disabled.
    #[default]
    Off,
    /// Voice carry-over.
    Vco,
    /// Hearing carry-over.
    Hco,
    /// Full TTY.
    Full,
}

impl TtyMode {
    fn as_bits(self) -> u32 {
        match self {
            Self::Off => 0,
            Self::Vco => 1,
            Self::Hco => 2,
            Self::Full => 3,
        }
    }

    fn from_bits(bits: u32) -> Self {
        match bits {
            1 => Self::Vco,
            2 => Self::Hco,
            3 => Self::Full,
            _ => Self::Off,
        }
    }
}

/// Validated call attributes behind the routing-profile key.
///
/// Construct with [`CallParams::new`] (which range-checks every field)
/// or decode an existing key with [`CallParams::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallParams {
    device: u8,
    band: RateBand,
    call_type: u8,
    tty: TtyMode,
    mic_count: u8,
    channels: u8,
    special: u8,
}

impl CallParams {
    /// Creates call parameters, validating each field against its bit
    /// width.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidCallParameter`] naming the first
    /// out-of-range field.
    pub fn new(
        device: u8,
        band: RateBand,
        call_type: u8,
        tty: TtyMode,
        mic_count: u8,
        channels: u8,
    ) -> Result<Self, ProxyError> {
        check("device", u32::from(device), DEVICE_MAX)?;
        check("call_type", u32::from(call_type), CALL_TYPE_MAX)?;
        check("mic_num", u32::from(mic_count), MIC_NUM_MAX)?;
        check("channel", u32::from(channels), CHANNEL_MAX)?;
        Ok(Self {
            device,
            band,
            call_type,
            tty,
            mic_count,
            channels,
            special: 0,
        })
    }

    /// Sets the vendor-special bits (3 bits).
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidCallParameter`] if `special` does not
    /// fit in 3 bits.
    pub fn with_special(mut self, special: u8) -> Result<Self, ProxyError> {
        check("special", u32::from(special), SPECIAL_MAX)?;
        self.special = special;
        Ok(self)
    }

    /// Packs the attributes into the 32-bit routing-profile key.
    pub fn encode(&self) -> u32 {
        u32::from(self.device) << DEVICE_SHIFT
            | self.band.as_bits() << RATE_BAND_SHIFT
            | u32::from(self.call_type) << CALL_TYPE_SHIFT
            | self.tty.as_bits() << TTY_MODE_SHIFT
            | u32::from(self.mic_count) << MIC_NUM_SHIFT
            | u32::from(self.channels) << CHANNEL_SHIFT
            | u32::from(self.special) << SPECIAL_SHIFT
    }

    /// Unpacks a routing-profile key back into its attributes.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidCallParameter`] if the reserved bits
    /// are set or the rate band carries an undefined value.
    pub fn decode(key: u32) -> Result<Self, ProxyError> {
        let reserved = (key >> RESERVED_SHIFT) & RESERVED_MAX;
        if reserved != 0 {
            return Err(ProxyError::InvalidCallParameter {
                field: "reserved",
                value: reserved,
                max: 0,
            });
        }
        let band = RateBand::from_bits((key >> RATE_BAND_SHIFT) & RATE_BAND_MAX)?;
        Ok(Self {
            device: ((key >> DEVICE_SHIFT) & DEVICE_MAX) as u8,
            band,
            call_type: ((key >> CALL_TYPE_SHIFT) & CALL_TYPE_MAX) as u8,
            tty: TtyMode::from_bits((key >> TTY_MODE_SHIFT) & TTY_MODE_MAX),
            mic_count: ((key >> MIC_NUM_SHIFT) & MIC_NUM_MAX) as u8,
            channels: ((key >> CHANNEL_SHIFT) & CHANNEL_MAX) as u8,
            special: ((key >> SPECIAL_SHIFT) & SPECIAL_MAX) as u8,
        })
    }

    /// 6-bit device code.
    pub fn device(&self) -> u8 {
        self.device
    }

    /// Voice bandwidth.
    pub fn band(&self) -> RateBand {
        self.band
    }

    /// Call type code (GSM, CDMA, IMS, ...).
    pub fn call_type(&self) -> u8 {
        self.call_type
    }

    /// TTY mode.
    pub fn tty(&self) -> TtyMode {
        self.tty
    }

    /// Active microphone count.
    pub fn mic_count(&self) -> u8 {
        self.mic_count
    }

    /// Channel count.
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Vendor-special bits.
    pub fn special(&self) -> u8 {
        self.special
    }
}

fn check(field: &'static str, value: u32, max: u32) -> Result<(), ProxyError> {
    if value > max {
        return Err(ProxyError::InvalidCallParameter { field, value, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CallParams {
        CallParams::new(2, RateBand::Wideband, 3, TtyMode::Off, 2, 1).unwrap()
    }

    #[test]
    fn test_encode_reference_key() {
        // device=2, band=WB(1), call_type=3, tty=0, mic=2, channel=1
        let key = params().encode();
        assert_eq!(key & 0x3F, 2);
        assert_eq!((key >> 6) & 0x3, 1);
        assert_eq!((key >> 8) & 0x1F, 3);
        assert_eq!((key >> 13) & 0x3, 0);
        assert_eq!((key >> 15) & 0x7, 2);
        assert_eq!((key >> 18) & 0xF, 1);
    }

    #[test]
    fn test_roundtrip_reference_params() {
        let original = params();
        let decoded = CallParams::decode(original.encode()).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.device(), 2);
        assert_eq!(decoded.band(), RateBand::Wideband);
        assert_eq!(decoded.call_type(), 3);
        assert_eq!(decoded.tty(), TtyMode::Off);
        assert_eq!(decoded.mic_count(), 2);
        assert_eq!(decoded.channels(), 1);
    }

    #[test]
    fn test_roundtrip_field_extremes() {
        // Exhaustive corners of every field width.
        for device in [0u8, 1, 63] {
            for band in [RateBand::Narrowband, RateBand::SuperWideband] {
                for call_type in [0u8, 31] {
                    for tty in [TtyMode::Off, TtyMode::Full] {
                        for mic in [0u8, 7] {
                            for ch in [0u8, 15] {
                                let p = CallParams::new(device, band, call_type, tty, mic, ch)
                                    .unwrap()
                                    .with_special(5)
                                    .unwrap();
                                assert_eq!(CallParams::decode(p.encode()).unwrap(), p);
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_out_of_range_device() {
        let err = CallParams::new(64, RateBand::Narrowband, 0, TtyMode::Off, 1, 1).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::InvalidCallParameter {
                field: "device",
                value: 64,
                max: 63,
            }
        ));
    }

    #[test]
    fn test_out_of_range_call_type() {
        let err = CallParams::new(1, RateBand::Narrowband, 32, TtyMode::Off, 1, 1).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::InvalidCallParameter {
                field: "call_type",
                ..
            }
        ));
    }

    #[test]
    fn test_out_of_range_mic_and_channel() {
        assert!(CallParams::new(1, RateBand::Narrowband, 0, TtyMode::Off, 8, 1).is_err());
        assert!(CallParams::new(1, RateBand::Narrowband, 0, TtyMode::Off, 1, 16).is_err());
    }

    #[test]
    fn test_out_of_range_special() {
        let err = params().with_special(8).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::InvalidCallParameter { field: "special", .. }
        ));
    }

    #[test]
    fn test_decode_rejects_reserved_bits() {
        let key = params().encode() | (1 << 22);
        assert!(CallParams::decode(key).is_err());
    }

    #[test]
    fn test_decode_rejects_undefined_band() {
        // rate_band bits = 3 is not a defined bandwidth
        let key = 3 << 6;
        assert!(CallParams::decode(key).is_err());
    }

    #[test]
    fn test_encode_is_injective_across_fields() {
        let a = CallParams::new(1, RateBand::Narrowband, 0, TtyMode::Off, 0, 0).unwrap();
        let b = CallParams::new(0, RateBand::Narrowband, 0, TtyMode::Off, 0, 0)
            .unwrap()
            .with_special(1)
            .unwrap();
        assert_ne!(a.encode(), b.encode());
    }
}
