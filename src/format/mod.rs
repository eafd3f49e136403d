//! Format adaptation between a stream's negotiated format and the
//! device-native format.
//!
//! [`FormatAdapter::negotiate`] derives the conversion plan once, at
//! configure time; [`FormatAdapter::push`] (playback) and
//! [`FormatAdapter::pull`] (capture) apply it on every I/O call against
//! scratch buffers sized at negotiation, so steady-state calls do not
//! allocate.

mod convert;
mod resample;

pub use convert::{apply_gain, f32_slice_to_i16, f32_to_i16, i16_slice_to_f32, i16_to_f32};
pub use resample::{LinearResampler, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;

use crate::config::{PcmConfig, SampleFormat};
use crate::error::ProxyError;

/// Conversion flags derived from comparing the negotiated and the
/// device-native format, computed once and consulted on every I/O call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionPlan {
    /// Sample rates differ.
    pub needs_resampling: bool,
    /// Channel counts differ.
    pub needs_channel_conversion: bool,
    /// Sample encodings differ (handled at the stream edge).
    pub needs_format_conversion: bool,
    /// Format samples enter the adapter in.
    pub source: PcmConfig,
    /// Format samples leave the adapter in.
    pub target: PcmConfig,
}

impl ConversionPlan {
    /// `true` when [`FormatAdapter::push`] returns its input untouched.
    pub fn is_passthrough(&self) -> bool {
        !self.needs_resampling && !self.needs_channel_conversion && !self.needs_format_conversion
    }
}

/// Derives the conversion plan between two endpoint formats.
///
/// # Errors
///
/// Returns [`ProxyError::UnsupportedFormat`] when no supported conversion
/// path exists: channel counts other than 1 or 2, rates outside the
/// converter's range, or S24 samples on either side.
pub fn negotiate(source: &PcmConfig, target: &PcmConfig) -> Result<ConversionPlan, ProxyError> {
    for config in [source, target] {
        if !(1..=2).contains(&config.channels) {
            return Err(ProxyError::unsupported(format!(
                "{}-channel endpoints are not supported",
                config.channels
            )));
        }
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&config.sample_rate) {
            return Err(ProxyError::unsupported(format!(
                "sample rate {}Hz outside {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE}",
                config.sample_rate
            )));
        }
        if config.format == SampleFormat::S24Le {
            return Err(ProxyError::unsupported("no conversion path for S24 samples"));
        }
        if config.period_frames == 0 {
            return Err(ProxyError::unsupported("zero-frame period"));
        }
    }

    Ok(ConversionPlan {
        needs_resampling: source.sample_rate != target.sample_rate,
        needs_channel_conversion: source.channels != target.channels,
        needs_format_conversion: source.format != target.format,
        source: *source,
        target: *target,
    })
}

/// Per-stream converter between the negotiated and device-native format.
///
/// Samples move through the adapter as interleaved i16; F32 client
/// buffers are converted at the stream edge before they reach `push` or
/// after they leave `pull`. Channel conversion runs first, then rate
/// conversion, so the resampler always works at the target channel
/// count.
pub struct FormatAdapter {
    plan: ConversionPlan,
    resampler: Option<LinearResampler>,
    chan_scratch: Vec<i16>,
    out_scratch: Vec<i16>,
    raw_scratch: Vec<i16>,
    staged_prod: ringbuf::HeapProd<i16>,
    staged_cons: ringbuf::HeapCons<i16>,
}

impl FormatAdapter {
    /// Negotiates the conversion plan and sizes all scratch storage.
    ///
    /// Callers pass at most `source.period_frames` frames per `push` and
    /// request at most `target.period_frames` frames per `pull`; larger
    /// calls still work but may reallocate scratch.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::UnsupportedFormat`] as [`negotiate`] does.
    pub fn negotiate(source: &PcmConfig, target: &PcmConfig) -> Result<Self, ProxyError> {
        let plan = negotiate(source, target)?;

        let resampler = if plan.needs_resampling {
            Some(LinearResampler::new(
                source.sample_rate,
                target.sample_rate,
                target.channels,
            )?)
        } else {
            None
        };

        let ratio = f64::from(target.sample_rate) / f64::from(source.sample_rate);
        // Widest converted burst one source period can produce.
        let burst_frames = (source.period_frames as f64 * ratio).ceil() as usize + 2;
        let target_ch = target.channels as usize;

        let staged = HeapRb::<i16>::new(
            ((burst_frames * 2 + target.period_frames) * target_ch).max(1024),
        );
        let (staged_prod, staged_cons) = staged.split();

        Ok(Self {
            plan,
            resampler,
            chan_scratch: Vec::with_capacity(source.period_frames * target_ch),
            out_scratch: Vec::with_capacity(burst_frames * target_ch),
            raw_scratch: vec![0; source.period_samples()],
            staged_prod,
            staged_cons,
        })
    }

    /// The plan derived at negotiation.
    pub fn plan(&self) -> &ConversionPlan {
        &self.plan
    }

    /// Converts one playback block from source to target format.
    ///
    /// When no conversion is needed the input slice is returned
    /// unchanged (byte-identical pass-through). Converted output lives
    /// in adapter scratch and is valid until the next call.
    pub fn push<'a>(&'a mut self, input: &'a [i16]) -> &'a [i16] {
        let converted: &[i16] = if self.plan.needs_channel_conversion {
            self.chan_scratch.clear();
            if self.plan.source.channels == 2 {
                convert::downmix_to_mono(input, &mut self.chan_scratch);
            } else {
                convert::upmix_to_stereo(input, &mut self.chan_scratch);
            }
            &self.chan_scratch
        } else {
            input
        };

        if let Some(resampler) = self.resampler.as_mut() {
            self.out_scratch.clear();
            resampler.process(converted, &mut self.out_scratch);
            &self.out_scratch
        } else {
            converted
        }
    }

    /// Fills `out` with converted capture samples, pulling raw frames
    /// from `provider` whenever the staged buffer runs dry.
    ///
    /// `provider` fills a device-format buffer and returns the frame
    /// count it delivered; returning 0 ends the call early with a short
    /// result instead of blocking. Returns the frames written to `out`.
    ///
    /// # Errors
    ///
    /// Propagates the provider's I/O error; staged samples survive for
    /// the next call.
    pub fn pull(
        &mut self,
        out: &mut [i16],
        provider: &mut dyn FnMut(&mut [i16]) -> Result<usize, ProxyError>,
    ) -> Result<usize, ProxyError> {
        let target_ch = self.plan.target.channels as usize;
        let source_ch = self.plan.source.channels as usize;
        let want = out.len() - out.len() % target_ch;
        let mut filled = 0;

        while filled < want {
            filled += self.staged_cons.pop_slice(&mut out[filled..want]);
            if filled == want {
                break;
            }

            let raw_frames = provider(&mut self.raw_scratch)?;
            if raw_frames == 0 {
                break;
            }
            let raw = &self.raw_scratch[..raw_frames * source_ch];

            let converted: &[i16] = if self.plan.needs_channel_conversion {
                self.chan_scratch.clear();
                if source_ch == 2 {
                    convert::downmix_to_mono(raw, &mut self.chan_scratch);
                } else {
                    convert::upmix_to_stereo(raw, &mut self.chan_scratch);
                }
                &self.chan_scratch
            } else {
                raw
            };

            let staged: &[i16] = if let Some(resampler) = self.resampler.as_mut() {
                self.out_scratch.clear();
                resampler.process(converted, &mut self.out_scratch);
                &self.out_scratch
            } else {
                converted
            };

            self.staged_prod.push_slice(staged);
        }

        Ok(filled / target_ch)
    }

    /// Discards staged capture samples and resampler carry, e.g. when a
    /// stream leaves standby onto a fresh device buffer.
    pub fn flush(&mut self) {
        while self.staged_cons.try_pop().is_some() {}
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rate: u32, channels: u16) -> PcmConfig {
        PcmConfig::new(rate, channels)
    }

    #[test]
    fn test_negotiate_passthrough() {
        let native = config(48_000, 2);
        let plan = negotiate(&native, &native).unwrap();
        assert!(!plan.needs_resampling);
        assert!(!plan.needs_channel_conversion);
        assert!(!plan.needs_format_conversion);
        assert!(plan.is_passthrough());
    }

    #[test]
    fn test_negotiate_capture_flags() {
        // 16kHz mono client from a 48kHz stereo device.
        let plan = negotiate(&config(48_000, 2), &config(16_000, 1)).unwrap();
        assert!(plan.needs_resampling);
        assert!(plan.needs_channel_conversion);
        assert!(!plan.needs_format_conversion);
    }

    #[test]
    fn test_negotiate_format_flag() {
        let mut client = config(48_000, 2);
        client.format = SampleFormat::F32Le;
        let plan = negotiate(&client, &config(48_000, 2)).unwrap();
        assert!(plan.needs_format_conversion);
        assert!(!plan.is_passthrough());
    }

    #[test]
    fn test_negotiate_rejects_unsupported() {
        assert!(negotiate(&config(48_000, 3), &config(48_000, 2)).is_err());
        assert!(negotiate(&config(48_000, 2), &config(200_000, 2)).is_err());
        let mut s24 = config(48_000, 2);
        s24.format = SampleFormat::S24Le;
        assert!(negotiate(&s24, &config(48_000, 2)).is_err());
    }

    #[test]
    fn test_push_passthrough_is_identity() {
        let native = config(48_000, 2);
        let mut adapter = FormatAdapter::negotiate(&native, &native).unwrap();
        let input: Vec<i16> = (0..1920).map(|i| i as i16).collect();
        let out = adapter.push(&input);
        assert_eq!(out.as_ptr(), input.as_ptr());
        assert_eq!(out, &input[..]);
    }

    #[test]
    fn test_push_downmix_and_resample() {
        // 48kHz stereo in, 16kHz mono out.
        let mut adapter =
            FormatAdapter::negotiate(&config(48_000, 2), &config(16_000, 1)).unwrap();
        let input = vec![600i16; 960 * 2];
        let out = adapter.push(&input);
        // 960 frames / 3, give or take the interpolation tail.
        assert!((318..=320).contains(&out.len()), "{}", out.len());
        assert!(out.iter().all(|&s| s == 600));
    }

    #[test]
    fn test_push_upmix() {
        let mut adapter =
            FormatAdapter::negotiate(&config(16_000, 1), &config(16_000, 2)).unwrap();
        let out = adapter.push(&[7i16, 8]);
        assert_eq!(out, &[7, 7, 8, 8]);
    }

    #[test]
    fn test_pull_converts_one_second() {
        // Device native 48kHz stereo, client wants 16kHz mono: one second
        // of device audio must yield exactly 16000 client frames.
        let mut adapter =
            FormatAdapter::negotiate(&config(48_000, 2), &config(16_000, 1)).unwrap();

        let mut device_frames_left = 48_000usize;
        let mut provider = |buf: &mut [i16]| {
            let frames = (buf.len() / 2).min(device_frames_left);
            buf[..frames * 2].fill(100);
            device_frames_left -= frames;
            Ok(frames)
        };

        let mut total = 0usize;
        let mut out = vec![0i16; 320];
        loop {
            let frames = adapter.pull(&mut out, &mut provider).unwrap();
            if frames == 0 {
                break;
            }
            assert!(out[..frames].iter().all(|&s| s == 100));
            total += frames;
        }
        assert!((15_999..=16_000).contains(&total), "{total}");
    }

    #[test]
    fn test_pull_short_read_does_not_block() {
        let mut adapter =
            FormatAdapter::negotiate(&config(16_000, 1), &config(16_000, 1)).unwrap();

        // Device delivers 10 frames then dries up.
        let mut served = false;
        let mut provider = |buf: &mut [i16]| {
            if served {
                return Ok(0);
            }
            served = true;
            buf[..10].copy_from_slice(&[5i16; 10]);
            Ok(10)
        };

        let mut out = vec![0i16; 160];
        let frames = adapter.pull(&mut out, &mut provider).unwrap();
        assert_eq!(frames, 10);
        assert_eq!(&out[..10], &[5i16; 10]);
    }

    #[test]
    fn test_pull_stages_leftover_for_next_call() {
        let mut adapter =
            FormatAdapter::negotiate(&config(16_000, 1), &config(16_000, 1)).unwrap();

        // One burst of 100 frames, drained 60 then 40.
        let mut served = false;
        let mut provider = |buf: &mut [i16]| {
            if served {
                return Ok(0);
            }
            served = true;
            for (i, s) in buf[..100].iter_mut().enumerate() {
                *s = i as i16;
            }
            Ok(100)
        };

        let mut first = vec![0i16; 60];
        assert_eq!(adapter.pull(&mut first, &mut provider).unwrap(), 60);
        let mut second = vec![0i16; 60];
        assert_eq!(adapter.pull(&mut second, &mut provider).unwrap(), 40);
        assert_eq!(second[0], 60);
        assert_eq!(second[39], 99);
    }

    #[test]
    fn test_pull_propagates_io_error() {
        let mut adapter =
            FormatAdapter::negotiate(&config(16_000, 1), &config(16_000, 1)).unwrap();
        let mut provider = |_buf: &mut [i16]| Err(ProxyError::io("xrun"));
        let mut out = vec![0i16; 16];
        assert!(adapter.pull(&mut out, &mut provider).is_err());
    }
}
