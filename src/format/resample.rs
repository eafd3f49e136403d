//! Sample rate conversion.
//!
//! One canonical converter: stateful linear interpolation. Fractional
//! position and the last input frame are carried across calls, so
//! block-wise streaming produces exactly the rate-ratio frame count in
//! steady state (48kHz in over one second -> 16000 frames out at 16kHz,
//! regardless of block boundaries).

use crate::error::ProxyError;

/// Lowest sample rate the converter accepts.
pub const MIN_SAMPLE_RATE: u32 = 4_000;
/// Highest sample rate the converter accepts.
pub const MAX_SAMPLE_RATE: u32 = 192_000;
/// Widest interleaved frame the converter handles.
const MAX_CHANNELS: usize = 2;

/// Streaming linear-interpolation resampler for interleaved i16 frames.
pub struct LinearResampler {
    in_rate: u32,
    out_rate: u32,
    channels: usize,
    /// Input frames advanced per output frame.
    step: f64,
    /// Position into the virtual input (carry frame at index 0).
    pos: f64,
    carry: [i16; MAX_CHANNELS],
    has_carry: bool,
}

impl LinearResampler {
    /// Creates a converter between two rates at a fixed channel count.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::UnsupportedFormat`] for channel counts other
    /// than 1 or 2, or rates outside the supported range.
    pub fn new(in_rate: u32, out_rate: u32, channels: u16) -> Result<Self, ProxyError> {
        if !(1..=MAX_CHANNELS as u16).contains(&channels) {
            return Err(ProxyError::unsupported(format!(
                "{channels}-channel resampling is not supported"
            )));
        }
        for rate in [in_rate, out_rate] {
            if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&rate) {
                return Err(ProxyError::unsupported(format!(
                    "sample rate {rate}Hz outside {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE}"
                )));
            }
        }
        Ok(Self {
            in_rate,
            out_rate,
            channels: channels as usize,
            step: f64::from(in_rate) / f64::from(out_rate),
            pos: 0.0,
            carry: [0; MAX_CHANNELS],
            has_carry: false,
        })
    }

    /// Output frames per input frame.
    pub fn ratio(&self) -> f64 {
        f64::from(self.out_rate) / f64::from(self.in_rate)
    }

    /// Converts one block of interleaved frames, appending to `out`.
    ///
    /// A partial trailing frame in `input` is ignored. The caller clears
    /// and pre-sizes `out` so steady-state calls do not allocate.
    pub fn process(&mut self, input: &[i16], out: &mut Vec<i16>) {
        if self.in_rate == self.out_rate {
            out.extend_from_slice(&input[..input.len() - input.len() % self.channels]);
            return;
        }

        let frames_in = input.len() / self.channels;
        if frames_in == 0 {
            return;
        }

        let carry_frames = usize::from(self.has_carry);
        let total = frames_in + carry_frames;
        let channels = self.channels;
        let carry = self.carry;
        let frame = move |idx: usize, ch: usize| -> f64 {
            if idx < carry_frames {
                f64::from(carry[ch])
            } else {
                f64::from(input[(idx - carry_frames) * channels + ch])
            }
        };

        // Interpolation needs idx and idx+1; positions landing on the
        // final frame wait for the next block, where that frame becomes
        // the carry at index 0.
        let limit = (total - 1) as f64;
        while self.pos < limit {
            let idx = self.pos.floor() as usize;
            let frac = self.pos - idx as f64;
            for ch in 0..self.channels {
                let s1 = frame(idx, ch);
                let s2 = frame(idx + 1, ch);
                out.push((s1 + (s2 - s1) * frac) as i16);
            }
            self.pos += self.step;
        }

        // Rebase the fractional position onto the last input frame, which
        // becomes the next call's carry.
        self.pos -= limit;
        let last = (frames_in - 1) * self.channels;
        self.carry[..self.channels].copy_from_slice(&input[last..last + self.channels]);
        self.has_carry = true;
    }

    /// Discards carried state; the next block starts a fresh stream.
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.has_carry = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_blocks(resampler: &mut LinearResampler, input: &[i16], block_frames: usize) -> Vec<i16> {
        let mut out = Vec::new();
        for block in input.chunks(block_frames * resampler.channels) {
            resampler.process(block, &mut out);
        }
        out
    }

    #[test]
    fn test_same_rate_passthrough() {
        let mut r = LinearResampler::new(16_000, 16_000, 1).unwrap();
        let samples = vec![100i16, 200, 300];
        let mut out = Vec::new();
        r.process(&samples, &mut out);
        assert_eq!(out, samples);
    }

    #[test]
    fn test_empty_input() {
        let mut r = LinearResampler::new(48_000, 16_000, 1).unwrap();
        let mut out = Vec::new();
        r.process(&[], &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_downsample_exact_second() {
        // 1 second of 48kHz mono fed in 10ms blocks -> exactly 16000 frames.
        let input: Vec<i16> = (0..48_000).map(|i| (i % 1000) as i16).collect();
        let mut r = LinearResampler::new(48_000, 16_000, 1).unwrap();
        let out = run_blocks(&mut r, &input, 480);
        assert_eq!(out.len(), 16_000);
    }

    #[test]
    fn test_downsample_block_boundaries_irrelevant() {
        let input: Vec<i16> = (0..4800).map(|i| (i % 777) as i16).collect();
        let mut whole = LinearResampler::new(48_000, 16_000, 1).unwrap();
        let mut split = LinearResampler::new(48_000, 16_000, 1).unwrap();

        let mut expected = Vec::new();
        whole.process(&input, &mut expected);
        let got = run_blocks(&mut split, &input, 111);

        assert_eq!(got, expected);
    }

    #[test]
    fn test_upsample_throughput() {
        // 16kHz -> 48kHz over one second: within one output frame of 3x,
        // minus the interpolation tail held for the next block.
        let input: Vec<i16> = (0..16_000).map(|i| (i % 500) as i16).collect();
        let mut r = LinearResampler::new(16_000, 48_000, 1).unwrap();
        let out = run_blocks(&mut r, &input, 160);
        assert!(out.len() >= 47_995 && out.len() <= 48_000, "{}", out.len());
    }

    #[test]
    fn test_interpolated_values() {
        // 2x upsample of a ramp lands original samples on even indices.
        let mut r = LinearResampler::new(8_000, 16_000, 1).unwrap();
        let mut out = Vec::new();
        r.process(&[0i16, 100, 200, 300], &mut out);
        assert_eq!(out[0], 0);
        assert_eq!(out[1], 50);
        assert_eq!(out[2], 100);
        assert_eq!(out[3], 150);
        assert_eq!(out[4], 200);
    }

    #[test]
    fn test_stereo_frames_stay_paired() {
        let input: Vec<i16> = (0..960).flat_map(|i| [i as i16, -(i as i16)]).collect();
        let mut r = LinearResampler::new(48_000, 16_000, 2).unwrap();
        let mut out = Vec::new();
        r.process(&input, &mut out);
        assert_eq!(out.len() % 2, 0);
        // Left is the negation of right throughout the ramp.
        for frame in out.chunks_exact(2) {
            assert_eq!(frame[0], -frame[1]);
        }
    }

    #[test]
    fn test_reset_discards_carry() {
        let mut r = LinearResampler::new(48_000, 16_000, 1).unwrap();
        let mut out = Vec::new();
        r.process(&[1i16, 2, 3, 4, 5, 6], &mut out);
        r.reset();

        let mut fresh = Vec::new();
        r.process(&[10i16, 20, 30], &mut fresh);
        assert_eq!(fresh[0], 10);
    }

    #[test]
    fn test_rejects_unsupported_channels() {
        assert!(LinearResampler::new(48_000, 16_000, 3).is_err());
        assert!(LinearResampler::new(48_000, 16_000, 0).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_rates() {
        assert!(LinearResampler::new(1_000, 16_000, 1).is_err());
        assert!(LinearResampler::new(48_000, 400_000, 1).is_err());
    }
}
