//! Audio format descriptor and sample component encoding
//!
//! [`Format`] is the immutable metadata shared by every stream derived from
//! the same source: sample rate, channel count, and the byte width used when
//! samples are stored in a [`crate::buffer::Buffer`].
//!
//! Components are encoded little-endian:
//! - 1 byte:  signed 8-bit fixed point
//! - 2 bytes: signed 16-bit fixed point
//! - 3 bytes: signed 24-bit fixed point
//! - 4 bytes: IEEE 754 binary32
//!
//! Fixed-point widths clamp to [-1.0, 1.0] before quantizing, so values that
//! transiently exceeded the nominal range during mixing store as full scale.

use crate::error::{Error, Result};
use std::time::Duration;

/// Fixed-point full-scale values per width.
const SCALE_8: f32 = i8::MAX as f32;
const SCALE_16: f32 = i16::MAX as f32;
const SCALE_24: f32 = 8_388_607.0; // 2^23 - 1

/// Audio format descriptor.
///
/// Immutable once created; cheap to copy and share. All streams derived from
/// one source carry the same `Format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    /// Samples per second per channel (e.g. 44100)
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo, ...)
    pub channels: u16,

    /// Bytes used to store one sample component (1, 2, 3, or 4)
    pub bytes_per_sample: u16,
}

impl Format {
    /// Create a validated format descriptor.
    ///
    /// # Errors
    /// `Error::Configuration` if the sample rate is zero, the channel count is
    /// zero, or the byte width is not 1, 2, 3, or 4.
    pub fn new(sample_rate: u32, channels: u16, bytes_per_sample: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::Configuration("sample rate must be positive".into()));
        }
        if channels == 0 {
            return Err(Error::Configuration("channel count must be at least 1".into()));
        }
        if !(1..=4).contains(&bytes_per_sample) {
            return Err(Error::Configuration(format!(
                "bytes per sample must be 1-4, got {}",
                bytes_per_sample
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            bytes_per_sample,
        })
    }

    /// Bytes occupied by one frame (one sample per channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.bytes_per_sample as usize
    }

    /// Wall-clock duration of `frames` frames at this sample rate.
    pub fn frames_to_duration(&self, frames: usize) -> Duration {
        // Split off whole seconds first so the nanosecond product cannot
        // overflow even for very large frame counts
        let rate = self.sample_rate as u64;
        let secs = frames as u64 / rate;
        let rem = frames as u64 % rate;
        Duration::new(secs, (rem * 1_000_000_000 / rate) as u32)
    }

    /// Number of whole frames covering `duration` at this sample rate.
    pub fn duration_to_frames(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * self.sample_rate as f64) as usize
    }

    /// Encode one frame of samples into `out`.
    ///
    /// `frame` must hold exactly `channels` samples and `out` exactly
    /// [`Format::bytes_per_frame`] bytes.
    pub fn encode_frame(&self, frame: &[f32], out: &mut [u8]) {
        debug_assert_eq!(frame.len(), self.channels as usize);
        debug_assert_eq!(out.len(), self.bytes_per_frame());

        let width = self.bytes_per_sample as usize;
        for (sample, chunk) in frame.iter().zip(out.chunks_exact_mut(width)) {
            encode_component(*sample, chunk);
        }
    }

    /// Decode one frame of samples from `bytes`.
    ///
    /// `bytes` must hold exactly [`Format::bytes_per_frame`] bytes and `out`
    /// exactly `channels` samples.
    pub fn decode_frame(&self, bytes: &[u8], out: &mut [f32]) {
        debug_assert_eq!(bytes.len(), self.bytes_per_frame());
        debug_assert_eq!(out.len(), self.channels as usize);

        let width = self.bytes_per_sample as usize;
        for (sample, chunk) in out.iter_mut().zip(bytes.chunks_exact(width)) {
            *sample = decode_component(chunk);
        }
    }
}

/// Encode a single sample component, little-endian, width = out.len().
pub(crate) fn encode_component(value: f32, out: &mut [u8]) {
    match out.len() {
        1 => {
            let q = (value.clamp(-1.0, 1.0) * SCALE_8).round() as i8;
            out[0] = q as u8;
        }
        2 => {
            let q = (value.clamp(-1.0, 1.0) * SCALE_16).round() as i16;
            out.copy_from_slice(&q.to_le_bytes());
        }
        3 => {
            let q = (value.clamp(-1.0, 1.0) * SCALE_24).round() as i32;
            out.copy_from_slice(&q.to_le_bytes()[..3]);
        }
        4 => {
            out.copy_from_slice(&value.to_le_bytes());
        }
        _ => unreachable!("validated at Format::new"),
    }
}

/// Decode a single sample component, little-endian, width = bytes.len().
pub(crate) fn decode_component(bytes: &[u8]) -> f32 {
    match bytes.len() {
        1 => bytes[0] as i8 as f32 / SCALE_8,
        2 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / SCALE_16,
        3 => {
            // Sign-extend the 24-bit value through the top byte
            let raw = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
            ((raw << 8) >> 8) as f32 / SCALE_24
        }
        4 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        _ => unreachable!("validated at Format::new"),
    }
}
