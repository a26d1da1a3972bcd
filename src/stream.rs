//! Sample stream contracts and built-in sources
//!
//! [`SampleStream`] is the single capability every audio source implements:
//! buffer views, decoder collaborators, generators, and the mixer's entries
//! are all interchangeable anywhere a source is required. [`SeekableStream`]
//! extends it with position query and repositioning for sources whose data is
//! fully resident.
//!
//! Samples are interleaved f32 in [-1.0, 1.0] (values may transiently exceed
//! that range during mixing).

use crate::error::{Error, Result};

/// Pull-based producer of interleaved multi-channel f32 samples.
///
/// This is the polymorphism boundary of the crate: any type implementing it
/// can be appended to a [`crate::buffer::Buffer`] or played through a
/// [`crate::speaker::Speaker`].
pub trait SampleStream: Send {
    /// Fill `out` with up to `out.len() / channels` frames starting at the
    /// stream's current position, advancing the position by the number of
    /// frames written.
    ///
    /// `out` must hold a whole number of frames (its length a multiple of the
    /// stream's channel count). Returns `(frames_written, ok)`:
    ///
    /// - `ok == true`: the stream produced `frames_written` frames (possibly
    ///   fewer than requested) and may produce more.
    /// - `ok == false`: the stream is permanently exhausted;
    ///   `frames_written` is 0. A stream at its end returns one final partial
    ///   batch with `ok == true`, then `(0, false)` on every later call.
    ///
    /// In-memory sources never block; live decoder collaborators must still
    /// complete in bounded time when fed to the playback engine.
    fn stream(&mut self, out: &mut [f32]) -> (usize, bool);

    /// The non-recoverable failure that stopped this stream, if any.
    ///
    /// Once this returns `Some`, further [`SampleStream::stream`] calls
    /// return `(0, false)`.
    fn err(&self) -> Option<Error>;
}

/// A [`SampleStream`] whose total length is known and whose position can be
/// changed freely.
///
/// Seeking never fails for I/O reasons on buffer-backed views; the only
/// failure mode is an out-of-range target.
pub trait SeekableStream: SampleStream {
    /// Total frame count of the stream.
    fn len(&self) -> usize;

    /// True if the stream contains no frames.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current frame index, in `[0, len()]`.
    fn position(&self) -> usize;

    /// Reposition to `frame`.
    ///
    /// # Errors
    /// `Error::InvalidRange` if `frame > len()`. Seeking to exactly `len()`
    /// is valid and leaves the stream exhausted.
    fn seek(&mut self, frame: usize) -> Result<()>;
}

impl SampleStream for Box<dyn SampleStream + Send> {
    fn stream(&mut self, out: &mut [f32]) -> (usize, bool) {
        (**self).stream(out)
    }

    fn err(&self) -> Option<Error> {
        (**self).err()
    }
}

/// Silent source: produces zero-valued frames.
///
/// Useful as filler and in mixing tests; an infinite silence keeps a playback
/// entry alive until it is removed explicitly.
#[derive(Debug)]
pub struct Silence {
    channels: u16,
    /// Frames remaining; None = infinite
    remaining: Option<usize>,
}

impl Silence {
    /// Silence lasting exactly `frames` frames.
    pub fn new(channels: u16, frames: usize) -> Self {
        Self {
            channels,
            remaining: Some(frames),
        }
    }

    /// Silence that never ends.
    pub fn infinite(channels: u16) -> Self {
        Self {
            channels,
            remaining: None,
        }
    }
}

impl SampleStream for Silence {
    fn stream(&mut self, out: &mut [f32]) -> (usize, bool) {
        let want = out.len() / self.channels as usize;
        let n = match self.remaining {
            None => want,
            Some(0) => return (0, false),
            Some(left) => {
                let n = want.min(left);
                self.remaining = Some(left - n);
                n
            }
        };

        out[..n * self.channels as usize].fill(0.0);
        (n, true)
    }

    fn err(&self) -> Option<Error> {
        None
    }
}

/// Seekable stream over owned interleaved samples.
///
/// The in-memory stand-in for a decoder collaborator: tests and callers that
/// already hold raw samples wrap them in a `FrameStream` and feed them to a
/// buffer or straight to the speaker.
#[derive(Debug, Clone)]
pub struct FrameStream {
    samples: Vec<f32>,
    channels: u16,
    /// Current position in frames
    pos: usize,
}

impl FrameStream {
    /// Wrap interleaved samples.
    ///
    /// # Panics
    /// Panics if `samples.len()` is not a multiple of `channels` (partial
    /// frames cannot be represented).
    pub fn new(samples: Vec<f32>, channels: u16) -> Self {
        assert_eq!(
            samples.len() % channels as usize,
            0,
            "sample count must be a whole number of frames"
        );
        Self {
            samples,
            channels,
            pos: 0,
        }
    }
}

impl SampleStream for FrameStream {
    fn stream(&mut self, out: &mut [f32]) -> (usize, bool) {
        let ch = self.channels as usize;
        let total = self.samples.len() / ch;
        if self.pos >= total {
            return (0, false);
        }

        let want = out.len() / ch;
        let n = want.min(total - self.pos);
        let start = self.pos * ch;
        out[..n * ch].copy_from_slice(&self.samples[start..start + n * ch]);
        self.pos += n;
        (n, true)
    }

    fn err(&self) -> Option<Error> {
        None
    }
}

impl SeekableStream for FrameStream {
    fn len(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn seek(&mut self, frame: usize) -> Result<()> {
        if frame > self.len() {
            return Err(Error::InvalidRange(format!(
                "seek to frame {} beyond length {}",
                frame,
                self.len()
            )));
        }
        self.pos = frame;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_finite() {
        let mut silence = Silence::new(2, 3);
        let mut out = [1.0f32; 8];

        let (frames, ok) = silence.stream(&mut out);
        assert_eq!(frames, 3);
        assert!(ok);
        assert_eq!(&out[..6], &[0.0; 6]);

        let (frames, ok) = silence.stream(&mut out);
        assert_eq!(frames, 0);
        assert!(!ok);
    }

    #[test]
    fn test_silence_infinite() {
        let mut silence = Silence::infinite(1);
        let mut out = [0.5f32; 64];

        for _ in 0..10 {
            let (frames, ok) = silence.stream(&mut out);
            assert_eq!(frames, 64);
            assert!(ok);
        }
    }

    #[test]
    fn test_frame_stream_batching() {
        let mut stream = FrameStream::new(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 2);
        let mut out = [0.0f32; 4];

        let (frames, ok) = stream.stream(&mut out);
        assert_eq!(frames, 2);
        assert!(ok);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.4]);

        // Final partial batch, then exhaustion
        let (frames, ok) = stream.stream(&mut out);
        assert_eq!(frames, 1);
        assert!(ok);
        assert_eq!(&out[..2], &[0.5, 0.6]);

        let (frames, ok) = stream.stream(&mut out);
        assert_eq!(frames, 0);
        assert!(!ok);
    }

    #[test]
    fn test_frame_stream_seek() {
        let mut stream = FrameStream::new(vec![0.1, 0.2, 0.3], 1);
        assert_eq!(stream.len(), 3);

        stream.seek(2).unwrap();
        assert_eq!(stream.position(), 2);

        let mut out = [0.0f32; 4];
        let (frames, _) = stream.stream(&mut out);
        assert_eq!(frames, 1);
        assert_eq!(out[0], 0.3);

        // Seeking to len() is valid; past it is not
        stream.seek(3).unwrap();
        assert!(matches!(stream.seek(4), Err(Error::InvalidRange(_))));
    }

    #[test]
    fn test_seek_rewinds_exhausted_stream() {
        let mut stream = FrameStream::new(vec![0.5, -0.5], 1);
        let mut out = [0.0f32; 4];

        stream.stream(&mut out);
        assert!(!stream.stream(&mut out).1);

        stream.seek(0).unwrap();
        let (frames, ok) = stream.stream(&mut out);
        assert_eq!(frames, 2);
        assert!(ok);
    }

    #[test]
    #[should_panic(expected = "whole number of frames")]
    fn test_frame_stream_rejects_partial_frame() {
        FrameStream::new(vec![0.1, 0.2, 0.3], 2);
    }
}
