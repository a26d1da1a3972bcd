//! In-memory sample store with cheap seekable views
//!
//! [`Buffer`] drains sample streams into a compact byte encoding (per its
//! [`Format`]'s component width) and hands out [`BufferStreamer`] views that
//! decode lazily. Views never copy sample data at creation: they share the
//! byte store through an `Arc`.
//!
//! Appending after views exist is safe: the store copies-on-write, so a view
//! keeps reading the range it captured. The intended usage is still to fill
//! the buffer fully and then only read, which appends in place with amortized
//! constant-time growth.

use crate::error::{Error, Result};
use crate::format::Format;
use crate::stream::{SampleStream, SeekableStream};
use std::sync::Arc;
use tracing::debug;

/// Frames drained from the source per append iteration.
const APPEND_BATCH_FRAMES: usize = 1024;

/// Append-only store of encoded audio samples.
///
/// Invariant: `bytes.len() == frames * format.bytes_per_frame()`.
#[derive(Debug, Clone)]
pub struct Buffer {
    format: Format,
    frames: usize,
    bytes: Arc<Vec<u8>>,
}

impl Buffer {
    /// Create an empty buffer bound to `format`.
    pub fn new(format: Format) -> Self {
        Self {
            format,
            frames: 0,
            bytes: Arc::new(Vec::new()),
        }
    }

    /// The format every view of this buffer shares.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Total frames currently stored.
    pub fn len(&self) -> usize {
        self.frames
    }

    /// True if no frames have been appended.
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Wall-clock duration of the stored audio.
    pub fn duration(&self) -> std::time::Duration {
        self.format.frames_to_duration(self.frames)
    }

    /// Synchronously drain `source` to exhaustion, encoding every batch into
    /// the byte store as it arrives. Returns the number of frames appended.
    ///
    /// Blocking from the caller's perspective: returns only once the source
    /// signals exhaustion or failure. If the source ends with a
    /// non-recoverable error, that error is returned **after** committing all
    /// frames streamed before the failure (partial success, no rollback).
    pub fn append(&mut self, source: &mut dyn SampleStream) -> Result<usize> {
        let ch = self.format.channels as usize;
        let bpf = self.format.bytes_per_frame();
        let width = self.format.bytes_per_sample as usize;

        let mut scratch = vec![0.0f32; APPEND_BATCH_FRAMES * ch];
        let mut component = [0u8; 4];
        let mut appended = 0usize;

        loop {
            let (frames, ok) = source.stream(&mut scratch);
            if frames > 0 {
                // Copies-on-write only when live views still reference the
                // old allocation; the fill-then-read pattern extends in place.
                let bytes = Arc::make_mut(&mut self.bytes);
                bytes.reserve(frames * bpf);
                for sample in &scratch[..frames * ch] {
                    crate::format::encode_component(*sample, &mut component[..width]);
                    bytes.extend_from_slice(&component[..width]);
                }
                self.frames += frames;
                appended += frames;
            }
            if !ok {
                break;
            }
        }

        if let Some(err) = source.err() {
            debug!(
                frames = appended,
                "append stopped by source error; partial frames committed"
            );
            return Err(err);
        }

        debug!(frames = appended, total = self.frames, "appended to buffer");
        Ok(appended)
    }

    /// Create a seekable view over frames `[start, end)`.
    ///
    /// Creation is cheap (no sample data is copied) and any number of
    /// views, including overlapping or identical ranges, may exist at once;
    /// each tracks its own position.
    ///
    /// # Errors
    /// `Error::InvalidRange` if `start > end` or `end > len()`.
    /// `streamer(0, len())` always succeeds, including on an empty buffer
    /// (yielding an immediately exhausted stream).
    pub fn streamer(&self, start: usize, end: usize) -> Result<BufferStreamer> {
        if start > end || end > self.frames {
            return Err(Error::InvalidRange(format!(
                "streamer range {}..{} invalid for buffer of {} frames",
                start, end, self.frames
            )));
        }

        Ok(BufferStreamer {
            format: self.format,
            bytes: Arc::clone(&self.bytes),
            start,
            end,
            pos: 0,
        })
    }
}

/// Seekable read view over a [`Buffer`] sub-range.
///
/// Decodes bytes to samples lazily, per [`SampleStream::stream`] call, from
/// the shared byte store. Independent of every other view: reading one never
/// moves another's position.
#[derive(Debug, Clone)]
pub struct BufferStreamer {
    format: Format,
    bytes: Arc<Vec<u8>>,
    /// First frame of the view, as an index into the buffer
    start: usize,
    /// One past the last frame of the view
    end: usize,
    /// Current position, relative to `start`
    pos: usize,
}

impl SampleStream for BufferStreamer {
    fn stream(&mut self, out: &mut [f32]) -> (usize, bool) {
        let ch = self.format.channels as usize;
        let bpf = self.format.bytes_per_frame();
        let total = self.end - self.start;

        if self.pos >= total {
            return (0, false);
        }

        let want = out.len() / ch;
        let n = want.min(total - self.pos);
        let byte_start = (self.start + self.pos) * bpf;

        for i in 0..n {
            let frame_bytes = &self.bytes[byte_start + i * bpf..byte_start + (i + 1) * bpf];
            self.format
                .decode_frame(frame_bytes, &mut out[i * ch..(i + 1) * ch]);
        }

        self.pos += n;
        (n, true)
    }

    fn err(&self) -> Option<Error> {
        // All data is resident; buffer views cannot fail mid-stream
        None
    }
}

impl SeekableStream for BufferStreamer {
    fn len(&self) -> usize {
        self.end - self.start
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn seek(&mut self, frame: usize) -> Result<()> {
        if frame > self.len() {
            return Err(Error::InvalidRange(format!(
                "seek to frame {} beyond view length {}",
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
    use crate::stream::FrameStream;

    fn drain(stream: &mut dyn SampleStream, channels: usize) -> Vec<f32> {
        let mut out = Vec::new();
        let mut batch = vec![0.0f32; 8 * channels];
        loop {
            let (frames, ok) = stream.stream(&mut batch);
            out.extend_from_slice(&batch[..frames * channels]);
            if !ok {
                break;
            }
        }
        out
    }

    #[test]
    fn test_append_and_len() {
        let format = Format::new(44100, 2, 2).unwrap();
        let mut buffer = Buffer::new(format);
        assert_eq!(buffer.len(), 0);

        let mut source = FrameStream::new(vec![0.5, -0.5, 0.25, 0.25, -1.0, 1.0], 2);
        let appended = buffer.append(&mut source).unwrap();
        assert_eq!(appended, 3);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_roundtrip() {
        let format = Format::new(44100, 2, 2).unwrap();
        let mut buffer = Buffer::new(format);
        let samples = vec![0.5, -0.5, 0.25, 0.25, -1.0, 1.0];
        buffer
            .append(&mut FrameStream::new(samples.clone(), 2))
            .unwrap();

        let mut view = buffer.streamer(0, buffer.len()).unwrap();
        let decoded = drain(&mut view, 2);
        assert_eq!(decoded.len(), samples.len());
        for (d, s) in decoded.iter().zip(&samples) {
            assert!((d - s).abs() < 1e-4, "decoded {} expected {}", d, s);
        }
    }

    #[test]
    fn test_sub_range_view() {
        // The worked example: 3 stereo frames at 44.1kHz / 16-bit
        let format = Format::new(44100, 2, 2).unwrap();
        let mut buffer = Buffer::new(format);
        buffer
            .append(&mut FrameStream::new(
                vec![0.5, -0.5, 0.25, 0.25, -1.0, 1.0],
                2,
            ))
            .unwrap();
        assert_eq!(buffer.len(), 3);

        let mut view = buffer.streamer(1, 3).unwrap();
        let mut out = [0.0f32; 8];
        let (frames, ok) = view.stream(&mut out);
        assert_eq!(frames, 2);
        assert!(ok);
        for (got, want) in out[..4].iter().zip(&[0.25, 0.25, -1.0, 1.0]) {
            assert!((got - want).abs() < 1e-4);
        }

        let (frames, ok) = view.stream(&mut out);
        assert_eq!(frames, 0);
        assert!(!ok);
    }

    #[test]
    fn test_range_validation() {
        let format = Format::new(44100, 2, 2).unwrap();
        let mut buffer = Buffer::new(format);
        buffer
            .append(&mut FrameStream::new(vec![0.0; 8], 2))
            .unwrap();

        assert!(matches!(
            buffer.streamer(3, 2),
            Err(Error::InvalidRange(_))
        ));
        assert!(matches!(
            buffer.streamer(0, 5),
            Err(Error::InvalidRange(_))
        ));
        assert!(buffer.streamer(0, 4).is_ok());
        assert!(buffer.streamer(4, 4).is_ok());
    }

    #[test]
    fn test_empty_buffer_zero_length_view() {
        let format = Format::new(44100, 2, 2).unwrap();
        let buffer = Buffer::new(format);

        let mut view = buffer.streamer(0, 0).unwrap();
        let mut out = [0.0f32; 4];
        let (frames, ok) = view.stream(&mut out);
        assert_eq!(frames, 0);
        assert!(!ok);
    }

    #[test]
    fn test_views_are_independent() {
        let format = Format::new(44100, 1, 2).unwrap();
        let mut buffer = Buffer::new(format);
        buffer
            .append(&mut FrameStream::new(vec![0.1, 0.2, 0.3, 0.4], 1))
            .unwrap();

        let mut a = buffer.streamer(0, 4).unwrap();
        let mut b = buffer.streamer(0, 4).unwrap();

        let mut out = [0.0f32; 2];
        a.stream(&mut out);
        assert_eq!(a.position(), 2);
        assert_eq!(b.position(), 0);

        let da = drain(&mut buffer.streamer(0, 4).unwrap(), 1);
        let db = drain(&mut b, 1);
        assert_eq!(da.len(), db.len());
        for (x, y) in da.iter().zip(&db) {
            assert_eq!(x, y);
        }
    }

    #[test]
    fn test_view_survives_later_append() {
        let format = Format::new(44100, 1, 2).unwrap();
        let mut buffer = Buffer::new(format);
        buffer
            .append(&mut FrameStream::new(vec![0.5, -0.5], 1))
            .unwrap();

        let mut view = buffer.streamer(0, 2).unwrap();

        // Growing the buffer afterwards copies-on-write; the view still reads
        // the range it captured.
        buffer
            .append(&mut FrameStream::new(vec![0.9; 100], 1))
            .unwrap();
        assert_eq!(buffer.len(), 102);

        let decoded = drain(&mut view, 1);
        assert_eq!(decoded.len(), 2);
        assert!((decoded[0] - 0.5).abs() < 1e-4);
        assert!((decoded[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_seek_within_view() {
        let format = Format::new(44100, 1, 2).unwrap();
        let mut buffer = Buffer::new(format);
        buffer
            .append(&mut FrameStream::new(vec![0.1, 0.2, 0.3, 0.4], 1))
            .unwrap();

        let mut view = buffer.streamer(1, 4).unwrap();
        assert_eq!(view.len(), 3);

        view.seek(2).unwrap();
        let mut out = [0.0f32; 1];
        let (frames, _) = view.stream(&mut out);
        assert_eq!(frames, 1);
        assert!((out[0] - 0.4).abs() < 1e-4);

        assert!(matches!(view.seek(4), Err(Error::InvalidRange(_))));
        view.seek(0).unwrap();
        assert_eq!(view.position(), 0);
    }

    #[test]
    fn test_append_error_keeps_partial_frames() {
        struct FailingSource {
            sent: bool,
        }

        impl SampleStream for FailingSource {
            fn stream(&mut self, out: &mut [f32]) -> (usize, bool) {
                if self.sent {
                    return (0, false);
                }
                self.sent = true;
                out[..2].fill(0.5);
                (2, true)
            }

            fn err(&self) -> Option<Error> {
                if self.sent {
                    Some(Error::Decode("bitstream truncated".into()))
                } else {
                    None
                }
            }
        }

        let format = Format::new(44100, 1, 2).unwrap();
        let mut buffer = Buffer::new(format);
        let result = buffer.append(&mut FailingSource { sent: false });

        assert!(matches!(result, Err(Error::Decode(_))));
        // Frames streamed before the failure stay committed
        assert_eq!(buffer.len(), 2);
    }
}
