//! Decoder collaborator contract
//!
//! Compressed-format decoding lives outside this crate. A decoder hands back
//! a [`SampleStream`] plus the [`Format`] it will produce for its entire
//! lifetime; from then on it is interchangeable with every other source.
//!
//! [`PcmDecoder`] is the reference collaborator: raw interleaved little-endian
//! PCM over the same component widths the buffer uses. It exists to exercise
//! the contract end to end and to read back byte streams this crate produced.

use crate::error::{Error, Result};
use crate::format::Format;
use crate::stream::SampleStream;
use std::io::Read;

/// Contract for external decoder collaborators.
///
/// Given a readable byte source, produce a sample stream and the format it
/// decodes to. The returned stream's format must remain constant for its
/// lifetime; decode failures surface through the stream's
/// [`SampleStream::err`], never by panicking.
pub trait Decoder {
    /// Open `input` for streaming decode.
    fn open(&self, input: Box<dyn Read + Send>) -> Result<(Box<dyn SampleStream + Send>, Format)>;
}

/// Raw PCM decoder: interleaved little-endian components at a fixed format.
///
/// The byte layout matches what [`crate::buffer::Buffer`] stores, so a dumped
/// buffer reads back through this decoder.
#[derive(Debug, Clone, Copy)]
pub struct PcmDecoder {
    format: Format,
}

impl PcmDecoder {
    /// Decoder producing samples in `format`.
    pub fn new(format: Format) -> Self {
        Self { format }
    }
}

impl Decoder for PcmDecoder {
    fn open(&self, input: Box<dyn Read + Send>) -> Result<(Box<dyn SampleStream + Send>, Format)> {
        let stream = PcmStream {
            reader: input,
            format: self.format,
            error: None,
            done: false,
        };
        Ok((Box::new(stream), self.format))
    }
}

/// Streaming side of [`PcmDecoder`].
struct PcmStream {
    reader: Box<dyn Read + Send>,
    format: Format,
    error: Option<Error>,
    done: bool,
}

impl PcmStream {
    /// Read as many bytes as possible into `buf`, tolerating short reads.
    /// Returns bytes read; fewer than `buf.len()` means end of input.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Decode(format!("read failed: {}", e))),
            }
        }
        Ok(filled)
    }
}

impl SampleStream for PcmStream {
    fn stream(&mut self, out: &mut [f32]) -> (usize, bool) {
        if self.done || self.error.is_some() {
            return (0, false);
        }

        let ch = self.format.channels as usize;
        let width = self.format.bytes_per_sample as usize;
        let bpf = self.format.bytes_per_frame();
        let want = out.len() / ch;

        let mut bytes = vec![0u8; want * bpf];
        let read = match self.read_bytes(&mut bytes) {
            Ok(n) => n,
            Err(e) => {
                self.error = Some(e);
                self.done = true;
                return (0, false);
            }
        };

        if read < bytes.len() {
            self.done = true;
            if read % bpf != 0 {
                // Trailing partial frame: the bitstream is truncated
                self.error = Some(Error::Decode(format!(
                    "input truncated mid-frame ({} stray bytes)",
                    read % bpf
                )));
            }
        }

        let frames = read / bpf;
        for (sample, chunk) in out[..frames * ch]
            .iter_mut()
            .zip(bytes[..frames * bpf].chunks_exact(width))
        {
            *sample = crate::format::decode_component(chunk);
        }

        if frames == 0 {
            (0, false)
        } else {
            (frames, true)
        }
    }

    fn err(&self) -> Option<Error> {
        self.error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_pcm(format: Format, samples: &[f32]) -> Vec<u8> {
        let width = format.bytes_per_sample as usize;
        let mut out = Vec::new();
        let mut component = [0u8; 4];
        for &s in samples {
            crate::format::encode_component(s, &mut component[..width]);
            out.extend_from_slice(&component[..width]);
        }
        out
    }

    #[test]
    fn test_pcm_decode_roundtrip() {
        let format = Format::new(44100, 2, 2).unwrap();
        let samples = vec![0.5, -0.5, 0.25, 0.25, -1.0, 1.0];
        let bytes = encode_pcm(format, &samples);

        let (mut stream, got_format) = PcmDecoder::new(format)
            .open(Box::new(std::io::Cursor::new(bytes)))
            .unwrap();
        assert_eq!(got_format, format);

        let mut out = [0.0f32; 16];
        let (frames, ok) = stream.stream(&mut out);
        assert_eq!(frames, 3);
        assert!(ok);
        for (got, want) in out[..6].iter().zip(&samples) {
            assert!((got - want).abs() < 1e-4);
        }

        let (frames, ok) = stream.stream(&mut out);
        assert_eq!(frames, 0);
        assert!(!ok);
        assert!(stream.err().is_none());
    }

    #[test]
    fn test_pcm_truncated_input_is_decode_error() {
        let format = Format::new(44100, 2, 2).unwrap();
        // One full frame plus one stray byte
        let bytes = vec![0x00, 0x40, 0x00, 0xC0, 0x7F];

        let (mut stream, _) = PcmDecoder::new(format)
            .open(Box::new(std::io::Cursor::new(bytes)))
            .unwrap();

        let mut out = [0.0f32; 8];
        let (frames, _) = stream.stream(&mut out);
        assert_eq!(frames, 1);

        let (frames, ok) = stream.stream(&mut out);
        assert_eq!(frames, 0);
        assert!(!ok);
        assert!(matches!(stream.err(), Some(Error::Decode(_))));
    }

    #[test]
    fn test_decoded_stream_feeds_buffer() {
        let format = Format::new(48000, 1, 4).unwrap();
        let samples = vec![0.1, 0.2, 0.3];
        let bytes = encode_pcm(format, &samples);

        let (mut stream, _) = PcmDecoder::new(format)
            .open(Box::new(std::io::Cursor::new(bytes)))
            .unwrap();

        let mut buffer = crate::buffer::Buffer::new(format);
        let appended = buffer.append(&mut *stream).unwrap();
        assert_eq!(appended, 3);
        assert_eq!(buffer.len(), 3);
    }
}
