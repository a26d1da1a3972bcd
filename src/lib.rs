//! # mixcore
//!
//! In-memory audio buffering and real-time mixing core.
//!
//! **Purpose:** store decoded audio compactly in memory, expose cheap
//! seekable read views over it, and mix concurrently active streams into one
//! continuous output signal on a real-time device callback.
//!
//! **Architecture:** a single pull-based [`SampleStream`] capability is
//! implemented by every source (buffer views, decoder collaborators,
//! generators), and the [`Speaker`] sums whichever streams are currently
//! playing into each output batch. Decoding of compressed formats and device
//! enumeration policy live outside this crate.
//!
//! ```
//! use mixcore::{Buffer, Format, FrameStream, SampleStream};
//!
//! let format = Format::new(44100, 2, 2)?;
//! let mut buffer = Buffer::new(format);
//! buffer.append(&mut FrameStream::new(vec![0.5, -0.5, 0.25, 0.25], 2))?;
//!
//! // Views are cheap, independent, and seekable
//! let mut view = buffer.streamer(0, buffer.len())?;
//! let mut batch = [0.0f32; 4];
//! let (frames, ok) = view.stream(&mut batch);
//! assert_eq!(frames, 2);
//! assert!(ok);
//! # Ok::<(), mixcore::Error>(())
//! ```
//!
//! Playback (requires an output device):
//!
//! ```no_run
//! use mixcore::{Format, Speaker, SpeakerConfig, Silence};
//!
//! let format = Format::new(44100, 2, 2)?;
//! let mut speaker = Speaker::new();
//! speaker.init(format, SpeakerConfig::default())?;
//! speaker.start()?;
//!
//! // Control from any thread while the callback mixes concurrently
//! let controller = speaker.controller()?;
//! controller.play(Box::new(Silence::new(2, 44100)))?;
//! # Ok::<(), mixcore::Error>(())
//! ```

pub mod buffer;
pub mod decode;
pub mod error;
pub mod format;
pub mod mixer;
pub mod output;
pub mod speaker;
pub mod stream;

pub use buffer::{Buffer, BufferStreamer};
pub use decode::{Decoder, PcmDecoder};
pub use error::{Error, Result};
pub use format::Format;
pub use mixer::{MixScratch, Mixer};
pub use output::{CpalOutput, ErrorFn, FillFn, OutputDevice};
pub use speaker::{Controller, EngineEvent, Speaker, SpeakerConfig};
pub use stream::{FrameStream, SampleStream, SeekableStream, Silence};
