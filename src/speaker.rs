//! Playback engine and control surface
//!
//! [`Speaker`] owns the connection to the output device and walks the state
//! machine `Uninitialized → Initialized → Running → Closed` (terminal). Once
//! running, the device invokes the mix callback on its own cadence and the
//! callback sums the active streams into each output batch.
//!
//! [`Controller`] is the thread-safe control surface: a cheap clone-able
//! handle through which any thread adds or removes streams while the
//! callback runs concurrently. Errors that occur during live mixing (a
//! stream failing, the device failing) never propagate through the callback;
//! they are queued and drained via `poll_events`.

use crate::error::{Error, Result};
use crate::format::Format;
use crate::mixer::{MixScratch, Mixer};
use crate::output::{CpalOutput, ErrorFn, FillFn, OutputDevice};
use crate::stream::SampleStream;
use ringbuf::{traits::*, HeapCons, HeapRb};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

/// Events queued before the application drains them; overflow drops rather
/// than blocking the callback.
const EVENT_QUEUE_CAPACITY: usize = 256;
const DEVICE_ERROR_QUEUE_CAPACITY: usize = 16;

const STATE_INITIALIZED: u8 = 1;
const STATE_RUNNING: u8 = 2;
const STATE_CLOSED: u8 = 3;

/// Playback engine configuration.
#[derive(Debug, Clone)]
pub struct SpeakerConfig {
    /// Output device name (None = system default)
    pub device_name: Option<String>,

    /// Frames per mix callback batch
    pub batch_frames: usize,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            batch_frames: 512,
        }
    }
}

/// Asynchronous notification from the mixing side.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The entry played to exhaustion and left the mixing set
    Finished(Uuid),

    /// The entry's stream failed; it was dropped from the mixing set
    StreamError {
        /// Handle of the dropped entry
        id: Uuid,
        /// The stream's error at the time it was dropped
        error: Error,
    },

    /// The output device reported a failure
    Device(String),
}

/// State shared between the engine, its controllers, and the callback.
struct Shared {
    mixer: Mixer,
    state: AtomicU8,
    events: Mutex<HeapCons<EngineEvent>>,
    device_errors: Mutex<HeapCons<String>>,
}

impl Shared {
    fn play(&self, stream: Box<dyn SampleStream + Send>) -> Result<Uuid> {
        if self.state.load(Ordering::Acquire) == STATE_CLOSED {
            return Err(Error::AlreadyClosed("play after close".into()));
        }
        Ok(self.mixer.add(stream))
    }

    fn poll_events(&self) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        {
            let mut events = self.events.lock().unwrap();
            while let Some(event) = events.try_pop() {
                out.push(event);
            }
        }
        {
            let mut errors = self.device_errors.lock().unwrap();
            while let Some(message) = errors.try_pop() {
                out.push(EngineEvent::Device(message));
            }
        }
        out
    }
}

/// The playback engine.
///
/// Not `Send` (the underlying device stream is tied to its creating thread);
/// use [`Speaker::controller`] to control playback from other threads.
pub struct Speaker {
    device: Option<Box<dyn OutputDevice>>,
    shared: Option<Arc<Shared>>,
    format: Option<Format>,
    closed: bool,
}

impl Speaker {
    /// Engine that will open the cpal output device at init time.
    pub fn new() -> Self {
        Self {
            device: None,
            shared: None,
            format: None,
            closed: false,
        }
    }

    /// Engine over a caller-supplied device backend.
    ///
    /// Used by tests (deterministic manual device) and alternative backends;
    /// `config.device_name` is ignored for injected devices.
    pub fn with_device(device: Box<dyn OutputDevice>) -> Self {
        Self {
            device: Some(device),
            shared: None,
            format: None,
            closed: false,
        }
    }

    /// Open the output device for `format` and register the mix callback.
    ///
    /// Transitions Uninitialized → Initialized; call [`Speaker::start`] to
    /// begin the callback cadence.
    ///
    /// # Errors
    /// - `Error::Configuration` if already initialized or
    ///   `config.batch_frames` is 0
    /// - `Error::AlreadyClosed` after [`Speaker::close`]
    /// - `Error::Device` if the output device cannot be claimed
    pub fn init(&mut self, format: Format, config: SpeakerConfig) -> Result<()> {
        if self.closed {
            return Err(Error::AlreadyClosed("init after close".into()));
        }
        if self.shared.is_some() {
            return Err(Error::Configuration("speaker already initialized".into()));
        }
        if config.batch_frames == 0 {
            return Err(Error::Configuration("batch size must be positive".into()));
        }

        let (event_prod, event_cons) = HeapRb::<EngineEvent>::new(EVENT_QUEUE_CAPACITY).split();
        let (mut error_prod, error_cons) =
            HeapRb::<String>::new(DEVICE_ERROR_QUEUE_CAPACITY).split();

        let shared = Arc::new(Shared {
            mixer: Mixer::new(format.channels),
            state: AtomicU8::new(STATE_INITIALIZED),
            events: Mutex::new(event_cons),
            device_errors: Mutex::new(error_cons),
        });

        let batch_samples = config.batch_frames * format.channels as usize;
        let mix_shared = Arc::clone(&shared);
        let mut scratch = MixScratch::new(batch_samples);
        let mut events = event_prod;
        let fill: FillFn = Box::new(move |out: &mut [f32]| {
            mix_shared.mixer.mix(out, &mut scratch, &mut events);
        });
        let on_error: ErrorFn = Box::new(move |message: String| {
            let _ = error_prod.try_push(message);
        });

        let device = self
            .device
            .get_or_insert_with(|| Box::new(CpalOutput::new(config.device_name.clone())));
        device.open(format, config.batch_frames, fill, on_error)?;

        self.shared = Some(shared);
        self.format = Some(format);
        info!(
            rate = format.sample_rate,
            channels = format.channels,
            batch = config.batch_frames,
            "speaker initialized"
        );
        Ok(())
    }

    /// Begin the periodic callback cadence (Initialized → Running).
    pub fn start(&mut self) -> Result<()> {
        let shared = Arc::clone(self.require_initialized()?);
        if shared.state.load(Ordering::Acquire) == STATE_RUNNING {
            return Err(Error::Configuration("speaker already running".into()));
        }

        self.device
            .as_mut()
            .expect("device present once initialized")
            .start()?;
        shared.state.store(STATE_RUNNING, Ordering::Release);
        info!("speaker running");
        Ok(())
    }

    /// Add `stream` to the mixing set; it contributes from the next batch.
    ///
    /// Never blocks and applies no backpressure. The stream must produce the
    /// engine's channel count at the engine's sample rate (no resampling is
    /// performed). Returns a handle usable with [`Speaker::stop_sound`];
    /// ignoring it is fine; the entry retires itself at exhaustion.
    pub fn play(&self, stream: Box<dyn SampleStream + Send>) -> Result<Uuid> {
        self.require_initialized()?.play(stream)
    }

    /// Remove one entry from the mixing set by its handle.
    pub fn stop_sound(&self, id: Uuid) -> Result<bool> {
        Ok(self.require_initialized()?.mixer.remove(id))
    }

    /// Empty the mixing set without closing the engine.
    pub fn clear(&self) -> Result<()> {
        self.require_initialized()?.mixer.clear();
        Ok(())
    }

    /// Number of entries currently in the mixing set.
    pub fn active_len(&self) -> Result<usize> {
        Ok(self.require_initialized()?.mixer.active_len())
    }

    /// Drain queued engine events (finished entries, stream errors, device
    /// errors).
    pub fn poll_events(&self) -> Vec<EngineEvent> {
        match &self.shared {
            Some(shared) => shared.poll_events(),
            None => Vec::new(),
        }
    }

    /// Thread-safe control surface for this engine.
    ///
    /// # Errors
    /// `Error::Configuration` before [`Speaker::init`].
    pub fn controller(&self) -> Result<Controller> {
        Ok(Controller {
            shared: Arc::clone(self.require_initialized()?),
        })
    }

    /// The engine format, once initialized.
    pub fn format(&self) -> Option<Format> {
        self.format
    }

    /// Release the output device and transition to the terminal Closed state.
    ///
    /// Idempotent. Subsequent `init`/`play` calls fail with
    /// `Error::AlreadyClosed`; outstanding [`Controller`] handles observe the
    /// same.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        if let Some(device) = self.device.as_mut() {
            if let Err(e) = device.stop() {
                warn!("failed to stop output device on close: {}", e);
            }
        }
        self.device = None;

        if let Some(shared) = &self.shared {
            shared.state.store(STATE_CLOSED, Ordering::Release);
            shared.mixer.clear();
        }

        self.closed = true;
        info!("speaker closed");
    }

    fn require_initialized(&self) -> Result<&Arc<Shared>> {
        if self.closed {
            return Err(Error::AlreadyClosed("speaker is closed".into()));
        }
        self.shared
            .as_ref()
            .ok_or_else(|| Error::Configuration("speaker not initialized".into()))
    }
}

impl Default for Speaker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.close();
    }
}

/// Clone-able, thread-safe handle to a running engine's control surface.
///
/// All operations are safe to call from any thread while the audio callback
/// executes concurrently; none of them blocks on a mixing pass.
#[derive(Clone)]
pub struct Controller {
    shared: Arc<Shared>,
}

impl Controller {
    /// Add a stream to the mixing set. See [`Speaker::play`].
    pub fn play(&self, stream: Box<dyn SampleStream + Send>) -> Result<Uuid> {
        self.shared.play(stream)
    }

    /// Remove one entry by handle.
    pub fn stop_sound(&self, id: Uuid) -> bool {
        self.shared.mixer.remove(id)
    }

    /// Empty the mixing set.
    pub fn clear(&self) {
        self.shared.mixer.clear();
    }

    /// Number of entries currently in the mixing set.
    pub fn active_len(&self) -> usize {
        self.shared.mixer.active_len()
    }

    /// Drain queued engine events.
    pub fn poll_events(&self) -> Vec<EngineEvent> {
        self.shared.poll_events()
    }
}
