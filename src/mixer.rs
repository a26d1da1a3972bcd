//! Mixing set: summation of active streams into output batches
//!
//! The [`Mixer`] holds the one piece of state shared between application
//! threads and the real-time callback. Its container is locked only briefly:
//! the mix pass snapshots the active entries under the lock, releases it, and
//! streams each entry outside it, so `play`/`clear` from other threads never
//! wait on a full mixing pass.
//!
//! Overflow policy: contributions are accumulated (not averaged) and the
//! batch is hard-clamped to [-1.0, 1.0] afterwards. Callers that need
//! headroom attenuate their sources before playing them.
//!
//! Real-time discipline: the steady-state mix path takes no allocations
//! beyond the pre-sized scratch, never logs, and never blocks on anything but
//! the brief set lock and per-entry stream locks.

use crate::speaker::EngineEvent;
use crate::stream::SampleStream;
use ringbuf::{traits::*, HeapProd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// One stream registered with the mixing set.
pub(crate) struct PlaybackEntry {
    id: Uuid,
    stream: Mutex<Box<dyn SampleStream + Send>>,
    /// Set during a mix pass once the stream exhausts or fails; retired
    /// entries are dropped from the set after that pass.
    finished: AtomicBool,
}

/// Reusable working memory for the mix pass.
///
/// Owned by the audio callback so the pass itself performs no steady-state
/// allocation: the snapshot vector and batch buffer keep their capacity
/// across callbacks.
pub struct MixScratch {
    snapshot: Vec<Arc<PlaybackEntry>>,
    batch: Vec<f32>,
}

impl MixScratch {
    /// Scratch sized for batches of up to `batch_samples` interleaved samples.
    pub fn new(batch_samples: usize) -> Self {
        Self {
            snapshot: Vec::with_capacity(16),
            batch: vec![0.0; batch_samples],
        }
    }
}

/// The set of currently playing streams.
///
/// Mutated only through the control surface ([`crate::speaker::Speaker`] /
/// [`crate::speaker::Controller`]); read every callback invocation.
pub struct Mixer {
    channels: u16,
    entries: Mutex<Vec<Arc<PlaybackEntry>>>,
}

impl Mixer {
    /// Empty mixing set for streams of `channels` channels.
    pub fn new(channels: u16) -> Self {
        Self {
            channels,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Channel count every mixed stream must match.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Add a stream to the set; it contributes to the next batch.
    ///
    /// Never blocks beyond the brief container lock; there is no
    /// backpressure. Returns the entry's handle.
    pub fn add(&self, stream: Box<dyn SampleStream + Send>) -> Uuid {
        let entry = Arc::new(PlaybackEntry {
            id: Uuid::new_v4(),
            stream: Mutex::new(stream),
            finished: AtomicBool::new(false),
        });
        let id = entry.id;
        self.entries.lock().unwrap().push(entry);
        id
    }

    /// Remove one entry by handle. Returns true if it was present.
    ///
    /// A pass already holding a snapshot may mix the entry one final batch.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Empty the set. Streams stop contributing after at most one more batch.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Number of entries currently registered.
    pub fn active_len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Mix one output batch: zero `out`, sum every active entry's
    /// contribution sample-wise, clamp to [-1.0, 1.0].
    ///
    /// `out.len()` must be a whole number of frames and no larger than the
    /// scratch batch. Exhausted entries are retired after the pass (with a
    /// [`EngineEvent::Finished`] notification); entries whose
    /// [`SampleStream::err`] turned non-`None` are retired and the error is
    /// forwarded through `events` instead of ever reaching the callback's
    /// return path.
    pub fn mix(
        &self,
        out: &mut [f32],
        scratch: &mut MixScratch,
        events: &mut HeapProd<EngineEvent>,
    ) {
        debug_assert!(out.len() <= scratch.batch.len());
        debug_assert_eq!(out.len() % self.channels as usize, 0);

        out.fill(0.0);

        // Snapshot under a brief lock, then mix without it
        scratch.snapshot.clear();
        {
            let entries = self.entries.lock().unwrap();
            scratch.snapshot.extend(entries.iter().cloned());
        }

        let ch = self.channels as usize;
        let mut any_finished = false;

        for entry in &scratch.snapshot {
            let (frames, ok) = {
                let mut stream = entry.stream.lock().unwrap();
                stream.stream(&mut scratch.batch[..out.len()])
            };

            for (acc, sample) in out[..frames * ch]
                .iter_mut()
                .zip(&scratch.batch[..frames * ch])
            {
                *acc += *sample;
            }

            if !ok {
                entry.finished.store(true, Ordering::Release);
                any_finished = true;

                let event = match entry.stream.lock().unwrap().err() {
                    Some(error) => EngineEvent::StreamError {
                        id: entry.id,
                        error,
                    },
                    None => EngineEvent::Finished(entry.id),
                };
                // Queue full means the application stopped draining; drop
                // rather than block the callback
                let _ = events.try_push(event);
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        if any_finished {
            self.entries
                .lock()
                .unwrap()
                .retain(|e| !e.finished.load(Ordering::Acquire));
        }
    }
}
