//! Shared test helpers
//!
//! `ManualOutput` stands in for the audio device: it stores the engine's fill
//! callback and lets tests drive it deterministically with `tick`, so engine
//! behavior is testable without audio hardware.

use mixcore::{ErrorFn, FillFn, Format, OutputDevice, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

static TRACING_INIT: Once = Once::new();

/// Install the test tracing subscriber (RUST_LOG-filtered, stderr).
///
/// Safe to call from every test; only the first call installs.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

#[derive(Default)]
struct ManualInner {
    fill: Mutex<Option<FillFn>>,
    on_error: Mutex<Option<ErrorFn>>,
    started: AtomicBool,
}

/// Output device driven by the test instead of a driver cadence.
pub struct ManualOutput {
    inner: Arc<ManualInner>,
}

/// Test-side handle: invokes the callbacks the engine registered.
#[derive(Clone)]
pub struct ManualHandle {
    inner: Arc<ManualInner>,
}

impl ManualOutput {
    pub fn new() -> (Self, ManualHandle) {
        let inner = Arc::new(ManualInner::default());
        (
            Self {
                inner: Arc::clone(&inner),
            },
            ManualHandle { inner },
        )
    }
}

impl OutputDevice for ManualOutput {
    fn open(
        &mut self,
        _format: Format,
        _batch_frames: usize,
        fill: FillFn,
        on_error: ErrorFn,
    ) -> Result<()> {
        *self.inner.fill.lock().unwrap() = Some(fill);
        *self.inner.on_error.lock().unwrap() = Some(on_error);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.inner.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.inner.started.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl ManualHandle {
    /// Invoke the fill callback once, as the device driver would.
    pub fn tick(&self, out: &mut [f32]) {
        if let Some(fill) = self.inner.fill.lock().unwrap().as_mut() {
            fill(out);
        }
    }

    /// Report a device failure, as the driver's error path would.
    pub fn raise_error(&self, message: &str) {
        if let Some(on_error) = self.inner.on_error.lock().unwrap().as_mut() {
            on_error(message.to_string());
        }
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }
}
