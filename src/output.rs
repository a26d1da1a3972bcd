//! Audio output using cpal
//!
//! [`OutputDevice`] is the seam between the playback engine and the
//! operating-system audio driver: the engine hands it a batch-fill callback
//! at open time and the device invokes that callback on its own cadence once
//! started. [`CpalOutput`] is the production implementation; tests drive the
//! engine with a manual device instead, so none of the engine logic depends
//! on audio hardware.
//!
//! Device-level failures are surfaced asynchronously through the error
//! callback, never through the fill callback's return path.

use crate::error::{Error, Result};
use crate::format::Format;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use tracing::{debug, info, warn};

/// Batch-fill callback: fills an interleaved f32 batch (a whole number of
/// frames, at most the batch size given to [`OutputDevice::open`]).
pub type FillFn = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Asynchronous device-error callback.
pub type ErrorFn = Box<dyn FnMut(String) + Send + 'static>;

/// Contract for output device backends.
///
/// Lifecycle: `open` registers the callbacks and claims the device, `start`
/// begins the periodic callback cadence, `stop` ends it. Implementations are
/// driven from the thread that owns the [`crate::speaker::Speaker`].
pub trait OutputDevice {
    /// Claim the device for `format` at `batch_frames` frames per callback
    /// and register the fill and error callbacks.
    fn open(
        &mut self,
        format: Format,
        batch_frames: usize,
        fill: FillFn,
        on_error: ErrorFn,
    ) -> Result<()>;

    /// Begin invoking the fill callback on the device cadence.
    fn start(&mut self) -> Result<()>;

    /// Stop callback delivery and release the device.
    fn stop(&mut self) -> Result<()>;
}

/// Output device backed by cpal.
///
/// Falls back to the default output device when the requested device name is
/// not found. Supports f32 and i16 device sample formats; the engine always
/// mixes in f32 and this wrapper converts at the edge.
pub struct CpalOutput {
    /// Requested device name (None = system default)
    device_name: Option<String>,
    stream: Option<Stream>,
}

impl CpalOutput {
    /// Output through the named device, or the system default when `None`.
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            stream: None,
        }
    }

    /// List available output device names.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::Device(format!("failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();
        debug!("found {} output devices", devices.len());
        Ok(devices)
    }

    /// Resolve the requested device, falling back to the default.
    fn find_device(&self) -> Result<Device> {
        let host = cpal::default_host();

        if let Some(name) = self.device_name.as_ref() {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::Device(format!("failed to enumerate devices: {}", e)))?;

            if let Some(device) = devices.find(|d| d.name().ok().as_ref() == Some(name)) {
                info!("using requested audio device: {}", name);
                return Ok(device);
            }

            warn!(
                "requested device '{}' not found, falling back to default",
                name
            );
        }

        let device = host.default_output_device().ok_or_else(|| {
            Error::Device("no default output device available".to_string())
        })?;
        info!(
            "using audio device: {}",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );
        Ok(device)
    }

    /// Pick a supported configuration matching the engine format.
    ///
    /// Prefers an f32 config at the requested rate and channel count, then
    /// i16; anything else is unsupported.
    fn get_best_config(device: &Device, format: Format) -> Result<(StreamConfig, SampleFormat)> {
        let configs: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::Device(format!("failed to get device configs: {}", e)))?
            .filter(|c| {
                c.channels() == format.channels
                    && c.min_sample_rate().0 <= format.sample_rate
                    && c.max_sample_rate().0 >= format.sample_rate
            })
            .collect();

        for wanted in [SampleFormat::F32, SampleFormat::I16] {
            if let Some(supported) = configs.iter().find(|c| c.sample_format() == wanted) {
                let config = supported
                    .clone()
                    .with_sample_rate(cpal::SampleRate(format.sample_rate))
                    .config();
                return Ok((config, wanted));
            }
        }

        Err(Error::Device(format!(
            "device does not support {} Hz / {} channels in f32 or i16",
            format.sample_rate, format.channels
        )))
    }
}

impl OutputDevice for CpalOutput {
    fn open(
        &mut self,
        format: Format,
        batch_frames: usize,
        mut fill: FillFn,
        mut on_error: ErrorFn,
    ) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::Configuration("output device already open".into()));
        }

        let device = self.find_device()?;
        let (mut config, sample_format) = Self::get_best_config(&device, format)?;
        config.buffer_size = cpal::BufferSize::Fixed(batch_frames as u32);

        debug!(
            "audio config: rate={}, channels={}, format={:?}, batch={} frames",
            config.sample_rate.0, config.channels, sample_format, batch_frames
        );

        let batch_samples = batch_frames * format.channels as usize;
        let error_cb = move |err: cpal::StreamError| {
            on_error(err.to_string());
        };

        let stream = match sample_format {
            SampleFormat::F32 => device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        // The driver may deliver more than one batch at once
                        for chunk in data.chunks_mut(batch_samples) {
                            fill(chunk);
                        }
                    },
                    error_cb,
                    None,
                )
                .map_err(|e| Error::Device(format!("failed to build stream: {}", e)))?,
            SampleFormat::I16 => {
                let mut scratch = vec![0.0f32; batch_samples];
                device
                    .build_output_stream(
                        &config,
                        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                            for chunk in data.chunks_mut(batch_samples) {
                                let f32_chunk = &mut scratch[..chunk.len()];
                                fill(f32_chunk);
                                for (dst, src) in chunk.iter_mut().zip(f32_chunk.iter()) {
                                    *dst = (src.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                                }
                            }
                        },
                        error_cb,
                        None,
                    )
                    .map_err(|e| Error::Device(format!("failed to build stream: {}", e)))?
            }
            other => {
                return Err(Error::Device(format!(
                    "unsupported device sample format: {:?}",
                    other
                )));
            }
        };

        self.stream = Some(stream);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| Error::Configuration("output device not open".into()))?;
        stream
            .play()
            .map_err(|e| Error::Device(format!("failed to start stream: {}", e)))?;
        info!("audio stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| Error::Device(format!("failed to pause stream: {}", e)))?;
            drop(stream);
            info!("audio stream stopped");
        }
        Ok(())
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices_does_not_panic() {
        // Enumeration depends on the host; either outcome is acceptable
        let result = CpalOutput::list_devices();
        assert!(result.is_ok() || result.is_err());
    }

    #[test]
    fn test_start_before_open_is_configuration_error() {
        let mut output = CpalOutput::new(None);
        assert!(matches!(
            output.start(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_stop_without_open_is_ok() {
        let mut output = CpalOutput::new(None);
        assert!(output.stop().is_ok());
    }
}
