//! # Audio Capture Module
//!
//! Real-time audio capture using CPAL (Cross-Platform Audio Library).
//!
//! The capture source opens exactly one input stream, mixes every hardware
//! buffer down to mono, re-chunks it into fixed-length [`AudioBlock`]s and
//! hands them to the [`StreamBuffer`]. It owns no analysis logic.
//!
//! The input callback runs on the driver's real-time thread and never waits:
//! blocks go through [`StreamBuffer::try_push_samples`], which drops the
//! incoming block when the consumer holds the lock. The mixdown buffer is
//! sized once, and block storage is recycled through the stream buffer.
//!
//! `cpal::Stream` is `!Send` on some hosts, so an [`AudioCapture`] must be
//! stopped and dropped on the thread that started it.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, SupportedStreamConfigRange};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

use crate::config::MonitorConfig;
use crate::error::{MeterError, Result};
use crate::stream_buffer::{AudioBlock, StreamBuffer};

/// Sample formats the capture source can convert, in order of preference.
const SUPPORTED_FORMATS: [SampleFormat; 3] =
    [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16];

/// Names of all input devices on the default host.
pub fn input_device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| MeterError::Device(e.to_string()))?;
    Ok(devices
        .enumerate()
        .map(|(idx, device)| {
            device
                .name()
                .unwrap_or_else(|_| format!("Input Device {}", idx + 1))
        })
        .collect())
}

/// Handle to a running input stream.
pub struct AudioCapture {
    stream: Option<cpal::Stream>,
    running: Arc<AtomicBool>,
    sample_rate: u32,
    channels: u16,
    device_name: String,
}

impl AudioCapture {
    /// Opens the configured input device and starts streaming into `sink`.
    ///
    /// # Arguments
    /// * `config` - Sample rate, block size and optional device name
    /// * `sink` - Stream buffer receiving the mono blocks
    ///
    /// # Returns
    /// * `Ok(capture)` - The stream is playing
    /// * `Err(e)` - The device or configuration could not be opened. Not retried.
    pub fn start(config: &MonitorConfig, sink: Arc<StreamBuffer>) -> Result<Self> {
        let device = select_device(config.device_name.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        info!(device = device_name.as_str(), "using audio input device");

        let configs = device
            .supported_input_configs()
            .map_err(|e| MeterError::Device(e.to_string()))?
            .collect::<Vec<_>>();
        let supported = find_supported_config(configs, config.sample_rate)
            .ok_or(MeterError::UnsupportedConfig {
                sample_rate: config.sample_rate,
            })?
            .with_sample_rate(cpal::SampleRate(config.sample_rate));

        let sample_format = supported.sample_format();
        let channels = supported.channels();
        let stream_config: cpal::StreamConfig = supported.into();
        info!(
            sample_rate = config.sample_rate,
            channels,
            format = ?sample_format,
            block_size = config.block_size,
            "audio config selected"
        );

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let block_size = config.block_size;
        let stream = match sample_format {
            SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, block_size, sink, flag)
            }
            SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, block_size, sink, flag)
            }
            SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, block_size, sink, flag)
            }
            other => {
                return Err(MeterError::Device(format!(
                    "unsupported sample format: {other:?}"
                )));
            }
        }?;

        stream
            .play()
            .map_err(|e| MeterError::Device(e.to_string()))?;
        info!("audio stream started");

        Ok(Self {
            stream: Some(stream),
            running,
            sample_rate: config.sample_rate,
            channels,
            device_name,
        })
    }

    /// Stops the stream and releases the device. Calling it again is a no-op.
    ///
    /// No block reaches the sink after this returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("error pausing stream: {e}");
            }
            drop(stream);
            info!(device = self.device_name.as_str(), "audio stream stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count of the device stream before the mono mixdown.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn select_device(preferred: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match preferred {
        Some(name) => {
            let mut devices = host
                .input_devices()
                .map_err(|e| MeterError::Device(e.to_string()))?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| MeterError::Device(format!("input device '{name}' not found")))
        }
        None => host.default_input_device().ok_or(MeterError::NoInputDevice),
    }
}

/// Finds a supported configuration covering the target sample rate.
///
/// Prefers fewer channels, then the formats in [`SUPPORTED_FORMATS`] order.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .filter_map(|c| {
            let rank = SUPPORTED_FORMATS.iter().position(|f| *f == c.sample_format())?;
            Some((c.channels(), rank, c))
        })
        .min_by_key(|(channels, rank, _)| (*channels, *rank))
        .map(|(_, _, c)| c)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    block_size: usize,
    sink: Arc<StreamBuffer>,
    running: Arc<AtomicBool>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut chunker = BlockChunker::new(config.channels as usize, block_size);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                chunker.push_interleaved(data, |samples| {
                    sink.try_push_samples(samples);
                });
            },
            |err| error!("an error occurred on the audio stream: {err}"),
            None,
        )
        .map_err(|e| MeterError::Device(e.to_string()))
}

/// Mixes interleaved frames to mono and emits fixed-length blocks.
///
/// `pending` never holds more than one block, so it is allocated once.
struct BlockChunker {
    channels: usize,
    block_size: usize,
    pending: Vec<f32>,
}

impl BlockChunker {
    fn new(channels: usize, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            channels: channels.max(1),
            block_size,
            pending: Vec::with_capacity(block_size),
        }
    }

    fn push_interleaved<T>(&mut self, data: &[T], mut emit: impl FnMut(&[f32]))
    where
        T: Sample,
        f32: FromSample<T>,
    {
        let ch = self.channels;
        for frame in data.chunks_exact(ch) {
            let mono = frame.iter().map(|&s| f32::from_sample(s)).sum::<f32>() / ch as f32;
            self.pending.push(mono);
            if self.pending.len() == self.block_size {
                emit(&self.pending);
                self.pending.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect<T>(chunker: &mut BlockChunker, data: &[T], blocks: &mut Vec<Vec<f32>>)
    where
        T: Sample,
        f32: FromSample<T>,
    {
        chunker.push_interleaved(data, |b| blocks.push(b.to_vec()));
    }

    #[test]
    fn chunker_emits_fixed_size_blocks() {
        let mut chunker = BlockChunker::new(1, 4);
        let mut blocks = Vec::new();
        collect(&mut chunker, &[0.1f32, 0.2, 0.3], &mut blocks);
        assert!(blocks.is_empty());
        collect(&mut chunker, &[0.4f32, 0.5, 0.6, 0.7, 0.8, 0.9], &mut blocks);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(blocks[1], vec![0.5, 0.6, 0.7, 0.8]);
        assert_eq!(chunker.pending, vec![0.9]);
    }

    #[test]
    fn chunker_averages_channels() {
        let mut chunker = BlockChunker::new(2, 2);
        let mut blocks = Vec::new();
        collect(&mut chunker, &[1.0f32, 0.0, 0.5, -0.5], &mut blocks);
        assert_eq!(blocks, vec![vec![0.5, 0.0]]);
    }

    #[test]
    fn chunker_converts_integer_samples() {
        let mut chunker = BlockChunker::new(1, 2);
        let mut blocks = Vec::new();
        collect(&mut chunker, &[i16::MIN, 0i16], &mut blocks);
        assert_eq!(blocks[0], vec![-1.0, 0.0]);
    }

    #[test]
    fn chunker_keeps_its_buffer_across_large_callbacks() {
        let mut chunker = BlockChunker::new(2, 64);
        let storage = chunker.pending.as_ptr();
        let capacity = chunker.pending.capacity();
        let data = vec![0.25f32; 2 * 64 * 10 + 6];
        let mut emitted = 0;
        chunker.push_interleaved(&data, |b| {
            assert_eq!(b.len(), 64);
            emitted += 1;
        });
        assert_eq!(emitted, 10);
        assert_eq!(chunker.pending.len(), 3);
        assert_eq!(chunker.pending.capacity(), capacity);
        assert_eq!(chunker.pending.as_ptr(), storage);
    }

    #[test]
    fn chunked_samples_reach_the_stream_buffer() {
        let sink = StreamBuffer::new(4, 0.6);
        let mut chunker = BlockChunker::new(1, 3);
        chunker.push_interleaved(&[0.1f32, 0.2, 0.3, 0.4], |b| {
            sink.try_push_samples(b);
        });
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.pop_oldest().unwrap().samples(), &[0.1, 0.2, 0.3]);
    }
}
