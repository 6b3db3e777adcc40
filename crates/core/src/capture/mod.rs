use std::collections::VecDeque;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

use crate::config::CaptureConfig;
use crate::{DuelError, Result};

/// Provider of sample blocks for the analysis cycle.
///
/// `read_block` fills `out` with up to `out.len()` samples and returns how
/// many were delivered. Zero samples (or an error) is treated upstream as
/// silence — the loop never stops over a bad read.
pub trait CaptureSource: Send {
    fn sample_rate(&self) -> u32;
    fn read_block(&mut self, out: &mut [f32]) -> Result<usize>;
}

/// Source that never produces audio. Used when no input device is available
/// so the engine can still run with zero-valued analyses.
#[derive(Debug)]
pub struct NullSource {
    sample_rate: u32,
}

impl NullSource {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl CaptureSource for NullSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_block(&mut self, _out: &mut [f32]) -> Result<usize> {
        Ok(0)
    }
}

/// Deterministic source that plays back prepared blocks in order, then goes
/// silent. Drives simulated battles and tests.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    sample_rate: u32,
    blocks: VecDeque<Vec<f32>>,
}

impl ScriptedSource {
    pub fn new(sample_rate: u32, blocks: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            blocks: blocks.into(),
        }
    }

    pub fn push_block(&mut self, block: Vec<f32>) {
        self.blocks.push_back(block);
    }

    pub fn remaining(&self) -> usize {
        self.blocks.len()
    }
}

impl CaptureSource for ScriptedSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_block(&mut self, out: &mut [f32]) -> Result<usize> {
        let Some(block) = self.blocks.pop_front() else {
            return Ok(0);
        };
        let count = block.len().min(out.len());
        out[..count].copy_from_slice(&block[..count]);
        Ok(count)
    }
}

/// Microphone capture backed by cpal.
///
/// cpal streams are not `Send`, so the stream lives on a dedicated thread
/// that forwards mixed-down mono blocks over a bounded channel; when the
/// channel is full the oldest audio is simply lost, which is fine for a
/// loudness estimate. Dropping the source shuts the thread down and releases
/// the device.
pub struct CpalSource {
    sample_rate: u32,
    blocks: Receiver<Vec<f32>>,
    pending: VecDeque<f32>,
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl CpalSource {
    /// Opens the default input device. The device's own sample rate wins over
    /// the requested one; callers should read it back via `sample_rate`.
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        let (block_tx, block_rx) = bounded::<Vec<f32>>(32);
        let (ready_tx, ready_rx) = bounded::<Result<u32>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let worker = std::thread::Builder::new()
            .name("duel-capture".to_string())
            .spawn(move || capture_worker(block_tx, ready_tx, shutdown_rx))
            .map_err(|err| DuelError::CaptureUnavailable(err.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => Ok(Self {
                sample_rate,
                blocks: block_rx,
                pending: VecDeque::new(),
                shutdown: Some(shutdown_tx),
                worker: Some(worker),
            }),
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(_) => {
                let _ = worker.join();
                Err(DuelError::CaptureUnavailable(
                    "capture thread exited before opening the device".to_string(),
                ))
            }
        }
        .map(|source| {
            tracing::info!(sample_rate = config.sample_rate, "capture source opened");
            source
        })
    }
}

impl CaptureSource for CpalSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_block(&mut self, out: &mut [f32]) -> Result<usize> {
        loop {
            match self.blocks.try_recv() {
                Ok(block) => self.pending.extend(block),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(DuelError::CaptureUnavailable(
                        "capture stream has stopped".to_string(),
                    ))
                }
            }
        }

        let count = self.pending.len().min(out.len());
        for slot in out.iter_mut().take(count) {
            // The loop bound above guarantees the pop succeeds.
            *slot = self.pending.pop_front().unwrap_or(0.0);
        }
        Ok(count)
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for CpalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalSource")
            .field("sample_rate", &self.sample_rate)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Owns the cpal stream for its whole lifetime. Reports the opened sample
/// rate (or the open error) once, then parks until the shutdown sender is
/// dropped.
fn capture_worker(
    blocks: Sender<Vec<f32>>,
    ready: Sender<Result<u32>>,
    shutdown: Receiver<()>,
) {
    let opened = open_stream(blocks);
    let stream = match opened {
        Ok((stream, sample_rate)) => {
            let _ = ready.send(Ok(sample_rate));
            stream
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    // Blocks until every shutdown sender is gone.
    let _ = shutdown.recv();
    drop(stream);
    tracing::debug!("capture thread shut down");
}

fn open_stream(blocks: Sender<Vec<f32>>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| DuelError::CaptureUnavailable("no input device".to_string()))?;
    let supported = device
        .default_input_config()
        .map_err(|err| DuelError::CaptureUnavailable(err.to_string()))?;

    let sample_format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.into();
    let sample_rate = stream_config.sample_rate.0;
    let channels = stream_config.channels as usize;

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, channels, blocks)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, channels, blocks)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, channels, blocks)?,
        other => {
            return Err(DuelError::CaptureUnavailable(format!(
                "unsupported sample format {other}"
            )))
        }
    };

    stream
        .play()
        .map_err(|err| DuelError::CaptureUnavailable(err.to_string()))?;

    Ok((stream, sample_rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    blocks: Sender<Vec<f32>>,
) -> Result<cpal::Stream>
where
    T: Sample + cpal::SizedSample,
    f32: FromSample<T>,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Mix interleaved frames down to mono before shipping them.
                let mono: Vec<f32> = data
                    .chunks(channels.max(1))
                    .map(|frame| {
                        let sum: f32 = frame.iter().map(|&s| s.to_sample::<f32>()).sum();
                        sum / frame.len() as f32
                    })
                    .collect();
                // try_send: losing a block under pressure beats stalling the
                // audio callback.
                let _ = blocks.try_send(mono);
            },
            |err| tracing::warn!(error = %err, "capture stream error"),
            None,
        )
        .map_err(|err| DuelError::CaptureUnavailable(err.to_string()))?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_source_yields_empty_blocks() {
        let mut source = NullSource::new(48_000);
        let mut out = vec![1.0_f32; 16];
        assert_eq!(source.read_block(&mut out).unwrap(), 0);
    }

    #[test]
    fn scripted_source_plays_blocks_in_order() {
        let mut source = ScriptedSource::new(48_000, vec![vec![0.1; 4], vec![0.2; 4]]);
        let mut out = vec![0.0_f32; 8];

        let n = source.read_block(&mut out).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&out[..4], &[0.1; 4]);

        let n = source.read_block(&mut out).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&out[..4], &[0.2; 4]);

        // Exhausted: silence from here on.
        assert_eq!(source.read_block(&mut out).unwrap(), 0);
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn scripted_source_truncates_to_the_buffer() {
        let mut source = ScriptedSource::new(48_000, vec![vec![0.5; 10]]);
        let mut out = vec![0.0_f32; 4];
        assert_eq!(source.read_block(&mut out).unwrap(), 4);
    }
}
