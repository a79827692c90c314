/*!
    Audio output through the default system device.
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use parking_lot::Mutex;
use ringbuf::{
    HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};

use super::device::{AudioDevice, AudioOutput};
use crate::error::DeviceError;

/// Time without any progress before a write gives up on the device.
const STALL_TIMEOUT: Duration = Duration::from_secs(1);
const WRITE_POLL: Duration = Duration::from_millis(2);
/// Smallest ring buffer we hand to the device, in frames.
const MIN_RING_FRAMES: usize = 2048;

/**
    Opens the host's default output device.
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct CpalOutput;

/**
    State shared between the device handle and the stream callback.
*/
#[derive(Default)]
struct Shared {
    paused: AtomicBool,
    flush: AtomicBool,
    error: Mutex<Option<String>>,
}

impl AudioOutput for CpalOutput {
    fn configure(
        &self,
        sample_rate: u32,
        channels: u16,
        buffer: Duration,
    ) -> Result<Box<dyn AudioDevice>, DeviceError> {
        let shared = Arc::new(Shared::default());
        let (ready_tx, ready_rx) = mpsc::channel();
        let (keep_alive, alive_rx) = mpsc::channel::<()>();

        // Streams are not Send on every platform, so one thread owns it for its lifetime
        let thread_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("vidplay-cpal".to_string())
            .spawn(move || match open_stream(buffer, thread_shared) {
                Ok((stream, opened)) => {
                    if ready_tx.send(Ok(opened)).is_ok() {
                        // Returns once the device handle is dropped
                        let _ = alive_rx.recv();
                    }
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| DeviceError::Stream(e.to_string()))?;

        let opened = ready_rx
            .recv()
            .map_err(|_| DeviceError::Stream("audio thread exited during setup".to_string()))??;

        tracing::info!(
            requested_rate = sample_rate,
            requested_channels = channels,
            rate = opened.sample_rate,
            channels = opened.channels,
            "opened audio output"
        );

        Ok(Box::new(CpalDevice {
            producer: opened.producer,
            buffer_frames: opened.frames,
            sample_rate: opened.sample_rate,
            channels: opened.channels,
            shared,
            _keep_alive: keep_alive,
        }))
    }
}

struct OpenedStream {
    producer: HeapProd<f32>,
    frames: usize,
    sample_rate: u32,
    channels: u16,
}

fn open_stream(
    buffer: Duration,
    shared: Arc<Shared>,
) -> Result<(cpal::Stream, OpenedStream), DeviceError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(DeviceError::NoDevice)?;
    let supported = device
        .default_output_config()
        .map_err(|e| DeviceError::Unsupported(e.to_string()))?;

    let sample_format = supported.sample_format();
    let config = supported.config();
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;

    let frames = ((buffer.as_secs_f64() * sample_rate as f64) as usize).max(MIN_RING_FRAMES);
    let (producer, consumer) = HeapRb::<f32>::new(frames * channels as usize).split();

    let stream = match sample_format {
        SampleFormat::I8 => build_stream::<i8>(&device, &config, consumer, shared),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, consumer, shared),
        SampleFormat::I32 => build_stream::<i32>(&device, &config, consumer, shared),
        SampleFormat::I64 => build_stream::<i64>(&device, &config, consumer, shared),
        SampleFormat::U8 => build_stream::<u8>(&device, &config, consumer, shared),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, consumer, shared),
        SampleFormat::U32 => build_stream::<u32>(&device, &config, consumer, shared),
        SampleFormat::U64 => build_stream::<u64>(&device, &config, consumer, shared),
        SampleFormat::F32 => build_stream::<f32>(&device, &config, consumer, shared),
        SampleFormat::F64 => build_stream::<f64>(&device, &config, consumer, shared),
        other => Err(DeviceError::Unsupported(format!("sample format {other:?}"))),
    }?;
    stream
        .play()
        .map_err(|e| DeviceError::Stream(e.to_string()))?;

    Ok((
        stream,
        OpenedStream {
            producer,
            frames,
            sample_rate,
            channels,
        },
    ))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: ringbuf::HeapCons<f32>,
    shared: Arc<Shared>,
) -> Result<cpal::Stream, DeviceError>
where
    T: SizedSample + FromSample<f32>,
{
    let error_slot = Arc::clone(&shared);
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if shared.flush.swap(false, Ordering::AcqRel) {
                    consumer.clear();
                }
                let silence = T::from_sample(0.0f32);
                if shared.paused.load(Ordering::Acquire) {
                    data.fill(silence);
                    return;
                }
                for sample in data.iter_mut() {
                    *sample = consumer.try_pop().map_or(silence, T::from_sample);
                }
            },
            move |err| {
                tracing::error!("audio stream error: {err}");
                *error_slot.error.lock() = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| DeviceError::Unsupported(e.to_string()))
}

struct CpalDevice {
    producer: HeapProd<f32>,
    buffer_frames: usize,
    sample_rate: u32,
    channels: u16,
    shared: Arc<Shared>,
    _keep_alive: mpsc::Sender<()>,
}

impl AudioDevice for CpalDevice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn min_buffer_size(&self) -> usize {
        self.buffer_frames
    }

    fn write(&mut self, samples: &[f32]) -> Result<(), DeviceError> {
        // A pending flush would also discard what we are about to write
        let flush_started = Instant::now();
        while self.shared.flush.load(Ordering::Acquire) && flush_started.elapsed() < STALL_TIMEOUT {
            thread::sleep(WRITE_POLL);
        }

        let mut remaining = samples;
        let mut last_progress = Instant::now();
        while !remaining.is_empty() {
            if let Some(err) = self.shared.error.lock().take() {
                return Err(DeviceError::Stream(err));
            }
            let pushed = self.producer.push_slice(remaining);
            if pushed > 0 {
                remaining = &remaining[pushed..];
                last_progress = Instant::now();
                continue;
            }
            if !self.shared.paused.load(Ordering::Acquire) && last_progress.elapsed() > STALL_TIMEOUT {
                return Err(DeviceError::Stalled);
            }
            thread::sleep(WRITE_POLL);
        }
        Ok(())
    }

    fn queued(&self) -> Duration {
        let frames = self.producer.occupied_len() / self.channels.max(1) as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
    }

    fn pause(&mut self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    fn resume(&mut self) {
        self.shared.paused.store(false, Ordering::Release);
    }

    fn flush(&mut self) {
        self.shared.flush.store(true, Ordering::Release);
    }
}
