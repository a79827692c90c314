use std::thread;
use std::time::{Duration, Instant};

use crate::error::DeviceError;

/**
    A source of audio output devices.

    Implementations open a device for a given stream layout. The device
    may settle on a different sample rate or channel count than requested;
    the audio sink converts to whatever the device reports.
*/
pub trait AudioOutput: Send + Sync {
    fn configure(
        &self,
        sample_rate: u32,
        channels: u16,
        buffer: Duration,
    ) -> Result<Box<dyn AudioDevice>, DeviceError>;
}

/**
    An opened audio output.

    Only the audio sink thread talks to a device once playback starts,
    so implementations need `Send` but not `Sync`.
*/
pub trait AudioDevice: Send {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Samples per channel the device keeps queued ahead of playback.
    fn min_buffer_size(&self) -> usize;

    /**
        Hand interleaved f32 samples to the device, blocking until they
        have been accepted. A device buffers at most its configured buffer
        length ahead of what is audible.
    */
    fn write(&mut self, samples: &[f32]) -> Result<(), DeviceError>;

    /**
        Length of the audio written but not yet audible, at the device's
        own rate. Stays constant while paused.
    */
    fn queued(&self) -> Duration;

    fn pause(&mut self);

    fn resume(&mut self);

    /// Discard everything buffered but not yet played.
    fn flush(&mut self);
}

/**
    Output that discards samples in real time.

    Used when no audio device is available or the real one fails, so the
    audio clock still advances at the pace a listener would hear.
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct NullOutput;

impl NullOutput {
    pub fn device(sample_rate: u32, channels: u16, buffer: Duration) -> Box<dyn AudioDevice> {
        Box::new(NullDevice {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            buffer,
            deadline: None,
            paused_lead: None,
        })
    }
}

impl AudioOutput for NullOutput {
    fn configure(
        &self,
        sample_rate: u32,
        channels: u16,
        buffer: Duration,
    ) -> Result<Box<dyn AudioDevice>, DeviceError> {
        if sample_rate == 0 || channels == 0 {
            return Err(DeviceError::Unsupported(format!(
                "{sample_rate} Hz with {channels} channels"
            )));
        }
        Ok(Self::device(sample_rate, channels, buffer))
    }
}

struct NullDevice {
    sample_rate: u32,
    channels: u16,
    buffer: Duration,
    /// Wall time at which everything written so far has been "played".
    deadline: Option<Instant>,
    /// Unplayed lead remembered across a pause.
    paused_lead: Option<Duration>,
}

impl AudioDevice for NullDevice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn min_buffer_size(&self) -> usize {
        (self.buffer.as_secs_f64() * self.sample_rate as f64) as usize
    }

    fn write(&mut self, samples: &[f32]) -> Result<(), DeviceError> {
        let frames = samples.len() / self.channels as usize;
        let length = Duration::from_secs_f64(frames as f64 / self.sample_rate as f64);

        let now = Instant::now();
        let start = self.deadline.map_or(now, |d| d.max(now));
        let deadline = start + length;
        self.deadline = Some(deadline);

        let lead = deadline.saturating_duration_since(now);
        if lead > self.buffer {
            thread::sleep(lead - self.buffer);
        }
        Ok(())
    }

    fn queued(&self) -> Duration {
        match (self.paused_lead, self.deadline) {
            (Some(lead), _) => lead,
            (None, Some(deadline)) => deadline.saturating_duration_since(Instant::now()),
            (None, None) => Duration::ZERO,
        }
    }

    fn pause(&mut self) {
        if self.paused_lead.is_none() {
            self.paused_lead = Some(
                self.deadline
                    .map_or(Duration::ZERO, |d| d.saturating_duration_since(Instant::now())),
            );
        }
    }

    fn resume(&mut self) {
        if let Some(lead) = self.paused_lead.take() {
            self.deadline = Some(Instant::now() + lead);
        }
    }

    fn flush(&mut self) {
        self.deadline = None;
        self.paused_lead = None;
    }
}
