/*!
    Sample conversion helpers for the audio sink.
*/

use media_types::SampleFormat;

/**
    Convert raw interleaved samples to f32 in [-1.0, 1.0].

    Returns `None` for sample formats this crate does not know about.
*/
pub fn to_f32(format: SampleFormat, data: &[u8]) -> Option<Vec<f32>> {
    let samples = match format {
        SampleFormat::F32 => data
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect(),
        SampleFormat::F64 => data
            .chunks_exact(8)
            .map(|c| bytemuck::pod_read_unaligned::<f64>(c) as f32)
            .collect(),
        SampleFormat::S16 => data
            .chunks_exact(2)
            .map(|c| bytemuck::pod_read_unaligned::<i16>(c) as f32 / 32768.0)
            .collect(),
        SampleFormat::S32 => data
            .chunks_exact(4)
            .map(|c| bytemuck::pod_read_unaligned::<i32>(c) as f32 / 2_147_483_648.0)
            .collect(),
        SampleFormat::U8 => data.iter().map(|&b| (b as f32 - 128.0) / 128.0).collect(),
        _ => return None,
    };
    Some(samples)
}

/**
    Change the channel count of interleaved samples.

    Mono is duplicated into every output channel, anything to mono is
    averaged, and other layouts keep the channels they share and fill the
    rest by wrapping around the source channels.
*/
pub fn remix(samples: Vec<f32>, from: u16, to: u16) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples;
    }
    let (from, to) = (from as usize, to as usize);
    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);

    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            out.extend((0..to).map(|c| frame[c % from]));
        }
    }
    out
}

pub fn apply_volume(samples: &mut [f32], volume: f32) {
    if volume == 1.0 {
        return;
    }
    for sample in samples {
        *sample *= volume;
    }
}

/**
    Streaming linear-interpolation resampler.

    `step` is the number of input frames consumed per output frame, so a
    step of 2.0 halves the frame count and plays the audio twice as fast.
    The last input frame is carried into the next call so batches join
    without clicks.
*/
#[derive(Debug, Default)]
pub struct Resampler {
    channels: usize,
    /// Read position, relative to the carried frame (or the first input frame).
    pos: f64,
    carry: Vec<f32>,
}

impl Resampler {
    pub fn new(channels: u16) -> Self {
        Self {
            channels: channels.max(1) as usize,
            pos: 0.0,
            carry: Vec::new(),
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels as u16
    }

    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.carry.clear();
    }

    pub fn process(&mut self, input: &[f32], step: f64) -> Vec<f32> {
        let ch = self.channels;
        let frames = input.len() / ch;
        if frames == 0 || !(step.is_finite() && step > 0.0) {
            return Vec::new();
        }

        let offset = usize::from(!self.carry.is_empty());
        let total = frames + offset;
        let carry = &self.carry;
        let at = |i: usize, c: usize| {
            if i < offset {
                carry[c]
            } else {
                input[(i - offset) * ch + c]
            }
        };

        let mut out = Vec::with_capacity(((total as f64 / step) as usize + 1) * ch);
        while self.pos + 1.0 < total as f64 {
            let i = self.pos as usize;
            let frac = (self.pos - i as f64) as f32;
            for c in 0..ch {
                let a = at(i, c);
                let b = at(i + 1, c);
                out.push(a + (b - a) * frac);
            }
            self.pos += step;
        }

        self.pos -= (total - 1) as f64;
        self.carry = input[(frames - 1) * ch..frames * ch].to_vec();
        out
    }
}
