use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/**
    Lock-free f32 cell, stored as its bit pattern.

    Used for values the audio path reads on every batch, such as volume.
*/
#[derive(Debug)]
pub struct AtomicF32 {
    inner: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            inner: AtomicU32::new(value.to_bits()),
        }
    }

    pub fn load(&self, ordering: Ordering) -> f32 {
        f32::from_bits(self.inner.load(ordering))
    }

    pub fn store(&self, value: f32, ordering: Ordering) {
        self.inner.store(value.to_bits(), ordering);
    }
}

/**
    Lock-free f64 cell, stored as its bit pattern.
*/
#[derive(Debug)]
pub struct AtomicF64 {
    inner: AtomicU64,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            inner: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn load(&self, ordering: Ordering) -> f64 {
        f64::from_bits(self.inner.load(ordering))
    }

    pub fn store(&self, value: f64, ordering: Ordering) {
        self.inner.store(value.to_bits(), ordering);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bit_patterns() {
        let volume = AtomicF32::new(0.25);
        assert_eq!(volume.load(Ordering::Relaxed), 0.25);
        volume.store(-0.0, Ordering::Relaxed);
        assert!(volume.load(Ordering::Relaxed).is_sign_negative());

        let speed = AtomicF64::new(1.0);
        speed.store(1.5, Ordering::Release);
        assert_eq!(speed.load(Ordering::Acquire), 1.5);
    }
}
