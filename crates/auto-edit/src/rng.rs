//! Seeded linear-congruential generator.
//!
//! Not suitable for anything but reproducible shuffles.

/// 32-bit LCG with the Numerical Recipes constants.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u32,
}

const MULTIPLIER: u32 = 1_664_525;
const INCREMENT: u32 = 1_013_904_223;

impl Lcg {
    /// Seed the generator. Only the low 32 bits of `seed` are used.
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed as u32,
        }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(MULTIPLIER)
            .wrapping_add(INCREMENT);
        self.state
    }

    /// Uniform value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / (f64::from(u32::MAX) + 1.0)
    }

    /// In-place Fisher–Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = (self.next_f64() * (i + 1) as f64) as usize;
            items.swap(i, j.min(i));
        }
    }
}
