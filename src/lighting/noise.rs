//! Deterministic value noise for light flicker

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

const TABLE_SIZE: usize = 256;

/// Seeded 2D value noise in [0, 1]
///
/// The lattice is built once from a `Pcg32` stream, so two instances with
/// the same seed produce identical flicker.
#[derive(Debug, Clone)]
pub struct FlickerNoise {
    perm: [u8; TABLE_SIZE],
    values: [f32; TABLE_SIZE],
}

impl FlickerNoise {
    pub fn new(seed: u64) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let mut perm = [0u8; TABLE_SIZE];
        for (i, p) in perm.iter_mut().enumerate() {
            *p = i as u8;
        }
        perm.shuffle(&mut rng);

        let mut values = [0.0f32; TABLE_SIZE];
        for v in values.iter_mut() {
            *v = rng.random::<f32>();
        }

        Self { perm, values }
    }

    #[inline]
    fn lattice(&self, x: i32, y: i32) -> f32 {
        let xi = (x & 0xff) as usize;
        let yi = (y & 0xff) as usize;
        let h = self.perm[(self.perm[xi] as usize + yi) & 0xff];
        self.values[h as usize]
    }

    /// Sample the noise field, smoothly interpolated between lattice points
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let (x0, y0) = (x.floor(), y.floor());
        let (tx, ty) = (smoothstep(x - x0), smoothstep(y - y0));
        let (xi, yi) = (x0 as i32, y0 as i32);

        let a = self.lattice(xi, yi);
        let b = self.lattice(xi + 1, yi);
        let c = self.lattice(xi, yi + 1);
        let d = self.lattice(xi + 1, yi + 1);

        let top = a + (b - a) * tx;
        let bottom = c + (d - c) * tx;
        (top + (bottom - top) * ty).clamp(0.0, 1.0)
    }
}

impl Default for FlickerNoise {
    fn default() -> Self {
        Self::new(0)
    }
}

#[inline]
fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}
