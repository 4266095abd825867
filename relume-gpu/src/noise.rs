use core::f32::consts::PI;

use glam::{vec2, vec3, UVec2, Vec2, Vec3};

/// PCG-based white noise generator.
///
/// Cheap, stateful and replayable: suffix samples store the generator state
/// they were traced from, so a hybrid shift can re-run the exact same random
/// walk from another vertex.
#[derive(Clone, Copy)]
pub struct WhiteNoise {
    state: u32,
}

impl WhiteNoise {
    pub fn new(seed: u32, id: UVec2) -> Self {
        Self {
            state: seed ^ (48619 * id.x) ^ (95461 * id.y),
        }
    }

    /// Restores a generator from a previously captured [`Self::state()`].
    pub fn from_state(state: u32) -> Self {
        Self { state }
    }

    pub fn state(&self) -> u32 {
        self.state
    }

    /// Generates a uniform sample in range `<0.0, 1.0>`.
    pub fn sample(&mut self) -> f32 {
        (self.sample_int() as f32) / (u32::MAX as f32)
    }

    /// Generates a uniform sample in range `<0, u32::MAX>`.
    pub fn sample_int(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(747796405).wrapping_add(2891336453);

        let word = ((self.state >> ((self.state >> 28) + 4)) ^ self.state)
            .wrapping_mul(277803737);

        (word >> 22) ^ word
    }

    /// Generates a uniform sample on a circle.
    pub fn sample_circle(&mut self) -> Vec2 {
        let angle = self.sample() * PI * 2.0;

        vec2(angle.cos(), angle.sin())
    }

    /// Generates a uniform sample inside of a disk.
    pub fn sample_disk(&mut self) -> Vec2 {
        let radius = self.sample().sqrt();

        self.sample_circle() * radius
    }

    /// Generates a cosine-weighted sample on the hemisphere around given
    /// normal; the associated solid-angle pdf is `cos(theta) / PI`.
    pub fn sample_hemisphere(&mut self, normal: Vec3) -> Vec3 {
        let u = vec2(self.sample(), self.sample());

        let radius = (1.0f32 - u.x * u.x).sqrt();
        let angle = 2.0 * PI * u.y;

        let b = normal.cross(vec3(0.0, 1.0, 1.0)).normalize();
        let t = b.cross(normal);

        (radius * angle.sin() * b + u.x * normal + radius * angle.cos() * t)
            .normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_is_deterministic() {
        let mut noise = WhiteNoise::new(0xcafe, UVec2::new(3, 7));

        noise.sample();

        let state = noise.state();
        let expected = [noise.sample(), noise.sample(), noise.sample()];

        let mut replay = WhiteNoise::from_state(state);
        let got = [replay.sample(), replay.sample(), replay.sample()];

        assert_eq!(expected, got);
    }

    #[test]
    fn samples_are_uniformish() {
        let mut noise = WhiteNoise::new(1, UVec2::ZERO);
        let mut sum = 0.0;

        for _ in 0..10_000 {
            let value = noise.sample();

            assert!((0.0..=1.0).contains(&value));

            sum += value;
        }

        let mean = sum / 10_000.0;

        assert!((mean - 0.5).abs() < 0.02, "mean = {mean}");
    }
}
