use glam::{ivec2, IVec2, Vec2};
use relume_gpu::WhiteNoise;

pub const NEIGHBOR_OFFSET_COUNT: usize = 8192;

/// Precomputed table of low-discrepancy offsets inside the unit disk,
/// quantized to `i8` pairs.
///
/// Built from the R2 sequence with rejection of points outside the disk;
/// spatial-reuse passes index it with a per-pixel random base so that
/// neighbour picks are well distributed without per-pick rejection loops.
#[derive(Clone, Debug)]
pub struct NeighborOffsets {
    offsets: Vec<[i8; 2]>,
}

impl NeighborOffsets {
    pub fn new() -> Self {
        const A1: f64 = 0.7548776662466927;
        const A2: f64 = 0.5698402909980532;

        let mut offsets = Vec::with_capacity(NEIGHBOR_OFFSET_COUNT);
        let mut u = 0.5f64;
        let mut v = 0.5f64;

        while offsets.len() < NEIGHBOR_OFFSET_COUNT {
            u = (u + A1) % 1.0;
            v = (v + A2) % 1.0;

            let x = u * 2.0 - 1.0;
            let y = v * 2.0 - 1.0;

            if x * x + y * y > 1.0 {
                continue;
            }

            offsets.push([(x * 127.0) as i8, (y * 127.0) as i8]);
        }

        Self { offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn get(&self, id: usize) -> IVec2 {
        let [x, y] = self.offsets[id % self.offsets.len()];

        ivec2(x as i32, y as i32)
    }

    /// Picks the next offset for given generator, scaled to `radius`
    /// pixels.
    pub fn sample(&self, wnoise: &mut WhiteNoise, radius: f32) -> IVec2 {
        let id = wnoise.sample_int() as usize % self.offsets.len();
        let offset = self.get(id).as_vec2() / 127.0 * radius;

        Vec2::round(offset).as_ivec2()
    }
}

impl Default for NeighborOffsets {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_full_and_in_disk() {
        let offsets = NeighborOffsets::new();

        assert_eq!(offsets.len(), NEIGHBOR_OFFSET_COUNT);

        for id in 0..offsets.len() {
            let offset = offsets.get(id);
            let r2 = offset.x * offset.x + offset.y * offset.y;

            assert!(r2 <= 127 * 127, "offset {id} escapes the disk: {offset}");
        }
    }

    #[test]
    fn samples_stay_within_radius() {
        let offsets = NeighborOffsets::new();
        let mut wnoise = WhiteNoise::new(0xcafe, glam::UVec2::new(7, 3));

        for _ in 0..1000 {
            let offset = offsets.sample(&mut wnoise, 16.0);

            assert!(offset.x.abs() <= 17 && offset.y.abs() <= 17);
        }
    }
}
