use glam::{UVec2, Vec2};
use relume_gpu::{
    trace_prefix, Camera, PrefixReservoir, PrefixVertex, SceneView,
    WhiteNoise,
};

use crate::passes::{pass_seed, reproject, SALT_PREFIX};
use crate::{Device, Handle, Image2d, Options, ReservoirBuffer};

/// Traces this frame's canonical prefixes and temporally resamples them
/// against the previous frame's prefix reservoirs.
///
/// Outputs both the packed reservoirs and the plain prefix g-buffer the
/// suffix passes consume.
#[derive(Debug)]
pub struct PrefixResamplingPass {
    pub(crate) kernel: Handle,
}

impl PrefixResamplingPass {
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        device: &Device,
        scene: &dyn SceneView,
        camera: &Camera,
        options: &Options,
        seed: u32,
        skip_temporal: bool,
        motion: &Image2d<Vec2>,
        vertices: &mut Image2d<PrefixVertex>,
        reservoirs: &mut ReservoirBuffer,
        prev_reservoirs: &ReservoirBuffer,
    ) {
        let seed = pass_seed(seed, SALT_PREFIX);
        let dim = vertices.size();
        let history = options.subpath.temporal_history_length;
        let min_len = options.minimum_prefix_length;

        device.for_each_zip(
            reservoirs.data_mut(),
            PrefixReservoir::STRIDE,
            vertices.data_mut(),
            1,
            |id, quads, vertex| {
                let pixel = UVec2::new(id as u32 % dim.x, id as u32 / dim.x);
                let mut wnoise = WhiteNoise::new(seed, pixel);

                let fresh =
                    trace_prefix(scene, camera, pixel, &mut wnoise, min_len);

                let mut res = PrefixReservoir::default();

                res.reservoir.update(&mut wnoise, fresh, fresh.target_pdf());
                res.reservoir.normalize(fresh.target_pdf());

                if !skip_temporal && fresh.is_some() {
                    let prev_pixel = reproject(pixel, motion.get(pixel));

                    if motion.contains(prev_pixel) {
                        let prev = PrefixReservoir::read(
                            prev_reservoirs.data(),
                            (prev_pixel.y as u32 * dim.x
                                + prev_pixel.x as u32)
                                as usize,
                        );

                        if !prev.is_empty() {
                            res.merge_temporal(&mut wnoise, &prev, history);
                        }
                    }
                }

                res.write(quads, 0);
                vertex[0] = res.reservoir.sample;
            },
        );
    }
}
