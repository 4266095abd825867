use glam::UVec2;
use relume_gpu::{trace_prefix, Camera, PrefixVertex, SceneView, WhiteNoise};

use crate::passes::{pass_seed, SALT_GATHER};
use crate::{Device, Handle, Image2d, Options};

/// Traces the extra integration prefixes the final gather averages over;
/// integration prefix zero borrows the canonical g-buffer instead.
#[derive(Debug)]
pub struct TraceNewPrefixesPass {
    pub(crate) kernel: Handle,
}

impl TraceNewPrefixesPass {
    pub fn run(
        &self,
        device: &Device,
        scene: &dyn SceneView,
        camera: &Camera,
        options: &Options,
        seed: u32,
        integration_prefix: u32,
        out: &mut Image2d<PrefixVertex>,
    ) {
        debug_assert!(integration_prefix > 0);

        let seed = pass_seed(seed, SALT_GATHER + integration_prefix);
        let dim = out.size();
        let min_len = options.minimum_prefix_length;

        device.for_each(out.data_mut(), |id, vertex| {
            let pixel = UVec2::new(id as u32 % dim.x, id as u32 / dim.x);
            let mut wnoise = WhiteNoise::new(seed, pixel);

            *vertex = trace_prefix(scene, camera, pixel, &mut wnoise, min_len);
        });
    }
}
