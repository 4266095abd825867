use relume_gpu::{
    trace_suffix, PrefixVertex, SceneView, SuffixReservoir, WhiteNoise,
};

use crate::{Device, Handle, Image2d, Options, ReservoirBuffer};

/// Traces one fresh suffix per pixel at the given prefix endpoints and
/// turns it into an initial one-candidate reservoir.
///
/// The suffix generator chains off the prefix's stored state, so the same
/// prefix always grows the same canonical suffix.
#[derive(Debug)]
pub struct TraceNewSuffixesPass {
    pub(crate) kernel: Handle,
}

impl TraceNewSuffixesPass {
    pub fn run(
        &self,
        device: &Device,
        scene: &dyn SceneView,
        options: &Options,
        vertices: &Image2d<PrefixVertex>,
        reservoirs: &mut ReservoirBuffer,
    ) {
        let layout = options.layout;
        let stride = SuffixReservoir::stride(layout);
        let max_bounces = options.max_suffix_bounces;
        let pixels = vertices.len();

        device.for_each_chunk(reservoirs.data_mut(), stride, |id, quads| {
            if id >= pixels {
                return;
            }

            let vertex = vertices.at(id);
            let mut out = SuffixReservoir::default();

            if vertex.is_some() {
                let mut wnoise = WhiteNoise::from_state(vertex.rng);

                let traced =
                    trace_suffix(scene, &vertex, &mut wnoise, max_bounces);

                let target = traced.sample.target_pdf(&vertex);

                if traced.pdf > 0.0 && target > 0.0 {
                    out.reservoir.update(
                        &mut wnoise,
                        traced.sample,
                        target / traced.pdf,
                    );

                    out.reservoir.normalize(target);
                } else {
                    // Keep the confidence of the attempt even when it came
                    // back black.
                    out.reservoir.m = 1.0;
                }
            }

            out.write(quads, 0, layout);
        });
    }
}
