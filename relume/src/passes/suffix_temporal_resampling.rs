use glam::{UVec2, Vec2};
use relume_gpu::{
    Mis, PrefixVertex, Reservoir, SuffixReservoir, WhiteNoise,
};

use crate::passes::{pass_seed, reproject, SALT_TEMPORAL};
use crate::{
    Device, Handle, Image2d, Options, ReservoirBuffer, RetraceWorkload,
    INVALID_ID,
};

/// Merges the previous frame's suffix reservoir, shifted onto this
/// frame's prefix, into the freshly traced one.
#[derive(Debug)]
pub struct SuffixTemporalResamplingPass {
    pub(crate) kernel: Handle,
}

impl SuffixTemporalResamplingPass {
    /// Resolves the reprojected history pixel for every pixel.
    pub fn pick(
        &self,
        device: &Device,
        motion: &Image2d<Vec2>,
        picked: &mut [u32],
    ) {
        let dim = motion.size();

        device.for_each(picked, |id, pick| {
            let pixel = UVec2::new(id as u32 % dim.x, id as u32 / dim.x);
            let prev = reproject(pixel, motion.get(pixel));

            *pick = if motion.contains(prev) {
                prev.y as u32 * dim.x + prev.x as u32
            } else {
                INVALID_ID
            };
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        device: &Device,
        options: &Options,
        seed: u32,
        picked: &[u32],
        workload: &RetraceWorkload,
        vertices: &Image2d<PrefixVertex>,
        prev_vertices: &Image2d<PrefixVertex>,
        curr: &mut ReservoirBuffer,
        prev: &ReservoirBuffer,
    ) {
        let seed = pass_seed(seed, SALT_TEMPORAL);
        let layout = options.layout;
        let stride = SuffixReservoir::stride(layout);
        let history = options.subpath.temporal_history_length;
        let dim = vertices.size();
        let pixels = vertices.len();

        device.for_each_chunk(curr.data_mut(), stride, |id, quads| {
            if id >= pixels {
                return;
            }

            let vertex = vertices.at(id);

            if !vertex.is_some() {
                return;
            }

            let neighbor = picked[id];

            if neighbor == INVALID_ID {
                return;
            }

            let Some(fwd) = workload.record(id, 0) else {
                return;
            };

            let mut history_res = SuffixReservoir::read(
                prev.data(),
                neighbor as usize,
                layout,
            );

            if history_res.is_empty() {
                return;
            }

            history_res.reservoir.clamp_m(history);

            let canon = SuffixReservoir::read(quads, 0, layout);
            let prev_vertex = prev_vertices.at(neighbor as usize);

            let pixel = UVec2::new(id as u32 % dim.x, id as u32 / dim.x);
            let mut wnoise = WhiteNoise::new(seed, pixel);

            let lhs_pdf = canon.reservoir.sample.target_pdf(&vertex);

            let mis = Mis {
                lhs_m: canon.reservoir.m,
                rhs_m: history_res.reservoir.m,
                rhs_jacobian: fwd.jacobian,
                lhs_lhs_pdf: lhs_pdf,
                lhs_rhs_pdf: workload
                    .record(id, 1)
                    .map(|rev| rev.dst_pdf * rev.jacobian)
                    .unwrap_or(0.0),
                rhs_lhs_pdf: fwd.dst_pdf,
                rhs_rhs_pdf: history_res
                    .reservoir
                    .sample
                    .target_pdf(&prev_vertex),
            }
            .eval();

            let mut out = Reservoir::default();
            let mut out_pdf = 0.0;

            if out.merge(
                &mut wnoise,
                &canon.reservoir,
                mis.lhs_mis * lhs_pdf * canon.reservoir.w,
            ) {
                out_pdf = lhs_pdf;
            }

            let candidate = Reservoir {
                sample: fwd.sample,
                m: history_res.reservoir.m,
                w: history_res.reservoir.w,
            };

            if out.merge(
                &mut wnoise,
                &candidate,
                mis.rhs_mis * fwd.dst_pdf * candidate.w * fwd.jacobian,
            ) {
                out_pdf = fwd.dst_pdf;
            }

            out.normalize_mis(out_pdf);

            SuffixReservoir { reservoir: out }.write(quads, 0, layout);
        });
    }
}
