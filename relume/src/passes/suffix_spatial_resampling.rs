use glam::UVec2;
use relume_gpu::{
    Mis, PrefixVertex, Reservoir, SuffixReservoir, WhiteNoise,
};

use crate::passes::{pass_seed, SALT_PICK, SALT_SPATIAL};
use crate::{
    Device, Handle, Image2d, NeighborOffsets, Options, ReservoirBuffer,
    RetraceWorkload, INVALID_ID,
};

/// One spatial reuse round: every pixel merges the shifted suffixes of a
/// few nearby pixels into its own reservoir, with defensive pairwise MIS
/// anchored at the canonical sample.
#[derive(Debug)]
pub struct SuffixSpatialResamplingPass {
    pub(crate) kernel: Handle,
}

impl SuffixSpatialResamplingPass {
    /// Picks this round's neighbour pixels from the offset table.
    #[allow(clippy::too_many_arguments)]
    pub fn pick(
        &self,
        device: &Device,
        options: &Options,
        seed: u32,
        round: u32,
        offsets: &NeighborOffsets,
        dim: UVec2,
        picked: &mut [u32],
    ) {
        let seed = pass_seed(seed, SALT_PICK + round);
        let k = options.subpath.suffix_spatial_neighbor_count as usize;
        let radius = options.subpath.suffix_spatial_reuse_radius;

        device.for_each_chunk(picked, k, |id, picks| {
            let pixel = UVec2::new(id as u32 % dim.x, id as u32 / dim.x);
            let mut wnoise = WhiteNoise::new(seed, pixel);

            for pick in picks {
                let neighbor =
                    pixel.as_ivec2() + offsets.sample(&mut wnoise, radius);

                let in_bounds = neighbor.x >= 0
                    && neighbor.y >= 0
                    && (neighbor.x as u32) < dim.x
                    && (neighbor.y as u32) < dim.y;

                *pick = if in_bounds && neighbor != pixel.as_ivec2() {
                    neighbor.y as u32 * dim.x + neighbor.x as u32
                } else {
                    INVALID_ID
                };
            }
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        device: &Device,
        options: &Options,
        seed: u32,
        round: u32,
        picked: &[u32],
        workload: &RetraceWorkload,
        vertices: &Image2d<PrefixVertex>,
        curr: &mut ReservoirBuffer,
        prev: &ReservoirBuffer,
    ) {
        let seed = pass_seed(seed, SALT_SPATIAL + round);
        let layout = options.layout;
        let stride = SuffixReservoir::stride(layout);
        let k = options.subpath.suffix_spatial_neighbor_count as usize;
        let inv_k = 1.0 / k as f32;
        let multiplier = options.subpath.non_canonical_weight_multiplier;
        let dim = vertices.size();
        let pixels = vertices.len();

        device.for_each_chunk(curr.data_mut(), stride, |id, quads| {
            if id >= pixels {
                return;
            }

            let vertex = vertices.at(id);

            if !vertex.is_some() {
                SuffixReservoir::default().write(quads, 0, layout);
                return;
            }

            let canon = SuffixReservoir::read(prev.data(), id, layout);

            let pixel = UVec2::new(id as u32 % dim.x, id as u32 / dim.x);
            let mut wnoise = WhiteNoise::new(seed, pixel);

            let lhs_pdf = canon.reservoir.sample.target_pdf(&vertex);

            let mut out = Reservoir::default();
            let mut out_pdf = 0.0;
            let mut canonical_mis = 0.0;

            for j in 0..k {
                let neighbor = picked[id * k + j];

                let (Some(fwd), false) =
                    (workload.record(id, j * 2), neighbor == INVALID_ID)
                else {
                    canonical_mis += inv_k;
                    continue;
                };

                let neigh = SuffixReservoir::read(
                    prev.data(),
                    neighbor as usize,
                    layout,
                );

                if neigh.is_empty() {
                    canonical_mis += inv_k;
                    continue;
                }

                let neigh_vertex = vertices.at(neighbor as usize);

                let mis = Mis {
                    lhs_m: canon.reservoir.m,
                    rhs_m: neigh.reservoir.m * multiplier,
                    rhs_jacobian: fwd.jacobian,
                    lhs_lhs_pdf: lhs_pdf,
                    lhs_rhs_pdf: workload
                        .record(id, j * 2 + 1)
                        .map(|rev| rev.dst_pdf * rev.jacobian)
                        .unwrap_or(0.0),
                    rhs_lhs_pdf: fwd.dst_pdf,
                    rhs_rhs_pdf: neigh
                        .reservoir
                        .sample
                        .target_pdf(&neigh_vertex),
                }
                .eval();

                canonical_mis += mis.lhs_mis * inv_k;

                let candidate = Reservoir {
                    sample: fwd.sample,
                    m: neigh.reservoir.m,
                    w: neigh.reservoir.w,
                };

                if out.merge(
                    &mut wnoise,
                    &candidate,
                    mis.rhs_mis
                        * inv_k
                        * fwd.dst_pdf
                        * candidate.w
                        * fwd.jacobian,
                ) {
                    out_pdf = fwd.dst_pdf;
                }
            }

            if out.merge(
                &mut wnoise,
                &canon.reservoir,
                canonical_mis * lhs_pdf * canon.reservoir.w,
            ) {
                out_pdf = lhs_pdf;
            }

            out.normalize_mis(out_pdf);

            SuffixReservoir { reservoir: out }.write(quads, 0, layout);
        });
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{uvec2, vec3, Vec3};
    use relume_gpu::{
        ReservoirLayout, SuffixSample, PREFIX_FLAG_VALID, SUFFIX_FLAG_HAS_RC,
    };

    use super::*;
    use crate::{
        DeviceDescriptor, KernelCache, KernelId, RetraceSchedule,
        SubpathSettings, WorkloadKind,
    };

    fn device() -> Device {
        Device::new(DeviceDescriptor {
            threads: Some(2),
            ..Default::default()
        })
        .unwrap()
    }

    fn options() -> Options {
        Options {
            layout: ReservoirLayout::Full,
            subpath: SubpathSettings {
                suffix_spatial_neighbor_count: 2,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn vertex(point: Vec3, albedo: f32) -> PrefixVertex {
        PrefixVertex {
            point,
            roughness: 1.0,
            normal: Vec3::Y,
            flags: PREFIX_FLAG_VALID,
            albedo: Vec3::splat(albedo),
            rng: 0,
            throughput: Vec3::ONE,
            bounces: 1,
        }
    }

    fn sample(rc_point: Vec3, radiance: Vec3) -> SuffixSample {
        SuffixSample {
            radiance,
            flags: SUFFIX_FLAG_HAS_RC,
            rc_point,
            rng: 0,
            rc_normal: -Vec3::Y,
            pad: 0,
        }
    }

    /// Runs one spatial round over a 2x2 frame with a fixed pick table and
    /// identity shifts (jacobian one, samples carried over verbatim), then
    /// reads the resampled reservoirs back.
    fn resample(
        vertices: &Image2d<PrefixVertex>,
        reservoirs: &[Reservoir<SuffixSample>],
        picked: &[u32],
    ) -> Vec<SuffixReservoir> {
        let device = device();
        let options = options();
        let layout = options.layout;
        let stride = SuffixReservoir::stride(layout);
        let pixels = vertices.len();

        let mut prev = ReservoirBuffer::new("prev");
        let mut curr = ReservoirBuffer::new("curr");

        prev.resize(pixels, stride);
        curr.resize(pixels, stride);

        for (id, reservoir) in reservoirs.iter().enumerate() {
            SuffixReservoir {
                reservoir: *reservoir,
            }
            .write(prev.data_mut(), id, layout);
        }

        let mut workload = RetraceWorkload::new();

        workload.produce(
            &device,
            pixels,
            WorkloadKind::Pairwise { neighbors: 2 },
            RetraceSchedule::Compact,
            |_, slots| slots.fill(1),
        );

        workload.retrace(&device, |entry, record| {
            let pixel = entry.pixel() as usize;
            let neighbor =
                picked[pixel * 2 + entry.slot() as usize] as usize;

            let (src, dst) = if entry.is_reverse() {
                (pixel, neighbor)
            } else {
                (neighbor, pixel)
            };

            record.sample = reservoirs[src].sample;
            record.dst_pdf =
                reservoirs[src].sample.target_pdf(&vertices.at(dst));
            record.jacobian = 1.0;
            record.valid = 1;
        });

        let mut cache = KernelCache::new();

        let pass = SuffixSpatialResamplingPass {
            kernel: cache
                .compile(KernelId::SuffixSpatialResampling, vec![]),
        };

        pass.run(
            &device, &options, 7, 0, picked, &workload, vertices, &mut curr,
            &prev,
        );

        (0..pixels)
            .map(|id| SuffixReservoir::read(curr.data(), id, layout))
            .collect()
    }

    /// When every pixel holds the exact same sample with unit contribution
    /// weight and all shifts are identities, the combined MIS weights must
    /// partition unity and the resampled weight must stay exactly one.
    #[test]
    fn symmetric_reuse_keeps_unit_contribution_weight() {
        let mut vertices = Image2d::new(uvec2(2, 2));

        vertices
            .data_mut()
            .fill(vertex(Vec3::ZERO, 0.5));

        let reservoirs = vec![
            Reservoir {
                sample: sample(vec3(0.0, 1.0, 0.0), Vec3::ONE),
                m: 1.0,
                w: 1.0,
            };
            4
        ];

        let picked = [1, 2, 0, 3, 3, 0, 2, 1];

        for (id, got) in
            resample(&vertices, &reservoirs, &picked).iter().enumerate()
        {
            assert_eq!(got.reservoir.m, 3.0, "pixel {id}");

            assert_relative_eq!(
                got.reservoir.w,
                1.0,
                max_relative = 1e-6,
            );
        }
    }

    /// A 2x2 frame with distinct diffuse vertices, distinct suffixes and a
    /// fixed pick table, checked against hand-computed pairwise weights.
    #[test]
    fn spatial_round_matches_hand_computed_weights() {
        let mut vertices = Image2d::new(uvec2(2, 2));

        for id in 0..4 {
            vertices.data_mut()[id] = vertex(
                vec3(id as f32, 0.0, 0.0),
                0.2 + 0.2 * id as f32,
            );
        }

        let reservoirs: Vec<_> = (0..4)
            .map(|id| Reservoir {
                sample: sample(
                    vec3(id as f32, 1.0, 0.0),
                    vec3(0.5 + 0.25 * id as f32, 0.25, 0.125),
                ),
                m: 1.0 + id as f32,
                w: 0.5 + 0.25 * id as f32,
            })
            .collect();

        // Pixel i reuses from pixels (i + 1) % 4 and (i + 3) % 4
        let picked: Vec<u32> = (0..4u32)
            .flat_map(|id| [(id + 1) % 4, (id + 3) % 4])
            .collect();

        let got = resample(&vertices, &reservoirs, &picked);

        let p = |s: usize, d: usize| {
            reservoirs[s].sample.target_pdf(&vertices.at(d))
        };

        for d in 0..4 {
            let mut w_sum = 0.0;
            let mut canonical_mis = 0.0;
            let mut candidates = Vec::new();

            for j in 0..2 {
                let n = picked[d * 2 + j] as usize;
                let m_d = reservoirs[d].m;
                let m_n = reservoirs[n].m;

                let lhs_mis = m_d * p(d, d)
                    / (m_d * p(d, d) + m_n * p(d, n));

                let rhs_mis = m_n * p(n, n)
                    / (m_n * p(n, n) + m_d * p(n, d));

                canonical_mis += lhs_mis / 2.0;
                w_sum += rhs_mis / 2.0 * p(n, d) * reservoirs[n].w;
                candidates.push((reservoirs[n].sample, p(n, d)));
            }

            w_sum += canonical_mis * p(d, d) * reservoirs[d].w;
            candidates.push((reservoirs[d].sample, p(d, d)));

            let expected_m: f32 = (0..2)
                .map(|j| reservoirs[picked[d * 2 + j] as usize].m)
                .sum::<f32>()
                + reservoirs[d].m;

            assert_eq!(got[d].reservoir.m, expected_m, "pixel {d}");

            // Selection is stochastic; whichever candidate won, its weight
            // must be the shared weight sum over its own target density
            let (_, selected_pdf) = candidates
                .iter()
                .find(|(sample, _)| {
                    sample.radiance == got[d].reservoir.sample.radiance
                })
                .expect("selected sample is not one of the candidates");

            assert_relative_eq!(
                got[d].reservoir.w,
                w_sum / selected_pdf,
                max_relative = 1e-5,
            );
        }
    }
}
