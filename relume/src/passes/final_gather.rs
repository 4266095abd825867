use glam::{Vec3, Vec4};
use relume_gpu::{
    shift_suffix, talbot_mis_weight, Mis, PrefixVertex, SceneView,
    SuffixReservoir,
};

use crate::{
    Device, Handle, Image2d, Options, ReservoirBuffer, RetraceWorkload,
    INVALID_ID,
};

/// Integrates one integration prefix: every pixel combines its canonical
/// suffix with the shifted suffixes borrowed from world-space prefix
/// neighbours, MIS-weighted, and accumulates the result into the output
/// image.
///
/// Unlike the reuse rounds this pass does not resample; the MIS-weighted
/// sum of all candidates is the estimator itself.
#[derive(Debug)]
pub struct FinalGatherPass {
    pub(crate) kernel: Handle,
}

impl FinalGatherPass {
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        device: &Device,
        scene: &dyn SceneView,
        options: &Options,
        vertices: &Image2d<PrefixVertex>,
        canonical_vertices: &Image2d<PrefixVertex>,
        found: &[u32],
        workload: &RetraceWorkload,
        canonical_reservoirs: &ReservoirBuffer,
        neighbor_reservoirs: &ReservoirBuffer,
        has_canonical: bool,
        out_color: &mut Image2d<Vec4>,
    ) {
        let layout = options.layout;
        let k = options.subpath.final_gather_suffix_count as usize;
        let multiplier = options.subpath.non_canonical_weight_multiplier;
        let talbot = options.subpath.use_talbot_mis_for_gather;

        let inv_prefixes =
            1.0 / options.subpath.num_integration_prefixes as f32;

        device.for_each(out_color.data_mut(), |id, color| {
            let vertex = vertices.at(id);

            if !vertex.is_some() {
                return;
            }

            let canon = if has_canonical {
                SuffixReservoir::read(canonical_reservoirs.data(), id, layout)
            } else {
                SuffixReservoir::default()
            };

            let radiance = if talbot {
                Self::gather_talbot(
                    scene,
                    options,
                    id,
                    &vertex,
                    &canon,
                    canonical_vertices,
                    &found[id * k..id * k + k],
                    workload,
                    neighbor_reservoirs,
                )
            } else {
                Self::gather_pairwise(
                    options,
                    id,
                    &vertex,
                    &canon,
                    canonical_vertices,
                    &found[id * k..id * k + k],
                    workload,
                    neighbor_reservoirs,
                    multiplier,
                )
            };

            *color += (vertex.throughput * radiance * inv_prefixes)
                .extend(0.0);

            color.w = 1.0;
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn gather_pairwise(
        options: &Options,
        id: usize,
        vertex: &PrefixVertex,
        canon: &SuffixReservoir,
        canonical_vertices: &Image2d<PrefixVertex>,
        found: &[u32],
        workload: &RetraceWorkload,
        neighbor_reservoirs: &ReservoirBuffer,
        multiplier: f32,
    ) -> Vec3 {
        let layout = options.layout;
        let k = found.len();
        let inv_k = 1.0 / k as f32;

        let lhs_pdf = canon.reservoir.sample.target_pdf(vertex);

        let mut radiance = Vec3::ZERO;
        let mut canonical_mis = 0.0;

        for (j, neighbor) in found.iter().enumerate() {
            let (Some(fwd), false) =
                (workload.record(id, j * 2), *neighbor == INVALID_ID)
            else {
                canonical_mis += inv_k;
                continue;
            };

            let neigh = SuffixReservoir::read(
                neighbor_reservoirs.data(),
                *neighbor as usize,
                layout,
            );

            if neigh.is_empty() {
                canonical_mis += inv_k;
                continue;
            }

            let neigh_vertex =
                canonical_vertices.at(*neighbor as usize);

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

            radiance += mis.rhs_mis
                * inv_k
                * fwd.sample.contribution(vertex)
                * neigh.reservoir.w
                * fwd.jacobian;
        }

        if !canon.is_empty() {
            radiance += canonical_mis
                * canon.reservoir.sample.contribution(vertex)
                * canon.reservoir.w;
        }

        radiance
    }

    #[allow(clippy::too_many_arguments)]
    fn gather_talbot(
        scene: &dyn SceneView,
        options: &Options,
        id: usize,
        vertex: &PrefixVertex,
        canon: &SuffixReservoir,
        canonical_vertices: &Image2d<PrefixVertex>,
        found: &[u32],
        workload: &RetraceWorkload,
        neighbor_reservoirs: &ReservoirBuffer,
    ) -> Vec3 {
        let layout = options.layout;
        let k = found.len();
        let domains = k + 1;
        let multiplier = options.subpath.non_canonical_weight_multiplier;

        // Domain 0 is the gather pixel itself, domains 1..=k are the
        // neighbours; confidences of absent candidates stay zero so their
        // domains drop out of every denominator
        let mut confidence = [0.0f32; 9];

        confidence[0] = canon.reservoir.m;

        for (j, neighbor) in found.iter().enumerate() {
            if *neighbor == INVALID_ID {
                continue;
            }

            let neigh = SuffixReservoir::read(
                neighbor_reservoirs.data(),
                *neighbor as usize,
                layout,
            );

            confidence[j + 1] = neigh.reservoir.m * multiplier;
        }

        let mut radiance = Vec3::ZERO;

        for (j, neighbor) in found.iter().enumerate() {
            if *neighbor == INVALID_ID {
                continue;
            }

            let Some(into_gather) = workload.record(id, j * domains) else {
                continue;
            };

            let neigh = SuffixReservoir::read(
                neighbor_reservoirs.data(),
                *neighbor as usize,
                layout,
            );

            if neigh.is_empty() {
                continue;
            }

            // This sample's density in every domain, jacobians folded in
            let mut densities = [0.0f32; 9];

            for domain in 0..domains {
                densities[domain] = workload
                    .record(id, j * domains + domain)
                    .map(|record| record.dst_pdf * record.jacobian)
                    .unwrap_or(0.0);
            }

            let mis = talbot_mis_weight(
                &confidence[..domains],
                &densities[..domains],
                j + 1,
            );

            radiance += mis
                * into_gather.sample.contribution(vertex)
                * neigh.reservoir.w
                * into_gather.jacobian;
        }

        if !canon.is_empty() {
            // The canonical sample's densities in the neighbour domains
            // are not part of the retrace workload, so shift it here
            let mut densities = [0.0f32; 9];

            densities[0] = canon.reservoir.sample.target_pdf(vertex);

            for (j, neighbor) in found.iter().enumerate() {
                if *neighbor == INVALID_ID {
                    continue;
                }

                let neigh_vertex =
                    canonical_vertices.at(*neighbor as usize);

                let shift = shift_suffix(
                    scene,
                    &options.shift,
                    options.shift_mapping,
                    &canon.reservoir.sample,
                    vertex,
                    &neigh_vertex,
                    options.max_suffix_bounces,
                );

                if shift.valid {
                    densities[j + 1] =
                        shift.sample.target_pdf(&neigh_vertex)
                            * shift.jacobian;
                }
            }

            let mis = talbot_mis_weight(
                &confidence[..domains],
                &densities[..domains],
                0,
            );

            radiance += mis
                * canon.reservoir.sample.contribution(vertex)
                * canon.reservoir.w;
        }

        radiance
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{uvec2, vec3};
    use relume_gpu::{
        Hit, LightSample, Ray, Reservoir, ReservoirLayout, SuffixSample,
        WhiteNoise, PREFIX_FLAG_VALID, SUFFIX_FLAG_HAS_RC,
    };

    use super::*;
    use crate::{
        DeviceDescriptor, KernelCache, KernelId, Options, RetraceSchedule,
        SubpathSettings, WorkloadKind,
    };

    struct NoScene;

    impl SceneView for NoScene {
        fn nearest_hit(&self, _ray: Ray) -> Option<Hit> {
            None
        }

        fn occluded(&self, _from: Vec3, _to: Vec3) -> bool {
            false
        }

        fn sample_light(
            &self,
            _point: Vec3,
            _noise: &mut WhiteNoise,
        ) -> Option<LightSample> {
            None
        }
    }

    /// Identical suffixes everywhere with unit contribution weight: the
    /// pairwise gather weights must partition unity, so every pixel
    /// integrates exactly one suffix contribution.
    #[test]
    fn symmetric_gather_integrates_one_contribution() {
        let dim = uvec2(2, 2);

        let options = Options {
            layout: ReservoirLayout::Full,
            subpath: SubpathSettings {
                num_integration_prefixes: 1,
                final_gather_suffix_count: 2,
                ..Default::default()
            },
            ..Default::default()
        };

        let device = Device::new(DeviceDescriptor {
            threads: Some(2),
            ..Default::default()
        })
        .unwrap();

        let vertex = PrefixVertex {
            point: Vec3::ZERO,
            roughness: 1.0,
            normal: Vec3::Y,
            flags: PREFIX_FLAG_VALID,
            albedo: Vec3::splat(0.5),
            rng: 0,
            throughput: Vec3::ONE,
            bounces: 1,
        };

        let sample = SuffixSample {
            radiance: vec3(2.0, 1.0, 0.5),
            flags: SUFFIX_FLAG_HAS_RC,
            rc_point: vec3(0.0, 1.0, 0.0),
            rng: 0,
            rc_normal: -Vec3::Y,
            pad: 0,
        };

        let mut vertices = Image2d::new(dim);

        vertices.data_mut().fill(vertex);

        let layout = options.layout;
        let stride = SuffixReservoir::stride(layout);
        let mut reservoirs = ReservoirBuffer::new("reservoirs");

        reservoirs.resize(4, stride);

        for id in 0..4 {
            SuffixReservoir {
                reservoir: Reservoir {
                    sample,
                    m: 1.0,
                    w: 1.0,
                },
            }
            .write(reservoirs.data_mut(), id, layout);
        }

        let found = [1, 2, 0, 3, 3, 0, 2, 1];
        let pdf = sample.target_pdf(&vertex);
        let mut workload = RetraceWorkload::new();

        workload.produce(
            &device,
            4,
            WorkloadKind::Pairwise { neighbors: 2 },
            RetraceSchedule::Compact,
            |_, slots| slots.fill(1),
        );

        workload.retrace(&device, |_, record| {
            record.sample = sample;
            record.dst_pdf = pdf;
            record.jacobian = 1.0;
            record.valid = 1;
        });

        let mut cache = KernelCache::new();

        let pass = FinalGatherPass {
            kernel: cache.compile(KernelId::FinalGather, vec![]),
        };

        let mut out_color = Image2d::new(dim);

        pass.run(
            &device,
            &NoScene,
            &options,
            &vertices,
            &vertices,
            &found,
            &workload,
            &reservoirs,
            &reservoirs,
            true,
            &mut out_color,
        );

        let expected = sample.contribution(&vertex);

        for id in 0..4 {
            let got = out_color.at(id);

            for c in 0..3 {
                assert_relative_eq!(
                    got[c],
                    expected[c],
                    max_relative = 1e-5,
                );
            }

            assert_eq!(got.w, 1.0, "pixel {id}");
        }
    }
}
