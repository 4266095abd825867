//! Relume is a spatiotemporal path-resampling engine: camera paths are
//! split into prefixes and suffixes, both get stored in per-pixel
//! reservoirs, and reuse happens across frames and across pixels through
//! shift mappings instead of re-tracing whole paths.
//!
//! The engine runs as a sequence of wide data-parallel passes over flat
//! buffers; `relume-gpu` holds the per-element algorithms and this crate
//! owns buffer lifecycles, scheduling and pass orchestration.
//!
//! Usage:
//!
//! - create a [`Device`] and an engine through [`Relume::new()`],
//! - once per frame, call [`Relume::begin_frame()`],
//!   [`Relume::render()`] and [`Relume::end_frame()`].

mod buffers;
mod cache;
mod device;
mod error;
mod neighbors;
mod options;
mod passes;
mod prefix_search;
mod scheduler;
mod utils;

use std::mem;

use glam::{UVec2, Vec2, Vec4};
use log::info;
use relume_gpu::{Camera, SceneView};

pub use self::buffers::*;
pub use self::cache::*;
pub use self::device::*;
pub use self::error::*;
pub use self::neighbors::*;
pub use self::options::*;
pub use self::passes::*;
pub use self::prefix_search::*;
pub use self::scheduler::*;
pub use self::utils::*;
pub use relume_gpu as gpu;

/// The engine.
///
/// Owns every persistent buffer, the kernel cache and the pass set; the
/// scene and camera stay on the caller's side and come in through
/// [`Self::render()`].
#[derive(Debug)]
pub struct Relume {
    device: Device,
    options: Options,
    buffers: FrameBuffers,
    cache: KernelCache,
    passes: Passes,
    workload: RetraceWorkload,
    neighbors: NeighborOffsets,
    search: PrefixSearchIndex,
    frame_dim: UVec2,
    frame: u32,
    base_seed: u32,
    reset_temporal: bool,
    realloc_buffers: bool,
    frozen: bool,
}

impl Relume {
    pub fn new(device: Device, options: Options) -> Result<Self> {
        options.validate()?;

        let mut cache = KernelCache::new();
        let passes = Passes::new(&mut cache, &options);

        cache.mark_up_to_date();

        info!("Creating engine on device `{}`", device.name());

        Ok(Self {
            device,
            options,
            buffers: FrameBuffers::new(),
            cache,
            passes,
            workload: RetraceWorkload::new(),
            neighbors: NeighborOffsets::new(),
            search: PrefixSearchIndex::default(),
            frame_dim: UVec2::ZERO,
            frame: 0,
            base_seed: rand::random(),
            reset_temporal: true,
            realloc_buffers: false,
            frozen: false,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Reconfigures the engine.
    ///
    /// Any actual change invalidates the kernel cache and drops temporal
    /// history; buffers get reallocated lazily on the next
    /// [`Self::begin_frame()`] if the new options need different ones.
    pub fn set_options(&mut self, options: Options) -> Result<()> {
        options.validate()?;

        if options == self.options {
            return Ok(());
        }

        if self.options.invalidates_buffers(&options) {
            self.realloc_buffers = true;
        }

        self.options = options;
        self.cache.invalidate();
        self.reset_temporal_history();

        Ok(())
    }

    /// Overrides the random seed everything this engine samples derives
    /// from; two engines with the same seed, options and inputs render
    /// bit-identical frames.
    pub fn set_base_seed(&mut self, seed: u32) {
        self.base_seed = seed;
    }

    /// Schedules temporal history to be dropped; the next frame restarts
    /// resampling from scratch.
    pub fn reset_temporal_history(&mut self) {
        self.reset_temporal = true;
        self.buffers.reset();
    }

    pub fn needs_reset_temporal_history(&self) -> bool {
        self.reset_temporal
    }

    /// Prepares buffers and passes for a frame of given dimensions.
    pub fn begin_frame(&mut self, frame_dim: UVec2) {
        self.frame_dim = frame_dim;

        if mem::take(&mut self.realloc_buffers) {
            self.buffers = FrameBuffers::new();
        }

        if self.buffers.resize(frame_dim, &self.options) {
            self.buffers.reset();
            self.reset_temporal = true;
        }

        if self.cache.state() == RebuildState::Invalidated {
            self.passes = Passes::new(&mut self.cache, &self.options);
            self.cache.mark_up_to_date();
        }

        self.passes.validate(&self.cache);
    }

    /// Renders one frame into `out_color`.
    ///
    /// `motion` maps each pixel to its position in the previous frame, in
    /// pixels; pass a zero image for a static camera.
    pub fn render(
        &mut self,
        scene: &dyn SceneView,
        camera: &Camera,
        motion: &Image2d<Vec2>,
        out_color: &mut Image2d<Vec4>,
    ) {
        assert_eq!(out_color.size(), self.frame_dim);
        assert_eq!(motion.size(), self.frame_dim);

        let reset = self.reset_temporal;
        let frozen = scene.frozen();
        let seed = self.base_seed ^ self.frame.wrapping_mul(0x0019_660d);
        let pixels = (self.frame_dim.x * self.frame_dim.y) as usize;
        let schedule = self.options.retrace_schedule;

        self.frozen = frozen;

        out_color.data_mut().fill(Vec4::ZERO);

        // Canonical prefixes, temporally resampled against last frame's
        {
            let (curr, prev) = self.buffers.prefix_reservoirs.split_mut();

            self.passes.prefix_resampling.run(
                &self.device,
                scene,
                camera,
                &self.options,
                seed,
                reset,
                motion,
                self.buffers.prefix_vertices.curr_mut(),
                curr,
                prev,
            );
        }

        // The final gather borrows suffixes across pixels through a
        // world-space search over this frame's prefix endpoints; on reset
        // frames it falls back to canonical suffixes only
        self.search = if reset {
            PrefixSearchIndex::default()
        } else {
            PrefixSearchIndex::build(
                self.buffers.prefix_vertices.curr().data(),
            )
        };

        self.passes.trace_new_suffixes.run(
            &self.device,
            scene,
            &self.options,
            self.buffers.prefix_vertices.curr(),
            self.buffers.suffix_reservoirs.curr_mut(),
        );

        if self.options.subpath.suffix_temporal_reuse && !reset {
            self.suffix_temporal_round(scene, motion, seed, pixels);
        }

        for round in 0..self.options.subpath.suffix_spatial_reuse_rounds {
            self.suffix_spatial_round(scene, seed, round, frozen);
        }

        // Position the resampled population in the previous-frame role,
        // where both the gather and next frame's temporal round read it;
        // while the scene is frozen the scratch buffer stands in so real
        // history stays untouched
        if frozen {
            mem::swap(
                self.buffers.suffix_reservoirs.curr_mut(),
                &mut self.buffers.temp_suffix_reservoirs,
            );
        } else {
            self.buffers.suffix_reservoirs.swap();
        }

        for ip in 0..self.options.subpath.num_integration_prefixes {
            self.final_gather_round(
                scene, camera, seed, ip, frozen, schedule, out_color,
            );
        }

        self.reset_temporal = false;
    }

    /// Closes the frame, flipping the per-frame buffers.
    ///
    /// Skipped entirely while the scene is frozen, so consecutive frozen
    /// frames replay the exact same frame.
    pub fn end_frame(&mut self) {
        if self.frozen {
            return;
        }

        self.buffers.prefix_reservoirs.swap();
        self.buffers.prefix_vertices.swap();
        self.frame = self.frame.wrapping_add(1);
    }

    fn suffix_temporal_round(
        &mut self,
        scene: &dyn SceneView,
        motion: &Image2d<Vec2>,
        seed: u32,
        pixels: usize,
    ) {
        self.passes.suffix_temporal_resampling.pick(
            &self.device,
            motion,
            &mut self.buffers.picked_neighbors[..pixels],
        );

        self.passes.suffix_produce_retrace_workload.run(
            &self.device,
            &mut self.workload,
            self.options.retrace_schedule,
            1,
            &self.buffers.picked_neighbors[..pixels],
            self.buffers.prefix_vertices.curr(),
            self.buffers.prefix_vertices.prev(),
        );

        self.passes.suffix_retrace.run(
            &self.device,
            scene,
            &self.options,
            &mut self.workload,
            &self.buffers.picked_neighbors[..pixels],
            1,
            self.buffers.prefix_vertices.curr(),
            self.buffers.prefix_vertices.prev(),
            self.buffers.suffix_reservoirs.curr(),
            self.buffers.suffix_reservoirs.prev(),
        );

        let (curr, prev) = self.buffers.suffix_reservoirs.split_mut();

        self.passes.suffix_temporal_resampling.run(
            &self.device,
            &self.options,
            seed,
            &self.buffers.picked_neighbors[..pixels],
            &self.workload,
            self.buffers.prefix_vertices.curr(),
            self.buffers.prefix_vertices.prev(),
            curr,
            prev,
        );
    }

    fn suffix_spatial_round(
        &mut self,
        scene: &dyn SceneView,
        seed: u32,
        round: u32,
        frozen: bool,
    ) {
        let neighbors = self.options.subpath.suffix_spatial_neighbor_count;

        // Flip so the previous round's output becomes this round's input
        if frozen {
            mem::swap(
                self.buffers.suffix_reservoirs.curr_mut(),
                &mut self.buffers.temp_suffix_reservoirs,
            );
        } else {
            self.buffers.suffix_reservoirs.swap();
        }

        self.passes.suffix_spatial_resampling.pick(
            &self.device,
            &self.options,
            seed,
            round,
            &self.neighbors,
            self.frame_dim,
            &mut self.buffers.picked_neighbors,
        );

        self.passes.suffix_produce_retrace_workload.run(
            &self.device,
            &mut self.workload,
            self.options.retrace_schedule,
            neighbors,
            &self.buffers.picked_neighbors,
            self.buffers.prefix_vertices.curr(),
            self.buffers.prefix_vertices.curr(),
        );

        let (curr, prev) = if frozen {
            (
                self.buffers.suffix_reservoirs.curr_mut(),
                &self.buffers.temp_suffix_reservoirs,
            )
        } else {
            self.buffers.suffix_reservoirs.split_mut()
        };

        self.passes.suffix_retrace.run(
            &self.device,
            scene,
            &self.options,
            &mut self.workload,
            &self.buffers.picked_neighbors,
            neighbors,
            self.buffers.prefix_vertices.curr(),
            self.buffers.prefix_vertices.curr(),
            prev,
            prev,
        );

        self.passes.suffix_spatial_resampling.run(
            &self.device,
            &self.options,
            seed,
            round,
            &self.buffers.picked_neighbors,
            &self.workload,
            self.buffers.prefix_vertices.curr(),
            curr,
            prev,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn final_gather_round(
        &mut self,
        scene: &dyn SceneView,
        camera: &Camera,
        seed: u32,
        integration_prefix: u32,
        frozen: bool,
        schedule: RetraceSchedule,
        out_color: &mut Image2d<Vec4>,
    ) {
        let subpath = &self.options.subpath;
        let neighbors = subpath.final_gather_suffix_count;
        let talbot = subpath.use_talbot_mis_for_gather;

        let has_canonical = integration_prefix == 0
            || subpath.generate_canonical_suffix_for_each_prefix;

        // Integration prefix zero borrows the canonical g-buffer; the
        // others get freshly traced prefixes
        if integration_prefix > 0 {
            self.passes.trace_new_prefixes.run(
                &self.device,
                scene,
                camera,
                &self.options,
                seed,
                integration_prefix,
                &mut self.buffers.gather_vertices,
            );
        }

        if has_canonical {
            let vertices = if integration_prefix == 0 {
                self.buffers.prefix_vertices.curr()
            } else {
                &self.buffers.gather_vertices
            };

            self.passes.trace_new_suffixes.run(
                &self.device,
                scene,
                &self.options,
                vertices,
                self.buffers.suffix_reservoirs.curr_mut(),
            );
        } else if integration_prefix == 1 {
            // Later prefixes run without a canonical suffix; drop the one
            // prefix zero left behind so the gather never reads it
            self.buffers.suffix_reservoirs.curr_mut().reset();
        }

        let vertices = if integration_prefix == 0 {
            self.buffers.prefix_vertices.curr()
        } else {
            &self.buffers.gather_vertices
        };

        self.passes.prefix_neighbor_search.run(
            &self.device,
            &self.options,
            vertices,
            &self.search,
            &mut self.buffers.found_neighbors,
        );

        let vertices = if integration_prefix == 0 {
            self.buffers.prefix_vertices.curr()
        } else {
            &self.buffers.gather_vertices
        };

        let reservoirs = if frozen {
            &self.buffers.temp_suffix_reservoirs
        } else {
            self.buffers.suffix_reservoirs.prev()
        };

        if talbot {
            self.passes.suffix_produce_retrace_workload.run_talbot(
                &self.device,
                &mut self.workload,
                schedule,
                neighbors,
                &self.buffers.found_neighbors,
                vertices,
                self.buffers.prefix_vertices.curr(),
            );

            self.passes.suffix_retrace.run_talbot(
                &self.device,
                scene,
                &self.options,
                &mut self.workload,
                &self.buffers.found_neighbors,
                neighbors,
                vertices,
                self.buffers.prefix_vertices.curr(),
                reservoirs,
            );
        } else {
            self.passes.suffix_produce_retrace_workload.run(
                &self.device,
                &mut self.workload,
                schedule,
                neighbors,
                &self.buffers.found_neighbors,
                vertices,
                self.buffers.prefix_vertices.curr(),
            );

            self.passes.suffix_retrace.run(
                &self.device,
                scene,
                &self.options,
                &mut self.workload,
                &self.buffers.found_neighbors,
                neighbors,
                vertices,
                self.buffers.prefix_vertices.curr(),
                self.buffers.suffix_reservoirs.curr(),
                reservoirs,
            );
        }

        self.passes.final_gather.run(
            &self.device,
            scene,
            &self.options,
            vertices,
            self.buffers.prefix_vertices.curr(),
            &self.buffers.found_neighbors,
            &self.workload,
            self.buffers.suffix_reservoirs.curr(),
            reservoirs,
            has_canonical,
            out_color,
        );
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{uvec2, vec3, Vec3};
    use relume_gpu::{
        trace_prefix, trace_suffix, Hit, Ray, ReservoirLayout, WhiteNoise,
    };

    use super::*;
    use crate::passes::{pass_seed, SALT_PREFIX};

    /// Infinite diffuse floor under a constant sky; no lights, so no
    /// next-event estimation and nothing to occlude.
    struct FloorScene;

    impl SceneView for FloorScene {
        fn nearest_hit(&self, ray: Ray) -> Option<Hit> {
            if ray.dir().y >= -1e-6 {
                return None;
            }

            let t = -ray.origin().y / ray.dir().y;

            if t <= 1e-4 {
                return None;
            }

            Some(Hit {
                t,
                point: ray.at(t),
                normal: Vec3::Y,
                albedo: Vec3::splat(0.5),
                roughness: 1.0,
                emission: Vec3::ZERO,
            })
        }

        fn occluded(&self, _from: Vec3, _to: Vec3) -> bool {
            false
        }

        fn sample_light(
            &self,
            _point: Vec3,
            _noise: &mut WhiteNoise,
        ) -> Option<relume_gpu::LightSample> {
            None
        }

        fn sky(&self, _dir: Vec3) -> Vec3 {
            Vec3::ONE
        }
    }

    /// With reuse disabled (no temporal round, no spatial rounds, one
    /// integration prefix) the first frame must reduce to plain
    /// single-sample path tracing: every pixel equals the estimate of the
    /// one canonical prefix-plus-suffix path it traced.
    #[test]
    fn zero_reuse_frame_is_single_sample_path_tracing() {
        let dim = uvec2(8, 8);

        // The full layout keeps radiance bit-exact, so the comparison
        // against the reference estimate can be tight
        let options = Options {
            layout: ReservoirLayout::Full,
            subpath: SubpathSettings {
                suffix_temporal_reuse: false,
                suffix_spatial_reuse_rounds: 0,
                num_integration_prefixes: 1,
                ..Default::default()
            },
            ..Default::default()
        };

        let device = Device::new(DeviceDescriptor {
            threads: Some(2),
            ..Default::default()
        })
        .unwrap();

        let mut engine = Relume::new(device, options.clone()).unwrap();

        engine.set_base_seed(123);

        let camera = Camera::look_at(
            vec3(0.0, 2.0, 3.0),
            vec3(0.0, 0.0, 0.0),
            Vec3::Y,
            1.0,
            dim,
        );

        let motion = Image2d::<Vec2>::new(dim);
        let mut color = Image2d::<Vec4>::new(dim);

        engine.begin_frame(dim);
        engine.render(&FloorScene, &camera, &motion, &mut color);
        engine.end_frame();

        let prefix_seed = pass_seed(123, SALT_PREFIX);

        for idx in 0..color.len() {
            let pixel = color.pixel(idx);
            let got = color.at(idx);

            let mut wnoise = WhiteNoise::new(prefix_seed, pixel);

            let vertex = trace_prefix(
                &FloorScene,
                &camera,
                pixel,
                &mut wnoise,
                options.minimum_prefix_length,
            );

            if !vertex.is_some() {
                assert_eq!(got, Vec4::ZERO, "pixel {pixel}");
                continue;
            }

            let mut snoise = WhiteNoise::from_state(vertex.rng);

            let traced = trace_suffix(
                &FloorScene,
                &vertex,
                &mut snoise,
                options.max_suffix_bounces,
            );

            let target = traced.sample.target_pdf(&vertex);

            let expected = if traced.pdf > 0.0 && target > 0.0 {
                let w = (target / traced.pdf) / target;

                vertex.throughput
                    * traced.sample.contribution(&vertex)
                    * w
            } else {
                Vec3::ZERO
            };

            for c in 0..3 {
                assert_relative_eq!(
                    got[c],
                    expected[c],
                    epsilon = 1e-5,
                    max_relative = 1e-4,
                );
            }

            assert_eq!(got.w, 1.0, "pixel {pixel}");
        }
    }
}
