use relume_gpu::{
    shift_suffix, PrefixVertex, SceneView, Shift, SuffixReservoir,
};

use crate::{
    Device, Handle, Image2d, Options, ReservoirBuffer, RetraceWorkload,
    ShiftRecord,
};

/// Evaluates every scheduled shift and fills the record buffer the
/// resampling passes read back.
///
/// Forward slots shift a neighbour's suffix into the canonical domain;
/// reverse slots shift the canonical suffix out, producing the density the
/// pairwise MIS needs on the other side.
#[derive(Debug)]
pub struct SuffixRetracePass {
    pub(crate) kernel: Handle,
    pub(crate) kernel_talbot: Handle,
}

impl SuffixRetracePass {
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        device: &Device,
        scene: &dyn SceneView,
        options: &Options,
        workload: &mut RetraceWorkload,
        picked: &[u32],
        neighbors: u32,
        dst_vertices: &Image2d<PrefixVertex>,
        src_vertices: &Image2d<PrefixVertex>,
        canonical_reservoirs: &ReservoirBuffer,
        neighbor_reservoirs: &ReservoirBuffer,
    ) {
        let k = neighbors as usize;
        let layout = options.layout;
        let settings = &options.shift;
        let mapping = options.shift_mapping;
        let max_bounces = options.max_suffix_bounces;

        workload.retrace(device, |entry, record| {
            let pixel = entry.pixel() as usize;
            let slot = entry.slot() as usize;
            let neighbor = picked[pixel * k + slot] as usize;

            let dst_vertex = dst_vertices.at(pixel);
            let src_vertex = src_vertices.at(neighbor);

            *record = if entry.is_reverse() {
                let canon = SuffixReservoir::read(
                    canonical_reservoirs.data(),
                    pixel,
                    layout,
                );

                if canon.is_empty() {
                    ShiftRecord::default()
                } else {
                    let shift = shift_suffix(
                        scene,
                        settings,
                        mapping,
                        &canon.reservoir.sample,
                        &dst_vertex,
                        &src_vertex,
                        max_bounces,
                    );

                    ShiftRecord::new(shift, &src_vertex)
                }
            } else {
                let neigh = SuffixReservoir::read(
                    neighbor_reservoirs.data(),
                    neighbor,
                    layout,
                );

                if neigh.is_empty() {
                    ShiftRecord::default()
                } else {
                    let shift = shift_suffix(
                        scene,
                        settings,
                        mapping,
                        &neigh.reservoir.sample,
                        &src_vertex,
                        &dst_vertex,
                        max_bounces,
                    );

                    ShiftRecord::new(shift, &dst_vertex)
                }
            };
        });
    }

    /// Talbot gather variant: the sample index and target domain come from
    /// the entry's extra word instead of a direction bit.
    #[allow(clippy::too_many_arguments)]
    pub fn run_talbot(
        &self,
        device: &Device,
        scene: &dyn SceneView,
        options: &Options,
        workload: &mut RetraceWorkload,
        picked: &[u32],
        neighbors: u32,
        dst_vertices: &Image2d<PrefixVertex>,
        src_vertices: &Image2d<PrefixVertex>,
        neighbor_reservoirs: &ReservoirBuffer,
    ) {
        let k = neighbors as usize;
        let layout = options.layout;
        let settings = &options.shift;
        let mapping = options.shift_mapping;
        let max_bounces = options.max_suffix_bounces;

        workload.retrace(device, |entry, record| {
            let pixel = entry.pixel() as usize;
            let sampled = entry.slot() as usize;
            let domain = entry.extra as usize;

            let source = picked[pixel * k + sampled] as usize;
            let src_vertex = src_vertices.at(source);

            let reservoir = SuffixReservoir::read(
                neighbor_reservoirs.data(),
                source,
                layout,
            );

            if reservoir.is_empty() {
                *record = ShiftRecord::default();
                return;
            }

            let sample = reservoir.reservoir.sample;

            // Shifting a sample into its own domain is the identity
            let (shift, dst_vertex) = if domain > 0
                && picked[pixel * k + domain - 1] as usize == source
            {
                (
                    Shift {
                        valid: true,
                        jacobian: 1.0,
                        sample,
                    },
                    src_vertex,
                )
            } else {
                let dst_vertex = if domain == 0 {
                    dst_vertices.at(pixel)
                } else {
                    src_vertices
                        .at(picked[pixel * k + domain - 1] as usize)
                };

                (
                    shift_suffix(
                        scene,
                        settings,
                        mapping,
                        &sample,
                        &src_vertex,
                        &dst_vertex,
                        max_bounces,
                    ),
                    dst_vertex,
                )
            };

            *record = ShiftRecord::new(shift, &dst_vertex);
        });
    }
}
