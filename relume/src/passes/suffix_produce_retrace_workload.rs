use relume_gpu::PrefixVertex;

use crate::{
    Device, Handle, Image2d, RetraceSchedule, RetraceWorkload, WorkloadKind,
    INVALID_ID,
};

/// Flags the (pixel, neighbour, direction) slots whose shift actually
/// needs evaluating and compacts them into the retrace workload.
#[derive(Debug)]
pub struct SuffixProduceRetraceWorkloadPass {
    pub(crate) kernel: Handle,
}

impl SuffixProduceRetraceWorkloadPass {
    /// Pairwise rounds: two slots per neighbour, forward and reverse.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        device: &Device,
        workload: &mut RetraceWorkload,
        schedule: RetraceSchedule,
        neighbors: u32,
        picked: &[u32],
        dst_vertices: &Image2d<PrefixVertex>,
        src_vertices: &Image2d<PrefixVertex>,
    ) {
        let k = neighbors as usize;

        workload.produce(
            device,
            dst_vertices.len(),
            WorkloadKind::Pairwise { neighbors },
            schedule,
            |pixel, slots| {
                if !dst_vertices.at(pixel).is_some() {
                    return;
                }

                for j in 0..k {
                    let neighbor = picked[pixel * k + j];

                    if neighbor == INVALID_ID {
                        continue;
                    }

                    if !src_vertices.at(neighbor as usize).is_some() {
                        continue;
                    }

                    slots[j * 2] = 1;
                    slots[j * 2 + 1] = 1;
                }
            },
        );
    }

    /// Talbot gather: one slot per (sample, domain) pair.
    #[allow(clippy::too_many_arguments)]
    pub fn run_talbot(
        &self,
        device: &Device,
        workload: &mut RetraceWorkload,
        schedule: RetraceSchedule,
        neighbors: u32,
        picked: &[u32],
        dst_vertices: &Image2d<PrefixVertex>,
        src_vertices: &Image2d<PrefixVertex>,
    ) {
        let k = neighbors as usize;
        let domains = k + 1;

        workload.produce(
            device,
            dst_vertices.len(),
            WorkloadKind::Talbot { neighbors },
            schedule,
            |pixel, slots| {
                if !dst_vertices.at(pixel).is_some() {
                    return;
                }

                for j in 0..k {
                    let sampled = picked[pixel * k + j];

                    if sampled == INVALID_ID
                        || !src_vertices.at(sampled as usize).is_some()
                    {
                        continue;
                    }

                    for domain in 0..domains {
                        if domain > 0 {
                            let target = picked[pixel * k + domain - 1];

                            if target == INVALID_ID
                                || !src_vertices
                                    .at(target as usize)
                                    .is_some()
                            {
                                continue;
                            }
                        }

                        slots[j * domains + domain] = 1;
                    }
                }
            },
        );
    }
}
