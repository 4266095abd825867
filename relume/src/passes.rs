mod final_gather;
mod prefix_neighbor_search;
mod prefix_resampling;
mod suffix_produce_retrace_workload;
mod suffix_retrace;
mod suffix_spatial_resampling;
mod suffix_temporal_resampling;
mod trace_new_prefixes;
mod trace_new_suffixes;

use glam::{IVec2, UVec2, Vec2};

pub use self::final_gather::*;
pub use self::prefix_neighbor_search::*;
pub use self::prefix_resampling::*;
pub use self::suffix_produce_retrace_workload::*;
pub use self::suffix_retrace::*;
pub use self::suffix_spatial_resampling::*;
pub use self::suffix_temporal_resampling::*;
pub use self::trace_new_prefixes::*;
pub use self::trace_new_suffixes::*;
use crate::{KernelCache, KernelId, Options};

// Per-pass seed salts; every pass that consumes randomness gets its own
// decorrelated stream, and per-round passes add the round id on top.
pub(crate) const SALT_PREFIX: u32 = 0x01;
pub(crate) const SALT_TEMPORAL: u32 = 0x02;
pub(crate) const SALT_SPATIAL: u32 = 0x10;
pub(crate) const SALT_PICK: u32 = 0x30;
pub(crate) const SALT_GATHER: u32 = 0x50;

pub(crate) fn pass_seed(seed: u32, salt: u32) -> u32 {
    seed ^ salt.wrapping_mul(0x9e37_79b9)
}

pub(crate) fn reproject(pixel: UVec2, motion: Vec2) -> IVec2 {
    (pixel.as_vec2() + motion).round().as_ivec2()
}

/// The resampling pass set, holding one specialized kernel handle per
/// pass.
///
/// Rebuilt from scratch whenever the kernel cache gets invalidated; all
/// handles stay valid until then.
#[derive(Debug)]
pub struct Passes {
    pub prefix_resampling: PrefixResamplingPass,
    pub trace_new_prefixes: TraceNewPrefixesPass,
    pub trace_new_suffixes: TraceNewSuffixesPass,
    pub prefix_neighbor_search: PrefixNeighborSearchPass,
    pub suffix_produce_retrace_workload: SuffixProduceRetraceWorkloadPass,
    pub suffix_retrace: SuffixRetracePass,
    pub suffix_temporal_resampling: SuffixTemporalResamplingPass,
    pub suffix_spatial_resampling: SuffixSpatialResamplingPass,
    pub final_gather: FinalGatherPass,
}

impl Passes {
    pub fn new(cache: &mut KernelCache, options: &Options) -> Self {
        let defines = options.defines();

        let mut compile =
            |id: KernelId| cache.compile(id, defines.clone());

        Self {
            prefix_resampling: PrefixResamplingPass {
                kernel: compile(KernelId::PrefixResampling),
            },
            trace_new_prefixes: TraceNewPrefixesPass {
                kernel: compile(KernelId::TraceNewPrefixes),
            },
            trace_new_suffixes: TraceNewSuffixesPass {
                kernel: compile(KernelId::TraceNewSuffixes),
            },
            prefix_neighbor_search: PrefixNeighborSearchPass {
                kernel: compile(KernelId::PrefixNeighborSearch),
            },
            suffix_produce_retrace_workload:
                SuffixProduceRetraceWorkloadPass {
                    kernel: compile(KernelId::SuffixProduceRetraceWorkload),
                },
            suffix_retrace: SuffixRetracePass {
                kernel: compile(KernelId::SuffixRetrace),
                kernel_talbot: compile(KernelId::SuffixRetraceTalbot),
            },
            suffix_temporal_resampling: SuffixTemporalResamplingPass {
                kernel: compile(KernelId::SuffixTemporalResampling),
            },
            suffix_spatial_resampling: SuffixSpatialResamplingPass {
                kernel: compile(KernelId::SuffixSpatialResampling),
            },
            final_gather: FinalGatherPass {
                kernel: compile(KernelId::FinalGather),
            },
        }
    }

    /// Panics if any pass holds a handle from before the last cache
    /// invalidation.
    pub fn validate(&self, cache: &KernelCache) {
        for handle in [
            self.prefix_resampling.kernel,
            self.trace_new_prefixes.kernel,
            self.trace_new_suffixes.kernel,
            self.prefix_neighbor_search.kernel,
            self.suffix_produce_retrace_workload.kernel,
            self.suffix_retrace.kernel,
            self.suffix_retrace.kernel_talbot,
            self.suffix_temporal_resampling.kernel,
            self.suffix_spatial_resampling.kernel,
            self.final_gather.kernel,
        ] {
            cache.kernel(handle);
        }
    }
}
