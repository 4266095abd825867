use fxhash::FxHashMap;
use log::debug;

use crate::{Arena, Handle};

pub type KernelDefines = Vec<(&'static str, String)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KernelId {
    PrefixResampling,
    TraceNewPrefixes,
    TraceNewSuffixes,
    PrefixNeighborSearch,
    SuffixProduceRetraceWorkload,
    SuffixRetrace,
    SuffixRetraceTalbot,
    SuffixTemporalResampling,
    SuffixSpatialResampling,
    FinalGather,
}

/// A specialized kernel: the id plus the defines it was compiled with.
#[derive(Clone, Debug)]
pub struct Kernel {
    pub id: KernelId,
    pub defines: KernelDefines,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildState {
    UpToDate,
    Invalidated,
}

/// Cache of specialized kernels, keyed by (id, defines).
///
/// Option changes invalidate the whole cache; the pass set is then
/// reconstructed, recompiling each kernel it needs exactly once.
#[derive(Debug, Default)]
pub struct KernelCache {
    kernels: Arena<Kernel>,
    index: FxHashMap<(KernelId, KernelDefines), Handle>,
    state: RebuildState,
}

impl Default for RebuildState {
    fn default() -> Self {
        Self::Invalidated
    }
}

impl KernelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RebuildState {
        self.state
    }

    /// Drops every compiled kernel; handles held by passes go stale and
    /// the passes must be rebuilt before the next frame.
    pub fn invalidate(&mut self) {
        if self.state == RebuildState::Invalidated {
            return;
        }

        debug!("Invalidating kernel cache ({} kernels)", self.kernels.len());

        // Removing one by one keeps the slot generations monotonic, so
        // handles compiled before the invalidation can never alias handles
        // compiled after it.
        for handle in self.index.drain().map(|(_, handle)| handle) {
            self.kernels.remove(handle);
        }

        self.state = RebuildState::Invalidated;
    }

    pub fn mark_up_to_date(&mut self) {
        self.state = RebuildState::UpToDate;
    }

    pub fn compile(&mut self, id: KernelId, defines: KernelDefines) -> Handle {
        if let Some(handle) = self.index.get(&(id, defines.clone())) {
            return *handle;
        }

        debug!("Compiling kernel {:?}", id);

        let handle = self.kernels.insert(Kernel {
            id,
            defines: defines.clone(),
        });

        self.index.insert((id, defines), handle);

        handle
    }

    /// Panics on a stale handle; a pass outliving its cache generation is
    /// an orchestration bug.
    pub fn kernel(&self, handle: Handle) -> &Kernel {
        self.kernels
            .get(handle)
            .unwrap_or_else(|| panic!("stale kernel handle: {handle:?}"))
    }
}
