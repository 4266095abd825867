use relume_gpu::PrefixVertex;

use crate::{Device, Handle, Image2d, Options, PrefixSearchIndex, INVALID_ID};

/// Finds, for every integration prefix endpoint, the spatially closest
/// canonical prefixes whose suffix reservoirs the final gather can borrow.
///
/// On frames without history the index is empty and every slot comes back
/// as [`INVALID_ID`]; the gather then falls back to canonical suffixes
/// only.
#[derive(Debug)]
pub struct PrefixNeighborSearchPass {
    pub(crate) kernel: Handle,
}

impl PrefixNeighborSearchPass {
    pub fn run(
        &self,
        device: &Device,
        options: &Options,
        vertices: &Image2d<PrefixVertex>,
        index: &PrefixSearchIndex,
        found: &mut [u32],
    ) {
        let k = options.subpath.final_gather_suffix_count as usize;
        let radius = options.subpath.prefix_neighbor_search_radius;

        device.for_each_chunk(found, k, |id, found| {
            let vertex = vertices.at(id);

            if index.is_empty() || !vertex.is_some() {
                found.fill(INVALID_ID);
                return;
            }

            index.find_nearest(vertex.point, radius, found);
        });
    }
}
