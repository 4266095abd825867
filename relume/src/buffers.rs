mod double_buffered;
mod image;
mod reservoir_buffer;

use glam::UVec2;
use relume_gpu::{PrefixReservoir, PrefixVertex, SuffixReservoir};

pub use self::double_buffered::*;
pub use self::image::*;
pub use self::reservoir_buffer::*;
use crate::{Options, INVALID_ID};

/// Tile the reservoir buffers are padded to; element counts are always a
/// multiple of the tile area.
pub const SCREEN_TILE_DIM: UVec2 = UVec2::splat(16);

pub fn screen_tiles(frame_dim: UVec2) -> UVec2 {
    (frame_dim + SCREEN_TILE_DIM - UVec2::ONE) / SCREEN_TILE_DIM
}

/// Persistent per-frame storage of the resampling passes.
#[derive(Debug)]
pub struct FrameBuffers {
    /// Canonical prefix endpoints, this frame and the previous one.
    pub prefix_vertices: DoubleBuffered<Image2d<PrefixVertex>>,
    /// Scratch endpoints for the integration prefixes of the final gather.
    pub gather_vertices: Image2d<PrefixVertex>,
    pub prefix_reservoirs: DoubleBuffered<ReservoirBuffer>,
    pub suffix_reservoirs: DoubleBuffered<ReservoirBuffer>,
    /// Stand-in for the previous-frame reservoirs while the scene is
    /// frozen, so history is left untouched.
    pub temp_suffix_reservoirs: ReservoirBuffer,
    /// Spatial-reuse neighbour picks, `suffix_spatial_neighbor_count` per
    /// pixel.
    pub picked_neighbors: Vec<u32>,
    /// Final-gather neighbour pixels, `final_gather_suffix_count` per
    /// pixel.
    pub found_neighbors: Vec<u32>,
}

impl FrameBuffers {
    pub fn new() -> Self {
        Self {
            prefix_vertices: DoubleBuffered::new(
                Image2d::new(UVec2::ZERO),
                Image2d::new(UVec2::ZERO),
            ),
            gather_vertices: Image2d::new(UVec2::ZERO),
            prefix_reservoirs: DoubleBuffered::new(
                ReservoirBuffer::new("prefix_reservoirs_a"),
                ReservoirBuffer::new("prefix_reservoirs_b"),
            ),
            suffix_reservoirs: DoubleBuffered::new(
                ReservoirBuffer::new("suffix_reservoirs_a"),
                ReservoirBuffer::new("suffix_reservoirs_b"),
            ),
            temp_suffix_reservoirs: ReservoirBuffer::new(
                "temp_suffix_reservoirs",
            ),
            picked_neighbors: Vec::new(),
            found_neighbors: Vec::new(),
        }
    }

    /// Number of reservoir elements backing a frame of given dimensions;
    /// padded up to whole screen tiles.
    pub fn element_count(frame_dim: UVec2, options: &Options) -> usize {
        let tiles = screen_tiles(frame_dim);
        let tile_area = (SCREEN_TILE_DIM.x * SCREEN_TILE_DIM.y) as usize;

        (tiles.x * tiles.y) as usize
            * tile_area
            * options.reservoir_count_per_pixel as usize
    }

    /// Grows or shrinks everything to fit `frame_dim`; returns whether any
    /// buffer got reallocated.
    pub fn resize(&mut self, frame_dim: UVec2, options: &Options) -> bool {
        let elements = Self::element_count(frame_dim, options);
        let suffix_stride = SuffixReservoir::stride(options.layout);

        let mut reallocated = false;

        self.prefix_vertices.for_each_mut(|image| {
            reallocated |= image.resize(frame_dim);
        });

        reallocated |= self.gather_vertices.resize(frame_dim);

        self.prefix_reservoirs.for_each_mut(|buffer| {
            reallocated |= buffer.resize(elements, PrefixReservoir::STRIDE);
        });

        self.suffix_reservoirs.for_each_mut(|buffer| {
            reallocated |= buffer.resize(elements, suffix_stride);
        });

        reallocated |=
            self.temp_suffix_reservoirs.resize(elements, suffix_stride);

        let pixels = (frame_dim.x * frame_dim.y) as usize;

        let picked = pixels
            * options.subpath.suffix_spatial_neighbor_count as usize;

        if self.picked_neighbors.len() != picked {
            self.picked_neighbors = vec![INVALID_ID; picked];
            reallocated = true;
        }

        let found =
            pixels * options.subpath.final_gather_suffix_count as usize;

        if self.found_neighbors.len() != found {
            self.found_neighbors = vec![INVALID_ID; found];
            reallocated = true;
        }

        reallocated
    }

    /// Clears reservoir history; the next frame starts from scratch.
    pub fn reset(&mut self) {
        self.prefix_reservoirs.for_each_mut(ReservoirBuffer::reset);
        self.suffix_reservoirs.for_each_mut(ReservoirBuffer::reset);
        self.temp_suffix_reservoirs.reset();

        self.prefix_vertices.for_each_mut(|image| {
            image.data_mut().fill(Default::default());
        });
    }
}

impl Default for FrameBuffers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use glam::uvec2;

    use super::*;

    #[test]
    fn element_count_is_tile_padded() {
        let options = Options::default();

        assert_eq!(
            FrameBuffers::element_count(uvec2(16, 16), &options),
            256
        );

        assert_eq!(
            FrameBuffers::element_count(uvec2(17, 16), &options),
            512
        );

        assert_eq!(
            FrameBuffers::element_count(uvec2(1920, 1080), &options),
            120 * 68 * 256
        );
    }

    #[test]
    fn resize_is_idempotent() {
        let options = Options::default();
        let mut buffers = FrameBuffers::new();

        assert!(buffers.resize(uvec2(64, 64), &options));
        assert!(!buffers.resize(uvec2(64, 64), &options));
        assert!(buffers.resize(uvec2(128, 64), &options));
        assert!(buffers.resize(uvec2(64, 64), &options));
    }
}
