use glam::Vec4;
use log::debug;

/// Flat storage for packed reservoirs: `len` elements of `stride` quads
/// each.
///
/// Reallocation happens only when the element count or stride actually
/// changes; every reallocation bumps the generation so stale views can be
/// detected.
#[derive(Clone, Debug)]
pub struct ReservoirBuffer {
    label: &'static str,
    data: Vec<Vec4>,
    len: usize,
    stride: usize,
    generation: u32,
}

impl ReservoirBuffer {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            data: Vec::new(),
            len: 0,
            stride: 0,
            generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Ensures capacity for `len` elements of `stride` quads; returns
    /// whether a reallocation happened.
    pub fn resize(&mut self, len: usize, stride: usize) -> bool {
        if len == self.len && stride == self.stride {
            return false;
        }

        debug!(
            "Reallocating `{}`: {}x{} -> {}x{} quads",
            self.label, self.len, self.stride, len, stride,
        );

        self.data = vec![Vec4::ZERO; len * stride];
        self.len = len;
        self.stride = stride;
        self.generation += 1;

        true
    }

    pub fn reset(&mut self) {
        self.data.fill(Vec4::ZERO);
    }

    pub fn data(&self) -> &[Vec4] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [Vec4] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reallocation_round_trips_capacity() {
        let mut buffer = ReservoirBuffer::new("test");

        assert!(buffer.resize(256, 3));
        assert_eq!(buffer.data().len(), 768);
        assert_eq!(buffer.generation(), 1);

        assert!(buffer.resize(1024, 3));
        assert_eq!(buffer.data().len(), 3072);

        assert!(buffer.resize(256, 3));
        assert_eq!(buffer.data().len(), 768);
        assert_eq!(buffer.generation(), 3);

        // Same shape, no reallocation
        assert!(!buffer.resize(256, 3));
        assert_eq!(buffer.generation(), 3);
    }

    #[test]
    fn stride_change_reallocates() {
        let mut buffer = ReservoirBuffer::new("test");

        buffer.resize(100, 3);
        assert!(buffer.resize(100, 2));
        assert_eq!(buffer.data().len(), 200);
    }
}
