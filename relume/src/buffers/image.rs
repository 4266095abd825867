use glam::{IVec2, UVec2};

/// Screen-sized 2D buffer with row-major storage.
#[derive(Clone, Debug)]
pub struct Image2d<T> {
    size: UVec2,
    data: Vec<T>,
}

impl<T> Image2d<T>
where
    T: Clone + Copy + Default,
{
    pub fn new(size: UVec2) -> Self {
        Self {
            size,
            data: vec![T::default(); (size.x * size.y) as usize],
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reallocates when the size changes; contents survive otherwise.
    pub fn resize(&mut self, size: UVec2) -> bool {
        if size == self.size {
            return false;
        }

        *self = Self::new(size);

        true
    }

    pub fn contains(&self, pixel: IVec2) -> bool {
        pixel.x >= 0
            && pixel.y >= 0
            && (pixel.x as u32) < self.size.x
            && (pixel.y as u32) < self.size.y
    }

    pub fn idx(&self, pixel: UVec2) -> usize {
        (pixel.y * self.size.x + pixel.x) as usize
    }

    pub fn pixel(&self, idx: usize) -> UVec2 {
        UVec2::new(idx as u32 % self.size.x, idx as u32 / self.size.x)
    }

    pub fn get(&self, pixel: UVec2) -> T {
        self.data[self.idx(pixel)]
    }

    pub fn set(&mut self, pixel: UVec2, item: T) {
        let idx = self.idx(pixel);

        self.data[idx] = item;
    }

    pub fn at(&self, idx: usize) -> T {
        self.data[idx]
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use glam::{ivec2, uvec2};

    use super::*;

    #[test]
    fn indexing_round_trips() {
        let image = Image2d::<u32>::new(uvec2(7, 3));

        for idx in 0..image.len() {
            assert_eq!(image.idx(image.pixel(idx)), idx);
        }

        assert!(image.contains(ivec2(6, 2)));
        assert!(!image.contains(ivec2(7, 2)));
        assert!(!image.contains(ivec2(-1, 0)));
    }
}
