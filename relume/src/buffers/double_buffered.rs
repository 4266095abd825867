/// Pair of buffers alternating roles between frames.
///
/// `curr()` and `prev()` resolve through a flip flag instead of moving
/// data; `swap()` is O(1) and keeps both allocations warm.
#[derive(Clone, Debug)]
pub struct DoubleBuffered<T> {
    a: T,
    b: T,
    alternate: bool,
}

impl<T> DoubleBuffered<T> {
    pub fn new(a: T, b: T) -> Self {
        Self {
            a,
            b,
            alternate: false,
        }
    }

    pub fn curr(&self) -> &T {
        if self.alternate {
            &self.b
        } else {
            &self.a
        }
    }

    pub fn curr_mut(&mut self) -> &mut T {
        if self.alternate {
            &mut self.b
        } else {
            &mut self.a
        }
    }

    pub fn prev(&self) -> &T {
        if self.alternate {
            &self.a
        } else {
            &self.b
        }
    }

    pub fn prev_mut(&mut self) -> &mut T {
        if self.alternate {
            &mut self.a
        } else {
            &mut self.b
        }
    }

    /// Borrows the current buffer mutably and the previous one
    /// immutably; the shape every resampling pass wants.
    pub fn split_mut(&mut self) -> (&mut T, &T) {
        if self.alternate {
            (&mut self.b, &self.a)
        } else {
            (&mut self.a, &self.b)
        }
    }

    pub fn swap(&mut self) {
        self.alternate = !self.alternate;
    }

    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        f(&mut self.a);
        f(&mut self.b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_flips_roles_without_moving_data() {
        let mut buffers = DoubleBuffered::new(1, 2);

        assert_eq!(*buffers.curr(), 1);
        assert_eq!(*buffers.prev(), 2);

        buffers.swap();

        assert_eq!(*buffers.curr(), 2);
        assert_eq!(*buffers.prev(), 1);

        let (curr, prev) = buffers.split_mut();

        *curr += 10;

        assert_eq!(*prev, 1);
        assert_eq!(*buffers.curr(), 12);
    }
}
