use std::ops::{Add, AddAssign};

use glam::Vec3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    min: Vec3,
    max: Vec3,
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> Vec3 {
        self.min
    }

    pub fn max(&self) -> Vec3 {
        self.max
    }

    pub fn extent(&self) -> Vec3 {
        self.max() - self.min()
    }

    pub fn center(&self) -> Vec3 {
        0.5 * (self.min() + self.max())
    }

    pub fn is_set(&self) -> bool {
        self.min.x != Self::default().min.x
    }

    /// Squared distance from `p` to the box; zero inside.
    pub fn distance_squared(&self, p: Vec3) -> f32 {
        (p.clamp(self.min, self.max) - p).length_squared()
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new(Vec3::MAX, Vec3::MIN)
    }
}

impl Add<Vec3> for BoundingBox {
    type Output = Self;

    fn add(mut self, rhs: Vec3) -> Self::Output {
        self += rhs;
        self
    }
}

impl AddAssign<Vec3> for BoundingBox {
    fn add_assign(&mut self, rhs: Vec3) {
        self.min = self.min.min(rhs);
        self.max = self.max.max(rhs);
    }
}

impl FromIterator<Vec3> for BoundingBox {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = Vec3>,
    {
        let mut this = Self::default();

        for item in iter {
            this += item;
        }

        this
    }
}

#[cfg(test)]
mod tests {
    use glam::vec3;

    use super::*;

    #[test]
    fn distance_squared() {
        let bb: BoundingBox =
            [vec3(0.0, 0.0, 0.0), vec3(2.0, 2.0, 2.0)].into_iter().collect();

        assert_eq!(bb.distance_squared(vec3(1.0, 1.0, 1.0)), 0.0);
        assert_eq!(bb.distance_squared(vec3(3.0, 1.0, 1.0)), 1.0);
        assert_eq!(bb.distance_squared(vec3(-1.0, -1.0, 1.0)), 2.0);
    }
}
