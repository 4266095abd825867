use glam::Vec3;

#[derive(Clone, Copy, Debug, Default)]
pub struct Ray {
    origin: Vec3,
    dir: Vec3,
    len: f32,
}

impl Ray {
    /// How far to move a ray origin away from the surface it starts on, to
    /// avoid self-intersection.
    pub const NUDGE_OFFSET: f32 = 1e-3;

    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self {
            origin,
            dir,
            len: f32::MAX,
        }
    }

    pub fn with_len(mut self, len: f32) -> Self {
        self.len = len;
        self
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn dir(&self) -> Vec3 {
        self.dir
    }

    pub fn len(&self) -> f32 {
        self.len
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }
}
