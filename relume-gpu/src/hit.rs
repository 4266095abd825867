use glam::Vec3;

/// Surface hit returned by the scene oracle.
#[derive(Clone, Copy, Debug)]
pub struct Hit {
    pub t: f32,
    pub point: Vec3,
    pub normal: Vec3,
    pub albedo: Vec3,
    pub roughness: f32,
    pub emission: Vec3,
}

impl Hit {
    /// Returns the hit point nudged away from the surface; shadow and bounce
    /// rays start here.
    pub fn offset_point(&self) -> Vec3 {
        self.point + self.normal * crate::Ray::NUDGE_OFFSET
    }
}
