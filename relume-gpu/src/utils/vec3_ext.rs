use glam::Vec3;

pub trait Vec3Ext
where
    Self: Sized,
{
    /// Returns the luminance of given color; used as the scalar target
    /// function for resampling.
    fn luma(self) -> f32;
}

impl Vec3Ext for Vec3 {
    fn luma(self) -> f32 {
        self.dot(Vec3::new(0.2126, 0.7152, 0.0722))
    }
}
