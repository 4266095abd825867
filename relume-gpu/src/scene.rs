use glam::Vec3;

use crate::{Hit, Ray, WhiteNoise};

/// Light sample returned by [`SceneView::sample_light()`].
#[derive(Clone, Copy, Debug)]
pub struct LightSample {
    /// Direction from the shaded point toward the light.
    pub dir: Vec3,

    /// Distance to the sampled point on the light.
    pub dist: f32,

    /// Incident radiance, assuming the path to the light is unoccluded.
    pub radiance: Vec3,

    /// Solid-angle pdf of this sample.
    pub pdf: f32,
}

/// The kernels' view of the scene: a queryable ray-intersection and light
/// oracle.
///
/// The actual acceleration structure, material system and light hierarchy
/// live outside of this crate; the resampling engine only ever asks these
/// four questions.
pub trait SceneView: Sync {
    /// Traces a ray and returns its nearest hit, if any.
    fn nearest_hit(&self, ray: Ray) -> Option<Hit>;

    /// Returns whether the segment between two points is occluded.
    fn occluded(&self, from: Vec3, to: Vec3) -> bool;

    /// Samples a point on a light, for next-event estimation.
    fn sample_light(
        &self,
        point: Vec3,
        noise: &mut WhiteNoise,
    ) -> Option<LightSample>;

    /// Radiance of an escaped ray.
    fn sky(&self, _dir: Vec3) -> Vec3 {
        Vec3::ZERO
    }

    /// Whether the scene is frozen for debugging; a frozen scene keeps its
    /// temporal reservoirs byte-for-byte intact across frames.
    fn frozen(&self) -> bool {
        false
    }
}
