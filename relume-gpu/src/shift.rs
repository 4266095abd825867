use glam::Vec3;

use crate::{
    trace_suffix, PrefixVertex, SceneView, SuffixSample, WhiteNoise,
};

/// How paths sampled for one pixel get mapped onto another pixel's domain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ShiftMapping {
    /// Deterministically reconnect to the stored reconnection vertex; cheap,
    /// but inadmissible near specular surfaces.
    Reconnection,

    /// Try reconnection first, fall back to replaying the suffix's random
    /// walk from the target vertex at the cost of extra ray queries.
    #[default]
    Hybrid,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShiftSettings {
    /// Reconnection is rejected when the receiving surface is glossier than
    /// this; a near-specular lobe makes the reconnected direction land on a
    /// discontinuous part of the BSDF.
    pub specular_roughness_threshold: f32,

    /// Reconnection is rejected when the reconnection segment would be
    /// shorter than this.
    pub near_field_distance_threshold: f32,
}

impl Default for ShiftSettings {
    fn default() -> Self {
        Self {
            specular_roughness_threshold: 0.2,
            near_field_distance_threshold: 0.05,
        }
    }
}

/// Outcome of a shift-mapping evaluation.
///
/// An invalid shift is not an error: the candidate simply contributes zero
/// weight to the resampling step.
#[derive(Clone, Copy, Debug)]
pub struct Shift {
    pub valid: bool,
    pub jacobian: f32,
    pub sample: SuffixSample,
}

impl Shift {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            jacobian: 0.0,
            sample: SuffixSample::default(),
        }
    }
}

/// Cheap admissibility predicate for reconnection; no rays are cast.
///
/// Also used by the workload scheduler to skip (pixel, neighbour) pairs that
/// cannot possibly need a retrace.
pub fn reconnection_admissible(
    sample: &SuffixSample,
    vertex: &PrefixVertex,
    settings: &ShiftSettings,
) -> bool {
    sample.has_rc()
        && vertex.is_some()
        && vertex.roughness >= settings.specular_roughness_threshold
        && vertex.point.distance(sample.rc_point)
            >= settings.near_field_distance_threshold
}

/// Change of measure at the reconnection vertex when moving the connecting
/// segment's origin from `src_point` to `dst_point`: the solid-angle-to-area
/// ratio of both segments.
pub fn reconnection_jacobian(
    src_point: Vec3,
    dst_point: Vec3,
    rc_point: Vec3,
    rc_normal: Vec3,
) -> f32 {
    let to_src = src_point - rc_point;
    let to_dst = dst_point - rc_point;

    let d2_src = to_src.length_squared();
    let d2_dst = to_dst.length_squared();

    if d2_src <= 0.0 || d2_dst <= 0.0 {
        return 0.0;
    }

    let cos_src = rc_normal.dot(to_src / d2_src.sqrt()).abs();
    let cos_dst = rc_normal.dot(to_dst / d2_dst.sqrt()).abs();

    if cos_src <= 1e-6 {
        return 0.0;
    }

    (cos_dst / cos_src) * (d2_src / d2_dst)
}

/// Re-evaluates a suffix sampled at `src_vertex` as if it had been sampled
/// at `dst_vertex`.
pub fn shift_suffix(
    scene: &dyn SceneView,
    settings: &ShiftSettings,
    mapping: ShiftMapping,
    src: &SuffixSample,
    src_vertex: &PrefixVertex,
    dst_vertex: &PrefixVertex,
    max_bounces: u32,
) -> Shift {
    if !dst_vertex.is_some() {
        return Shift::invalid();
    }

    if src_vertex.is_some() && reconnection_admissible(src, dst_vertex, settings)
    {
        if scene.occluded(dst_vertex.offset_point(), src.rc_point) {
            return Shift::invalid();
        }

        let jacobian = reconnection_jacobian(
            src_vertex.point,
            dst_vertex.point,
            src.rc_point,
            src.rc_normal,
        );

        if !jacobian.is_finite() || jacobian <= 0.0 {
            return Shift::invalid();
        }

        return Shift {
            valid: true,
            jacobian,
            sample: *src,
        };
    }

    match mapping {
        ShiftMapping::Reconnection => Shift::invalid(),

        ShiftMapping::Hybrid => {
            // Replay the suffix's random walk from the target vertex; an
            // identity mapping in primary sample space, so the jacobian is
            // one.
            let mut wnoise = WhiteNoise::from_state(src.rng);
            let traced =
                trace_suffix(scene, dst_vertex, &mut wnoise, max_bounces);

            Shift {
                valid: true,
                jacobian: 1.0,
                sample: traced.sample,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::vec3;

    use super::*;

    /// Shifting there and back again must cancel: the product of the forward
    /// and inverse jacobians is one.
    #[test]
    fn jacobian_round_trips() {
        let cases = [
            (vec3(0.0, 1.0, 0.0), vec3(0.5, 1.5, -0.25)),
            (vec3(-2.0, 0.5, 1.0), vec3(2.0, 3.0, 0.0)),
            (vec3(0.1, 0.1, 0.1), vec3(4.0, 0.2, -1.0)),
        ];

        let rc_point = vec3(0.0, 0.0, -3.0);
        let rc_normal = vec3(0.0, 0.3, 1.0).normalize();

        for (src, dst) in cases {
            let fwd = reconnection_jacobian(src, dst, rc_point, rc_normal);
            let inv = reconnection_jacobian(dst, src, rc_point, rc_normal);

            assert_relative_eq!(fwd * inv, 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn jacobian_is_one_for_identity_shift() {
        let point = vec3(1.0, 2.0, 3.0);

        let jacobian = reconnection_jacobian(
            point,
            point,
            vec3(0.0, 0.0, 0.0),
            vec3(0.0, 1.0, 0.0).normalize(),
        );

        assert_relative_eq!(jacobian, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn near_specular_receiver_is_inadmissible() {
        let settings = ShiftSettings::default();

        let sample = SuffixSample {
            flags: crate::SUFFIX_FLAG_HAS_RC,
            rc_point: vec3(0.0, 5.0, 0.0),
            ..Default::default()
        };

        let mut vertex = PrefixVertex {
            flags: crate::PREFIX_FLAG_VALID,
            roughness: 0.05,
            ..Default::default()
        };

        assert!(!reconnection_admissible(&sample, &vertex, &settings));

        vertex.roughness = 0.8;

        assert!(reconnection_admissible(&sample, &vertex, &settings));
    }

    #[test]
    fn short_segment_is_inadmissible() {
        let settings = ShiftSettings::default();

        let sample = SuffixSample {
            flags: crate::SUFFIX_FLAG_HAS_RC,
            rc_point: vec3(0.0, 0.01, 0.0),
            ..Default::default()
        };

        let vertex = PrefixVertex {
            flags: crate::PREFIX_FLAG_VALID,
            roughness: 1.0,
            ..Default::default()
        };

        assert!(!reconnection_admissible(&sample, &vertex, &settings));
    }
}
