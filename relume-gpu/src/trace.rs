use core::f32::consts::PI;

use glam::{UVec2, Vec3};

use crate::{
    Camera, Hit, PrefixVertex, Ray, SceneView, SuffixSample, Vec3Ext,
    WhiteNoise, PREFIX_FLAG_VALID, SUFFIX_FLAG_HAS_RC,
};

/// Freshly traced suffix together with the solid-angle pdf of its first
/// segment; the caller turns the pair into an initial reservoir.
#[derive(Clone, Copy, Debug)]
pub struct TracedSuffix {
    pub sample: SuffixSample,
    pub pdf: f32,
}

/// Traces a camera subpath of `min_len` diffuse bounces and returns its
/// endpoint; an escaped prefix yields an invalid vertex.
pub fn trace_prefix(
    scene: &dyn SceneView,
    camera: &Camera,
    pixel: UVec2,
    wnoise: &mut WhiteNoise,
    min_len: u32,
) -> PrefixVertex {
    let mut ray = camera.primary_ray(pixel);
    let mut throughput = Vec3::ONE;
    let mut bounces = 0;

    loop {
        let Some(hit) = scene.nearest_hit(ray) else {
            return PrefixVertex::default();
        };

        bounces += 1;

        if bounces >= min_len {
            return PrefixVertex {
                point: hit.point,
                roughness: hit.roughness,
                normal: hit.normal,
                flags: PREFIX_FLAG_VALID,
                albedo: hit.albedo,
                rng: wnoise.state(),
                throughput,
                bounces,
            };
        }

        // Cosine-weighted continuation: the cos / PI factor cancels against
        // the pdf, leaving just the albedo.
        throughput *= hit.albedo;
        ray = Ray::new(hit.offset_point(), wnoise.sample_hemisphere(hit.normal));
    }
}

/// Traces a fresh suffix from given prefix endpoint: one bounce to the
/// reconnection vertex, next-event estimation there, and up to
/// `max_bounces - 1` further folded-in bounces.
pub fn trace_suffix(
    scene: &dyn SceneView,
    vertex: &PrefixVertex,
    wnoise: &mut WhiteNoise,
    max_bounces: u32,
) -> TracedSuffix {
    let seed = wnoise.state();
    let dir = wnoise.sample_hemisphere(vertex.normal);
    let pdf = vertex.normal.dot(dir).max(0.0) / PI;

    let Some(rc) = scene.nearest_hit(Ray::new(vertex.offset_point(), dir))
    else {
        return TracedSuffix {
            sample: SuffixSample {
                radiance: scene.sky(dir),
                flags: 0,
                rc_point: dir,
                rng: seed,
                rc_normal: Vec3::ZERO,
                pad: 0,
            },
            pdf,
        };
    };

    let mut radiance = rc.emission + next_event(scene, &rc, wnoise);

    if max_bounces > 1 {
        radiance += continuation(scene, rc, wnoise, max_bounces - 1);
    }

    TracedSuffix {
        sample: SuffixSample {
            radiance,
            flags: SUFFIX_FLAG_HAS_RC,
            rc_point: rc.point,
            rng: seed,
            rc_normal: rc.normal,
            pad: 0,
        },
        pdf,
    }
}

/// Next-event estimation at given surface point.
fn next_event(scene: &dyn SceneView, hit: &Hit, wnoise: &mut WhiteNoise) -> Vec3 {
    let Some(light) = scene.sample_light(hit.offset_point(), wnoise) else {
        return Vec3::ZERO;
    };

    if light.pdf <= 0.0 {
        return Vec3::ZERO;
    }

    let cos = hit.normal.dot(light.dir).max(0.0);

    if cos <= 0.0 || light.radiance.luma() <= 0.0 {
        return Vec3::ZERO;
    }

    let target = hit.offset_point() + light.dir * light.dist;

    if scene.occluded(hit.offset_point(), target) {
        return Vec3::ZERO;
    }

    light.radiance * hit.albedo * (cos / PI) / light.pdf
}

/// Random walk continuing past the reconnection vertex; emission at the
/// visited vertices is skipped since next-event estimation covers it.
fn continuation(
    scene: &dyn SceneView,
    from: Hit,
    wnoise: &mut WhiteNoise,
    bounces: u32,
) -> Vec3 {
    let mut radiance = Vec3::ZERO;
    let mut throughput = Vec3::ONE;
    let mut hit = from;

    for _ in 0..bounces {
        throughput *= hit.albedo;

        let dir = wnoise.sample_hemisphere(hit.normal);

        match scene.nearest_hit(Ray::new(hit.offset_point(), dir)) {
            Some(next) => {
                hit = next;
                radiance += throughput * next_event(scene, &hit, wnoise);
            }

            None => {
                radiance += throughput * scene.sky(dir);
                break;
            }
        }
    }

    radiance
}
