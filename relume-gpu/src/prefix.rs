use bytemuck::{Pod, Zeroable};
use glam::{vec2, Vec3, Vec4, Vec4Swizzles};

use crate::{Normal, Ray, Reservoir, Vec3Ext, WhiteNoise};

pub const PREFIX_FLAG_VALID: u32 = 1;

/// Endpoint of a camera subpath: the vertex suffixes get attached to.
///
/// One of these lives per pixel in the prefix g-buffer; the same record also
/// serves as the payload of prefix reservoirs.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PrefixVertex {
    pub point: Vec3,
    pub roughness: f32,
    pub normal: Vec3,
    pub flags: u32,
    pub albedo: Vec3,
    /// Generator state right after this prefix was traced; fresh suffixes
    /// for this vertex start here.
    pub rng: u32,
    /// Camera-to-vertex throughput, already divided by the sampling pdf.
    pub throughput: Vec3,
    pub bounces: u32,
}

impl PrefixVertex {
    pub fn is_some(&self) -> bool {
        self.flags & PREFIX_FLAG_VALID != 0
    }

    pub fn offset_point(&self) -> Vec3 {
        self.point + self.normal * Ray::NUDGE_OFFSET
    }

    /// Scalar target function for prefix resampling.
    pub fn target_pdf(&self) -> f32 {
        if self.is_some() {
            self.throughput.luma()
        } else {
            0.0
        }
    }
}

/// Reservoir over camera prefixes; packed into four quads per element.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PrefixReservoir {
    pub reservoir: Reservoir<PrefixVertex>,
}

impl PrefixReservoir {
    pub const STRIDE: usize = 4;

    pub fn read(buffer: &[Vec4], id: usize) -> Self {
        let d0 = buffer[Self::STRIDE * id];
        let d1 = buffer[Self::STRIDE * id + 1];
        let d2 = buffer[Self::STRIDE * id + 2];
        let d3 = buffer[Self::STRIDE * id + 3];

        Self {
            reservoir: Reservoir {
                sample: PrefixVertex {
                    point: d0.xyz(),
                    roughness: d2.w,
                    normal: Normal::decode(d3.xy()),
                    flags: d3.w.to_bits() & 0xff,
                    albedo: d2.xyz(),
                    rng: d3.z.to_bits(),
                    throughput: d1.xyz(),
                    bounces: d3.w.to_bits() >> 8,
                },
                m: d0.w,
                w: d1.w,
            },
        }
    }

    pub fn write(self, buffer: &mut [Vec4], id: usize) {
        let sample = &self.reservoir.sample;

        let d0 = sample.point.extend(self.reservoir.m);
        let d1 = sample.throughput.extend(self.reservoir.w);
        let d2 = sample.albedo.extend(sample.roughness);

        let d3 = Normal::encode(sample.normal)
            .extend(f32::from_bits(sample.rng))
            .extend(f32::from_bits(
                (sample.flags & 0xff) | (sample.bounces << 8),
            ));

        buffer[Self::STRIDE * id] = d0;
        buffer[Self::STRIDE * id + 1] = d1;
        buffer[Self::STRIDE * id + 2] = d2;
        buffer[Self::STRIDE * id + 3] = d3;
    }

    pub fn is_empty(&self) -> bool {
        self.reservoir.is_empty()
    }

    /// Temporal merge of the previous frame's prefix reservoir into the
    /// current one, with confidence-weighted balance-heuristic MIS.
    pub fn merge_temporal(
        &mut self,
        wnoise: &mut WhiteNoise,
        prev: &Self,
        history_cap: f32,
    ) {
        let mut prev = *prev;

        prev.reservoir.clamp_m(history_cap);

        let lhs_pdf = self.reservoir.sample.target_pdf();
        let rhs_pdf = prev.reservoir.sample.target_pdf();

        let denom = self.reservoir.m * lhs_pdf + prev.reservoir.m * rhs_pdf;

        if denom <= 0.0 {
            return;
        }

        let rhs_mis = prev.reservoir.m * rhs_pdf / denom;
        let lhs_mis = 1.0 - rhs_mis;

        let mut out = Reservoir::default();
        let mut out_pdf = 0.0;

        if out.merge(
            wnoise,
            &self.reservoir,
            lhs_mis * lhs_pdf * self.reservoir.w,
        ) {
            out_pdf = lhs_pdf;
        }

        if out.merge(
            wnoise,
            &prev.reservoir,
            rhs_mis * rhs_pdf * prev.reservoir.w,
        ) {
            out_pdf = rhs_pdf;
        }

        out.normalize_mis(out_pdf);

        self.reservoir = out;
    }
}

#[cfg(test)]
mod tests {
    use glam::{vec3, vec4};

    use super::*;

    #[test]
    fn packing_round_trips() {
        let reservoir = PrefixReservoir {
            reservoir: Reservoir {
                sample: PrefixVertex {
                    point: vec3(1.0, -2.0, 3.0),
                    roughness: 0.7,
                    normal: vec3(0.0, 1.0, 0.0),
                    flags: PREFIX_FLAG_VALID,
                    albedo: vec3(0.5, 0.25, 0.125),
                    rng: 0xdeadbeef,
                    throughput: vec3(0.9, 0.8, 0.7),
                    bounces: 3,
                },
                m: 5.0,
                w: 0.625,
            },
        };

        let mut buffer = vec![vec4(0.0, 0.0, 0.0, 0.0); 8];

        reservoir.write(&mut buffer, 1);

        let got = PrefixReservoir::read(&buffer, 1);

        assert_eq!(reservoir.reservoir.m, got.reservoir.m);
        assert_eq!(reservoir.reservoir.w, got.reservoir.w);
        assert_eq!(reservoir.reservoir.sample.point, got.reservoir.sample.point);
        assert_eq!(reservoir.reservoir.sample.rng, got.reservoir.sample.rng);
        assert_eq!(reservoir.reservoir.sample.flags, got.reservoir.sample.flags);
        assert_eq!(
            reservoir.reservoir.sample.bounces,
            got.reservoir.sample.bounces
        );
    }
}
