use core::f32::consts::PI;

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4, Vec4Swizzles};

use crate::{
    pack_rgb9e5, pack_unorm_2x16, unpack_rgb9e5, unpack_unorm_2x16, Normal,
    PrefixVertex, Reservoir, ReservoirLayout, Vec3Ext,
};

pub const SUFFIX_FLAG_HAS_RC: u32 = 1;

/// A light subpath continuation: everything needed to re-attach the suffix
/// to another prefix endpoint without re-tracing it from scratch.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SuffixSample {
    /// Radiance arriving at the prefix endpoint from the suffix.
    pub radiance: Vec3,
    pub flags: u32,
    /// Reconnection vertex position; for escaped suffixes (no reconnection
    /// vertex) this holds the escape direction instead.
    pub rc_point: Vec3,
    /// Generator state the suffix random walk started from; a hybrid shift
    /// replays it from another vertex.
    pub rng: u32,
    pub rc_normal: Vec3,
    pub pad: u32,
}

impl SuffixSample {
    pub fn has_rc(&self) -> bool {
        self.flags & SUFFIX_FLAG_HAS_RC != 0
    }

    /// Direction from given point toward the suffix's first vertex.
    pub fn dir_from(&self, point: Vec3) -> Vec3 {
        if self.has_rc() {
            (self.rc_point - point).normalize()
        } else {
            self.rc_point
        }
    }

    /// Outgoing radiance this suffix contributes when attached to given
    /// prefix endpoint.
    pub fn contribution(&self, vertex: &PrefixVertex) -> Vec3 {
        if !vertex.is_some() {
            return Vec3::ZERO;
        }

        let cos = vertex.normal.dot(self.dir_from(vertex.point)).max(0.0);

        self.radiance * vertex.albedo * (cos / PI)
    }

    /// Scalar target function: luminance of the contribution.
    pub fn target_pdf(&self, vertex: &PrefixVertex) -> f32 {
        self.contribution(vertex).luma()
    }
}

/// Reservoir over suffixes; packed into three quads per element, or two when
/// the compressed layout is active.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SuffixReservoir {
    pub reservoir: Reservoir<SuffixSample>,
}

impl SuffixReservoir {
    /// Sentinel for "no reconnection vertex" in the compressed layout; legal
    /// octahedral packings never hit the exact all-ones word for real
    /// normals.
    const NO_RC: u32 = u32::MAX;

    pub const fn stride(layout: ReservoirLayout) -> usize {
        match layout {
            ReservoirLayout::Full => 3,
            ReservoirLayout::Compressed => 2,
        }
    }

    pub fn read(
        buffer: &[Vec4],
        id: usize,
        layout: ReservoirLayout,
    ) -> Self {
        let base = Self::stride(layout) * id;

        match layout {
            ReservoirLayout::Full => {
                let d0 = buffer[base];
                let d1 = buffer[base + 1];
                let d2 = buffer[base + 2];

                Self {
                    reservoir: Reservoir {
                        sample: SuffixSample {
                            radiance: d0.xyz(),
                            flags: d2.w.to_bits(),
                            rc_point: d1.xyz(),
                            rng: d2.z.to_bits(),
                            rc_normal: Normal::decode(d2.xy()),
                            pad: 0,
                        },
                        m: d0.w,
                        w: d1.w,
                    },
                }
            }

            ReservoirLayout::Compressed => {
                let d0 = buffer[base];
                let d1 = buffer[base + 1];

                let packed_normal = d1.y.to_bits();

                let (rc_normal, flags) = if packed_normal == Self::NO_RC {
                    (Vec3::ZERO, 0)
                } else {
                    (
                        Normal::decode(unpack_unorm_2x16(packed_normal)),
                        SUFFIX_FLAG_HAS_RC,
                    )
                };

                Self {
                    reservoir: Reservoir {
                        sample: SuffixSample {
                            radiance: unpack_rgb9e5(d1.x.to_bits()),
                            flags,
                            rc_point: d0.xyz(),
                            rng: d1.w.to_bits(),
                            rc_normal,
                            pad: 0,
                        },
                        m: d0.w,
                        w: d1.z,
                    },
                }
            }
        }
    }

    pub fn write(
        self,
        buffer: &mut [Vec4],
        id: usize,
        layout: ReservoirLayout,
    ) {
        let base = Self::stride(layout) * id;
        let sample = &self.reservoir.sample;

        match layout {
            ReservoirLayout::Full => {
                buffer[base] = sample.radiance.extend(self.reservoir.m);
                buffer[base + 1] = sample.rc_point.extend(self.reservoir.w);

                buffer[base + 2] = Normal::encode(sample.rc_normal)
                    .extend(f32::from_bits(sample.rng))
                    .extend(f32::from_bits(sample.flags));
            }

            ReservoirLayout::Compressed => {
                let packed_normal = if sample.has_rc() {
                    pack_unorm_2x16(Normal::encode(sample.rc_normal))
                } else {
                    Self::NO_RC
                };

                buffer[base] = sample.rc_point.extend(self.reservoir.m);

                buffer[base + 1] = Vec4::new(
                    f32::from_bits(pack_rgb9e5(sample.radiance)),
                    f32::from_bits(packed_normal),
                    self.reservoir.w,
                    f32::from_bits(sample.rng),
                );
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reservoir.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{vec3, vec4};

    use super::*;

    fn sample() -> SuffixSample {
        SuffixSample {
            radiance: vec3(1.5, 0.25, 0.0625),
            flags: SUFFIX_FLAG_HAS_RC,
            rc_point: vec3(-4.0, 2.0, 9.0),
            rng: 0x12345678,
            rc_normal: vec3(0.0, 0.0, 1.0),
            pad: 0,
        }
    }

    #[test]
    fn full_packing_round_trips() {
        let reservoir = SuffixReservoir {
            reservoir: Reservoir {
                sample: sample(),
                m: 7.0,
                w: 0.125,
            },
        };

        let mut buffer = vec![vec4(0.0, 0.0, 0.0, 0.0); 6];

        reservoir.write(&mut buffer, 1, ReservoirLayout::Full);

        let got = SuffixReservoir::read(&buffer, 1, ReservoirLayout::Full);

        assert_eq!(reservoir, got);
    }

    #[test]
    fn compressed_packing_keeps_semantics() {
        let reservoir = SuffixReservoir {
            reservoir: Reservoir {
                sample: sample(),
                m: 7.0,
                w: 0.125,
            },
        };

        let mut buffer = vec![vec4(0.0, 0.0, 0.0, 0.0); 4];

        reservoir.write(&mut buffer, 0, ReservoirLayout::Compressed);

        let got =
            SuffixReservoir::read(&buffer, 0, ReservoirLayout::Compressed);

        assert_eq!(got.reservoir.m, 7.0);
        assert_eq!(got.reservoir.w, 0.125);
        assert_eq!(got.reservoir.sample.rng, 0x12345678);
        assert!(got.reservoir.sample.has_rc());
        assert_eq!(got.reservoir.sample.rc_point, vec3(-4.0, 2.0, 9.0));

        // Radiance and normal go through lossy packing.
        for c in 0..3 {
            assert_relative_eq!(
                got.reservoir.sample.radiance[c],
                reservoir.reservoir.sample.radiance[c],
                max_relative = 0.01,
            );
        }

        assert!(
            got.reservoir
                .sample
                .rc_normal
                .dot(reservoir.reservoir.sample.rc_normal)
                > 0.999
        );
    }

    #[test]
    fn compressed_packing_keeps_escaped_suffixes() {
        let escaped = SuffixReservoir {
            reservoir: Reservoir {
                sample: SuffixSample {
                    radiance: vec3(0.5, 0.5, 1.0),
                    flags: 0,
                    rc_point: vec3(0.0, 1.0, 0.0),
                    rng: 42,
                    rc_normal: Vec3::ZERO,
                    pad: 0,
                },
                m: 1.0,
                w: 2.0,
            },
        };

        let mut buffer = vec![vec4(0.0, 0.0, 0.0, 0.0); 2];

        escaped.write(&mut buffer, 0, ReservoirLayout::Compressed);

        let got =
            SuffixReservoir::read(&buffer, 0, ReservoirLayout::Compressed);

        assert!(!got.reservoir.sample.has_rc());
        assert_eq!(got.reservoir.sample.rc_point, vec3(0.0, 1.0, 0.0));
    }
}
