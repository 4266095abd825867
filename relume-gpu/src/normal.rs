use glam::{vec2, vec3, Vec2, Vec3, Vec3Swizzles};

pub struct Normal;

impl Normal {
    /// Compresses a unit vector into two `<0.0, 1.0>` floats using
    /// octahedron-normal mapping.
    pub fn encode(n: Vec3) -> Vec2 {
        let n = n / (n.x.abs() + n.y.abs() + n.z.abs());

        let n = if n.z >= 0.0 {
            n.xy()
        } else {
            vec2(
                (1.0 - n.y.abs()).copysign(n.x),
                (1.0 - n.x.abs()).copysign(n.y),
            )
        };

        n * 0.5 + 0.5
    }

    /// See: [`Self::encode()`].
    pub fn decode(n: Vec2) -> Vec3 {
        let n = n * 2.0 - 1.0;
        let mut n = vec3(n.x, n.y, 1.0 - n.x.abs() - n.y.abs());
        let t = (-n.z).max(0.0);

        n.x -= t.copysign(n.x);
        n.y -= t.copysign(n.y);
        n.normalize()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn round_trips() {
        let cases = [
            vec3(0.0, 1.0, 0.0),
            vec3(0.0, -1.0, 0.0),
            vec3(1.0, 0.0, 0.0),
            vec3(0.0, 0.0, -1.0),
            vec3(0.5, -0.5, 0.7071).normalize(),
            vec3(-0.3, 0.9, -0.1).normalize(),
        ];

        for n in cases {
            let decoded = Normal::decode(Normal::encode(n));

            assert_relative_eq!(n.x, decoded.x, epsilon = 1e-6);
            assert_relative_eq!(n.y, decoded.y, epsilon = 1e-6);
            assert_relative_eq!(n.z, decoded.z, epsilon = 1e-6);
        }
    }
}
