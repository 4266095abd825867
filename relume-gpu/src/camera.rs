use glam::{vec2, IVec2, UVec2, Vec2, Vec3};

use crate::Ray;

/// Pinhole camera, shared between the host and the kernels.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub origin: Vec3,

    /// Screen-space basis: right and up vectors scaled so that one unit
    /// covers half of the screen, and the forward vector.
    pub u: Vec3,
    pub v: Vec3,
    pub w: Vec3,

    pub screen: UVec2,
    pub jitter: Vec2,
}

impl Camera {
    pub fn look_at(
        origin: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y: f32,
        screen: UVec2,
    ) -> Self {
        let w = (target - origin).normalize();
        let u = w.cross(up).normalize();
        let v = u.cross(w);

        let tan_half = (fov_y * 0.5).tan();
        let aspect = screen.x as f32 / screen.y as f32;

        Self {
            origin,
            u: u * tan_half * aspect,
            v: v * tan_half,
            w,
            screen,
            jitter: Vec2::splat(0.5),
        }
    }

    /// Casts a ray from camera's origin through given screen position.
    pub fn primary_ray(&self, pos: UVec2) -> Ray {
        let uv = (pos.as_vec2() + self.jitter) / self.screen.as_vec2();
        let ndc = vec2(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0);

        let dir = (self.w + self.u * ndc.x + self.v * ndc.y).normalize();

        Ray::new(self.origin, dir)
    }

    /// Given a screen position, returns a unique index for it; used to index
    /// screen-space buffers.
    pub fn screen_to_idx(&self, pos: UVec2) -> usize {
        (pos.y * self.screen.x + pos.x) as usize
    }

    pub fn idx_to_screen(&self, idx: usize) -> UVec2 {
        UVec2::new(idx as u32 % self.screen.x, idx as u32 / self.screen.x)
    }

    /// Returns whether given point lays inside the screen.
    pub fn contains(&self, pos: IVec2) -> bool {
        let screen = self.screen.as_ivec2();

        pos.x >= 0 && pos.y >= 0 && pos.x < screen.x && pos.y < screen.y
    }
}
