use glam::{vec2, vec3, Vec2, Vec3};

/// Packs two `<0.0, 1.0>` floats into a single word, 16 bits each.
pub fn pack_unorm_2x16(v: Vec2) -> u32 {
    let x = (v.x.clamp(0.0, 1.0) * 65535.0).round() as u32;
    let y = (v.y.clamp(0.0, 1.0) * 65535.0).round() as u32;

    x | (y << 16)
}

/// See: [`pack_unorm_2x16()`].
pub fn unpack_unorm_2x16(packed: u32) -> Vec2 {
    vec2(
        (packed & 0xffff) as f32 / 65535.0,
        (packed >> 16) as f32 / 65535.0,
    )
}

/// Packs an HDR color into the shared-exponent RGB9E5 format; used by the
/// compressed reservoir layout.
pub fn pack_rgb9e5(color: Vec3) -> u32 {
    const MAX: f32 = 65408.0;

    let r = color.x.clamp(0.0, MAX);
    let g = color.y.clamp(0.0, MAX);
    let b = color.z.clamp(0.0, MAX);

    let max_channel = r.max(g).max(b);

    // `log2(0.0)` is -inf, which `as i32` saturates to `i32::MIN`, so the
    // black case falls out of the `max()` below on its own.
    let mut exp = ((max_channel.log2().floor() as i32).max(-16) + 16)
        .clamp(0, 31);

    let mut scale = ((exp - 15 - 9) as f32).exp2();

    if (max_channel / scale).round() as u32 == 512 {
        exp += 1;
        scale *= 2.0;
    }

    let r = ((r / scale).round() as u32).min(511);
    let g = ((g / scale).round() as u32).min(511);
    let b = ((b / scale).round() as u32).min(511);

    r | (g << 9) | (b << 18) | ((exp as u32) << 27)
}

/// See: [`pack_rgb9e5()`].
pub fn unpack_rgb9e5(packed: u32) -> Vec3 {
    let exp = (packed >> 27) as i32;
    let scale = ((exp - 15 - 9) as f32).exp2();

    vec3(
        (packed & 0x1ff) as f32,
        ((packed >> 9) & 0x1ff) as f32,
        ((packed >> 18) & 0x1ff) as f32,
    ) * scale
}
