//! Kernel-side structs and algorithms shared by Relume's resampling passes.
//!
//! Everything in this crate is written the way a wide data-parallel kernel
//! would run it: plain math over `glam` types, buffer I/O through packed
//! `Vec4` quads, and no allocation on the per-pixel paths. The host crate
//! (`relume`) owns buffer lifecycles and drives these routines one barrier
//! phase at a time.

mod camera;
mod hit;
mod mis;
mod noise;
mod normal;
mod prefix;
mod ray;
mod reservoir;
mod scene;
mod shift;
mod trace;
mod utils;

pub use self::camera::*;
pub use self::hit::*;
pub use self::mis::*;
pub use self::noise::*;
pub use self::normal::*;
pub use self::prefix::*;
pub use self::ray::*;
pub use self::reservoir::*;
pub use self::scene::*;
pub use self::shift::*;
pub use self::trace::*;
pub use self::utils::*;

pub mod prelude {
    pub use core::f32::consts::PI;

    pub use glam::*;

    pub use crate::*;
}
