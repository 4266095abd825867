mod u32_ext;
mod vec3_ext;

pub use self::u32_ext::*;
pub use self::vec3_ext::*;
