mod arena;
mod bounding_box;

pub use self::arena::*;
pub use self::bounding_box::*;
