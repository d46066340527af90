//! Sky coordinates and their projection onto exposure pixels

pub mod angle;
pub mod transform;

pub use angle::Angle;
pub use transform::{pixel_delta, pixel_delta_at_scale, PlateSolution, DEFAULT_PLATE_SCALE};
