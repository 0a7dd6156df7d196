pub mod camera;
pub mod selection;

pub use camera::*;
pub use selection::*;
