//! Geographic primitives shared by every map-engine crate.

pub mod bounds;
pub mod color;
pub mod feature;
pub mod geometry;
pub mod names;

pub use bounds::*;
pub use color::{color_from_key, fnv1a32};
pub use feature::*;
pub use geometry::*;
pub use names::{canonicalize_name, derive_owner_from_adjective, normalize_text};
