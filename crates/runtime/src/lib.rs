pub mod animation;
pub mod frame;
pub mod lifecycle;
pub mod timers;

pub use animation::*;
pub use frame::*;
pub use lifecycle::*;
pub use timers::*;
