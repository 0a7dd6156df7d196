pub mod cache;
pub mod history;
pub mod pipeline;
pub mod protocol;
pub mod request;
pub mod source;

pub use cache::*;
pub use history::*;
pub use pipeline::*;
pub use protocol::*;
pub use request::*;
pub use source::*;
