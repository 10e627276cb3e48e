//! Line-oriented client protocol: request framing in, JSON-shaped replies out

pub mod charset;
pub mod line;
pub mod reply;
pub mod request;

pub use charset::Charset;
pub use line::LineAssembler;
pub use reply::{Reply, ReplyKind, envelope};
pub use request::{Request, RequestLimits, RequestReader};
