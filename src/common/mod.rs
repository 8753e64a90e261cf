mod id;
mod messages;
mod peer;

pub use id::*;
pub use messages::*;
pub use peer::*;
