pub mod clock;
pub mod conversation;

pub use clock::*;
pub use conversation::*;
