mod ar;
mod decompress;
mod materialize;

pub use ar::*;
pub use decompress::*;
pub use materialize::*;
