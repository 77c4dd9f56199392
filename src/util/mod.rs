mod dir_size;
mod expand_tilde;
mod output;

pub use dir_size::*;
pub use expand_tilde::*;
pub use output::*;
