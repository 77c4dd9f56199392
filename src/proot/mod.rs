mod binary;
mod launch;

pub use binary::*;
pub use launch::*;
