mod delete;
mod env_struct;
mod state;

pub use env_struct::*;
pub use state::*;
