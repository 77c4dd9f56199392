mod config;
mod delete;
mod install;
mod status;

pub use config::*;
pub use delete::*;
pub use install::*;
pub use status::*;
