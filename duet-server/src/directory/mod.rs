mod directory_actor;
mod directory_command;

pub use directory_actor::*;
pub use directory_command::*;
