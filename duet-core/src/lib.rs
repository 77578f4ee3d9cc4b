pub mod model;
pub mod registry;
pub mod role;
pub mod utils;

pub use model::*;
pub use registry::RoomRegistry;
pub use role::{Role, RoleConflict, assign_role};
