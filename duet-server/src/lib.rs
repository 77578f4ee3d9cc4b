pub mod directory;
pub mod error;
mod relay;
pub mod signaling;

pub use directory::{DirectoryActor, DirectoryCommand, DirectoryHandle};
pub use error::RelayError;
pub use relay::{RelayConfig, router, serve, serve_on};
pub use signaling::{RelayService, ws_handler};
