use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind relay listener: {0}")]
    Bind(#[source] io::Error),

    #[error("relay server stopped: {0}")]
    Serve(#[source] io::Error),
}
