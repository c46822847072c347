use std::io;

use thiserror::Error;

/// Errors returned by reactor setup and teardown.
#[derive(Debug, Error)]
pub enum Error {
    /// io_uring setup or operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Ring configuration rejected (bad queue depth, pool size, batch bound).
    #[error("ring setup: {0}")]
    RingSetup(String),
    /// The driver thread could not be started.
    #[error("driver start: {0}")]
    DriverStart(String),
}
