//! Library error type (SPEC_FULL §7).

use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("i/o error")]
    Io(#[from] std::io::Error),

    #[error("malformed binary set: {0}")]
    Parse(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid network: address has set bits beyond the CIDR prefix")]
    InvalidNetwork,
}

pub type Result<T> = std::result::Result<T, Error>;
