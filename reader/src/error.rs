use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum Error {
    #[error("Card data error: {0}")]
    Data(#[from] siread_common::error::Error),
    #[error("Timed out waiting for the station")]
    Timeout,
    #[error("Unexpected message: received command {received:#04X}, expected {expected:#04X}")]
    UnexpectedMessage { received: u8, expected: u8 },
    #[error("{0}")]
    ConfigurationMismatch(String),
    #[error("Master station did not answer to startup sequence (high/low baud)")]
    StartupTimeout,
    #[error("Serial port error: {0}")]
    Port(String),
}
