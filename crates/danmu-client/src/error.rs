//! Client error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(#[from] danmu_transport::TransportError),
}
