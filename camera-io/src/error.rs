use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not open camera: {0}")]
    Open(String),
    #[error("unknown camera property `{0}`")]
    UnknownProperty(String),
    #[error("value for property `{0}` is out of range")]
    OutOfRange(String),
    #[error("camera is not connected")]
    NotConnected,
}
