use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Frame is less than the minimum of {minimum} bytes")]
    FrameTooShort { minimum: usize },

    #[error("Frame does not have ether type {expected:#06x}, found {found:#06x}")]
    WrongEtherType { expected: u16, found: u16 },

    #[error("Frame payload is too small")]
    PayloadTooShort,

    #[error("Frame payload doesn't match address length fields")]
    AddrLenMismatch,
}

pub type Result<T> = std::result::Result<T, PacketError>;
