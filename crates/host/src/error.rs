//! Host error types
//!
//! The taxonomy separates caller bugs (`Bounds`, `InvalidState`) from
//! recoverable platform refusals (`PermissionDenied`) and from native
//! transfer failures, which always surface as `Transport` carrying the
//! closed [`TransferStatus`] cause so callers can implement retry policies.

use thiserror::Error;
use transport::TransferStatus;

/// Errors raised by descriptor decoding.
///
/// Only missing or short top-level buffers fail construction; running out of
/// embedded interface or endpoint descriptors is the natural end of
/// enumeration and is not an error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("device descriptor could not be read")]
    MissingDeviceDescriptor,

    #[error("device descriptor too short: {len} bytes")]
    ShortDeviceDescriptor { len: usize },

    #[error("configuration descriptor {index} could not be read")]
    MissingConfigurationDescriptor { index: u8 },

    #[error("configuration descriptor {index} too short: {len} bytes")]
    ShortConfigurationDescriptor { index: u8, len: usize },
}

#[derive(Debug, Error)]
pub enum Error {
    /// The platform refused to open a session for the device.
    #[error("permission denied for device: {device}")]
    PermissionDenied { device: String },

    /// Operation attempted on a connection whose session is already closed.
    #[error("connection has been closed")]
    InvalidState,

    /// Buffer offset/length violates the buffer's capacity. Raised before
    /// any native call; always a caller bug.
    #[error("buffer region out of bounds: offset {offset} + length {length} exceeds {buffer_len}")]
    Bounds { offset: usize, length: usize, buffer_len: usize },

    /// A native transfer or control primitive returned a negative code.
    #[error("transport error: {0}")]
    Transport(TransferStatus),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Native isochronous packet-descriptor allocation failed.
    #[error("failed to allocate isochronous packet descriptors")]
    IsoAllocation,

    /// Native isochronous packet setup failed; distinct from submission
    /// failure, which surfaces as [`Error::Transport`].
    #[error("failed to set up isochronous packets: {status}")]
    IsoSetup { status: TransferStatus },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PermissionDenied { device: "usb:001/004".to_string() };
        assert!(format!("{}", err).contains("usb:001/004"));

        let err = Error::Bounds { offset: 10, length: 20, buffer_len: 16 };
        let msg = format!("{}", err);
        assert!(msg.contains("10"));
        assert!(msg.contains("20"));
        assert!(msg.contains("16"));
    }

    #[test]
    fn test_decode_error_conversion() {
        let err: Error = DecodeError::MissingDeviceDescriptor.into();
        assert!(matches!(err, Error::Decode(DecodeError::MissingDeviceDescriptor)));
    }
}
