//! Native transfer result codes
//!
//! Every transfer and control primitive on the transport boundary returns a
//! small integer: a non-negative byte count on success or a negative code on
//! failure. This module maps those codes onto a closed enumeration so callers
//! can implement retry policies without matching on raw integers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result code returned by native transfer and control primitives.
///
/// The numeric values follow the libusb convention: `0` is success and
/// failures are small negative integers. Codes outside the known set map to
/// [`TransferStatus::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Success (no error)
    Success,
    /// Input/output error
    Io,
    /// Invalid parameter
    InvalidParam,
    /// Access denied (insufficient permissions)
    Access,
    /// No such device (it may have been disconnected)
    NoDevice,
    /// Entity not found
    NotFound,
    /// Resource busy
    Busy,
    /// Operation timed out
    Timeout,
    /// Overflow
    Overflow,
    /// Pipe error (endpoint stalled)
    Pipe,
    /// System call interrupted (perhaps due to signal)
    Interrupted,
    /// Insufficient memory
    NoMem,
    /// Operation not supported or unimplemented on this platform
    NotSupported,
    /// Other error
    Other,
}

impl TransferStatus {
    /// Map a native result code to a status.
    ///
    /// Non-negative codes are [`TransferStatus::Success`]; unknown negative
    /// codes collapse to [`TransferStatus::Other`].
    pub fn from_code(code: i32) -> Self {
        match code {
            c if c >= 0 => TransferStatus::Success,
            -1 => TransferStatus::Io,
            -2 => TransferStatus::InvalidParam,
            -3 => TransferStatus::Access,
            -4 => TransferStatus::NoDevice,
            -5 => TransferStatus::NotFound,
            -6 => TransferStatus::Busy,
            -7 => TransferStatus::Timeout,
            -8 => TransferStatus::Overflow,
            -9 => TransferStatus::Pipe,
            -10 => TransferStatus::Interrupted,
            -11 => TransferStatus::NoMem,
            -12 => TransferStatus::NotSupported,
            _ => TransferStatus::Other,
        }
    }

    /// The canonical native code for this status.
    pub fn code(&self) -> i32 {
        match self {
            TransferStatus::Success => 0,
            TransferStatus::Io => -1,
            TransferStatus::InvalidParam => -2,
            TransferStatus::Access => -3,
            TransferStatus::NoDevice => -4,
            TransferStatus::NotFound => -5,
            TransferStatus::Busy => -6,
            TransferStatus::Timeout => -7,
            TransferStatus::Overflow => -8,
            TransferStatus::Pipe => -9,
            TransferStatus::Interrupted => -10,
            TransferStatus::NoMem => -11,
            TransferStatus::NotSupported => -12,
            TransferStatus::Other => -99,
        }
    }

    /// True for the success status.
    pub fn is_success(&self) -> bool {
        matches!(self, TransferStatus::Success)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TransferStatus::Success => "success",
            TransferStatus::Io => "input/output error",
            TransferStatus::InvalidParam => "invalid parameter",
            TransferStatus::Access => "access denied",
            TransferStatus::NoDevice => "no such device",
            TransferStatus::NotFound => "entity not found",
            TransferStatus::Busy => "resource busy",
            TransferStatus::Timeout => "operation timed out",
            TransferStatus::Overflow => "overflow",
            TransferStatus::Pipe => "pipe error",
            TransferStatus::Interrupted => "system call interrupted",
            TransferStatus::NoMem => "insufficient memory",
            TransferStatus::NotSupported => "operation not supported",
            TransferStatus::Other => "other error",
        };
        write!(f, "{}", text)
    }
}
