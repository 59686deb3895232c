//! Handle and parameter types crossing the transport boundary

use crate::status::TransferStatus;
use serde::{Deserialize, Serialize};

/// Opaque handle to an open native session.
///
/// Behaves like a file descriptor: a small integer whose meaning is private
/// to the transport implementation. The host core owns exactly one live
/// session per registered device and closes it explicitly; the value may be
/// copied for read-only native calls but ownership is never duplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle(pub i32);

impl SessionHandle {
    /// Sentinel for "no live session", used when a device model is
    /// reconstructed outside the process that opened it.
    pub const INVALID: SessionHandle = SessionHandle(-1);

    /// True unless this is the [`SessionHandle::INVALID`] sentinel.
    pub fn is_valid(&self) -> bool {
        *self != SessionHandle::INVALID
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        SessionHandle::INVALID
    }
}

/// Setup packet parameters for a control transfer on endpoint zero.
///
/// Direction is encoded in bit 7 of `request_type`: set means IN (device to
/// host), clear means OUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSetup {
    /// Request type byte (bmRequestType)
    pub request_type: u8,
    /// Request byte (bRequest)
    pub request: u8,
    /// Value parameter (wValue)
    pub value: u16,
    /// Index parameter (wIndex)
    pub index: u16,
}

impl ControlSetup {
    /// True if bit 7 marks this as an IN (device to host) request.
    pub fn is_in(&self) -> bool {
        (self.request_type & 0x80) != 0
    }
}

/// One discrete asynchronous completion event.
///
/// Delivered on the event-pump thread once the native layer reports the
/// transfer finished. `data` is the submission buffer handed back, truncated
/// to the transferred length for IN transfers.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Final status of the transfer.
    pub status: TransferStatus,
    /// Buffer contents after the transfer.
    pub data: Vec<u8>,
}

/// Completion sink handed to the transport at submission time.
///
/// The transport invokes it exactly once, from inside `process_events`, on
/// whichever thread is driving the pump.
pub type CompletionFn = Box<dyn FnOnce(Completion) + Send>;

/// Opaque handle to a native isochronous packet-descriptor allocation.
///
/// Allocated for a fixed packet count, must be released with
/// `free_iso_packets` once the owning transfer is finished with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IsoPackets(pub u64);
