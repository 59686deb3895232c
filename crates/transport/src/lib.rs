//! Transport boundary contract for usb-host-rs
//!
//! This crate defines the capability interface between the host library and
//! the native USB transport layer. The host core never talks to the platform
//! directly; it consumes an implementation of [`UsbTransport`] that provides
//! raw descriptor buffers, opaque session handles, and transfer primitives
//! returning small integer result codes.
//!
//! # Example
//!
//! ```
//! use transport::{Speed, TransferStatus};
//!
//! // Native result codes map onto a closed status enum.
//! assert_eq!(TransferStatus::from_code(-7), TransferStatus::Timeout);
//! assert_eq!(TransferStatus::Timeout.code(), -7);
//!
//! // Unknown speed codes fall back to Unknown.
//! assert_eq!(Speed::from_code(42), Speed::Unknown);
//! ```

pub mod capability;
pub mod speed;
pub mod status;
pub mod types;

pub use capability::UsbTransport;
pub use speed::Speed;
pub use status::TransferStatus;
pub use types::{Completion, CompletionFn, ControlSetup, IsoPackets, SessionHandle};
