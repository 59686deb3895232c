//! USB host library
//!
//! Decodes raw USB descriptor buffers into a typed device model and manages
//! the lifecycle of open device connections on top of a pluggable
//! [`transport::UsbTransport`]. The [`UsbHost`] registry deduplicates
//! registrations by device name, shares one native session per device, and
//! runs a single background event pump while asynchronous transfers are in
//! flight.
//!
//! ```
//! use std::sync::Arc;
//! use common::test_support::{ScriptedDevice, ScriptedTransport};
//! use host::UsbHost;
//!
//! let transport = Arc::new(ScriptedTransport::new());
//! transport.add_device("usb:001/004", ScriptedDevice::basic(0x1234, 0x5678));
//!
//! let host = UsbHost::new(transport);
//! let connection = host.register("usb:001/004")?;
//! assert_eq!(connection.device().vendor_id(), 0x1234);
//! for interface in connection.device().interfaces() {
//!     println!("interface {} alt {}", interface.id(), interface.alternate_setting());
//! }
//! connection.close();
//! # Ok::<(), host::Error>(())
//! ```

pub mod connection;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod iso;
pub mod manager;
mod pump;
pub mod snapshot;

pub use connection::{CompletionReceiver, Connection};
pub use device::{Direction, TransferKind, UsbConfiguration, UsbDevice, UsbEndpoint, UsbInterface};
pub use error::{DecodeError, Error, Result};
pub use iso::IsochronousTransfer;
pub use manager::UsbHost;
pub use snapshot::{SnapshotError, restore, snapshot};
