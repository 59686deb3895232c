//! Device model snapshots
//!
//! A snapshot is a compact binary encoding of a decoded [`UsbDevice`] tree,
//! suitable for handing the model across a process boundary or parking it
//! while the device is closed. It carries identity and descriptor content
//! only; the session handle is not part of the encoding, so a restored model
//! reports [`transport::SessionHandle::INVALID`] until the device is
//! registered again.

use thiserror::Error;

use crate::device::UsbDevice;

/// Failure while encoding or decoding a device snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to encode device snapshot: {0}")]
    Encode(#[source] postcard::Error),
    #[error("failed to decode device snapshot: {0}")]
    Decode(#[source] postcard::Error),
}

/// Encode the device model.
pub fn snapshot(device: &UsbDevice) -> Result<Vec<u8>, SnapshotError> {
    postcard::to_allocvec(device).map_err(SnapshotError::Encode)
}

/// Decode a device model previously produced by [`snapshot`].
pub fn restore(bytes: &[u8]) -> Result<UsbDevice, SnapshotError> {
    postcard::from_bytes(bytes).map_err(SnapshotError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::UsbHost;
    use common::test_support::{ScriptedDevice, ScriptedTransport};
    use std::sync::Arc;

    fn decoded_device() -> UsbDevice {
        let transport = Arc::new(ScriptedTransport::new());
        transport.add_device("usb:001/004", ScriptedDevice::basic(0x1234, 0x5678));
        let host = UsbHost::new(transport);
        let device = host.register("usb:001/004").unwrap().device().clone();
        host.destroy();
        device
    }

    #[test]
    fn test_round_trip_preserves_the_tree() {
        let device = decoded_device();
        let bytes = snapshot(&device).unwrap();
        let restored = restore(&bytes).unwrap();

        assert_eq!(restored, device);
        assert_eq!(restored.vendor_id(), device.vendor_id());
        assert_eq!(restored.product_id(), device.product_id());
        assert_eq!(restored.serial_number(), device.serial_number());
        assert_eq!(restored.configuration_count(), device.configuration_count());
        assert_eq!(
            restored.configuration(0).unwrap().interfaces(),
            device.configuration(0).unwrap().interfaces()
        );
    }

    #[test]
    fn test_restored_model_has_no_session() {
        let device = decoded_device();
        let restored = restore(&snapshot(&device).unwrap()).unwrap();
        assert!(!restored.session().is_valid());
    }

    #[test]
    fn test_truncated_snapshot_fails_to_decode() {
        let device = decoded_device();
        let bytes = snapshot(&device).unwrap();
        assert!(matches!(restore(&bytes[..bytes.len() / 2]), Err(SnapshotError::Decode(_))));
    }
}
