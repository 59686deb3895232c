//! The device registry
//!
//! [`UsbHost`] owns every open connection and the single background event
//! pump. Registration deduplicates by device name, so two callers asking for
//! the same device share one connection and one session. One lock covers the
//! connection cache and the pump; the close hooks run under it so the pump's
//! lifetime tracks the cache size exactly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, info};
use transport::{SessionHandle, UsbTransport};

use crate::connection::Connection;
use crate::descriptor::decode_device;
use crate::device::UsbDevice;
use crate::error::{Error, Result};
use crate::pump::EventPump;

/// The host-side registry of open USB connections.
pub struct UsbHost {
    shared: Arc<HostShared>,
}

pub(crate) struct HostShared {
    transport: Arc<dyn UsbTransport>,
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<String, Connection>,
    pump: Option<EventPump>,
}

impl UsbHost {
    pub fn new(transport: Arc<dyn UsbTransport>) -> Self {
        UsbHost {
            shared: Arc::new(HostShared { transport, state: Mutex::new(RegistryState::default()) }),
        }
    }

    /// Open a connection to the named device, or return the existing one.
    ///
    /// The name is the device's identity: registering a name that is already
    /// open hands back the same shared connection without touching the
    /// transport.
    pub fn register(&self, name: &str) -> Result<Connection> {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(existing) = state.connections.get(name) {
            debug!(device = name, "already registered, reusing connection");
            return Ok(existing.clone());
        }

        let session = self
            .shared
            .transport
            .open_session(name)
            .ok_or_else(|| Error::PermissionDenied { device: name.to_string() })?;

        let device = match decode_device(self.shared.transport.as_ref(), session, name) {
            Ok(device) => device,
            Err(e) => {
                self.shared.transport.close_session(session);
                return Err(e.into());
            }
        };

        info!(
            device = name,
            vendor_id = format_args!("{:#06x}", device.vendor_id()),
            product_id = format_args!("{:#06x}", device.product_id()),
            "registered device"
        );
        let connection = Connection::new(device, session, Arc::downgrade(&self.shared));
        state.connections.insert(name.to_string(), connection.clone());
        Ok(connection)
    }

    /// The open connection for the named device, if any.
    pub fn connection(&self, name: &str) -> Option<Connection> {
        self.shared.state.lock().unwrap().connections.get(name).cloned()
    }

    /// Close and remove the connection for the named device. A name that is
    /// not registered is a no-op.
    pub fn unregister(&self, name: &str) {
        if let Some(connection) = self.connection(name) {
            connection.close();
        }
    }

    /// A snapshot of every registered device's model, keyed by device name.
    pub fn device_list(&self) -> HashMap<String, UsbDevice> {
        let state = self.shared.state.lock().unwrap();
        state.connections.iter().map(|(name, c)| (name.clone(), c.device().clone())).collect()
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.shared.state.lock().unwrap().connections.len()
    }

    /// True while the event pump thread is running and not shutting down.
    pub fn is_pump_running(&self) -> bool {
        let state = self.shared.state.lock().unwrap();
        state.pump.as_ref().is_some_and(|p| !p.is_stopping())
    }

    /// Close every connection and stop the event pump.
    pub fn destroy(&self) {
        let connections: Vec<Connection> = {
            let state = self.shared.state.lock().unwrap();
            state.connections.values().cloned().collect()
        };
        for connection in connections {
            connection.close();
        }
        // The last close already stops the pump; anything left is stale.
        if let Some(mut pump) = self.shared.state.lock().unwrap().pump.take() {
            pump.request_shutdown();
            pump.join();
        }
        info!("USB host destroyed");
    }
}

impl Drop for UsbHost {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl HostShared {
    pub(crate) fn transport(&self) -> &Arc<dyn UsbTransport> {
        &self.transport
    }

    /// Ensure the event pump is running. A pump that is mid-shutdown is
    /// joined and replaced, so a transfer submitted while the previous last
    /// connection closes still gets its events processed.
    pub(crate) fn start_pump_if_needed(&self) {
        let mut state = self.state.lock().unwrap();
        let stale = state.pump.as_ref().is_some_and(|p| p.is_stopping());
        if stale {
            if let Some(mut old) = state.pump.take() {
                old.request_shutdown();
                old.join();
            }
        }
        if state.pump.is_none() {
            state.pump = Some(EventPump::spawn(self.transport.clone()));
        }
    }

    /// Remove a closing connection from the cache and run the pump hooks:
    /// the pump is asked to stop while the last connection is closing and
    /// joined once the cache is empty.
    pub(crate) fn finish_close(&self, name: &str, session: SessionHandle) {
        let pump = {
            let mut state = self.state.lock().unwrap();
            if state.connections.remove(name).is_none() {
                return;
            }
            if state.connections.is_empty() {
                if let Some(pump) = &state.pump {
                    pump.request_shutdown();
                }
            }
            self.transport.close_session(session);
            if state.connections.is_empty() { state.pump.take() } else { None }
        };
        if let Some(mut pump) = pump {
            pump.join();
        }
        debug!(device = name, "connection closed");
    }
}

pub(crate) type HostRef = Weak<HostShared>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_support::{ScriptedDevice, ScriptedTransport};

    fn host_with(devices: &[&str]) -> (Arc<ScriptedTransport>, UsbHost) {
        let transport = Arc::new(ScriptedTransport::new());
        for (i, name) in devices.iter().enumerate() {
            transport.add_device(name, ScriptedDevice::basic(0x1234, 0x5678 + i as u16));
        }
        let host = UsbHost::new(transport.clone());
        (transport, host)
    }

    #[test]
    fn test_register_deduplicates_by_name() {
        let (transport, host) = host_with(&["usb:001/004"]);
        let first = host.register("usb:001/004").unwrap();
        let second = host.register("usb:001/004").unwrap();
        assert_eq!(first.device().session(), second.device().session());
        assert_eq!(host.connection_count(), 1);
        assert_eq!(transport.counts().open_session, 1);
    }

    #[test]
    fn test_register_denied_access() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut device = ScriptedDevice::basic(0x1234, 0x5678);
        device.deny_open = true;
        transport.add_device("usb:001/004", device);
        let host = UsbHost::new(transport.clone());

        let err = host.register("usb:001/004").unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
        assert_eq!(host.connection_count(), 0);
    }

    #[test]
    fn test_failed_decode_closes_session() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut device = ScriptedDevice::basic(0x1234, 0x5678);
        device.descriptor = None;
        transport.add_device("usb:001/004", device);
        let host = UsbHost::new(transport.clone());

        assert!(host.register("usb:001/004").is_err());
        assert_eq!(host.connection_count(), 0);
        assert_eq!(transport.open_sessions(), 0);
    }

    #[test]
    fn test_device_list_reflects_registrations() {
        let (_transport, host) = host_with(&["usb:001/004", "usb:001/005"]);
        host.register("usb:001/004").unwrap();
        host.register("usb:001/004").unwrap();
        host.register("usb:001/005").unwrap();

        let devices = host.device_list();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices["usb:001/004"].name(), "usb:001/004");
        assert_eq!(devices["usb:001/005"].name(), "usb:001/005");

        host.unregister("usb:001/005");
        assert!(!host.device_list().contains_key("usb:001/005"));
    }

    #[test]
    fn test_destroy_closes_all_sessions() {
        let (transport, host) = host_with(&["usb:001/004", "usb:001/005"]);
        host.register("usb:001/004").unwrap();
        host.register("usb:001/005").unwrap();
        host.destroy();
        assert_eq!(host.connection_count(), 0);
        assert_eq!(transport.open_sessions(), 0);
        assert!(!host.is_pump_running());
    }
}
