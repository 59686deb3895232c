//! The background event pump
//!
//! One dedicated OS thread that drives the transport's event processing
//! while asynchronous transfers are outstanding. The registry owns at most
//! one pump; it starts when the first asynchronous transfer is submitted and
//! stops when the last open connection closes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tracing::{debug, error, warn};
use transport::UsbTransport;

/// Handle to the running event-pump thread.
pub(crate) struct EventPump {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EventPump {
    /// Spawn the pump thread. The thread loops over the transport's event
    /// processing until a shutdown is requested.
    pub(crate) fn spawn(transport: Arc<dyn UsbTransport>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let handle = std::thread::Builder::new()
            .name("usb-event-pump".to_string())
            .spawn(move || run(transport, flag))
            .expect("Failed to spawn USB event pump thread");
        debug!("USB event pump started");
        EventPump { shutdown, handle: Some(handle) }
    }

    /// Ask the pump thread to stop after its current event-processing call.
    pub(crate) fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// True once a shutdown has been requested. A stopping pump must not be
    /// handed to new connections; the registry joins it and spawns a fresh
    /// one instead.
    pub(crate) fn is_stopping(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Block until the pump thread exits. Idempotent.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("USB event pump thread panicked during shutdown");
            } else {
                debug!("USB event pump stopped");
            }
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.request_shutdown();
        self.join();
    }
}

fn run(transport: Arc<dyn UsbTransport>, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Acquire) {
        // A panicking completion callback must not take the pump down with it.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            transport.process_events()
        }));
        match result {
            Ok(code) if code < 0 => {
                warn!(code, "event processing reported an error; continuing");
            }
            Ok(_) => {}
            Err(e) => {
                error!("Panic in event processing: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_support::ScriptedTransport;

    #[test]
    fn test_pump_processes_events_until_shutdown() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut pump = EventPump::spawn(transport.clone());
        // Let the loop turn over at least once.
        std::thread::sleep(std::time::Duration::from_millis(20));
        pump.request_shutdown();
        assert!(pump.is_stopping());
        pump.join();
        assert!(transport.counts().process_events > 0);
    }

    #[test]
    fn test_join_is_idempotent() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut pump = EventPump::spawn(transport);
        pump.request_shutdown();
        pump.join();
        pump.join();
    }
}
