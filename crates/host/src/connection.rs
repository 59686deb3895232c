//! Open device connections
//!
//! A [`Connection`] is the shared handle the registry hands out for one
//! open device. Clones share the same session; the connection stays open
//! until [`Connection::close`] runs or the host is destroyed. All transfer
//! and administrative operations live here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::trace;
use transport::{Completion, CompletionFn, ControlSetup, SessionHandle, TransferStatus};

use crate::device::UsbDevice;
use crate::error::{DecodeError, Error, Result};
use crate::manager::{HostRef, HostShared};

/// A shared handle to one open device connection.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

#[derive(Debug)]
struct ConnectionInner {
    device: UsbDevice,
    session: SessionHandle,
    host: HostRef,
    closed: AtomicBool,
}

/// Receiver for the completion of one asynchronous transfer.
///
/// Exactly one [`Completion`] arrives per successful submission, delivered
/// from the event-pump thread.
#[derive(Debug)]
pub struct CompletionReceiver {
    receiver: async_channel::Receiver<Completion>,
}

impl CompletionReceiver {
    /// Await the completion.
    pub async fn recv(&self) -> Result<Completion> {
        self.receiver.recv().await.map_err(|_| Error::InvalidState)
    }

    /// Block the current thread until the completion arrives.
    pub fn recv_blocking(&self) -> Result<Completion> {
        self.receiver.recv_blocking().map_err(|_| Error::InvalidState)
    }

    /// The completion, if it has already arrived.
    pub fn try_recv(&self) -> Option<Completion> {
        self.receiver.try_recv().ok()
    }
}

/// Reject a transfer region that does not fit its buffer before anything
/// reaches the transport.
fn check_bounds(offset: usize, length: usize, buffer_len: usize) -> Result<()> {
    let out_of_bounds = Error::Bounds { offset, length, buffer_len };
    match offset.checked_add(length) {
        Some(end) if end <= buffer_len => Ok(()),
        _ => Err(out_of_bounds),
    }
}

/// Map a native transfer result to the transferred byte count.
fn transferred(code: i32) -> Result<usize> {
    if code >= 0 {
        Ok(code as usize)
    } else {
        Err(Error::Transport(TransferStatus::from_code(code)))
    }
}

impl Connection {
    pub(crate) fn new(device: UsbDevice, session: SessionHandle, host: HostRef) -> Self {
        Connection {
            inner: Arc::new(ConnectionInner {
                device,
                session,
                host,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The decoded device model this connection belongs to.
    pub fn device(&self) -> &UsbDevice {
        &self.inner.device
    }

    /// The native session handle.
    pub fn session(&self) -> SessionHandle {
        self.inner.session
    }

    /// The device serial number captured when the connection opened.
    pub fn serial(&self) -> Option<&str> {
        self.inner.device.serial_number()
    }

    /// True until the connection is closed.
    pub fn is_open(&self) -> bool {
        !self.inner.closed.load(Ordering::Acquire)
    }

    /// The raw device descriptor bytes, freshly read from the device.
    pub fn raw_descriptors(&self) -> Result<Vec<u8>> {
        let host = self.ensure_open()?;
        host.transport()
            .device_descriptor(self.inner.session)
            .ok_or(Error::Decode(DecodeError::MissingDeviceDescriptor))
    }

    pub(crate) fn ensure_open(&self) -> Result<Arc<HostShared>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::InvalidState);
        }
        self.inner.host.upgrade().ok_or(Error::InvalidState)
    }

    /// The registry state, regardless of whether this connection is still
    /// open. Native cleanup paths use this after a close.
    pub(crate) fn host(&self) -> Option<Arc<HostShared>> {
        self.inner.host.upgrade()
    }

    /// Synchronous control transfer over `data[offset..offset + length]`.
    /// Returns the number of bytes transferred.
    pub fn control_transfer(
        &self,
        setup: ControlSetup,
        data: &mut [u8],
        offset: usize,
        length: usize,
        timeout: Duration,
    ) -> Result<usize> {
        let host = self.ensure_open()?;
        check_bounds(offset, length, data.len())?;
        trace!(session = self.inner.session.0, length, "control transfer");
        let code = host.transport().control(
            self.inner.session,
            setup,
            &mut data[offset..offset + length],
            timeout,
        );
        transferred(code)
    }

    /// Synchronous bulk transfer on the given endpoint address.
    pub fn bulk_transfer(
        &self,
        endpoint: u8,
        data: &mut [u8],
        offset: usize,
        length: usize,
        timeout: Duration,
    ) -> Result<usize> {
        let host = self.ensure_open()?;
        check_bounds(offset, length, data.len())?;
        trace!(session = self.inner.session.0, endpoint, length, "bulk transfer");
        let code = host.transport().bulk(
            self.inner.session,
            endpoint,
            &mut data[offset..offset + length],
            timeout,
        );
        transferred(code)
    }

    /// Synchronous interrupt transfer on the given endpoint address.
    pub fn interrupt_transfer(
        &self,
        endpoint: u8,
        data: &mut [u8],
        offset: usize,
        length: usize,
        timeout: Duration,
    ) -> Result<usize> {
        let host = self.ensure_open()?;
        check_bounds(offset, length, data.len())?;
        trace!(session = self.inner.session.0, endpoint, length, "interrupt transfer");
        let code = host.transport().interrupt(
            self.inner.session,
            endpoint,
            &mut data[offset..offset + length],
            timeout,
        );
        transferred(code)
    }

    /// Submit an asynchronous control transfer. The returned receiver yields
    /// the completion once the event pump has processed it.
    pub fn control_transfer_async(
        &self,
        setup: ControlSetup,
        data: Vec<u8>,
        offset: usize,
        length: usize,
        timeout: Duration,
    ) -> Result<CompletionReceiver> {
        let session = self.inner.session;
        self.submit(data.len(), offset, length, move |host, complete| {
            host.transport().submit_control(session, setup, data, offset, length, timeout, complete)
        })
    }

    /// Submit an asynchronous bulk transfer.
    pub fn bulk_transfer_async(
        &self,
        endpoint: u8,
        data: Vec<u8>,
        offset: usize,
        length: usize,
        timeout: Duration,
    ) -> Result<CompletionReceiver> {
        let session = self.inner.session;
        self.submit(data.len(), offset, length, move |host, complete| {
            host.transport().submit_bulk(session, endpoint, data, offset, length, timeout, complete)
        })
    }

    /// Submit an asynchronous interrupt transfer.
    pub fn interrupt_transfer_async(
        &self,
        endpoint: u8,
        data: Vec<u8>,
        offset: usize,
        length: usize,
        timeout: Duration,
    ) -> Result<CompletionReceiver> {
        let session = self.inner.session;
        self.submit(data.len(), offset, length, move |host, complete| {
            host.transport().submit_interrupt(
                session, endpoint, data, offset, length, timeout, complete,
            )
        })
    }

    pub(crate) fn submit<F>(
        &self,
        buffer_len: usize,
        offset: usize,
        length: usize,
        submit: F,
    ) -> Result<CompletionReceiver>
    where
        F: FnOnce(&HostShared, CompletionFn) -> i32,
    {
        let host = self.ensure_open()?;
        check_bounds(offset, length, buffer_len)?;
        // The pump must be running before the native layer can owe us a
        // completion.
        host.start_pump_if_needed();
        let (sender, receiver) = async_channel::bounded(1);
        let complete: CompletionFn = Box::new(move |completion| {
            let _ = sender.try_send(completion);
        });
        transferred(submit(&host, complete))?;
        Ok(CompletionReceiver { receiver })
    }

    /// Claim exclusive access to an interface. With `force`, any kernel
    /// driver bound to it is detached first.
    pub fn claim_interface(&self, interface: u8, force: bool) -> Result<()> {
        let host = self.ensure_open()?;
        transferred(host.transport().claim_interface(self.inner.session, interface, force))?;
        Ok(())
    }

    /// Release a claimed interface.
    pub fn release_interface(&self, interface: u8) -> Result<()> {
        let host = self.ensure_open()?;
        transferred(host.transport().release_interface(self.inner.session, interface))?;
        Ok(())
    }

    /// Select an alternate setting of an interface.
    pub fn set_interface(&self, interface: u8, alternate_setting: u8) -> Result<()> {
        let host = self.ensure_open()?;
        transferred(host.transport().set_interface(
            self.inner.session,
            interface,
            alternate_setting,
        ))?;
        Ok(())
    }

    /// Select the active configuration by configuration value.
    pub fn set_configuration(&self, configuration: u8) -> Result<()> {
        let host = self.ensure_open()?;
        transferred(host.transport().set_configuration(self.inner.session, configuration))?;
        Ok(())
    }

    /// Clear a stall condition on the given endpoint address.
    pub fn clear_stall(&self, endpoint: u8) -> Result<()> {
        let host = self.ensure_open()?;
        transferred(host.transport().clear_stall(self.inner.session, endpoint))?;
        Ok(())
    }

    /// Reset the device's port. Outstanding claims are lost.
    pub fn reset_device(&self) -> Result<()> {
        let host = self.ensure_open()?;
        transferred(host.transport().reset_device(self.inner.session))?;
        Ok(())
    }

    /// Close the connection: remove it from the registry, release the native
    /// session, and stop the event pump if this was the last device.
    /// Idempotent; every clone observes the closed state.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(host) = self.inner.host.upgrade() {
            host.finish_close(self.inner.device.name(), self.inner.session);
        }
    }
}
