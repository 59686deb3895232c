//! The transport capability interface
//!
//! One implementation of [`UsbTransport`] exists per target platform; the
//! host core is written entirely against this trait and never depends on
//! which implementation is active.

use crate::speed::Speed;
use crate::types::{CompletionFn, ControlSetup, IsoPackets, SessionHandle};
use std::time::Duration;

/// Capability interface over the native USB transport layer.
///
/// Raw descriptor buffers returned by the `*_descriptor` methods are owned
/// copies in standard USB wire layout; the host core is free to drop them
/// once decoded. Transfer primitives return the native convention: a
/// non-negative transferred byte count, or a negative result code (see
/// [`crate::TransferStatus::from_code`]).
///
/// Implementations must be safe to call from multiple threads; the event
/// pump drives `process_events` on a dedicated thread in parallel with
/// callers issuing transfers.
pub trait UsbTransport: Send + Sync {
    /// Open a native session for the device with the given identity
    /// (platform device path). `None` means the platform refused access.
    fn open_session(&self, identity: &str) -> Option<SessionHandle>;

    /// Release the native session. The handle is dead afterwards.
    fn close_session(&self, session: SessionHandle);

    /// Raw device descriptor (18 bytes in standard layout), or `None` if it
    /// could not be read.
    fn device_descriptor(&self, session: SessionHandle) -> Option<Vec<u8>>;

    /// Number of configurations the device reports.
    fn configuration_count(&self, session: SessionHandle) -> u8;

    /// Raw configuration descriptor bundle for `index`: the 9-byte
    /// configuration header followed by the embedded interface, endpoint,
    /// and class-specific descriptors.
    fn configuration_descriptor(&self, session: SessionHandle, index: u8) -> Option<Vec<u8>>;

    /// Resolve a nonzero string-descriptor index. `None` if the device does
    /// not carry the string. Callers never pass index 0.
    fn string_descriptor(&self, session: SessionHandle, index: u8) -> Option<String>;

    /// Negotiated link speed for the device.
    fn link_speed(&self, session: SessionHandle) -> Speed;

    /// Synchronous control transfer on endpoint zero over `buffer`.
    fn control(
        &self,
        session: SessionHandle,
        setup: ControlSetup,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> i32;

    /// Synchronous bulk transfer on the given endpoint address.
    fn bulk(&self, session: SessionHandle, endpoint: u8, buffer: &mut [u8], timeout: Duration)
    -> i32;

    /// Synchronous interrupt transfer on the given endpoint address.
    fn interrupt(
        &self,
        session: SessionHandle,
        endpoint: u8,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> i32;

    /// Submit an asynchronous control transfer. Returns the submission
    /// result code; on success `complete` fires later from `process_events`
    /// with the buffer region `offset..offset + length` transferred.
    fn submit_control(
        &self,
        session: SessionHandle,
        setup: ControlSetup,
        buffer: Vec<u8>,
        offset: usize,
        length: usize,
        timeout: Duration,
        complete: CompletionFn,
    ) -> i32;

    /// Submit an asynchronous bulk transfer.
    fn submit_bulk(
        &self,
        session: SessionHandle,
        endpoint: u8,
        buffer: Vec<u8>,
        offset: usize,
        length: usize,
        timeout: Duration,
        complete: CompletionFn,
    ) -> i32;

    /// Submit an asynchronous interrupt transfer.
    fn submit_interrupt(
        &self,
        session: SessionHandle,
        endpoint: u8,
        buffer: Vec<u8>,
        offset: usize,
        length: usize,
        timeout: Duration,
        complete: CompletionFn,
    ) -> i32;

    /// Allocate a native packet-descriptor structure sized for a fixed
    /// packet count. `None` on allocation failure.
    fn allocate_iso_packets(&self, packet_count: usize) -> Option<IsoPackets>;

    /// Configure the allocated packet descriptors for an endpoint and packet
    /// size. Returns the usable byte capacity (positive) or a negative
    /// result code.
    fn setup_iso_packets(
        &self,
        session: SessionHandle,
        packets: IsoPackets,
        endpoint: u8,
        packet_size: usize,
    ) -> i32;

    /// Submit an asynchronous isochronous transfer using previously
    /// configured packet descriptors.
    fn submit_iso(
        &self,
        session: SessionHandle,
        packets: IsoPackets,
        endpoint: u8,
        buffer: Vec<u8>,
        timeout: Duration,
        complete: CompletionFn,
    ) -> i32;

    /// Release a native packet-descriptor allocation.
    fn free_iso_packets(&self, packets: IsoPackets);

    /// Claim exclusive access to an interface, optionally detaching a kernel
    /// driver first.
    fn claim_interface(&self, session: SessionHandle, interface: u8, force: bool) -> i32;

    /// Release a claimed interface.
    fn release_interface(&self, session: SessionHandle, interface: u8) -> i32;

    /// Select an alternate setting of an interface.
    fn set_interface(&self, session: SessionHandle, interface: u8, alternate_setting: u8) -> i32;

    /// Select the active configuration by configuration value.
    fn set_configuration(&self, session: SessionHandle, configuration: u8) -> i32;

    /// Clear a stall condition on the given endpoint address.
    fn clear_stall(&self, session: SessionHandle, endpoint: u8) -> i32;

    /// Reset the device's port.
    fn reset_device(&self, session: SessionHandle) -> i32;

    /// Drive native event processing for one bounded interval, firing any
    /// pending completion sinks. Returns a result code; transient failures
    /// are expected and must not be treated as fatal by the caller.
    fn process_events(&self) -> i32;
}
