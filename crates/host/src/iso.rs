//! Isochronous transfers
//!
//! Isochronous endpoints need a native packet-descriptor allocation that
//! outlives individual submissions, so they get their own handle instead of
//! a one-shot method on the connection. The allocation is configured once
//! for a fixed packet count, endpoint, and packet size; every submission
//! reuses it and must fit the configured capacity. Dropping the handle
//! releases the native allocation.

use std::time::Duration;

use tracing::debug;
use transport::{IsoPackets, TransferStatus};

use crate::connection::{CompletionReceiver, Connection};
use crate::error::{Error, Result};

/// A reusable isochronous transfer bound to one endpoint of an open
/// connection.
#[derive(Debug)]
pub struct IsochronousTransfer {
    connection: Connection,
    endpoint: u8,
    packets: IsoPackets,
    capacity: usize,
}

impl IsochronousTransfer {
    /// Allocate and configure packet descriptors for `packet_count` packets
    /// of `packet_size` bytes on the given endpoint address.
    pub fn new(
        connection: &Connection,
        endpoint: u8,
        packet_count: usize,
        packet_size: usize,
    ) -> Result<Self> {
        let host = connection.ensure_open()?;
        let packets =
            host.transport().allocate_iso_packets(packet_count).ok_or(Error::IsoAllocation)?;
        let code =
            host.transport().setup_iso_packets(connection.session(), packets, endpoint, packet_size);
        if code < 0 {
            host.transport().free_iso_packets(packets);
            return Err(Error::IsoSetup { status: TransferStatus::from_code(code) });
        }
        debug!(endpoint, packet_count, packet_size, capacity = code, "isochronous setup");
        Ok(IsochronousTransfer {
            connection: connection.clone(),
            endpoint,
            packets,
            capacity: code as usize,
        })
    }

    /// The usable byte capacity per submission.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Submit the buffer as one isochronous transfer. The buffer must hold
    /// the full configured capacity; the completion arrives via the event
    /// pump.
    pub fn submit(&self, data: Vec<u8>, timeout: Duration) -> Result<CompletionReceiver> {
        let session = self.connection.session();
        let packets = self.packets;
        let endpoint = self.endpoint;
        let buffer_len = data.len();
        self.connection.submit(buffer_len, 0, self.capacity, move |host, complete| {
            host.transport().submit_iso(session, packets, endpoint, data, timeout, complete)
        })
    }
}

impl Drop for IsochronousTransfer {
    fn drop(&mut self) {
        // Freed even after the connection closed; only a torn-down host
        // makes the native allocation unreachable.
        if let Some(host) = self.connection.host() {
            host.transport().free_iso_packets(self.packets);
        }
    }
}
