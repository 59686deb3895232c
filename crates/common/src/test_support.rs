//! Test support for usb-host-rs
//!
//! Provides a scripted in-memory [`UsbTransport`] implementation and raw
//! descriptor fixture builders shared by tests across crates.
//!
//! # Example
//!
//! ```
//! use common::test_support::{ScriptedDevice, ScriptedTransport};
//! use transport::UsbTransport;
//!
//! let transport = ScriptedTransport::new();
//! transport.add_device("usb:001/004", ScriptedDevice::basic(0x1234, 0x5678));
//!
//! let session = transport.open_session("usb:001/004").unwrap();
//! assert_eq!(transport.configuration_count(session), 1);
//! assert_eq!(transport.counts().open_session, 1);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use transport::{
    Completion, CompletionFn, ControlSetup, IsoPackets, SessionHandle, Speed, TransferStatus,
    UsbTransport,
};

/// An endpoint descriptor fixture (7 bytes on the wire).
#[derive(Debug, Clone)]
pub struct EndpointFixture {
    pub address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

impl EndpointFixture {
    /// Bulk IN endpoint 1, 64-byte packets.
    pub fn bulk_in() -> Self {
        EndpointFixture { address: 0x81, attributes: 0x02, max_packet_size: 64, interval: 0 }
    }

    /// Bulk OUT endpoint 2, 64-byte packets.
    pub fn bulk_out() -> Self {
        EndpointFixture { address: 0x02, attributes: 0x02, max_packet_size: 64, interval: 0 }
    }
}

/// An interface descriptor fixture (one alternate setting plus endpoints).
#[derive(Debug, Clone)]
pub struct InterfaceFixture {
    pub id: u8,
    pub alternate_setting: u8,
    pub string_index: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    pub endpoints: Vec<EndpointFixture>,
    /// Endpoint count declared in the descriptor. `None` means the actual
    /// endpoint count; tests override it to fabricate truncated bundles.
    pub declared_endpoints: Option<u8>,
}

impl InterfaceFixture {
    /// Vendor-specific interface with a bulk IN/OUT endpoint pair.
    pub fn vendor(id: u8) -> Self {
        InterfaceFixture {
            id,
            alternate_setting: 0,
            string_index: 0,
            class: 0xff,
            subclass: 0x00,
            protocol: 0x00,
            endpoints: vec![EndpointFixture::bulk_in(), EndpointFixture::bulk_out()],
            declared_endpoints: None,
        }
    }
}

/// Build a raw device-descriptor buffer in the transport layout.
///
/// Pinned field offsets: class@5, subclass@6, protocol@7, vendorId@9 (LE),
/// productId@11 (LE), bcdDevice@13 (LE), string indexes at 15/16/17.
#[allow(clippy::too_many_arguments)]
pub fn device_descriptor_bytes(
    vendor_id: u16,
    product_id: u16,
    class: u8,
    subclass: u8,
    protocol: u8,
    version_bcd: u16,
    manufacturer_index: u8,
    product_index: u8,
    serial_index: u8,
) -> Vec<u8> {
    let mut bytes = vec![0u8; 18];
    bytes[0] = 18;
    bytes[1] = 0x01;
    bytes[5] = class;
    bytes[6] = subclass;
    bytes[7] = protocol;
    bytes[9..11].copy_from_slice(&vendor_id.to_le_bytes());
    bytes[11..13].copy_from_slice(&product_id.to_le_bytes());
    bytes[13..15].copy_from_slice(&version_bcd.to_le_bytes());
    bytes[15] = manufacturer_index;
    bytes[16] = product_index;
    bytes[17] = serial_index;
    bytes
}

/// Build a raw configuration-descriptor bundle: the 9-byte header followed
/// by the interface and endpoint descriptors in wire layout.
pub fn configuration_bytes(
    configuration_value: u8,
    string_index: u8,
    attributes: u8,
    max_power: u8,
    interfaces: &[InterfaceFixture],
) -> Vec<u8> {
    let mut unique_ids: Vec<u8> = interfaces.iter().map(|i| i.id).collect();
    unique_ids.sort_unstable();
    unique_ids.dedup();

    let mut bytes = vec![0u8; 9];
    bytes[0] = 9;
    bytes[1] = 0x02;
    bytes[4] = unique_ids.len() as u8;
    bytes[5] = configuration_value;
    bytes[6] = string_index;
    bytes[7] = attributes;
    bytes[8] = max_power;

    for interface in interfaces {
        let declared =
            interface.declared_endpoints.unwrap_or(interface.endpoints.len() as u8);
        bytes.extend_from_slice(&[
            9,
            0x04,
            interface.id,
            interface.alternate_setting,
            declared,
            interface.class,
            interface.subclass,
            interface.protocol,
            interface.string_index,
        ]);
        for endpoint in &interface.endpoints {
            let mps = endpoint.max_packet_size.to_le_bytes();
            bytes.extend_from_slice(&[
                7,
                0x05,
                endpoint.address,
                endpoint.attributes,
                mps[0],
                mps[1],
                endpoint.interval,
            ]);
        }
    }

    let total = bytes.len() as u16;
    bytes[2..4].copy_from_slice(&total.to_le_bytes());
    bytes
}

/// Per-method call counters on the scripted transport.
#[derive(Debug, Default, Clone)]
pub struct CallCounts {
    pub open_session: usize,
    pub close_session: usize,
    pub control: usize,
    pub bulk: usize,
    pub interrupt: usize,
    pub submit_control: usize,
    pub submit_bulk: usize,
    pub submit_interrupt: usize,
    pub submit_iso: usize,
    pub free_iso_packets: usize,
    pub claim_interface: usize,
    pub release_interface: usize,
    pub set_interface: usize,
    pub set_configuration: usize,
    pub clear_stall: usize,
    pub reset_device: usize,
    pub process_events: usize,
}

/// One scripted device visible to the transport.
#[derive(Debug, Clone)]
pub struct ScriptedDevice {
    /// Raw device descriptor; `None` scripts a failed descriptor read.
    pub descriptor: Option<Vec<u8>>,
    /// Raw configuration bundles, one per configuration index.
    pub configurations: Vec<Vec<u8>>,
    /// String descriptors by index. Index 0 must never be queried.
    pub strings: HashMap<u8, String>,
    /// Reported link speed.
    pub speed: Speed,
    /// When set, `open_session` refuses access.
    pub deny_open: bool,
}

impl ScriptedDevice {
    /// A well-formed device: one configuration, one vendor interface with a
    /// bulk IN/OUT pair, manufacturer/product/serial strings at 1/2/3.
    pub fn basic(vendor_id: u16, product_id: u16) -> Self {
        let mut strings = HashMap::new();
        strings.insert(1, "Fixture Labs".to_string());
        strings.insert(2, "Fixture Widget".to_string());
        strings.insert(3, "SN000001".to_string());
        ScriptedDevice {
            descriptor: Some(device_descriptor_bytes(
                vendor_id, product_id, 0x00, 0x00, 0x00, 0x0102, 1, 2, 3,
            )),
            configurations: vec![configuration_bytes(
                1,
                0,
                0x80,
                50,
                &[InterfaceFixture::vendor(0)],
            )],
            strings,
            speed: Speed::High,
            deny_open: false,
        }
    }
}

#[derive(Default)]
struct ScriptState {
    devices: HashMap<String, ScriptedDevice>,
    sessions: HashMap<i32, String>,
    next_session: i32,
    next_iso: u64,
    iso_packet_counts: HashMap<u64, usize>,
    counts: CallCounts,
    sync_results: VecDeque<i32>,
    admin_results: VecDeque<i32>,
    submit_results: VecDeque<i32>,
    iso_setup_results: VecDeque<i32>,
    completions: VecDeque<Completion>,
    deny_iso_alloc: bool,
    pending: Vec<(CompletionFn, Completion)>,
}

/// In-memory transport driven entirely by scripted fixtures.
///
/// Sync transfers return the next scripted result or echo the buffer length.
/// Async submissions park their completion sink until `process_events` runs,
/// which fires the next scripted [`Completion`] (or a default success echo)
/// on the calling thread, exactly like a native event loop would.
pub struct ScriptedTransport {
    state: Mutex<ScriptState>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        ScriptedTransport {
            state: Mutex::new(ScriptState { next_session: 3, next_iso: 1, ..Default::default() }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().expect("scripted transport state poisoned")
    }

    /// Make a device visible under the given identity.
    pub fn add_device(&self, identity: &str, device: ScriptedDevice) {
        self.lock().devices.insert(identity.to_string(), device);
    }

    /// Snapshot of all call counters.
    pub fn counts(&self) -> CallCounts {
        self.lock().counts.clone()
    }

    /// Number of sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Script the result of the next synchronous transfer.
    pub fn push_sync_result(&self, code: i32) {
        self.lock().sync_results.push_back(code);
    }

    /// Script the result of the next administrative call.
    pub fn push_admin_result(&self, code: i32) {
        self.lock().admin_results.push_back(code);
    }

    /// Script the submission code of the next asynchronous transfer.
    pub fn push_submit_result(&self, code: i32) {
        self.lock().submit_results.push_back(code);
    }

    /// Script the completion delivered for the next asynchronous transfer.
    pub fn push_completion(&self, completion: Completion) {
        self.lock().completions.push_back(completion);
    }

    /// Script the result of the next isochronous packet setup.
    pub fn push_iso_setup_result(&self, code: i32) {
        self.lock().iso_setup_results.push_back(code);
    }

    /// Make isochronous packet allocation fail.
    pub fn deny_iso_allocation(&self) {
        self.lock().deny_iso_alloc = true;
    }

    fn device_of<'a>(
        state: &'a ScriptState,
        session: SessionHandle,
    ) -> Option<&'a ScriptedDevice> {
        let identity = state.sessions.get(&session.0)?;
        state.devices.get(identity)
    }

    fn sync_transfer(&self, counter: fn(&mut CallCounts) -> &mut usize, len: usize) -> i32 {
        let mut state = self.lock();
        *counter(&mut state.counts) += 1;
        state.sync_results.pop_front().unwrap_or(len as i32)
    }

    fn submit_transfer(
        &self,
        counter: fn(&mut CallCounts) -> &mut usize,
        region: Vec<u8>,
        complete: CompletionFn,
    ) -> i32 {
        let mut state = self.lock();
        *counter(&mut state.counts) += 1;
        let code = state.submit_results.pop_front().unwrap_or(0);
        if code < 0 {
            return code;
        }
        let completion = state
            .completions
            .pop_front()
            .unwrap_or(Completion { status: TransferStatus::Success, data: region });
        state.pending.push((complete, completion));
        code
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for ScriptedTransport {
    fn open_session(&self, identity: &str) -> Option<SessionHandle> {
        let mut state = self.lock();
        state.counts.open_session += 1;
        let device = state.devices.get(identity)?;
        if device.deny_open {
            return None;
        }
        let handle = state.next_session;
        state.next_session += 1;
        state.sessions.insert(handle, identity.to_string());
        Some(SessionHandle(handle))
    }

    fn close_session(&self, session: SessionHandle) {
        let mut state = self.lock();
        state.counts.close_session += 1;
        state.sessions.remove(&session.0);
    }

    fn device_descriptor(&self, session: SessionHandle) -> Option<Vec<u8>> {
        let state = self.lock();
        Self::device_of(&state, session)?.descriptor.clone()
    }

    fn configuration_count(&self, session: SessionHandle) -> u8 {
        let state = self.lock();
        Self::device_of(&state, session).map(|d| d.configurations.len() as u8).unwrap_or(0)
    }

    fn configuration_descriptor(&self, session: SessionHandle, index: u8) -> Option<Vec<u8>> {
        let state = self.lock();
        Self::device_of(&state, session)?.configurations.get(index as usize).cloned()
    }

    fn string_descriptor(&self, session: SessionHandle, index: u8) -> Option<String> {
        assert_ne!(index, 0, "string index 0 must be resolved by the decoder, not the transport");
        let state = self.lock();
        Self::device_of(&state, session)?.strings.get(&index).cloned()
    }

    fn link_speed(&self, session: SessionHandle) -> Speed {
        let state = self.lock();
        Self::device_of(&state, session).map(|d| d.speed).unwrap_or(Speed::Unknown)
    }

    fn control(
        &self,
        _session: SessionHandle,
        _setup: ControlSetup,
        buffer: &mut [u8],
        _timeout: Duration,
    ) -> i32 {
        self.sync_transfer(|c| &mut c.control, buffer.len())
    }

    fn bulk(
        &self,
        _session: SessionHandle,
        _endpoint: u8,
        buffer: &mut [u8],
        _timeout: Duration,
    ) -> i32 {
        self.sync_transfer(|c| &mut c.bulk, buffer.len())
    }

    fn interrupt(
        &self,
        _session: SessionHandle,
        _endpoint: u8,
        buffer: &mut [u8],
        _timeout: Duration,
    ) -> i32 {
        self.sync_transfer(|c| &mut c.interrupt, buffer.len())
    }

    fn submit_control(
        &self,
        _session: SessionHandle,
        _setup: ControlSetup,
        buffer: Vec<u8>,
        offset: usize,
        length: usize,
        _timeout: Duration,
        complete: CompletionFn,
    ) -> i32 {
        let region = buffer[offset..offset + length].to_vec();
        self.submit_transfer(|c| &mut c.submit_control, region, complete)
    }

    fn submit_bulk(
        &self,
        _session: SessionHandle,
        _endpoint: u8,
        buffer: Vec<u8>,
        offset: usize,
        length: usize,
        _timeout: Duration,
        complete: CompletionFn,
    ) -> i32 {
        let region = buffer[offset..offset + length].to_vec();
        self.submit_transfer(|c| &mut c.submit_bulk, region, complete)
    }

    fn submit_interrupt(
        &self,
        _session: SessionHandle,
        _endpoint: u8,
        buffer: Vec<u8>,
        offset: usize,
        length: usize,
        _timeout: Duration,
        complete: CompletionFn,
    ) -> i32 {
        let region = buffer[offset..offset + length].to_vec();
        self.submit_transfer(|c| &mut c.submit_interrupt, region, complete)
    }

    fn allocate_iso_packets(&self, packet_count: usize) -> Option<IsoPackets> {
        let mut state = self.lock();
        if state.deny_iso_alloc {
            return None;
        }
        let id = state.next_iso;
        state.next_iso += 1;
        state.iso_packet_counts.insert(id, packet_count);
        Some(IsoPackets(id))
    }

    fn setup_iso_packets(
        &self,
        _session: SessionHandle,
        packets: IsoPackets,
        _endpoint: u8,
        packet_size: usize,
    ) -> i32 {
        let mut state = self.lock();
        if let Some(code) = state.iso_setup_results.pop_front() {
            return code;
        }
        // Unscripted setup reports the full capacity of the allocation.
        let count = state.iso_packet_counts.get(&packets.0).copied().unwrap_or(0);
        (count * packet_size) as i32
    }

    fn submit_iso(
        &self,
        _session: SessionHandle,
        _packets: IsoPackets,
        _endpoint: u8,
        buffer: Vec<u8>,
        _timeout: Duration,
        complete: CompletionFn,
    ) -> i32 {
        self.submit_transfer(|c| &mut c.submit_iso, buffer, complete)
    }

    fn free_iso_packets(&self, _packets: IsoPackets) {
        self.lock().counts.free_iso_packets += 1;
    }

    fn claim_interface(&self, _session: SessionHandle, _interface: u8, _force: bool) -> i32 {
        let mut state = self.lock();
        state.counts.claim_interface += 1;
        state.admin_results.pop_front().unwrap_or(0)
    }

    fn release_interface(&self, _session: SessionHandle, _interface: u8) -> i32 {
        let mut state = self.lock();
        state.counts.release_interface += 1;
        state.admin_results.pop_front().unwrap_or(0)
    }

    fn set_interface(&self, _session: SessionHandle, _interface: u8, _alternate_setting: u8) -> i32 {
        let mut state = self.lock();
        state.counts.set_interface += 1;
        state.admin_results.pop_front().unwrap_or(0)
    }

    fn set_configuration(&self, _session: SessionHandle, _configuration: u8) -> i32 {
        let mut state = self.lock();
        state.counts.set_configuration += 1;
        state.admin_results.pop_front().unwrap_or(0)
    }

    fn clear_stall(&self, _session: SessionHandle, _endpoint: u8) -> i32 {
        let mut state = self.lock();
        state.counts.clear_stall += 1;
        state.admin_results.pop_front().unwrap_or(0)
    }

    fn reset_device(&self, _session: SessionHandle) -> i32 {
        let mut state = self.lock();
        state.counts.reset_device += 1;
        state.admin_results.pop_front().unwrap_or(0)
    }

    fn process_events(&self) -> i32 {
        let pending = {
            let mut state = self.lock();
            state.counts.process_events += 1;
            std::mem::take(&mut state.pending)
        };
        for (complete, completion) in pending {
            complete(completion);
        }
        // Emulate the bounded blocking of a native event-processing call.
        std::thread::sleep(Duration::from_millis(1));
        0
    }
}
