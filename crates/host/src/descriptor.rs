//! Descriptor decoding
//!
//! Reconstructs the typed device tree from the raw, packed descriptor
//! buffers the transport hands out. Field offsets are fixed by the wire
//! format and must not change; all multi-byte fields are unsigned
//! little-endian.
//!
//! Only the top-level device and configuration buffers are load-bearing:
//! if either is absent the device cannot be constructed. Running out of
//! embedded interface or endpoint descriptors mid-walk is the natural
//! termination of a variable-length alternate-setting list, not an error.

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;
use transport::{SessionHandle, UsbTransport};

use crate::device::{UsbConfiguration, UsbDevice, UsbEndpoint, UsbInterface};
use crate::error::DecodeError;

// Device descriptor layout.
const DEVICE_DESCRIPTOR_LEN: usize = 18;
const DEVICE_CLASS: usize = 5;
const DEVICE_SUBCLASS: usize = 6;
const DEVICE_PROTOCOL: usize = 7;
const DEVICE_VENDOR_ID: usize = 9;
const DEVICE_PRODUCT_ID: usize = 11;
const DEVICE_VERSION: usize = 13;
const DEVICE_MANUFACTURER_STRING: usize = 15;
const DEVICE_PRODUCT_STRING: usize = 16;
const DEVICE_SERIAL_STRING: usize = 17;

// Configuration descriptor header layout.
const CONFIG_DESCRIPTOR_LEN: usize = 9;
const CONFIG_NUM_INTERFACES: usize = 4;
const CONFIG_VALUE: usize = 5;
const CONFIG_STRING_INDEX: usize = 6;
const CONFIG_ATTRIBUTES: usize = 7;
const CONFIG_MAX_POWER: usize = 8;

// Interface descriptor layout.
const INTERFACE_DESCRIPTOR_LEN: usize = 9;
const INTERFACE_ID: usize = 2;
const INTERFACE_ALTERNATE_SETTING: usize = 3;
const INTERFACE_NUM_ENDPOINTS: usize = 4;
const INTERFACE_CLASS: usize = 5;
const INTERFACE_SUBCLASS: usize = 6;
const INTERFACE_PROTOCOL: usize = 7;
const INTERFACE_STRING_INDEX: usize = 8;

// Endpoint descriptor layout.
const ENDPOINT_DESCRIPTOR_LEN: usize = 7;
const ENDPOINT_ADDRESS: usize = 2;
const ENDPOINT_ATTRIBUTES: usize = 3;
const ENDPOINT_MAX_PACKET_SIZE: usize = 4;
const ENDPOINT_INTERVAL: usize = 6;

const DESCRIPTOR_TYPE_INTERFACE: u8 = 0x04;
const DESCRIPTOR_TYPE_ENDPOINT: u8 = 0x05;

/// Decode the full device tree for an open session.
///
/// All configurations are decoded before the [`UsbDevice`] is constructed,
/// so the returned device is never partially populated.
pub fn decode_device(
    transport: &dyn UsbTransport,
    session: SessionHandle,
    name: &str,
) -> Result<UsbDevice, DecodeError> {
    let descriptor =
        transport.device_descriptor(session).ok_or(DecodeError::MissingDeviceDescriptor)?;
    if descriptor.len() < DEVICE_DESCRIPTOR_LEN {
        return Err(DecodeError::ShortDeviceDescriptor { len: descriptor.len() });
    }

    let vendor_id = LittleEndian::read_u16(&descriptor[DEVICE_VENDOR_ID..]);
    let product_id = LittleEndian::read_u16(&descriptor[DEVICE_PRODUCT_ID..]);
    let version = version_string(LittleEndian::read_u16(&descriptor[DEVICE_VERSION..]));
    let manufacturer =
        lookup_string(transport, session, descriptor[DEVICE_MANUFACTURER_STRING]);
    let product = lookup_string(transport, session, descriptor[DEVICE_PRODUCT_STRING]);
    let serial_number = lookup_string(transport, session, descriptor[DEVICE_SERIAL_STRING]);

    let count = transport.configuration_count(session);
    let mut configurations = Vec::with_capacity(count as usize);
    for index in 0..count {
        configurations.push(decode_configuration(transport, session, index)?);
    }

    debug!(
        device = name,
        vendor_id = format_args!("{:#06x}", vendor_id),
        product_id = format_args!("{:#06x}", product_id),
        configurations = configurations.len(),
        "decoded device"
    );

    Ok(UsbDevice::new(
        name.to_string(),
        vendor_id,
        product_id,
        descriptor[DEVICE_CLASS],
        descriptor[DEVICE_SUBCLASS],
        descriptor[DEVICE_PROTOCOL],
        manufacturer,
        product,
        serial_number,
        version,
        transport.link_speed(session),
        session,
        configurations,
    ))
}

/// Decode the configuration at the given descriptor index.
///
/// The configuration ID is the descriptor's configuration value, not the
/// index the buffer was requested with.
pub fn decode_configuration(
    transport: &dyn UsbTransport,
    session: SessionHandle,
    index: u8,
) -> Result<UsbConfiguration, DecodeError> {
    let raw = transport
        .configuration_descriptor(session, index)
        .ok_or(DecodeError::MissingConfigurationDescriptor { index })?;
    if raw.len() < CONFIG_DESCRIPTOR_LEN {
        return Err(DecodeError::ShortConfigurationDescriptor { index, len: raw.len() });
    }

    let name = lookup_string(transport, session, raw[CONFIG_STRING_INDEX]);
    let interfaces = decode_interface_list(transport, session, &raw[CONFIG_DESCRIPTOR_LEN..]);

    debug!(
        index,
        declared_interfaces = raw[CONFIG_NUM_INTERFACES],
        decoded_entries = interfaces.len(),
        "decoded configuration"
    );

    Ok(UsbConfiguration::new(
        raw[CONFIG_VALUE],
        name,
        raw[CONFIG_ATTRIBUTES],
        raw[CONFIG_MAX_POWER],
        interfaces,
    ))
}

/// Decode every interface entry embedded in a configuration bundle, one
/// entry per alternate setting, in descriptor order.
fn decode_interface_list(
    transport: &dyn UsbTransport,
    session: SessionHandle,
    bytes: &[u8],
) -> Vec<UsbInterface> {
    let mut walker = DescriptorWalker::new(bytes);
    let mut interfaces = Vec::new();
    while let Some(interface) = decode_interface_group(transport, session, &mut walker) {
        interfaces.push(interface);
    }
    interfaces
}

/// Decode the next interface descriptor and its declared endpoints.
///
/// Returns `None` once no further interface descriptor can be decoded; a
/// declared endpoint missing from the buffer also ends the walk, without
/// producing the incomplete interface.
fn decode_interface_group(
    transport: &dyn UsbTransport,
    session: SessionHandle,
    walker: &mut DescriptorWalker<'_>,
) -> Option<UsbInterface> {
    let descriptor = loop {
        let (kind, descriptor) = walker.next()?;
        if kind == DESCRIPTOR_TYPE_INTERFACE {
            if descriptor.len() < INTERFACE_DESCRIPTOR_LEN {
                walker.exhaust();
                return None;
            }
            break descriptor;
        }
        // Class-specific descriptor ahead of the next interface; skip.
    };

    let num_endpoints = descriptor[INTERFACE_NUM_ENDPOINTS];
    let name = lookup_string(transport, session, descriptor[INTERFACE_STRING_INDEX]);

    let mut endpoints = Vec::with_capacity(num_endpoints as usize);
    for _ in 0..num_endpoints {
        match next_endpoint(walker).and_then(decode_endpoint) {
            Some(endpoint) => endpoints.push(endpoint),
            None => {
                walker.exhaust();
                return None;
            }
        }
    }

    Some(UsbInterface::new(
        descriptor[INTERFACE_ID],
        descriptor[INTERFACE_ALTERNATE_SETTING],
        name,
        descriptor[INTERFACE_CLASS],
        descriptor[INTERFACE_SUBCLASS],
        descriptor[INTERFACE_PROTOCOL],
        endpoints,
    ))
}

/// Advance to the next endpoint descriptor belonging to the current
/// interface. Stops at the next interface descriptor so a missing endpoint
/// never consumes the following alternate setting's header.
fn next_endpoint<'a>(walker: &mut DescriptorWalker<'a>) -> Option<&'a [u8]> {
    loop {
        let (kind, _) = walker.peek()?;
        if kind == DESCRIPTOR_TYPE_INTERFACE {
            return None;
        }
        let (kind, descriptor) = walker.next()?;
        if kind == DESCRIPTOR_TYPE_ENDPOINT {
            return Some(descriptor);
        }
        // Class-specific descriptor between endpoints; skip.
    }
}

/// Decode one raw endpoint descriptor. `None` if the buffer is too short.
pub fn decode_endpoint(bytes: &[u8]) -> Option<UsbEndpoint> {
    if bytes.len() < ENDPOINT_DESCRIPTOR_LEN {
        return None;
    }
    Some(UsbEndpoint::new(
        bytes[ENDPOINT_ADDRESS],
        bytes[ENDPOINT_ATTRIBUTES],
        LittleEndian::read_u16(&bytes[ENDPOINT_MAX_PACKET_SIZE..]),
        bytes[ENDPOINT_INTERVAL],
    ))
}

/// Resolve a string-descriptor index against the device.
///
/// Index 0 means "no string" and never reaches the transport; a nonzero
/// index the device does not carry legitimately resolves to `None`.
fn lookup_string(
    transport: &dyn UsbTransport,
    session: SessionHandle,
    index: u8,
) -> Option<String> {
    if index == 0 { None } else { transport.string_descriptor(session, index) }
}

fn version_string(bcd: u16) -> String {
    format!("{:x}.{:02x}", bcd >> 8, bcd & 0xff)
}

/// Cursor over concatenated wire-format descriptors (`bLength` at byte 0,
/// `bDescriptorType` at byte 1).
struct DescriptorWalker<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DescriptorWalker<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        DescriptorWalker { bytes, pos: 0 }
    }

    /// The next descriptor without consuming it. `None` when the remaining
    /// bytes cannot hold a complete descriptor.
    fn peek(&self) -> Option<(u8, &'a [u8])> {
        if self.pos + 2 > self.bytes.len() {
            return None;
        }
        let length = self.bytes[self.pos] as usize;
        if length < 2 || self.pos + length > self.bytes.len() {
            return None;
        }
        Some((self.bytes[self.pos + 1], &self.bytes[self.pos..self.pos + length]))
    }

    fn next(&mut self) -> Option<(u8, &'a [u8])> {
        let item = self.peek()?;
        self.pos += item.1.len();
        Some(item)
    }

    /// Terminate the walk.
    fn exhaust(&mut self) {
        self.pos = self.bytes.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_support::{
        EndpointFixture, InterfaceFixture, ScriptedDevice, ScriptedTransport, configuration_bytes,
        device_descriptor_bytes,
    };
    use crate::device::{Direction, TransferKind};

    fn open_basic(transport: &ScriptedTransport) -> SessionHandle {
        transport.add_device("usb:001/004", ScriptedDevice::basic(0x1234, 0x5678));
        transport.open_session("usb:001/004").unwrap()
    }

    #[test]
    fn test_decode_endpoint_fixed_offsets() {
        // address@2=0x81, attributes@3=0x02, maxPacketSize@4=0x0040 LE, interval@6=1
        let bytes = [7u8, 0x05, 0x81, 0x02, 0x40, 0x00, 0x01];
        let endpoint = decode_endpoint(&bytes).unwrap();
        assert_eq!(endpoint.address(), 0x81);
        assert_eq!(endpoint.number(), 1);
        assert_eq!(endpoint.direction(), Direction::In);
        assert_eq!(endpoint.transfer_kind(), TransferKind::Bulk);
        assert_eq!(endpoint.max_packet_size(), 64);
        assert_eq!(endpoint.interval(), 1);
    }

    #[test]
    fn test_decode_endpoint_short_buffer() {
        assert!(decode_endpoint(&[7, 0x05, 0x81, 0x02, 0x40, 0x00]).is_none());
    }

    #[test]
    fn test_decode_configuration_header_fields() {
        let transport = ScriptedTransport::new();
        let mut device = ScriptedDevice::basic(0x1234, 0x5678);
        // numInterfaces@4=1, configurationValue@5=1, stringIndex@6=0,
        // attributes@7=0b1100000, maxPower@8=50, no embedded interfaces.
        let mut raw = vec![0u8; 9];
        raw[0] = 9;
        raw[1] = 0x02;
        raw[4] = 1;
        raw[5] = 1;
        raw[6] = 0;
        raw[7] = 0b0110_0000;
        raw[8] = 50;
        device.configurations = vec![raw];
        transport.add_device("usb:001/004", device);
        let session = transport.open_session("usb:001/004").unwrap();

        let config = decode_configuration(&transport, session, 0).unwrap();
        assert_eq!(config.id(), 1);
        assert_eq!(config.name(), None);
        assert!(config.is_self_powered());
        assert!(config.is_remote_wakeup());
        assert_eq!(config.max_power_ma(), 100);
        assert_eq!(config.interface_count(), 0);
    }

    #[test]
    fn test_configuration_id_is_value_not_index() {
        let transport = ScriptedTransport::new();
        let mut device = ScriptedDevice::basic(0x1234, 0x5678);
        device.configurations =
            vec![configuration_bytes(5, 0, 0x80, 25, &[InterfaceFixture::vendor(0)])];
        transport.add_device("usb:001/004", device);
        let session = transport.open_session("usb:001/004").unwrap();

        let config = decode_configuration(&transport, session, 0).unwrap();
        assert_eq!(config.id(), 5);
    }

    #[test]
    fn test_decode_configuration_is_deterministic() {
        let transport = ScriptedTransport::new();
        let session = open_basic(&transport);
        let first = decode_configuration(&transport, session, 0).unwrap();
        let second = decode_configuration(&transport, session, 0).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_decode_alternate_settings_as_separate_entries() {
        let transport = ScriptedTransport::new();
        let mut device = ScriptedDevice::basic(0x1234, 0x5678);
        let mut alt = InterfaceFixture::vendor(0);
        alt.alternate_setting = 1;
        alt.endpoints = vec![EndpointFixture::bulk_in()];
        device.configurations = vec![configuration_bytes(
            1,
            0,
            0x80,
            50,
            &[InterfaceFixture::vendor(0), alt, InterfaceFixture::vendor(1)],
        )];
        transport.add_device("usb:001/004", device);
        let session = transport.open_session("usb:001/004").unwrap();

        let config = decode_configuration(&transport, session, 0).unwrap();
        let entries: Vec<(u8, u8, usize)> = config
            .interfaces()
            .iter()
            .map(|i| (i.id(), i.alternate_setting(), i.endpoint_count()))
            .collect();
        assert_eq!(entries, vec![(0, 0, 2), (0, 1, 1), (1, 0, 2)]);
    }

    #[test]
    fn test_missing_declared_endpoint_stops_enumeration() {
        let transport = ScriptedTransport::new();
        let mut device = ScriptedDevice::basic(0x1234, 0x5678);
        // Second interface declares two endpoints but carries none; it must
        // be dropped and the walk must stop there, keeping the first.
        let mut truncated = InterfaceFixture::vendor(1);
        truncated.endpoints = Vec::new();
        truncated.declared_endpoints = Some(2);
        device.configurations = vec![configuration_bytes(
            1,
            0,
            0x80,
            50,
            &[InterfaceFixture::vendor(0), truncated, InterfaceFixture::vendor(2)],
        )];
        transport.add_device("usb:001/004", device);
        let session = transport.open_session("usb:001/004").unwrap();

        let config = decode_configuration(&transport, session, 0).unwrap();
        assert_eq!(config.interface_count(), 1);
        assert_eq!(config.interface(0).unwrap().id(), 0);
    }

    #[test]
    fn test_class_specific_descriptors_are_skipped() {
        let transport = ScriptedTransport::new();
        let mut device = ScriptedDevice::basic(0x1234, 0x5678);
        let mut raw = configuration_bytes(1, 0, 0x80, 50, &[]);
        // Interface descriptor declaring one endpoint, followed by a
        // class-specific (HID-style) descriptor, then the endpoint.
        raw.extend_from_slice(&[9, 0x04, 0, 0, 1, 0x03, 0x00, 0x00, 0]);
        raw.extend_from_slice(&[6, 0x21, 0x11, 0x01, 0x00, 0x01]);
        raw.extend_from_slice(&[7, 0x05, 0x81, 0x03, 0x08, 0x00, 0x0a]);
        let total = raw.len() as u16;
        raw[2..4].copy_from_slice(&total.to_le_bytes());
        device.configurations = vec![raw];
        transport.add_device("usb:001/004", device);
        let session = transport.open_session("usb:001/004").unwrap();

        let config = decode_configuration(&transport, session, 0).unwrap();
        assert_eq!(config.interface_count(), 1);
        let interface = config.interface(0).unwrap();
        assert_eq!(interface.class(), 0x03);
        assert_eq!(interface.endpoint_count(), 1);
        assert_eq!(interface.endpoint(0).unwrap().interval(), 0x0a);
    }

    #[test]
    fn test_decode_device_reads_pinned_offsets() {
        let transport = ScriptedTransport::new();
        let session = open_basic(&transport);

        let device = decode_device(&transport, session, "usb:001/004").unwrap();
        assert_eq!(device.name(), "usb:001/004");
        assert_eq!(device.vendor_id(), 0x1234);
        assert_eq!(device.product_id(), 0x5678);
        assert_eq!(device.manufacturer(), Some("Fixture Labs"));
        assert_eq!(device.product(), Some("Fixture Widget"));
        assert_eq!(device.serial_number(), Some("SN000001"));
        assert_eq!(device.version(), "1.02");
        assert_eq!(device.configuration_count(), 1);
        assert_eq!(device.session(), session);
    }

    #[test]
    fn test_decode_device_without_strings() {
        let transport = ScriptedTransport::new();
        let mut device = ScriptedDevice::basic(0x1234, 0x5678);
        // All string indexes zero: resolves to no string, not an error.
        device.descriptor =
            Some(device_descriptor_bytes(0x1234, 0x5678, 0, 0, 0, 0x0200, 0, 0, 0));
        device.strings.clear();
        transport.add_device("usb:001/004", device);
        let session = transport.open_session("usb:001/004").unwrap();

        let decoded = decode_device(&transport, session, "usb:001/004").unwrap();
        assert_eq!(decoded.manufacturer(), None);
        assert_eq!(decoded.product(), None);
        assert_eq!(decoded.serial_number(), None);
        assert_eq!(decoded.version(), "2.00");
    }

    #[test]
    fn test_missing_device_descriptor_is_hard_failure() {
        let transport = ScriptedTransport::new();
        let mut device = ScriptedDevice::basic(0x1234, 0x5678);
        device.descriptor = None;
        transport.add_device("usb:001/004", device);
        let session = transport.open_session("usb:001/004").unwrap();

        let err = decode_device(&transport, session, "usb:001/004").unwrap_err();
        assert_eq!(err, DecodeError::MissingDeviceDescriptor);
    }

    #[test]
    fn test_short_configuration_descriptor_is_hard_failure() {
        let transport = ScriptedTransport::new();
        let mut device = ScriptedDevice::basic(0x1234, 0x5678);
        device.configurations = vec![vec![9, 0x02, 0x09, 0x00]];
        transport.add_device("usb:001/004", device);
        let session = transport.open_session("usb:001/004").unwrap();

        let err = decode_device(&transport, session, "usb:001/004").unwrap_err();
        assert_eq!(err, DecodeError::ShortConfigurationDescriptor { index: 0, len: 4 });
    }

    #[test]
    fn test_version_string_rendering() {
        assert_eq!(version_string(0x0200), "2.00");
        assert_eq!(version_string(0x0102), "1.02");
        assert_eq!(version_string(0x1234), "12.34");
    }
}
