//! Descriptor Decoder Integration Tests
//!
//! Decodes full device trees through registration against scripted raw
//! descriptor buffers:
//! - Pinned field offsets and little-endian multi-byte fields
//! - String resolution, including absent strings
//! - Alternate settings, class-specific descriptors, truncated bundles
//! - Snapshot round-trips of the decoded model
//!
//! Run with: `cargo test -p host`

use std::sync::Arc;

use common::test_support::{
    EndpointFixture, InterfaceFixture, ScriptedDevice, ScriptedTransport, configuration_bytes,
    device_descriptor_bytes,
};
use host::{Direction, TransferKind, UsbDevice, UsbHost, restore, snapshot};
use transport::Speed;

// ============================================================================
// Test Utilities
// ============================================================================

fn decode(device: ScriptedDevice) -> UsbDevice {
    let transport = Arc::new(ScriptedTransport::new());
    transport.add_device("usb:001/004", device);
    let host = UsbHost::new(transport);
    let decoded = host.register("usb:001/004").unwrap().device().clone();
    host.destroy();
    decoded
}

fn audio_interface(id: u8, alternate_setting: u8) -> InterfaceFixture {
    InterfaceFixture {
        id,
        alternate_setting,
        string_index: 0,
        class: 0x01,
        subclass: 0x02,
        protocol: 0x00,
        endpoints: vec![EndpointFixture {
            address: 0x01,
            attributes: 0x01,
            max_packet_size: 192,
            interval: 1,
        }],
        declared_endpoints: None,
    }
}

// ============================================================================
// Device Fields
// ============================================================================

#[test]
fn test_device_fields_come_from_pinned_offsets() {
    let mut device = ScriptedDevice::basic(0x0000, 0x0000);
    device.descriptor =
        Some(device_descriptor_bytes(0xFEED, 0xBEEF, 0x09, 0x01, 0x02, 0x0310, 1, 2, 3));

    let decoded = decode(device);
    assert_eq!(decoded.vendor_id(), 0xFEED);
    assert_eq!(decoded.product_id(), 0xBEEF);
    assert_eq!(decoded.class(), 0x09);
    assert_eq!(decoded.subclass(), 0x01);
    assert_eq!(decoded.protocol(), 0x02);
    assert_eq!(decoded.version(), "3.10");
    assert_eq!(decoded.manufacturer(), Some("Fixture Labs"));
    assert_eq!(decoded.product(), Some("Fixture Widget"));
    assert_eq!(decoded.serial_number(), Some("SN000001"));
    assert_eq!(decoded.speed(), Speed::High);
}

#[test]
fn test_missing_strings_decode_to_none() {
    let mut device = ScriptedDevice::basic(0x1234, 0x5678);
    // Nonzero indexes the device does not carry resolve to no string.
    device.strings.clear();

    let decoded = decode(device);
    assert_eq!(decoded.manufacturer(), None);
    assert_eq!(decoded.product(), None);
    assert_eq!(decoded.serial_number(), None);
}

#[test]
fn test_every_configuration_is_decoded() {
    let mut device = ScriptedDevice::basic(0x1234, 0x5678);
    device.configurations = vec![
        configuration_bytes(1, 0, 0x80, 50, &[InterfaceFixture::vendor(0)]),
        configuration_bytes(2, 0, 0xC0, 10, &[audio_interface(0, 0)]),
    ];

    let decoded = decode(device);
    assert_eq!(decoded.configuration_count(), 2);
    assert_eq!(decoded.configuration(0).unwrap().id(), 1);
    assert_eq!(decoded.configuration(1).unwrap().id(), 2);
    assert!(decoded.configuration(1).unwrap().is_self_powered());
    assert_eq!(decoded.configuration(1).unwrap().max_power_ma(), 20);
}

// ============================================================================
// Interface and Endpoint Trees
// ============================================================================

#[test]
fn test_alternate_settings_are_separate_entries() {
    let mut device = ScriptedDevice::basic(0x1234, 0x5678);
    device.configurations = vec![configuration_bytes(
        1,
        0,
        0x80,
        50,
        &[audio_interface(1, 0), audio_interface(1, 1), audio_interface(1, 2)],
    )];

    let decoded = decode(device);
    let config = decoded.configuration(0).unwrap();
    assert_eq!(config.interface_count(), 3);
    let alts: Vec<u8> = config.interfaces().iter().map(|i| i.alternate_setting()).collect();
    assert_eq!(alts, vec![0, 1, 2]);
    assert!(config.interfaces().iter().all(|i| i.id() == 1));
}

#[test]
fn test_endpoint_fields_and_derived_accessors() {
    let decoded = decode(ScriptedDevice::basic(0x1234, 0x5678));
    let interface = decoded.configuration(0).unwrap().interface(0).unwrap();
    assert_eq!(interface.endpoint_count(), 2);

    let ep_in = interface.endpoint(0).unwrap();
    assert_eq!(ep_in.address(), 0x81);
    assert_eq!(ep_in.number(), 1);
    assert_eq!(ep_in.direction(), Direction::In);
    assert_eq!(ep_in.transfer_kind(), TransferKind::Bulk);
    assert_eq!(ep_in.max_packet_size(), 64);

    let ep_out = interface.endpoint(1).unwrap();
    assert_eq!(ep_out.direction(), Direction::Out);
}

#[test]
fn test_truncated_bundle_keeps_earlier_interfaces() {
    let mut device = ScriptedDevice::basic(0x1234, 0x5678);
    let mut truncated = InterfaceFixture::vendor(1);
    truncated.endpoints = vec![EndpointFixture::bulk_in()];
    truncated.declared_endpoints = Some(3);
    device.configurations = vec![configuration_bytes(
        1,
        0,
        0x80,
        50,
        &[InterfaceFixture::vendor(0), truncated],
    )];

    let decoded = decode(device);
    let config = decoded.configuration(0).unwrap();
    assert_eq!(config.interface_count(), 1);
    assert_eq!(config.interface(0).unwrap().id(), 0);
}

#[test]
fn test_decoding_is_deterministic() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.add_device("usb:001/004", ScriptedDevice::basic(0x1234, 0x5678));
    let host = UsbHost::new(transport);

    let connection = host.register("usb:001/004").unwrap();
    let first = connection.device().clone();
    connection.close();
    let second = host.register("usb:001/004").unwrap().device().clone();

    assert_eq!(first.configurations(), second.configurations());
    assert_eq!(first.version(), second.version());
}

// ============================================================================
// Snapshots
// ============================================================================

#[test]
fn test_snapshot_round_trip_preserves_the_decoded_tree() {
    let mut device = ScriptedDevice::basic(0x1234, 0x5678);
    device.configurations = vec![
        configuration_bytes(1, 0, 0x80, 50, &[InterfaceFixture::vendor(0)]),
        configuration_bytes(2, 0, 0xA0, 100, &[audio_interface(0, 0), audio_interface(0, 1)]),
    ];
    let decoded = decode(device);

    let restored = restore(&snapshot(&decoded).unwrap()).unwrap();
    assert_eq!(restored, decoded);
    assert_eq!(restored.configurations(), decoded.configurations());
    assert_eq!(restored.speed(), decoded.speed());
    assert!(!restored.session().is_valid());
}
