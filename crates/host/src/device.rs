//! The USB device model
//!
//! An immutable tree of device, configuration, interface, and endpoint
//! entities built by the descriptor decoder. The model owns its tree
//! exclusively; nothing in it references native resources except the
//! session handle the registry opened for the device.

use serde::{Deserialize, Serialize};
use transport::{SessionHandle, Speed};

/// Mask for the endpoint number in the address byte.
pub const ENDPOINT_NUMBER_MASK: u8 = 0x0f;
/// Mask for the direction bit in the address byte.
pub const ENDPOINT_DIR_MASK: u8 = 0x80;
/// Mask for the transfer type in the attributes byte.
pub const ENDPOINT_XFER_TYPE_MASK: u8 = 0x03;

/// Mask for the "self-powered" bit in a configuration's attributes.
const ATTR_SELF_POWERED: u8 = 1 << 6;
/// Mask for the "remote wakeup" bit in a configuration's attributes.
const ATTR_REMOTE_WAKEUP: u8 = 1 << 5;

/// Data direction of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Host to device
    Out,
    /// Device to host
    In,
}

/// Transfer type encoded in an endpoint's attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// An endpoint on a [`UsbInterface`]: one channel for moving data to or
/// from the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbEndpoint {
    address: u8,
    attributes: u8,
    max_packet_size: u16,
    interval: u8,
}

impl UsbEndpoint {
    pub(crate) fn new(address: u8, attributes: u8, max_packet_size: u16, interval: u8) -> Self {
        UsbEndpoint { address, attributes, max_packet_size, interval }
    }

    /// The raw address byte: endpoint number in the low 4 bits, direction
    /// in bit 7.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// The endpoint number extracted from the address.
    pub fn number(&self) -> u8 {
        self.address & ENDPOINT_NUMBER_MASK
    }

    /// The data direction extracted from the address.
    pub fn direction(&self) -> Direction {
        if self.address & ENDPOINT_DIR_MASK != 0 { Direction::In } else { Direction::Out }
    }

    /// The raw attributes byte.
    pub fn attributes(&self) -> u8 {
        self.attributes
    }

    /// The transfer type encoded in the low two attribute bits.
    pub fn transfer_kind(&self) -> TransferKind {
        match self.attributes & ENDPOINT_XFER_TYPE_MASK {
            0 => TransferKind::Control,
            1 => TransferKind::Isochronous,
            2 => TransferKind::Bulk,
            _ => TransferKind::Interrupt,
        }
    }

    /// Maximum packet size in bytes.
    pub fn max_packet_size(&self) -> u16 {
        self.max_packet_size
    }

    /// Polling interval.
    pub fn interval(&self) -> u8 {
        self.interval
    }
}

/// An interface on a [`UsbDevice`]. Distinct alternate settings of the same
/// interface number are separate values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbInterface {
    id: u8,
    alternate_setting: u8,
    name: Option<String>,
    class: u8,
    subclass: u8,
    protocol: u8,
    endpoints: Vec<UsbEndpoint>,
}

impl UsbInterface {
    pub(crate) fn new(
        id: u8,
        alternate_setting: u8,
        name: Option<String>,
        class: u8,
        subclass: u8,
        protocol: u8,
        endpoints: Vec<UsbEndpoint>,
    ) -> Self {
        UsbInterface { id, alternate_setting, name, class, subclass, protocol, endpoints }
    }

    /// The interface number. Together with the alternate setting this
    /// uniquely identifies the interface on the device.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// The alternate setting number.
    pub fn alternate_setting(&self) -> u8 {
        self.alternate_setting
    }

    /// The interface name, if the device carries one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn class(&self) -> u8 {
        self.class
    }

    pub fn subclass(&self) -> u8 {
        self.subclass
    }

    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    /// Number of endpoints on this interface.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// The endpoint at the given index.
    pub fn endpoint(&self, index: usize) -> Option<&UsbEndpoint> {
        self.endpoints.get(index)
    }

    /// All endpoints of this interface.
    pub fn endpoints(&self) -> &[UsbEndpoint] {
        &self.endpoints
    }
}

/// A configuration on a [`UsbDevice`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbConfiguration {
    id: u8,
    name: Option<String>,
    attributes: u8,
    max_power: u8,
    interfaces: Vec<UsbInterface>,
}

impl UsbConfiguration {
    pub(crate) fn new(
        id: u8,
        name: Option<String>,
        attributes: u8,
        max_power: u8,
        interfaces: Vec<UsbInterface>,
    ) -> Self {
        UsbConfiguration { id, name, attributes, max_power, interfaces }
    }

    /// The configuration value that identifies this configuration on the
    /// device (not its descriptor index).
    pub fn id(&self) -> u8 {
        self.id
    }

    /// The configuration name, if the device carries one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// True if the device has a power source other than the bus.
    pub fn is_self_powered(&self) -> bool {
        (self.attributes & ATTR_SELF_POWERED) != 0
    }

    /// True if the device may signal the host to wake from suspend.
    pub fn is_remote_wakeup(&self) -> bool {
        (self.attributes & ATTR_REMOTE_WAKEUP) != 0
    }

    /// Maximum power consumption in milliamps. The descriptor stores the
    /// value in 2 mA units.
    pub fn max_power_ma(&self) -> u16 {
        self.max_power as u16 * 2
    }

    /// Number of interface entries, one per alternate setting.
    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    /// The interface entry at the given index.
    pub fn interface(&self, index: usize) -> Option<&UsbInterface> {
        self.interfaces.get(index)
    }

    /// All interface entries, flattened across alternate settings.
    pub fn interfaces(&self) -> &[UsbInterface] {
        &self.interfaces
    }
}

/// A USB device attached to the host.
///
/// Constructed by the descriptor decoder with its configuration tree fully
/// populated; immutable afterwards. Identity equality is by device name, not
/// by session handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbDevice {
    name: String,
    vendor_id: u16,
    product_id: u16,
    class: u8,
    subclass: u8,
    protocol: u8,
    manufacturer: Option<String>,
    product: Option<String>,
    serial_number: Option<String>,
    version: String,
    speed: Speed,
    #[serde(skip)]
    session: SessionHandle,
    configurations: Vec<UsbConfiguration>,
}

impl UsbDevice {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        vendor_id: u16,
        product_id: u16,
        class: u8,
        subclass: u8,
        protocol: u8,
        manufacturer: Option<String>,
        product: Option<String>,
        serial_number: Option<String>,
        version: String,
        speed: Speed,
        session: SessionHandle,
        configurations: Vec<UsbConfiguration>,
    ) -> Self {
        UsbDevice {
            name,
            vendor_id,
            product_id,
            class,
            subclass,
            protocol,
            manufacturer,
            product,
            serial_number,
            version,
            speed,
            session,
            configurations,
        }
    }

    /// The device name: the platform path of the device node, stable for
    /// the attachment lifetime. This is the device's identity.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    pub fn class(&self) -> u8 {
        self.class
    }

    pub fn subclass(&self) -> u8 {
        self.subclass
    }

    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    /// Manufacturer string, or `None` if the property could not be read.
    pub fn manufacturer(&self) -> Option<&str> {
        self.manufacturer.as_deref()
    }

    /// Product string, or `None` if the property could not be read.
    pub fn product(&self) -> Option<&str> {
        self.product.as_deref()
    }

    /// Serial number string, or `None` if the property could not be read.
    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    /// Device version string, rendered from the bcdDevice field.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Negotiated link speed.
    pub fn speed(&self) -> Speed {
        self.speed
    }

    /// The native session handle opened for this device.
    ///
    /// [`SessionHandle::INVALID`] on a model reconstructed from a snapshot.
    pub fn session(&self) -> SessionHandle {
        self.session
    }

    /// Number of configurations.
    pub fn configuration_count(&self) -> usize {
        self.configurations.len()
    }

    /// The configuration at the given index.
    pub fn configuration(&self, index: usize) -> Option<&UsbConfiguration> {
        self.configurations.get(index)
    }

    /// All configurations.
    pub fn configurations(&self) -> &[UsbConfiguration] {
        &self.configurations
    }

    /// All interface entries across all configurations, flattened.
    pub fn interfaces(&self) -> impl Iterator<Item = &UsbInterface> {
        self.configurations.iter().flat_map(|c| c.interfaces.iter())
    }
}

impl PartialEq for UsbDevice {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for UsbDevice {}

impl std::hash::Hash for UsbDevice {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
