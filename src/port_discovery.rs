use anyhow::{Context, Result};
use serialport::{SerialPortInfo, SerialPortType};

/// Shown instead of an empty list so port pickers always have an entry.
pub const NO_PORTS: &str = "None";

/// Source of port names, the OS in production.
pub trait PortEnumerator: Send + Sync {
    fn port_names(&self) -> Result<Vec<String>>;
}

pub struct SystemPorts;

impl SystemPorts {
    pub fn available() -> Result<Vec<SerialPortInfo>> {
        serialport::available_ports().context("Failed to list serial ports")
    }
}

impl PortEnumerator for SystemPorts {
    fn port_names(&self) -> Result<Vec<String>> {
        Ok(Self::available()?.into_iter().map(|p| p.port_name).collect())
    }
}

pub struct PortCatalog {
    source: Box<dyn PortEnumerator>,
}

impl PortCatalog {
    pub fn new(source: impl PortEnumerator + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    pub fn system() -> Self {
        Self::new(SystemPorts)
    }

    fn enumerate(&self) -> Vec<String> {
        match self.source.port_names() {
            Ok(names) => names,
            Err(e) => {
                log::warn!("Port enumeration failed, treating as no ports: {e:#}");
                Vec::new()
            }
        }
    }

    /// Sorted port names, or just [`NO_PORTS`] when there are none.
    pub fn list_ports(&self) -> Vec<String> {
        let mut names = self.enumerate();
        if names.is_empty() {
            return vec![NO_PORTS.to_string()];
        }
        names.sort();
        names
    }

    /// Case-insensitive exact match against what the OS reports.
    pub fn port_exists(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// The OS spelling of `name`, matched case-insensitively. Device paths are
    /// case-sensitive on Unix, so this is the name to open.
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.enumerate().into_iter().find(|port| {
            log::trace!("Checking serial port {name} against {port}");
            port.eq_ignore_ascii_case(name)
        })
    }

    pub fn first_port(&self) -> String {
        self.list_ports()
            .into_iter()
            .next()
            .unwrap_or_else(|| NO_PORTS.to_string())
    }
}

/// One row per port, sorted, with USB details when the OS has them. An empty
/// system lists the [`NO_PORTS`] sentinel, same as the catalog.
pub fn port_listing(ports: &[SerialPortInfo]) -> Vec<String> {
    if ports.is_empty() {
        return vec![NO_PORTS.to_string()];
    }
    let mut ports: Vec<&SerialPortInfo> = ports.iter().collect();
    ports.sort_by(|a, b| a.port_name.cmp(&b.port_name));

    ports
        .into_iter()
        .map(|p| {
            let detail = match &p.port_type {
                SerialPortType::UsbPort(info) => {
                    let mut usb = format!("USB vid=0x{:04x} pid=0x{:04x}", info.vid, info.pid);
                    for extra in [&info.manufacturer, &info.product].into_iter().flatten() {
                        usb.push(' ');
                        usb.push_str(extra);
                    }
                    Some(usb)
                }
                SerialPortType::BluetoothPort => Some("Bluetooth".to_string()),
                SerialPortType::PciPort => Some("PCI".to_string()),
                SerialPortType::Unknown => None,
            };
            match detail {
                Some(detail) => format!("{}  ({detail})", p.port_name),
                None => p.port_name.clone(),
            }
        })
        .collect()
}

pub fn print_ports(ports: &[SerialPortInfo]) {
    println!("Available serial ports:");
    for row in port_listing(ports) {
        println!("  {row}");
    }
}

#[cfg(test)]
pub struct FixedPorts(Vec<String>);

#[cfg(test)]
impl FixedPorts {
    pub fn new(names: &[&str]) -> Self {
        Self(names.iter().map(|n| n.to_string()).collect())
    }
}

#[cfg(test)]
impl PortEnumerator for FixedPorts {
    fn port_names(&self) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}
