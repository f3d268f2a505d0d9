//! Serial port configuration and connection management
//!
//! Handles serial port discovery and the connection to the processor's UART.

use super::link::DeviceLink;
use anyhow::{Context, Result};
use colored::Colorize;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Port used when none is given
pub const DEFAULT_PORT: &str = "/dev/ttyUSB1";

/// Baud rate suggested at the prompt
pub const DEFAULT_BAUD: u32 = 115200;

/// Read timeout for line reads
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for serial port connection
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/ttyUSB1, COM3)
    pub port_path: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (default: 8)
    pub data_bits: DataBits,
    /// Parity (default: None)
    pub parity: Parity,
    /// Stop bits (default: 2, the processor's UART expects two)
    pub stop_bits: StopBits,
    /// Flow control (default: None)
    pub flow_control: FlowControl,
    /// Read timeout
    pub timeout: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_path: String::from(DEFAULT_PORT),
            baud_rate: DEFAULT_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::Two,
            flow_control: FlowControl::None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PortConfig {
    /// Create a new configuration with default settings
    pub fn new(port_path: &str) -> Self {
        Self {
            port_path: port_path.to_string(),
            ..Default::default()
        }
    }

    /// Set the baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// An open connection to the processor's UART
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
    config: PortConfig,
}

impl SerialConnection {
    /// Open a serial connection with the given configuration
    pub fn open(config: PortConfig) -> Result<Self> {
        let port = serialport::new(&config.port_path, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .timeout(config.timeout)
            .open()
            .with_context(|| format!("Failed to open serial port: {}", config.port_path))?;

        Ok(Self { port, config })
    }

    /// Get the port configuration
    pub fn config(&self) -> &PortConfig {
        &self.config
    }
}

impl Read for SerialConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl DeviceLink for SerialConnection {
    fn discard_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::from)
    }
}

/// Information about a detected serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub path: String,
    pub port_type: PortType,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl PortInfo {
    /// One-line human description, used in the port selection list
    pub fn description(&self) -> String {
        match (&self.product, &self.manufacturer) {
            (Some(prod), _) => prod.clone(),
            (None, Some(mfg)) => format!("{} ({})", self.port_type, mfg),
            (None, None) => self.port_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PortType {
    UsbSerial,
    PciSerial,
    Bluetooth,
    Unknown,
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortType::UsbSerial => write!(f, "USB Serial"),
            PortType::PciSerial => write!(f, "PCI Serial"),
            PortType::Bluetooth => write!(f, "Bluetooth"),
            PortType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// List all available serial ports, in the order the OS reports them
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().with_context(|| "Failed to enumerate serial ports")?;

    let port_infos: Vec<PortInfo> = ports
        .into_iter()
        .map(|p| {
            let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    PortType::UsbSerial,
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::PciPort => {
                    (PortType::PciSerial, None, None, None, None, None)
                }
                serialport::SerialPortType::BluetoothPort => {
                    (PortType::Bluetooth, None, None, None, None, None)
                }
                serialport::SerialPortType::Unknown => {
                    (PortType::Unknown, None, None, None, None, None)
                }
            };

            PortInfo {
                path: p.port_name,
                port_type,
                manufacturer,
                product,
                serial_number,
                vid,
                pid,
            }
        })
        .collect();

    Ok(port_infos)
}

/// Print the numbered port list used for interactive selection
pub fn print_port_choices(ports: &[PortInfo]) {
    println!("{}", "Found UART devices:".cyan().bold());
    for (i, port) in ports.iter().enumerate() {
        println!("[{}] - {}: {}", i, port.path.white().bold(), port.description());
    }
}

/// USB details worth showing in `serial list`, empty for non-USB ports
pub fn usb_details(port: &PortInfo) -> Vec<String> {
    let mut details = Vec::new();
    if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        details.push(format!("{:04x}:{:04x}", vid, pid));
    }
    if let Some(ref mfg) = port.manufacturer {
        details.push(mfg.clone());
    }
    if let Some(ref sn) = port.serial_number {
        details.push(format!("s/n {}", sn));
    }
    details
}

/// Print the ports `serial run -p` accepts
pub fn print_ports() -> Result<()> {
    let ports = list_ports()?;

    if ports.is_empty() {
        println!("{}", "No serial ports found".yellow());
        println!("  Is the board powered and its USB-UART cable plugged in?");
        println!(
            "  Two-channel FTDI bridges put the processor UART on the second port ({}).",
            DEFAULT_PORT
        );
        return Ok(());
    }

    println!("{}", "Available Serial Ports:".green().bold());
    for port in &ports {
        println!("  {}  {}", port.path.white().bold(), port.description());
        let details = usb_details(port);
        if !details.is_empty() {
            println!("      {}", details.join(", ").dimmed());
        }
    }
    println!(
        "\n{}",
        "Use: cougar-term serial run -p <PORT> -b <BAUD> to connect".yellow()
    );

    Ok(())
}
