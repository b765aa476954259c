use crate::core::protocol::serial::*;
use crate::Transport;

use std::{
    io::{Read, Write},
    path::Path,
    thread,
};

use serialport::{SerialPort, SerialPortSettings};

pub const SERIAL_PORT_SETTINGS: SerialPortSettings = SerialPortSettings {
    baud_rate: BAUD_RATE,
    data_bits: DATA_BITS,
    stop_bits: STOP_BITS,
    parity: PARITY,
    flow_control: FLOW_CONTROL,
    timeout: RESPONSE_TIMEOUT,
};

/// The physical half-duplex line, exclusively owned for the process
/// lifetime. Dropping the transport closes the port.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open the adapter at `path` and wait for it to become ready.
    pub fn open_path(path: impl AsRef<Path>) -> serialport::Result<Self> {
        log::info!("Connecting to serial port {}", path.as_ref().display());
        let port =
            serialport::open_with_settings(path.as_ref().as_os_str(), &SERIAL_PORT_SETTINGS)?;
        thread::sleep(STARTUP_DELAY);
        Ok(Self { port })
    }

    pub fn from_port(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()
    }

    fn read_line(&mut self) -> std::io::Result<Vec<u8>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            self.port.read_exact(&mut byte)?;
            line.push(byte[0]);
            if byte[0] == b'\n' {
                return Ok(line);
            }
        }
    }
}
