use core::time::Duration;

use serialport::{DataBits, FlowControl, Parity, StopBits};

// Line parameters of the SDI-12 USB adapter, not of the SDI-12 bus itself
// (the adapter translates to 1200 baud on the sensor side).
pub const BAUD_RATE: u32 = 9600;
pub const DATA_BITS: DataBits = DataBits::Eight;
pub const STOP_BITS: StopBits = StopBits::One;
pub const PARITY: Parity = Parity::None;
pub const FLOW_CONTROL: FlowControl = FlowControl::None;

/// Fixed per-read timeout for the whole session; no per-command override.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Settling time after opening the port, covering the adapter's bootloader
/// and its one-second startup delay.
pub const STARTUP_DELAY: Duration = Duration::from_millis(2_500);
