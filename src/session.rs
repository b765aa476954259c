use crate::core::protocol::{
    decode_frame, extract_numbers, extract_value_count, Command, CommandFrame, DecodeError,
    Extraction,
};
use crate::{SensorAddress, Transport};

use std::io;

use thiserror::Error;

/// Raw values returned by one completed fetch-data transaction, in sensor
/// order (moisture counts, temperature, bulk conductivity for a TEROS 12).
#[derive(Clone, Debug, PartialEq)]
pub struct RawMeasurement {
    values: Vec<f64>,
}

impl RawMeasurement {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Failure of a single address's transaction.
///
/// Never fatal to the process: the caller aborts the current cycle and moves
/// on. `NoData` is the expected degraded path for hardware that is not ready
/// yet and asks for a settling delay before the next attempt.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// No response line within the fixed timeout.
    #[error("sensor {address} did not respond within the timeout")]
    NoResponse {
        address: SensorAddress,
        #[source]
        source: io::Error,
    },
    /// The response violated the frame format.
    #[error("sensor {address} sent a malformed frame: {source}")]
    ProtocolError {
        address: SensorAddress,
        source: DecodeError,
    },
    /// Fewer numeric values than the measurement-start response promised.
    #[error(
        "sensor {address} returned {returned} of {promised} promised values",
        returned = .received.len()
    )]
    NoData {
        address: SensorAddress,
        promised: usize,
        received: Vec<f64>,
    },
    /// Port-level write or read failure other than a timeout.
    #[error("line I/O with sensor {address} failed")]
    LineIo {
        address: SensorAddress,
        #[source]
        source: io::Error,
    },
}

impl TransactionError {
    pub fn address(&self) -> SensorAddress {
        match *self {
            TransactionError::NoResponse { address, .. }
            | TransactionError::ProtocolError { address, .. }
            | TransactionError::NoData { address, .. }
            | TransactionError::LineIo { address, .. } => address,
        }
    }

    /// Whether the caller should apply the settling delay before retrying on
    /// the next cycle.
    pub fn wants_settling(&self) -> bool {
        matches!(
            self,
            TransactionError::NoData { .. } | TransactionError::NoResponse { .. }
        )
    }
}

/// One-at-a-time request/response transaction engine for a single address.
///
/// The line is half-duplex and shared, so a transaction must run to
/// completion before the next address is touched.
pub struct SensorSession<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    address: SensorAddress,
}

impl<'a, T: Transport + ?Sized> SensorSession<'a, T> {
    pub fn new(transport: &'a mut T, address: SensorAddress) -> Self {
        Self { transport, address }
    }

    fn send(&mut self, command: Command) -> Result<(), TransactionError> {
        let frame = CommandFrame::new(self.address, command);
        self.transport
            .send(frame.as_bytes())
            .map_err(|source| TransactionError::LineIo {
                address: self.address,
                source,
            })
    }

    fn read_response(&mut self) -> Result<Vec<u8>, TransactionError> {
        let address = self.address;
        self.transport.read_line().map_err(|source| {
            if source.kind() == io::ErrorKind::TimedOut {
                TransactionError::NoResponse { address, source }
            } else {
                TransactionError::LineIo { address, source }
            }
        })
    }

    fn protocol_error(&self, source: DecodeError) -> TransactionError {
        TransactionError::ProtocolError {
            address: self.address,
            source,
        }
    }

    /// Send `I!` and return the identification payload.
    ///
    /// Used during setup to confirm that a sensor answers on the line before
    /// its relay is armed.
    pub fn identify(&mut self) -> Result<String, TransactionError> {
        self.send(Command::Identify)?;
        let line = self.read_response()?;
        let payload = decode_frame(&line, false).map_err(|err| self.protocol_error(err))?;
        Ok(String::from_utf8_lossy(payload).into_owned())
    }

    /// Run the full measurement transaction.
    ///
    /// `M!` promises a value count in its response; after the sensor's
    /// service-request line, `D0!` must deliver exactly that many values or
    /// the transaction ends in `NoData`.
    pub fn measure(&mut self) -> Result<RawMeasurement, TransactionError> {
        self.send(Command::StartMeasurement)?;
        let line = self.read_response()?;
        let payload = decode_frame(&line, false).map_err(|err| self.protocol_error(err))?;
        let promised = extract_value_count(payload).map_err(|err| self.protocol_error(err))?;

        // Service-request acknowledgment precedes the data; discard it.
        self.read_response()?;

        self.send(Command::FetchData)?;
        let line = self.read_response()?;
        let payload = decode_frame(&line, true).map_err(|err| self.protocol_error(err))?;
        match extract_numbers(payload, promised) {
            Extraction::Complete(values) => Ok(RawMeasurement { values }),
            Extraction::Partial(received) => {
                log::warn!(
                    "No data received from sensor at address {} ({} of {} values)",
                    self.address,
                    received.len(),
                    promised
                );
                Err(TransactionError::NoData {
                    address: self.address,
                    promised,
                    received,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedTransport;
    use std::convert::TryFrom;

    fn address(ch: char) -> SensorAddress {
        SensorAddress::try_from(ch).unwrap()
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn measure_runs_the_three_step_transaction() {
        let mut transport = ScriptedTransport::new(vec![
            b"10013\r\n".to_vec(),
            b"1\r\n".to_vec(),
            b"1+1234.5+22.1+350\r\n".to_vec(),
        ]);
        let raw = SensorSession::new(&mut transport, address('1'))
            .measure()
            .unwrap();
        assert_eq!(raw.values(), &[1234.5, 22.1, 350.0]);
        assert_eq!(transport.sent, vec![b"1M!".to_vec(), b"1D0!".to_vec()]);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn short_data_frame_is_no_data() {
        let mut transport = ScriptedTransport::new(vec![
            b"20013\r\n".to_vec(),
            b"2\r\n".to_vec(),
            b"2+1.5+2.5\r\n".to_vec(),
        ]);
        let err = SensorSession::new(&mut transport, address('2'))
            .measure()
            .unwrap_err();
        assert!(err.wants_settling());
        match err {
            TransactionError::NoData {
                promised, received, ..
            } => {
                assert_eq!(promised, 3);
                assert_eq!(received, vec![1.5, 2.5]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn timeout_maps_to_no_response() {
        let mut transport = ScriptedTransport::new(vec![]);
        let err = SensorSession::new(&mut transport, address('1'))
            .measure()
            .unwrap_err();
        assert!(matches!(err, TransactionError::NoResponse { .. }));
        assert!(err.wants_settling());
    }

    #[test]
    fn missing_value_count_is_a_protocol_error() {
        let mut transport = ScriptedTransport::new(vec![b"abc\r\n".to_vec()]);
        let err = SensorSession::new(&mut transport, address('1'))
            .measure()
            .unwrap_err();
        assert!(matches!(
            err,
            TransactionError::ProtocolError {
                source: DecodeError::NoValueCount,
                ..
            }
        ));
        assert!(!err.wants_settling());
    }

    #[test]
    fn truncated_frame_is_a_protocol_error() {
        let mut transport = ScriptedTransport::new(vec![b"\r".to_vec()]);
        let err = SensorSession::new(&mut transport, address('1'))
            .measure()
            .unwrap_err();
        assert!(matches!(
            err,
            TransactionError::ProtocolError {
                source: DecodeError::TruncatedFrame,
                ..
            }
        ));
    }

    #[test]
    fn identify_returns_the_payload() {
        let mut transport = ScriptedTransport::new(vec![b"113TEROS12 123\r\n".to_vec()]);
        let info = SensorSession::new(&mut transport, address('1'))
            .identify()
            .unwrap();
        assert_eq!(info, "113TEROS12 123");
        assert_eq!(transport.sent, vec![b"1I!".to_vec()]);
    }
}
