// THEORY:
// The `MatDevice` is the only stateful piece of the sensing layer: it exclusively
// owns the serial connection to the mat and runs the request/response exchange
// for one frame at a time.
//
// Key architectural principles:
// 1.  **Transport seam**: The device talks to a `MatTransport`, which is any byte
//     stream that can also drop its pending input. A real serial port and the
//     in-memory `ReplayTransport` both implement it, so the whole loop can run
//     without hardware.
// 2.  **Resynchronization**: Pending input is discarded before every request, and
//     again as soon as a response starts with anything other than the frame marker
//     or a frame is cut short. A late reply or a stale half-frame can never be read
//     as the current cycle's frame.
// 3.  **Error split**: "no frame ready" is an ordinary reading, a bad frame is a
//     recoverable error, and a broken transport is a fatal one.

use crate::config::SerialConfig;
use crate::core_modules::frame_decoder::{self, MatReading, Marker, REQUEST_BYTE};
use crate::error::{MatError, Result};
use serialport::{ClearBuffer, SerialPort};
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A byte stream to the mat that can throw away unread input.
pub trait MatTransport: Read + Write + Send {
    fn discard_input(&mut self) -> io::Result<()>;
}

impl MatTransport for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Owns the connection to the mat.
pub struct MatDevice<T: MatTransport> {
    transport: T,
}

impl MatDevice<Box<dyn SerialPort>> {
    /// Opens the serial port named in the configuration.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .timeout(Duration::from_millis(config.timeout_ms))
            .open()?;
        info!(port = %config.port, baud = config.baud_rate, "opened pressure mat");
        Ok(Self::new(port))
    }
}

impl<T: MatTransport> MatDevice<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Asks the mat for one frame. Whatever is still unread from earlier cycles is
    /// dropped first.
    pub fn request_pressure_map(&mut self) -> Result<()> {
        self.transport.discard_input()?;
        self.transport.write_all(&[REQUEST_BYTE])?;
        self.transport.flush()?;
        Ok(())
    }

    /// Reads one response. Resynchronizes the stream whenever the response is
    /// not a complete frame.
    pub fn receive_pressure_map(&mut self) -> Result<MatReading> {
        match frame_decoder::read_marker(&mut self.transport)? {
            Marker::Silent => {
                debug!("no frame before read timeout");
                Ok(MatReading::NoData)
            }
            Marker::Unexpected(byte) => {
                warn!(byte, "unexpected leading byte, discarding input");
                self.transport.discard_input()?;
                Ok(MatReading::NoData)
            }
            Marker::Frame => match frame_decoder::decode_body(&mut self.transport) {
                Ok(matrix) => {
                    debug!(active_points = matrix.active_count(), "decoded frame");
                    Ok(MatReading::Frame(matrix))
                }
                Err(err @ MatError::IncompleteFrame { .. }) => {
                    warn!(%err, "abandoning partial frame");
                    self.transport.discard_input()?;
                    Err(err)
                }
                Err(err) => Err(err),
            },
        }
    }

    /// One full request/response exchange.
    pub fn get_pressure_matrix(&mut self) -> Result<MatReading> {
        self.request_pressure_map()?;
        self.receive_pressure_map()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

/// One scripted reaction of a `ReplayTransport` to a frame request.
#[derive(Debug, Clone)]
pub enum ReplayStep {
    /// Append these bytes to the receive buffer.
    Respond(Vec<u8>),
    /// Send nothing; the next read times out.
    Silence,
    /// The device disappears; every later read and write fails.
    Disconnect,
}

/// An in-memory mat that answers each request with the next scripted step.
/// Once the script runs out it stays silent.
#[derive(Debug, Default)]
pub struct ReplayTransport {
    script: VecDeque<ReplayStep>,
    pending: VecDeque<u8>,
    requests: usize,
    discards: usize,
    disconnected: bool,
}

impl ReplayTransport {
    pub fn new(script: impl IntoIterator<Item = ReplayStep>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Number of request bytes the mat has received.
    pub fn requests(&self) -> usize {
        self.requests
    }

    /// Number of times unread bytes were actually thrown away.
    pub fn discards(&self) -> usize {
        self.discards
    }

    fn disconnected_error() -> io::Error {
        io::Error::new(ErrorKind::BrokenPipe, "mat disconnected")
    }
}

impl Read for ReplayTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.disconnected {
            return Err(Self::disconnected_error());
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending.is_empty() {
            return Err(io::Error::new(ErrorKind::TimedOut, "read timed out"));
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for ReplayTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.disconnected {
            return Err(Self::disconnected_error());
        }
        let requested = buf.iter().filter(|&&b| b == REQUEST_BYTE).count();
        for _ in 0..requested {
            self.requests += 1;
            match self.script.pop_front().unwrap_or(ReplayStep::Silence) {
                ReplayStep::Respond(bytes) => self.pending.extend(bytes),
                ReplayStep::Silence => {}
                ReplayStep::Disconnect => {
                    self.disconnected = true;
                    return Err(Self::disconnected_error());
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl MatTransport for ReplayTransport {
    fn discard_input(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            self.discards += 1;
            self.pending.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame_decoder::encode_frame;

    fn device(script: Vec<ReplayStep>) -> MatDevice<ReplayTransport> {
        MatDevice::new(ReplayTransport::new(script))
    }

    #[test]
    fn each_cycle_sends_one_request() {
        let mut mat = device(vec![ReplayStep::Respond(encode_frame(&[(1, 0, 1)]))]);
        let reading = mat.get_pressure_matrix().unwrap();
        let matrix = reading.into_matrix().unwrap();
        assert_eq!(matrix.get(1, 0), Some(1));
        assert_eq!(mat.transport().requests(), 1);
    }

    #[test]
    fn silence_yields_no_data() {
        let mut mat = device(vec![ReplayStep::Silence]);
        assert_eq!(mat.get_pressure_matrix().unwrap(), MatReading::NoData);
        assert_eq!(mat.transport().discards(), 0);
    }

    #[test]
    fn garbage_is_discarded_before_the_next_request() {
        let mut mat = device(vec![
            ReplayStep::Respond(vec![b'x', b'N', 0, 1]),
            ReplayStep::Respond(encode_frame(&[(2, 3, 9)])),
        ]);
        assert_eq!(mat.get_pressure_matrix().unwrap(), MatReading::NoData);
        assert_eq!(mat.transport().discards(), 1);

        let matrix = mat.get_pressure_matrix().unwrap().into_matrix().unwrap();
        assert_eq!(matrix.get(2, 3), Some(9));
    }

    #[test]
    fn partial_frame_is_reported_and_skipped() {
        let mut bytes = encode_frame(&[(1, 1, 1), (2, 2, 2)]);
        bytes.truncate(8);
        let mut mat = device(vec![
            ReplayStep::Respond(bytes),
            ReplayStep::Respond(encode_frame(&[(4, 4, 4)])),
        ]);

        assert!(matches!(
            mat.get_pressure_matrix(),
            Err(MatError::IncompleteFrame { .. })
        ));

        let matrix = mat.get_pressure_matrix().unwrap().into_matrix().unwrap();
        assert_eq!(matrix.active_count(), 1);
        assert_eq!(matrix.get(4, 4), Some(4));
    }

    #[test]
    fn leftover_response_is_dropped_before_the_next_request() {
        let mut doubled = encode_frame(&[(1, 1, 11)]);
        doubled.extend(encode_frame(&[(2, 2, 22)]));
        let mut mat = device(vec![
            ReplayStep::Respond(doubled),
            ReplayStep::Respond(encode_frame(&[(3, 3, 33)])),
        ]);

        let first = mat.get_pressure_matrix().unwrap().into_matrix().unwrap();
        assert_eq!(first.get(1, 1), Some(11));

        let second = mat.get_pressure_matrix().unwrap().into_matrix().unwrap();
        assert_eq!(second.get(3, 3), Some(33));
        assert_eq!(second.get(2, 2), Some(0));
        assert_eq!(mat.transport().discards(), 1);
    }

    #[test]
    fn late_reply_after_silence_is_not_used() {
        let mut mat = device(vec![
            ReplayStep::Silence,
            ReplayStep::Respond(encode_frame(&[(5, 5, 5)])),
        ]);
        assert_eq!(mat.get_pressure_matrix().unwrap(), MatReading::NoData);

        // The mat answers the first request only after the read gave up.
        mat.transport.pending.extend(encode_frame(&[(9, 9, 9)]));
        let matrix = mat.get_pressure_matrix().unwrap().into_matrix().unwrap();
        assert_eq!(matrix.get(5, 5), Some(5));
        assert_eq!(matrix.get(9, 9), Some(0));
    }

    #[test]
    fn disconnect_is_a_device_error() {
        let mut mat = device(vec![ReplayStep::Disconnect]);
        let err = mat.get_pressure_matrix().unwrap_err();
        assert!(matches!(err, MatError::Device(_)));
        assert!(!err.is_recoverable());
    }
}
