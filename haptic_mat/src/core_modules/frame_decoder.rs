// THEORY:
// The `frame_decoder` module is the bridge between the raw serial byte stream and
// the typed `PressureMatrix`. It implements the mat firmware's "active points"
// response format, bit for bit:
//
//   request:  'R'
//   response: 'N' | count:u16be | sync:2 | count x ( column:u8 | row:u8 | value:u16be )
//
// Key architectural principles:
// 1.  **Stateless**: Every call starts at a frame boundary and either consumes one
//     whole frame or reports why it could not. Nothing is buffered between calls.
// 2.  **All-or-nothing**: The declared payload is read in full before a single cell
//     is written. A short read is an `IncompleteFrame` error; a caller never sees a
//     half-filled matrix.
// 3.  **Marker first**: The marker byte is read separately so the device layer can
//     tell "nothing arrived" apart from "something other than a frame arrived" and
//     resynchronize in the latter case.

use crate::core_modules::pressure_matrix::{Coord, PressureMatrix};
use crate::error::{MatError, Result};
use std::io::{ErrorKind, Read};

/// Byte written to the mat to solicit one frame.
pub const REQUEST_BYTE: u8 = b'R';
/// First byte of every active-points response.
pub const FRAME_MARKER: u8 = b'N';
/// Point count (2 bytes) plus two sync bytes.
pub const HEADER_LEN: usize = 4;
/// column, row, value high, value low.
pub const POINT_LEN: usize = 4;

/// What the first byte of a response said.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// No byte arrived before the read timeout.
    Silent,
    /// The frame marker; a frame body follows.
    Frame,
    /// Any other byte. The stream is out of step and must be discarded.
    Unexpected(u8),
}

/// The result of one get-matrix cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatReading {
    NoData,
    Frame(PressureMatrix),
}

impl MatReading {
    pub fn into_matrix(self) -> Option<PressureMatrix> {
        match self {
            MatReading::NoData => None,
            MatReading::Frame(matrix) => Some(matrix),
        }
    }
}

/// Reads until `buf` is full, the stream ends, or the transport times out.
/// Returns the number of bytes actually read.
fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reads the single leading byte of a response.
pub fn read_marker<R: Read + ?Sized>(reader: &mut R) -> Result<Marker> {
    let mut byte = [0u8; 1];
    if read_up_to(reader, &mut byte)? == 0 {
        return Ok(Marker::Silent);
    }
    Ok(match byte[0] {
        FRAME_MARKER => Marker::Frame,
        other => Marker::Unexpected(other),
    })
}

/// Decodes everything after the marker byte into a fresh matrix.
pub fn decode_body<R: Read + ?Sized>(reader: &mut R) -> Result<PressureMatrix> {
    let mut header = [0u8; HEADER_LEN];
    let received = read_up_to(reader, &mut header)?;
    if received < HEADER_LEN {
        return Err(MatError::IncompleteFrame {
            expected: HEADER_LEN,
            received,
        });
    }
    let point_count = u16::from_be_bytes([header[0], header[1]]) as usize;

    let mut payload = vec![0u8; point_count * POINT_LEN];
    let received = read_up_to(reader, &mut payload)?;
    if received < payload.len() {
        return Err(MatError::IncompleteFrame {
            expected: HEADER_LEN + payload.len(),
            received: HEADER_LEN + received,
        });
    }

    // The whole frame is consumed by now, so rejecting it leaves the stream aligned.
    let mut matrix = PressureMatrix::new();
    for point in payload.chunks_exact(POINT_LEN) {
        let coord = Coord::new(point[1] as usize, point[0] as usize);
        let value = u16::from_be_bytes([point[2], point[3]]);
        matrix.set(coord.row, coord.column, value)?;
    }
    Ok(matrix)
}

/// Decodes one response, marker included. Anything that is not a frame marker
/// yields `MatReading::NoData`.
pub fn decode_frame<R: Read + ?Sized>(reader: &mut R) -> Result<MatReading> {
    match read_marker(reader)? {
        Marker::Frame => decode_body(reader).map(MatReading::Frame),
        Marker::Silent | Marker::Unexpected(_) => Ok(MatReading::NoData),
    }
}

/// Encodes `(row, column, value)` triples as a mat response, marker included.
/// Only the first `u16::MAX` points are encoded.
pub fn encode_frame(points: &[(u8, u8, u16)]) -> Vec<u8> {
    let points = &points[..points.len().min(u16::MAX as usize)];
    let mut bytes = Vec::with_capacity(1 + HEADER_LEN + points.len() * POINT_LEN);
    bytes.push(FRAME_MARKER);
    bytes.extend_from_slice(&(points.len() as u16).to_be_bytes());
    bytes.extend_from_slice(&[0, 0]);
    for &(row, column, value) in points {
        bytes.push(column);
        bytes.push(row);
        bytes.extend_from_slice(&value.to_be_bytes());
    }
    bytes
}
