//! Frame reader (C8): reads the record-framed data-socket stream for one
//! frame, applying the end-of-records sentinel, byte-swap and padding
//! fix-ups described in §4.8.

use std::io::Read as _;
use std::net::TcpStream;
use std::time::Duration;

use tracing::warn;

use crate::enums::FrameType;
use crate::error::{Error, Status};
use crate::wire::{WireParameters, WireReader};

/// How long to wait for the backend's erroneous trailing status byte before
/// concluding there isn't one.
const TRAILING_STATUS_TIMEOUT: Duration = Duration::from_millis(50);

/// One fully read, fixed-up frame: parameters plus payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_type: FrameType,
    pub last_frame: bool,
    pub bytes_per_line: i32,
    pub pixels_per_line: i32,
    pub line_count: i32,
    pub depth_per_pixel: i32,
    pub data: Vec<u8>,
}

/// Builder for [`Frame`]'s parameters: `lineCount` is the only field that
/// can change after the fact (inferred once the payload size is known), so
/// it is held mutable here and frozen into the immutable `Frame` at the end
/// of [`read`] rather than exposing interior mutability on `Frame` itself.
struct FrameParametersBuilder {
    frame_type: FrameType,
    last_frame: bool,
    bytes_per_line: i32,
    pixels_per_line: i32,
    line_count: i32,
    depth_per_pixel: i32,
}

impl From<WireParameters> for FrameParametersBuilder {
    fn from(p: WireParameters) -> Self {
        Self {
            frame_type: p.frame_type,
            last_frame: p.last_frame,
            bytes_per_line: p.bytes_per_line,
            pixels_per_line: p.pixels_per_line,
            line_count: p.line_count,
            depth_per_pixel: p.depth_per_pixel,
        }
    }
}

impl FrameParametersBuilder {
    fn freeze(self, data: Vec<u8>) -> Frame {
        Frame {
            frame_type: self.frame_type,
            last_frame: self.last_frame,
            bytes_per_line: self.bytes_per_line,
            pixels_per_line: self.pixels_per_line,
            line_count: self.line_count,
            depth_per_pixel: self.depth_per_pixel,
            data,
        }
    }
}

/// Reads one frame off `data_socket`. `big_endian` is the byte order `START`
/// reported for this acquisition; `expected_image_bytes` is `Some(bytesPerLine
/// * lineCount)` when `lineCount` was known up front. `on_record` is invoked
/// after every record with `(totalBytesRead, expectedImageBytes)`.
pub fn read(
    data_socket: TcpStream,
    parameters: WireParameters,
    big_endian: bool,
    expected_image_bytes: Option<usize>,
    mut on_record: impl FnMut(usize, Option<usize>),
) -> Result<Frame, Error> {
    let mut builder = FrameParametersBuilder::from(parameters);
    let mut buffer = Vec::new();

    {
        let mut reader = WireReader::new(&data_socket);
        loop {
            let len_word = reader.read_word()?;
            if len_word == -1 {
                break;
            }
            if len_word < 0 {
                return Err(Error::protocol("record length exceeds the supported range"));
            }
            let chunk = reader.read_exact_bytes(len_word as usize)?;
            buffer.extend_from_slice(&chunk);
            on_record(buffer.len(), expected_image_bytes);
        }
    }

    if let Some(status) = read_trailing_status(&data_socket)? {
        if status != Status::Eof {
            return Err(Error::Status { status, rpc: "DATA_SOCKET" });
        }
    }

    if let Some(expected) = expected_image_bytes {
        if buffer.len() < expected {
            warn!(expected, received = buffer.len(), "frame shorter than expected, padding with zeros");
            buffer.resize(expected, 0);
        }
    }

    if builder.depth_per_pixel == 16 && !big_endian {
        if buffer.len() % 2 != 0 {
            return Err(Error::protocol("16-bit frame buffer has odd length, cannot byte-swap"));
        }
        for pair in buffer.chunks_exact_mut(2) {
            pair.swap(0, 1);
        }
    }

    if builder.line_count <= 0 && builder.bytes_per_line > 0 {
        builder.line_count = (buffer.len() / builder.bytes_per_line as usize) as i32;
    }

    Ok(builder.freeze(buffer))
}

/// Some backends emit one extra byte after the end-of-records sentinel.
/// Tolerated if it decodes to `EOF`; any other value (or none at all within
/// the timeout) is handled per §4.8.
fn read_trailing_status(data_socket: &TcpStream) -> Result<Option<Status>, Error> {
    data_socket.set_read_timeout(Some(TRAILING_STATUS_TIMEOUT))?;
    let mut byte = [0u8; 1];
    match (&*data_socket).read(&mut byte) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(Status::from_word(byte[0] as i32))),
        Err(err)
            if matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) =>
        {
            Ok(None)
        }
        Err(err) => Err(Error::Io(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    fn parameters(frame_type: FrameType, bytes_per_line: i32, line_count: i32, depth: i32) -> WireParameters {
        WireParameters {
            frame_type,
            last_frame: true,
            bytes_per_line,
            pixels_per_line: bytes_per_line,
            line_count,
            depth_per_pixel: depth,
        }
    }

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = listener.accept().unwrap();
        (server, client.join().unwrap())
    }

    #[test]
    fn reads_records_until_sentinel() {
        let (server, client) = loopback_pair();
        let writer = thread::spawn(move || {
            let mut server = server;
            server.write_all(&4i32.to_be_bytes()).unwrap();
            server.write_all(&[1, 2, 3, 4]).unwrap();
            server.write_all(&(-1i32).to_be_bytes()).unwrap();
        });
        let frame = read(client, parameters(FrameType::Gray, 4, 1, 8), true, Some(4), |_, _| {}).unwrap();
        writer.join().unwrap();
        assert_eq!(frame.data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn pads_short_frame_with_zeros() {
        let (server, client) = loopback_pair();
        let writer = thread::spawn(move || {
            let mut server = server;
            server.write_all(&2i32.to_be_bytes()).unwrap();
            server.write_all(&[9, 9]).unwrap();
            server.write_all(&(-1i32).to_be_bytes()).unwrap();
        });
        let frame = read(client, parameters(FrameType::Gray, 4, 1, 8), true, Some(4), |_, _| {}).unwrap();
        writer.join().unwrap();
        assert_eq!(frame.data, vec![9, 9, 0, 0]);
    }

    #[test]
    fn byte_swaps_16bit_little_endian_payload() {
        let (server, client) = loopback_pair();
        let writer = thread::spawn(move || {
            let mut server = server;
            server.write_all(&4i32.to_be_bytes()).unwrap();
            server.write_all(&[0x01, 0x02, 0x03, 0x04]).unwrap();
            server.write_all(&(-1i32).to_be_bytes()).unwrap();
        });
        let frame = read(client, parameters(FrameType::Gray, 4, 1, 16), false, Some(4), |_, _| {}).unwrap();
        writer.join().unwrap();
        assert_eq!(frame.data, vec![0x02, 0x01, 0x04, 0x03]);
    }

    #[test]
    fn infers_line_count_when_unknown() {
        let (server, client) = loopback_pair();
        let writer = thread::spawn(move || {
            let mut server = server;
            server.write_all(&8i32.to_be_bytes()).unwrap();
            server.write_all(&[0u8; 8]).unwrap();
            server.write_all(&(-1i32).to_be_bytes()).unwrap();
        });
        let frame = read(client, parameters(FrameType::Gray, 4, -1, 8), true, None, |_, _| {}).unwrap();
        writer.join().unwrap();
        assert_eq!(frame.line_count, 2);
    }
}
