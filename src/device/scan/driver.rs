//! Scan driver (C10): drives `START` / data-socket / `GET_PARAMETERS` / frame
//! read in a loop until the daemon reports `lastFrame`, handing the result to
//! the image assembler (C9).

use std::net::TcpStream;

use crate::enums::FrameType;
use crate::error::Error;
use crate::session::WithSession;

use super::assembler::{Image, ImageAssembler};
use super::frame_reader;
use super::listener::ScanListener;

/// Runs one full acquisition on `handle` and returns the assembled image.
/// The data socket for each frame is opened fresh, per `START`'s reply, and
/// is always torn down (via `Drop`) before the next frame starts or this
/// function returns.
pub fn acquire_image<S: WithSession>(
    session: &S,
    handle: i32,
    mut listener: Option<&mut dyn ScanListener>,
) -> Result<Image, Error> {
    if let Some(l) = listener.as_deref_mut() {
        l.scanning_started();
    }

    let mut assembler = ImageAssembler::new();
    let mut frame_index = 0usize;

    let result = loop {
        let (port, big_endian) = match session.with_session(|s| s.start_scan(handle)) {
            Ok(reply) => reply,
            Err(err) => break Err(err),
        };
        let parameters = match session.with_session(|s| s.get_parameters(handle)) {
            Ok(p) => p,
            Err(err) => break Err(err),
        };
        let addr = match session.with_session(|s| s.peer_addr()) {
            Ok(addr) => addr,
            Err(err) => break Err(err),
        };
        let data_addr = std::net::SocketAddr::new(addr.ip(), port);
        let data_socket = match TcpStream::connect(data_addr) {
            Ok(socket) => socket,
            Err(err) => break Err(Error::Io(err)),
        };

        let likely_total_frames = likely_total_frames(parameters.frame_type);
        if let Some(l) = listener.as_deref_mut() {
            l.frame_acquisition_started(&parameters, frame_index, likely_total_frames);
        }

        let expected_image_bytes = expected_bytes(parameters.bytes_per_line, parameters.line_count);
        let last_frame = parameters.last_frame;
        let on_record = |total_bytes_read: usize, expected: Option<usize>| {
            if let Some(l) = listener.as_deref_mut() {
                l.record_read(total_bytes_read, expected);
            }
        };

        let frame = match frame_reader::read(data_socket, parameters, big_endian, expected_image_bytes, on_record) {
            Ok(frame) => frame,
            Err(err) => break Err(err),
        };

        if let Err(err) = assembler.add_frame(frame) {
            break Err(err);
        }
        frame_index += 1;

        if last_frame {
            break assembler.build();
        }
    };

    if let Some(l) = listener.as_deref_mut() {
        l.scanning_finished();
    }
    result
}

fn likely_total_frames(frame_type: FrameType) -> usize {
    if frame_type.is_singleton() {
        1
    } else {
        3
    }
}

fn expected_bytes(bytes_per_line: i32, line_count: i32) -> Option<usize> {
    if bytes_per_line > 0 && line_count > 0 {
        Some(bytes_per_line as usize * line_count as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn likely_total_frames_matches_singleton_classification() {
        assert_eq!(likely_total_frames(FrameType::Gray), 1);
        assert_eq!(likely_total_frames(FrameType::Rgb), 1);
        assert_eq!(likely_total_frames(FrameType::Red), 3);
    }

    #[test]
    fn expected_bytes_is_none_when_line_count_unknown() {
        assert_eq!(expected_bytes(100, -1), None);
        assert_eq!(expected_bytes(100, 4), Some(400));
    }
}
