//! Image assembler (C9): collects 1 or 3 frames into a multi-band image
//! under the frame-composition invariants in §4.9.

use crate::enums::FrameType;
use crate::error::Error;

use super::frame_reader::Frame;

/// Frames plus the raster geometry they agree on. Pixel-level repacking (bit
/// packing, channel interleaving) is left to the caller.
#[derive(Debug, Clone)]
pub struct Image {
    pub width: i32,
    pub height: i32,
    pub bytes_per_line: i32,
    pub depth_per_pixel: i32,
    pub frames: Vec<Frame>,
}

#[derive(Debug, Default)]
pub struct ImageAssembler {
    frames: Vec<Frame>,
    singleton_added: bool,
}

impl ImageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_frame(&mut self, frame: Frame) -> Result<(), Error> {
        if self.singleton_added {
            return Err(Error::precondition("cannot add a frame after a singleton frame"));
        }
        if frame.frame_type.is_singleton() && !self.frames.is_empty() {
            return Err(Error::precondition("a singleton frame cannot be added after any other frame"));
        }
        if self.frames.iter().any(|f| f.frame_type == frame.frame_type) {
            return Err(Error::precondition(format!(
                "duplicate frame type {:?}",
                frame.frame_type
            )));
        }
        if let Some(first) = self.frames.first() {
            if first.data.len() != frame.data.len() {
                return Err(Error::precondition("frame payloads differ in length"));
            }
        }
        if frame.frame_type.is_singleton() {
            self.singleton_added = true;
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Produces the assembled image. Three-frame images are reordered to
    /// `RED, GREEN, BLUE` regardless of arrival order.
    pub fn build(mut self) -> Result<Image, Error> {
        match self.frames.len() {
            1 if self.frames[0].frame_type.is_singleton() => {}
            3 => {
                let has = |t: FrameType| self.frames.iter().any(|f| f.frame_type == t);
                if !(has(FrameType::Red) && has(FrameType::Green) && has(FrameType::Blue)) {
                    return Err(Error::precondition(
                        "a three-frame image must consist of RED, GREEN and BLUE",
                    ));
                }
                self.frames.sort_by_key(|f| frame_order(f.frame_type));
            }
            n => {
                return Err(Error::precondition(format!(
                    "inconsistent frame composition: {n} frames"
                )))
            }
        }
        let first = &self.frames[0];
        Ok(Image {
            width: first.pixels_per_line,
            height: first.line_count,
            bytes_per_line: first.bytes_per_line,
            depth_per_pixel: first.depth_per_pixel,
            frames: self.frames,
        })
    }
}

const fn frame_order(frame_type: FrameType) -> u8 {
    match frame_type {
        FrameType::Red => 0,
        FrameType::Green => 1,
        FrameType::Blue => 2,
        _ => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(frame_type: FrameType, len: usize) -> Frame {
        Frame {
            frame_type,
            last_frame: true,
            bytes_per_line: len as i32,
            pixels_per_line: len as i32,
            line_count: 1,
            depth_per_pixel: 8,
            data: vec![0u8; len],
        }
    }

    #[test]
    fn single_gray_frame_builds() {
        let mut assembler = ImageAssembler::new();
        assembler.add_frame(frame(FrameType::Gray, 10)).unwrap();
        let image = assembler.build().unwrap();
        assert_eq!(image.frames.len(), 1);
    }

    #[test]
    fn rgb_triple_is_reordered_to_red_green_blue() {
        let mut assembler = ImageAssembler::new();
        assembler.add_frame(frame(FrameType::Blue, 4)).unwrap();
        assembler.add_frame(frame(FrameType::Red, 4)).unwrap();
        assembler.add_frame(frame(FrameType::Green, 4)).unwrap();
        let image = assembler.build().unwrap();
        let order: Vec<_> = image.frames.iter().map(|f| f.frame_type).collect();
        assert_eq!(order, vec![FrameType::Red, FrameType::Green, FrameType::Blue]);
    }

    #[test]
    fn duplicate_frame_type_is_rejected() {
        let mut assembler = ImageAssembler::new();
        assembler.add_frame(frame(FrameType::Red, 4)).unwrap();
        assert!(assembler.add_frame(frame(FrameType::Red, 4)).is_err());
    }

    #[test]
    fn singleton_after_other_frame_is_rejected() {
        let mut assembler = ImageAssembler::new();
        assembler.add_frame(frame(FrameType::Red, 4)).unwrap();
        assert!(assembler.add_frame(frame(FrameType::Gray, 4)).is_err());
    }

    #[test]
    fn mismatched_payload_lengths_are_rejected() {
        let mut assembler = ImageAssembler::new();
        assembler.add_frame(frame(FrameType::Red, 4)).unwrap();
        assert!(assembler.add_frame(frame(FrameType::Green, 8)).is_err());
    }

    #[test]
    fn two_frame_composition_is_inconsistent() {
        let mut assembler = ImageAssembler::new();
        assembler.add_frame(frame(FrameType::Red, 4)).unwrap();
        assembler.add_frame(frame(FrameType::Green, 4)).unwrap();
        assert!(assembler.build().is_err());
    }
}
