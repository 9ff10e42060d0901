//! Read/write primitives for the SANE wire format (C2): word, string,
//! status, parameters, option descriptor. Every value on the wire is a
//! stream of 4-byte big-endian words; strings carry their own length.

use std::io::{self, Read, Write};

use crate::enums::{ConstraintKind, FrameType, Unit, ValueKind};
use crate::error::{Error, Status};

use super::word::{decode_word, encode_word, Word};

/// Frame parameters as read off the wire: `frameType, lastFrame, bytesPerLine,
/// pixelsPerLine, lineCount, depthPerPixel` (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireParameters {
    pub frame_type: FrameType,
    pub last_frame: bool,
    pub bytes_per_line: i32,
    pub pixels_per_line: i32,
    pub line_count: i32,
    pub depth_per_pixel: i32,
}

/// A decoded option descriptor's constraint payload, before it is paired
/// with the option's `valueKind` to pick an integer or fixed-point
/// projection.
#[derive(Debug, Clone, PartialEq)]
pub enum WireConstraint {
    None,
    Range { min: Word, max: Word, quant: Word },
    WordList(Vec<Word>),
    StringList(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WireOptionDescriptor {
    pub name: String,
    pub title: String,
    pub description: String,
    pub value_kind: ValueKind,
    pub unit: Unit,
    pub size: i32,
    pub capabilities: i32,
    pub constraint: WireConstraint,
}

/// Reads SANE wire primitives off any byte stream (the control socket or,
/// for word-sized record lengths, the data socket).
pub struct WireReader<R> {
    inner: R,
}

impl<R: Read> WireReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn read_word(&mut self) -> Result<Word, Error> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                Error::protocol("truncated read of a word")
            } else {
                Error::Io(err)
            }
        })?;
        Ok(decode_word(buf))
    }

    pub fn read_status(&mut self) -> Result<Status, Error> {
        Ok(Status::from_word(self.read_word()?))
    }

    /// Reads a pointer word: `true` iff a value follows (§4.2).
    pub fn read_pointer(&mut self) -> Result<bool, Error> {
        Ok(self.read_word()? != 0)
    }

    /// Reads a length-prefixed, NUL-terminated, ISO-8859-1 string.
    pub fn read_string(&mut self) -> Result<String, Error> {
        let len = self.read_word()?;
        if len == 0 {
            return Ok(String::new());
        }
        if len < 0 {
            return Err(Error::protocol(format!("negative string length {len}")));
        }
        let len = len as usize;
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                Error::protocol("truncated read of a string body")
            } else {
                Error::Io(err)
            }
        })?;
        if buf.pop() != Some(0) {
            return Err(Error::protocol("string body missing NUL terminator"));
        }
        Ok(latin1_to_string(&buf))
    }

    pub fn read_parameters(&mut self) -> Result<WireParameters, Error> {
        Ok(WireParameters {
            frame_type: FrameType::from_word(self.read_word()?),
            last_frame: self.read_word()? != 0,
            bytes_per_line: self.read_word()?,
            pixels_per_line: self.read_word()?,
            line_count: self.read_word()?,
            depth_per_pixel: self.read_word()?,
        })
    }

    /// Reads one option descriptor body (without the leading pointer word,
    /// which the caller consumes to decide whether a descriptor follows).
    pub fn read_option_descriptor(&mut self) -> Result<WireOptionDescriptor, Error> {
        let name = self.read_string()?;
        let title = self.read_string()?;
        let description = self.read_string()?;
        let value_kind = ValueKind::from_word(self.read_word()?);
        let unit = Unit::from_word(self.read_word()?);
        let size = self.read_word()?;
        let capabilities = self.read_word()?;
        let constraint_kind = ConstraintKind::from_word(self.read_word()?);
        let constraint = match constraint_kind {
            ConstraintKind::None => WireConstraint::None,
            ConstraintKind::Range => {
                let min = self.read_word()?;
                let max = self.read_word()?;
                let quant = self.read_word()?;
                WireConstraint::Range { min, max, quant }
            }
            ConstraintKind::WordList => {
                let n = self.read_word()?;
                if n < 0 {
                    return Err(Error::protocol("negative word-list length"));
                }
                let n = n as usize;
                let mut words = Vec::with_capacity(n);
                for _ in 0..n {
                    words.push(self.read_word()?);
                }
                if words.is_empty() || words[0] as usize != n {
                    return Err(Error::protocol(
                        "word-list's first element must equal its own length",
                    ));
                }
                words.remove(0);
                WireConstraint::WordList(words)
            }
            ConstraintKind::StringList => {
                let n = self.read_word()?;
                if n < 0 {
                    return Err(Error::protocol("negative string-list length"));
                }
                let n = n as usize;
                let mut strings = Vec::with_capacity(n);
                for _ in 0..n {
                    strings.push(self.read_string()?);
                }
                if strings.last().map(String::is_empty) != Some(true) {
                    return Err(Error::protocol(
                        "string-list must end with an empty terminator",
                    ));
                }
                strings.pop();
                WireConstraint::StringList(strings)
            }
            ConstraintKind::Unknown(w) => {
                return Err(Error::protocol(format!("unknown constraint kind {w}")))
            }
        };
        Ok(WireOptionDescriptor {
            name,
            title,
            description,
            value_kind,
            unit,
            size,
            capabilities,
            constraint,
        })
    }

    /// Reads `len` raw bytes (used by the frame reader for record payloads).
    pub fn read_exact_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                Error::protocol("truncated read of a record payload")
            } else {
                Error::Io(err)
            }
        })?;
        Ok(buf)
    }
}

/// Writes SANE wire primitives to any byte sink (the control socket).
pub struct WireWriter<W> {
    inner: W,
}

impl<W: Write> WireWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_word(&mut self, value: Word) -> Result<(), Error> {
        self.inner.write_all(&encode_word(value))?;
        Ok(())
    }

    /// Writes a length-prefixed, NUL-terminated, ISO-8859-1 string.
    ///
    /// `L = length + 1` and a NUL byte is appended; an empty string is one
    /// zero word with no body (§4.2).
    pub fn write_string(&mut self, value: &str) -> Result<(), Error> {
        if value.is_empty() {
            return self.write_word(0);
        }
        let mut bytes = string_to_latin1(value)?;
        self.write_word((bytes.len() + 1) as Word)?;
        bytes.push(0);
        self.inner.write_all(&bytes)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.inner.flush()?;
        Ok(())
    }
}

/// ISO-8859-1 decodes byte-for-byte into Unicode code points 0..=255, so
/// every byte maps to exactly one `char` and the conversion cannot fail.
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Encodes a string as ISO-8859-1, rejecting characters outside the Latin-1
/// range (anything the daemon could not represent on the wire).
pub fn string_to_latin1(s: &str) -> Result<Vec<u8>, Error> {
    s.chars()
        .map(|c| {
            u8::try_from(c as u32)
                .map_err(|_| Error::protocol(format!("character {c:?} is not representable in ISO-8859-1")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn string_round_trips() {
        let mut buf = Vec::new();
        WireWriter::new(&mut buf).write_string("alice").unwrap();
        let mut reader = WireReader::new(Cursor::new(buf));
        assert_eq!(reader.read_string().unwrap(), "alice");
    }

    #[test]
    fn empty_string_is_single_zero_word() {
        let mut buf = Vec::new();
        WireWriter::new(&mut buf).write_string("").unwrap();
        assert_eq!(buf, encode_word(0));
    }

    #[test]
    fn truncated_string_is_protocol_error() {
        // length word says 5 bytes follow, but none are supplied.
        let buf = encode_word(5).to_vec();
        let mut reader = WireReader::new(Cursor::new(buf));
        assert!(matches!(reader.read_string(), Err(Error::Protocol(_))));
    }

    #[test]
    fn word_list_strips_leading_length_echo() {
        let mut buf = Vec::new();
        let mut writer = WireWriter::new(&mut buf);
        writer.write_word(1).unwrap(); // constraint kind = WordList
        writer.write_word(4).unwrap(); // n
        writer.write_word(4).unwrap(); // echoed length
        writer.write_word(10).unwrap();
        writer.write_word(20).unwrap();
        writer.write_word(30).unwrap();
        let mut reader = WireReader::new(Cursor::new(buf));
        let kind = ConstraintKind::from_word(reader.read_word().unwrap());
        assert_eq!(kind, ConstraintKind::WordList);
        // simulate read_option_descriptor's word-list branch directly
        let n = reader.read_word().unwrap() as usize;
        let mut words = Vec::with_capacity(n);
        for _ in 0..n {
            words.push(reader.read_word().unwrap());
        }
        assert_eq!(words[0] as usize, n);
        words.remove(0);
        assert_eq!(words, vec![10, 20, 30]);
    }

    #[test]
    fn string_list_round_trips_via_descriptor_reader() {
        let mut buf = Vec::new();
        {
            let mut writer = WireWriter::new(&mut buf);
            writer.write_string("resolution").unwrap();
            writer.write_string("Resolution").unwrap();
            writer.write_string("Scan resolution").unwrap();
            writer.write_word(ValueKind::String.to_word()).unwrap();
            writer.write_word(Unit::Dpi.to_word()).unwrap();
            writer.write_word(4).unwrap(); // size
            writer.write_word(0).unwrap(); // capabilities
            writer.write_word(ConstraintKind::StringList.to_word()).unwrap();
            writer.write_word(3).unwrap(); // n
            writer.write_string("Low").unwrap();
            writer.write_string("High").unwrap();
            writer.write_string("").unwrap(); // terminator
        }
        let mut reader = WireReader::new(Cursor::new(buf));
        let descriptor = reader.read_option_descriptor().unwrap();
        assert_eq!(descriptor.name, "resolution");
        assert_eq!(
            descriptor.constraint,
            WireConstraint::StringList(vec!["Low".into(), "High".into()])
        );
    }

    #[test]
    fn latin1_is_byte_for_byte() {
        let bytes = [0x41, 0x20, 0xE9]; // 'A', ' ', e-acute in Latin-1
        let s = latin1_to_string(&bytes);
        assert_eq!(string_to_latin1(&s).unwrap(), bytes);
    }
}
