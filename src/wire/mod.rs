//! Wire-level building blocks: the word/fixed-point codec (C1) and the
//! higher-level read/write primitives built on top of it (C2).

pub mod codec;
pub mod word;

pub use codec::{WireConstraint, WireOptionDescriptor, WireParameters, WireReader, WireWriter};
pub use word::{decode_word, encode_word, Fixed, Version, Word, PROTOCOL_VERSION};
