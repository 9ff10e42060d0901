//! Wire-value <-> symbol tables for every closed enumeration the protocol
//! uses (C3). Each is a plain Rust enum or bitflags set with `from_word`/
//! `to_word` methods; the match arms the compiler lowers to are the
//! "registry", no runtime table is needed for a handful of known values.

use bitflags::bitflags;
use core::fmt;

/// RPC opcode, the first word of every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcOp {
    Init,
    GetDevices,
    Open,
    Close,
    GetOptionDescriptors,
    ControlOption,
    GetParameters,
    Start,
    Cancel,
    Authorize,
    Exit,
}

impl RpcOp {
    pub const fn to_word(self) -> i32 {
        match self {
            Self::Init => 0,
            Self::GetDevices => 1,
            Self::Open => 2,
            Self::Close => 3,
            Self::GetOptionDescriptors => 4,
            Self::ControlOption => 5,
            Self::GetParameters => 6,
            Self::Start => 7,
            Self::Cancel => 8,
            Self::Authorize => 9,
            Self::Exit => 10,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::GetDevices => "GET_DEVICES",
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
            Self::GetOptionDescriptors => "GET_OPTION_DESCRIPTORS",
            Self::ControlOption => "CONTROL_OPTION",
            Self::GetParameters => "GET_PARAMETERS",
            Self::Start => "START",
            Self::Cancel => "CANCEL",
            Self::Authorize => "AUTHORIZE",
            Self::Exit => "EXIT",
        }
    }
}

impl fmt::Display for RpcOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Option value kind (`valueKind` in the descriptor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    Fixed,
    String,
    Button,
    Group,
    Unknown(i32),
}

impl ValueKind {
    pub const fn from_word(word: i32) -> Self {
        match word {
            0 => Self::Bool,
            1 => Self::Int,
            2 => Self::Fixed,
            3 => Self::String,
            4 => Self::Button,
            5 => Self::Group,
            other => Self::Unknown(other),
        }
    }

    pub const fn to_word(self) -> i32 {
        match self {
            Self::Bool => 0,
            Self::Int => 1,
            Self::Fixed => 2,
            Self::String => 3,
            Self::Button => 4,
            Self::Group => 5,
            Self::Unknown(w) => w,
        }
    }

    /// Whether values of this kind occupy one word each (§3 element-count invariant).
    pub const fn is_word_sized(&self) -> bool {
        matches!(self, Self::Bool | Self::Int | Self::Fixed)
    }

    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Bool | Self::Int | Self::Fixed | Self::String)
    }
}

/// Option units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    None,
    Pixel,
    Bit,
    Mm,
    Dpi,
    Percent,
    Microsecond,
    Unknown(i32),
}

impl Unit {
    pub const fn from_word(word: i32) -> Self {
        match word {
            0 => Self::None,
            1 => Self::Pixel,
            2 => Self::Bit,
            3 => Self::Mm,
            4 => Self::Dpi,
            5 => Self::Percent,
            6 => Self::Microsecond,
            other => Self::Unknown(other),
        }
    }

    pub const fn to_word(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Pixel => 1,
            Self::Bit => 2,
            Self::Mm => 3,
            Self::Dpi => 4,
            Self::Percent => 5,
            Self::Microsecond => 6,
            Self::Unknown(w) => w,
        }
    }
}

/// Discriminant of an option's constraint payload (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    None,
    Range,
    WordList,
    StringList,
    Unknown(i32),
}

impl ConstraintKind {
    pub const fn from_word(word: i32) -> Self {
        match word {
            0 => Self::None,
            1 => Self::Range,
            2 => Self::WordList,
            3 => Self::StringList,
            other => Self::Unknown(other),
        }
    }

    pub const fn to_word(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Range => 1,
            Self::WordList => 2,
            Self::StringList => 3,
            Self::Unknown(w) => w,
        }
    }
}

/// Frame type of one scan pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Gray,
    Rgb,
    Red,
    Green,
    Blue,
    Unknown(i32),
}

impl FrameType {
    pub const fn from_word(word: i32) -> Self {
        match word {
            0 => Self::Gray,
            1 => Self::Rgb,
            2 => Self::Red,
            3 => Self::Green,
            4 => Self::Blue,
            other => Self::Unknown(other),
        }
    }

    pub const fn to_word(self) -> i32 {
        match self {
            Self::Gray => 0,
            Self::Rgb => 1,
            Self::Red => 2,
            Self::Green => 3,
            Self::Blue => 4,
            Self::Unknown(w) => w,
        }
    }

    pub const fn is_singleton(&self) -> bool {
        matches!(self, Self::Gray | Self::Rgb)
    }
}

/// Control-option action (`GET_VALUE`/`SET_VALUE`/`SET_AUTO`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    GetValue,
    SetValue,
    SetAuto,
}

impl ControlAction {
    pub const fn to_word(self) -> i32 {
        match self {
            Self::GetValue => 0,
            Self::SetValue => 1,
            Self::SetAuto => 2,
        }
    }
}

bitflags! {
    /// Option capability bitset (§3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const SOFT_SELECT = 1;
        const HARD_SELECT = 2;
        const SOFT_DETECT = 4;
        const EMULATED    = 8;
        const AUTOMATIC   = 16;
        const INACTIVE    = 32;
        const ADVANCED    = 64;
    }
}

bitflags! {
    /// Option write-info bitset returned by `CONTROL_OPTION` on a write.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WriteInfo: u32 {
        const INEXACT           = 1;
        const RELOAD_OPTIONS    = 2;
        const RELOAD_PARAMETERS = 4;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_op_words_match_spec_table() {
        assert_eq!(RpcOp::Init.to_word(), 0);
        assert_eq!(RpcOp::GetDevices.to_word(), 1);
        assert_eq!(RpcOp::Open.to_word(), 2);
        assert_eq!(RpcOp::Close.to_word(), 3);
        assert_eq!(RpcOp::GetOptionDescriptors.to_word(), 4);
        assert_eq!(RpcOp::ControlOption.to_word(), 5);
        assert_eq!(RpcOp::GetParameters.to_word(), 6);
        assert_eq!(RpcOp::Start.to_word(), 7);
        assert_eq!(RpcOp::Cancel.to_word(), 8);
        assert_eq!(RpcOp::Authorize.to_word(), 9);
        assert_eq!(RpcOp::Exit.to_word(), 10);
    }

    #[test]
    fn value_kind_round_trips() {
        for kind in [
            ValueKind::Bool,
            ValueKind::Int,
            ValueKind::Fixed,
            ValueKind::String,
            ValueKind::Button,
            ValueKind::Group,
        ] {
            assert_eq!(ValueKind::from_word(kind.to_word()), kind);
        }
    }

    #[test]
    fn frame_type_singleton_classification() {
        assert!(FrameType::Gray.is_singleton());
        assert!(FrameType::Rgb.is_singleton());
        assert!(!FrameType::Red.is_singleton());
        assert!(!FrameType::Green.is_singleton());
        assert!(!FrameType::Blue.is_singleton());
    }

    #[test]
    fn capabilities_bitset_round_trips() {
        let set = Capabilities::SOFT_SELECT | Capabilities::SOFT_DETECT | Capabilities::ADVANCED;
        let decoded = Capabilities::from_bits_retain(set.bits());
        assert_eq!(decoded, set);
    }

    #[test]
    fn unknown_status_like_enum_carries_raw_word() {
        assert_eq!(ValueKind::from_word(42), ValueKind::Unknown(42));
        assert_eq!(Unit::from_word(42), Unit::Unknown(42));
        assert_eq!(ConstraintKind::from_word(42), ConstraintKind::Unknown(42));
        assert_eq!(FrameType::from_word(42), FrameType::Unknown(42));
    }
}
