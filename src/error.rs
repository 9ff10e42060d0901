use std::fmt;
use std::io;

/// Status word returned by the daemon on every RPC reply.
///
/// Any wire value outside the defined range decodes to [`Status::Unknown`],
/// carrying the raw word for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Good,
    Unsupported,
    Cancelled,
    DeviceBusy,
    Inval,
    Eof,
    Jammed,
    NoDocs,
    CoverOpen,
    IoError,
    NoMem,
    AccessDenied,
    Unknown(i32),
}

impl Status {
    pub const fn from_word(word: i32) -> Self {
        match word {
            0 => Self::Good,
            1 => Self::Unsupported,
            2 => Self::Cancelled,
            3 => Self::DeviceBusy,
            4 => Self::Inval,
            5 => Self::Eof,
            6 => Self::Jammed,
            7 => Self::NoDocs,
            8 => Self::CoverOpen,
            9 => Self::IoError,
            10 => Self::NoMem,
            11 => Self::AccessDenied,
            other => Self::Unknown(other),
        }
    }

    pub const fn to_word(self) -> i32 {
        match self {
            Self::Good => 0,
            Self::Unsupported => 1,
            Self::Cancelled => 2,
            Self::DeviceBusy => 3,
            Self::Inval => 4,
            Self::Eof => 5,
            Self::Jammed => 6,
            Self::NoDocs => 7,
            Self::CoverOpen => 8,
            Self::IoError => 9,
            Self::NoMem => 10,
            Self::AccessDenied => 11,
            Self::Unknown(w) => w,
        }
    }

    pub const fn is_good(&self) -> bool {
        matches!(self, Self::Good)
    }

    /// Converts a reply status into a result, carrying the offending RPC's name for context.
    pub(crate) fn into_result(self, rpc: &'static str) -> Result<(), Error> {
        if self.is_good() {
            Ok(())
        } else {
            Err(Error::Status { status: self, rpc })
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Good => "GOOD",
            Self::Unsupported => "UNSUPPORTED",
            Self::Cancelled => "CANCELLED",
            Self::DeviceBusy => "DEVICE_BUSY",
            Self::Inval => "INVAL",
            Self::Eof => "EOF",
            Self::Jammed => "JAMMED",
            Self::NoDocs => "NO_DOCS",
            Self::CoverOpen => "COVER_OPEN",
            Self::IoError => "IO_ERROR",
            Self::NoMem => "NO_MEM",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::Unknown(w) => return write!(f, "UNKNOWN({w})"),
        };
        f.write_str(name)
    }
}

/// Every way a session-level operation in this crate can fail.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The wire stream violated a format expectation of the codec itself
    /// (bad pointer discriminant, truncated length-prefixed value, an
    /// enumeration value that isn't allowed to be unknown here).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The daemon replied with a non-`GOOD` status to `rpc`.
    #[error("{rpc} failed with status {status}")]
    Status { status: Status, rpc: &'static str },

    /// A resource demanded authorization this session could not supply.
    #[error("authorization failed for resource {resource:?}: {reason}")]
    Auth { resource: String, reason: String },

    /// The caller violated an API precondition (closed device, oversized
    /// write, out-of-range fixed value, etc).
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// The underlying transport failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub(crate) fn auth(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Auth {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// The status this error carries, if it is a [`Error::Status`].
    pub const fn status(&self) -> Option<Status> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_wire_value() {
        for word in 0..=11 {
            assert_eq!(Status::from_word(word).to_word(), word);
        }
    }

    #[test]
    fn unknown_status_keeps_raw_word() {
        let status = Status::from_word(99);
        assert_eq!(status, Status::Unknown(99));
        assert_eq!(status.to_word(), 99);
    }

    #[test]
    fn good_status_is_ok() {
        assert!(Status::Good.into_result("TEST").is_ok());
        assert!(Status::Inval.into_result("TEST").is_err());
    }
}
