//! A pure-Rust client for the SANE network protocol (`saned`): connect over
//! TCP, list and open remote devices, read and write their options, and pull
//! scanned images off the data socket.

mod auth;
mod credentials;
pub mod device;
pub mod enums;
mod error;
pub mod session;
pub mod wire;

pub use credentials::{Credential, CredentialStore};
pub use device::{Device, Image, OptionConstraint, OptionDescriptor, OptionGroup, RateLimitedScanListener, ScanListener};
pub use error::{Error, Status};
pub use session::{DeviceDescriptor, PasswordProvider, Session, WithSession};
pub use wire::{Fixed, Version, PROTOCOL_VERSION};
