//! vinecdm - Widevine CDM client.
//!
//! This crate provides:
//! - Widevine device (.wvd) parsing and export.
//! - License challenge generation, privacy mode and license parsing.
//! - CDM session management over local or remote devices.
//! - PSSH parsing into Widevine init data.
//!
//! Feature flags:
//! - `tracing` (default): log through `tracing`.
//! - `remote`: enable the remote CDM API device and loading devices by URL.
//! - `cli`: enable the `vinecdm` binary.
#![allow(clippy::result_large_err)]

#[macro_use]
mod macros;

/// Core CDM implementation.
pub mod cdm;
/// Device identities and the .wvd format.
pub mod device;
/// Common error types and Result alias.
pub mod error;
/// Decrypted key representation.
pub mod key;
/// Widevine license protocol messages.
pub mod license_protocol;
/// PSSH parsing.
pub mod pssh;
/// CDM session container.
pub mod session;
/// Private-key operations.
pub mod signer;

/// Remote CDM client (feature: `remote`).
#[cfg(feature = "remote")]
pub mod remotecdm;

#[cfg(test)]
mod test_support;

pub use cdm::Cdm;
pub use device::{Device, DeviceType, LocalDevice};
pub use error::{Error, Result};
pub use key::{Key, KeyType};
pub use pssh::Pssh;
pub use session::{PendingLicense, Session};
pub use signer::Signer;
