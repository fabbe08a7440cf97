//! Read-only access to VeraCrypt-format encrypted containers.
//!
//! The pipeline: derive header keys from the password and the volume's
//! cleartext salt (PBKDF2-HMAC-SHA512), decrypt and validate the
//! 512-byte header (magic plus two CRC-32 gates), then stream-decrypt
//! the data region sector by sector with AES-256 in XTS mode. Hidden
//! volumes, cascaded ciphers and legacy (pre-1.11) formats are out of
//! scope, and nothing is ever written back to the container.
//!
//! ```no_run
//! use veradump::Volume;
//!
//! let mut volume = Volume::open_path("secret.hc", "password")?;
//! let mut out = Vec::new();
//! let total = volume.master_key_encryption_size();
//! volume.read_data_bytes(&mut out, 0, total, |_bytes| Ok(()))?;
//! # Ok::<(), veradump::VolumeError>(())
//! ```

pub mod header;
pub mod kdf;
pub mod layout;
pub mod volume;
pub mod xts;

pub use header::{HeaderError, VolumeHeader};
pub use volume::{Volume, VolumeError};
pub use xts::{Xts128, XtsError};
