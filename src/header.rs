// Parsing and validation of the decrypted volume header.
//
// `parse` expects the full 512-byte header with the salt still in
// cleartext at [0, 64) and everything past it already decrypted. The
// gates run in a fixed order and each failure is terminal, so the first
// error reported is the accurate one (a wrong password surfaces as
// InvalidMagic, never as a checksum mismatch).

use byteorder::BigEndian;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::layout::{self, FieldReader, HEADER_SIZE};

/// Expected magic bytes after decryption.
pub const MAGIC: &[u8; 4] = b"VERA";
/// Oldest reader version this implementation understands.
pub const MIN_SUPPORTED_PROGRAM_VERSION: u16 = 267;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// Decrypted magic is not "VERA". Most commonly a wrong password:
    /// decryption succeeds mechanically and yields garbage here.
    InvalidMagic { found: [u8; 4] },
    /// Stored CRC-32 of the key region does not match the computed one.
    KeyChecksumMismatch { stored: u32, actual: u32 },
    /// Stored CRC-32 of the header fields does not match the computed one.
    HeaderChecksumMismatch { stored: u32, actual: u32 },
    /// Volume requires a reader older than the supported minimum.
    UnsupportedVersion { min_program_version: u16 },
    /// Hidden volume present; hidden volumes are not supported.
    UnsupportedFeature { hidden_volume_size: u64 },
    /// Sector size outside the format's allowed range.
    InvalidSectorSize { sector_size: u32 },
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HeaderError::InvalidMagic { found } => {
                write!(
                    f,
                    "invalid magic field \"{}\" (0x{}), wrong password or not a supported volume",
                    String::from_utf8_lossy(found),
                    hex::encode(found)
                )
            }
            HeaderError::KeyChecksumMismatch { stored, actual } => {
                write!(
                    f,
                    "key checksum mismatch: header says {:08x}, key region hashes to {:08x}",
                    stored, actual
                )
            }
            HeaderError::HeaderChecksumMismatch { stored, actual } => {
                write!(
                    f,
                    "header checksum mismatch: header says {:08x}, fields hash to {:08x}",
                    stored, actual
                )
            }
            HeaderError::UnsupportedVersion {
                min_program_version,
            } => {
                write!(
                    f,
                    "unsupported legacy format: min program version {} is below {}",
                    min_program_version, MIN_SUPPORTED_PROGRAM_VERSION
                )
            }
            HeaderError::UnsupportedFeature { hidden_volume_size } => {
                write!(
                    f,
                    "hidden volumes are not supported (hidden volume size {})",
                    hidden_volume_size
                )
            }
            HeaderError::InvalidSectorSize { sector_size } => {
                write!(f, "invalid sector size {}", sector_size)
            }
        }
    }
}

impl std::error::Error for HeaderError {}

/// The validated header field set.
///
/// Key material is wiped when the struct is dropped. The checksums are
/// kept for diagnostics and carry nothing sensitive.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VolumeHeader {
    #[zeroize(skip)]
    pub magic: [u8; 4],
    pub header_version: u16,
    pub min_program_version: u16,
    #[zeroize(skip)]
    pub key_checksum: u32,
    /// Informational, zero in practice for supported volumes.
    pub volume_creation_time: u64,
    /// Informational, zero in practice for supported volumes.
    pub header_creation_time: u64,
    pub hidden_volume_size: u64,
    pub volume_size: u64,
    pub master_key_scope_offset: u64,
    pub master_key_encryption_size: u64,
    /// Raw flag bits; no meaning is assigned to individual bits here.
    pub flags: u32,
    pub sector_size: u32,
    #[zeroize(skip)]
    pub header_checksum: u32,
    /// The 256-byte key region; the data cipher uses the first two
    /// 32-byte halves.
    pub data_keys: [u8; 256],
}

impl VolumeHeader {
    /// Runs the validation gates over a decrypted header and extracts the
    /// field set. The buffer must be exactly [`HEADER_SIZE`] bytes; a
    /// shorter one is a caller bug, detected before any field is read.
    pub fn parse(decrypted: &[u8]) -> Result<Self, HeaderError> {
        assert_eq!(
            decrypted.len(),
            HEADER_SIZE,
            "header buffer must be {} bytes",
            HEADER_SIZE
        );
        let reader = FieldReader::<BigEndian>::new(decrypted);

        // Gate 1: magic. Decides wrong-password before any checksum runs.
        let magic_bytes = reader.bytes(layout::MAGIC);
        if magic_bytes != MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(magic_bytes);
            return Err(HeaderError::InvalidMagic { found });
        }

        // Gate 2: CRC-32 of the key region.
        let stored_key_checksum = reader.read_u32(layout::KEY_CHECKSUM);
        let actual_key_checksum = crc32fast::hash(reader.bytes(layout::KEYS));
        if stored_key_checksum != actual_key_checksum {
            return Err(HeaderError::KeyChecksumMismatch {
                stored: stored_key_checksum,
                actual: actual_key_checksum,
            });
        }

        // Gate 3: CRC-32 of the header fields at [64, 252).
        let stored_header_checksum = reader.read_u32(layout::CHECKSUM2);
        let actual_header_checksum = crc32fast::hash(reader.bytes(layout::CHECKSUM2_AREA));
        if stored_header_checksum != actual_header_checksum {
            return Err(HeaderError::HeaderChecksumMismatch {
                stored: stored_header_checksum,
                actual: actual_header_checksum,
            });
        }

        let header_version = reader.read_u16(layout::HEADER_VERSION);
        let min_program_version = reader.read_u16(layout::MIN_PROGRAM_VERSION);
        let volume_creation_time = reader.read_u64(layout::VOLUME_CREATION_TIME);
        let header_creation_time = reader.read_u64(layout::HEADER_CREATION_TIME);
        let hidden_volume_size = reader.read_u64(layout::HIDDEN_VOLUME_SIZE);
        let volume_size = reader.read_u64(layout::VOLUME_SIZE);
        let master_key_scope_offset = reader.read_u64(layout::MASTER_KEY_SCOPE_OFFSET);
        let master_key_encryption_size = reader.read_u64(layout::MASTER_KEY_ENCRYPTION_SIZE);
        let flags = reader.read_u32(layout::FLAG_BITS);
        let sector_size = reader.read_u32(layout::SECTOR_SIZE);

        // Gate 4: version floor.
        if min_program_version < MIN_SUPPORTED_PROGRAM_VERSION {
            return Err(HeaderError::UnsupportedVersion {
                min_program_version,
            });
        }

        // Gate 5: no hidden volume.
        if hidden_volume_size != 0 {
            return Err(HeaderError::UnsupportedFeature { hidden_volume_size });
        }

        // Gate 6: sector size sanity. The format allows 512..=4096 in
        // steps of 512; anything else would poison the sector arithmetic.
        if sector_size < 512 || sector_size > 4096 || sector_size % 512 != 0 {
            return Err(HeaderError::InvalidSectorSize { sector_size });
        }

        let mut data_keys = [0u8; 256];
        data_keys.copy_from_slice(reader.bytes(layout::KEYS));

        let mut magic = [0u8; 4];
        magic.copy_from_slice(magic_bytes);

        Ok(VolumeHeader {
            magic,
            header_version,
            min_program_version,
            key_checksum: stored_key_checksum,
            volume_creation_time,
            header_creation_time,
            hidden_volume_size,
            volume_size,
            master_key_scope_offset,
            master_key_encryption_size,
            flags,
            sector_size,
            header_checksum: stored_header_checksum,
            data_keys,
        })
    }
}

// Manual Debug so a stray {:?} never prints key material.
impl fmt::Debug for VolumeHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VolumeHeader")
            .field("magic", &String::from_utf8_lossy(&self.magic))
            .field("header_version", &self.header_version)
            .field("min_program_version", &self.min_program_version)
            .field("volume_size", &self.volume_size)
            .field("sector_size", &self.sector_size)
            .field("master_key_scope_offset", &self.master_key_scope_offset)
            .field("master_key_encryption_size", &self.master_key_encryption_size)
            .field("flags", &self.flags)
            .field("data_keys", &"[redacted]")
            .finish()
    }
}
