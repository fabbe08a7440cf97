// On-disk layout of the 512-byte volume header and typed field access.
//
// All multi-byte integers in the header are stored big-endian regardless of
// the host platform. Reads go through `FieldReader`, which takes the byte
// order as a type parameter so the big-endian and native-order strategies
// are both constructible (tests inject either one deterministically).

use byteorder::ByteOrder;
use std::marker::PhantomData;

/// Fixed size of the volume header at the start of the container.
pub const HEADER_SIZE: usize = 512;

/// Location of one logical field inside a fixed-layout buffer.
///
/// Purely descriptive. `offset + size` must stay within the buffer the
/// field is read from; violating that is a caller bug and panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeField {
    pub offset: usize,
    pub size: usize,
}

impl VolumeField {
    pub const fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }
}

// Header field table. Offsets are absolute within the 512-byte header.
/// PBKDF2 salt, stored in cleartext.
pub const SALT: VolumeField = VolumeField::new(0, 64);
/// ASCII magic, "VERA" after decryption.
pub const MAGIC: VolumeField = VolumeField::new(64, 4);
/// Region covered by the second checksum.
pub const CHECKSUM2_AREA: VolumeField = VolumeField::new(64, 188);
pub const HEADER_VERSION: VolumeField = VolumeField::new(68, 2);
/// Minimum compatible reader version.
pub const MIN_PROGRAM_VERSION: VolumeField = VolumeField::new(70, 2);
/// CRC-32 of the key-material region.
pub const KEY_CHECKSUM: VolumeField = VolumeField::new(72, 4);
/// Informational; zero for supported volumes.
pub const VOLUME_CREATION_TIME: VolumeField = VolumeField::new(76, 8);
/// Informational; zero for supported volumes.
pub const HEADER_CREATION_TIME: VolumeField = VolumeField::new(84, 8);
/// Must be zero; hidden volumes are not supported.
pub const HIDDEN_VOLUME_SIZE: VolumeField = VolumeField::new(92, 8);
pub const VOLUME_SIZE: VolumeField = VolumeField::new(100, 8);
/// Byte offset where the data region begins.
pub const MASTER_KEY_SCOPE_OFFSET: VolumeField = VolumeField::new(108, 8);
/// Byte length of the encryptable data region.
pub const MASTER_KEY_ENCRYPTION_SIZE: VolumeField = VolumeField::new(116, 8);
/// Raw flag bits, exposed for diagnostics only.
pub const FLAG_BITS: VolumeField = VolumeField::new(124, 4);
pub const SECTOR_SIZE: VolumeField = VolumeField::new(128, 4);
/// CRC-32 over CHECKSUM2_AREA.
pub const CHECKSUM2: VolumeField = VolumeField::new(252, 4);
/// Two 128-byte data-encryption key halves.
pub const KEYS: VolumeField = VolumeField::new(256, 256);

/// Every documented field, for layout sanity checks.
pub const ALL_FIELDS: &[VolumeField] = &[
    SALT,
    MAGIC,
    CHECKSUM2_AREA,
    HEADER_VERSION,
    MIN_PROGRAM_VERSION,
    KEY_CHECKSUM,
    VOLUME_CREATION_TIME,
    HEADER_CREATION_TIME,
    HIDDEN_VOLUME_SIZE,
    VOLUME_SIZE,
    MASTER_KEY_SCOPE_OFFSET,
    MASTER_KEY_ENCRYPTION_SIZE,
    FLAG_BITS,
    SECTOR_SIZE,
    CHECKSUM2,
    KEYS,
];

/// Typed accessors over a fixed-layout buffer with an explicit byte order.
///
/// The order is a compile-time strategy: `FieldReader::<BigEndian>` for the
/// on-disk format, `FieldReader::<NativeEndian>` where host order is wanted.
pub struct FieldReader<'a, E: ByteOrder> {
    buf: &'a [u8],
    _order: PhantomData<E>,
}

impl<'a, E: ByteOrder> FieldReader<'a, E> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            _order: PhantomData,
        }
    }

    /// Raw bytes of a field. Panics if the field lies outside the buffer.
    pub fn bytes(&self, field: VolumeField) -> &'a [u8] {
        &self.buf[field.offset..field.offset + field.size]
    }

    pub fn read_i16(&self, field: VolumeField) -> i16 {
        E::read_i16(self.bytes(field))
    }

    pub fn read_u16(&self, field: VolumeField) -> u16 {
        E::read_u16(self.bytes(field))
    }

    pub fn read_u32(&self, field: VolumeField) -> u32 {
        E::read_u32(self.bytes(field))
    }

    pub fn read_i64(&self, field: VolumeField) -> i64 {
        E::read_i64(self.bytes(field))
    }

    pub fn read_u64(&self, field: VolumeField) -> u64 {
        E::read_u64(self.bytes(field))
    }

    /// Field bytes interpreted as ASCII; non-ASCII bytes are replaced so the
    /// result is always printable in diagnostics.
    pub fn read_ascii(&self, field: VolumeField) -> String {
        String::from_utf8_lossy(self.bytes(field)).into_owned()
    }
}
