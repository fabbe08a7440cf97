// Opening a volume and streaming decryption of its data region.
//
// `Volume::open` runs the whole header pipeline: read the 512-byte
// header, derive the header keys from the password and the cleartext
// salt, decrypt [64, 512) in place at sector 0, validate, then build the
// data cipher from the key region. On any failure no `Volume` exists;
// there is no partially opened state.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use aes::Aes256;
use byteorder::BigEndian;
use cipher::KeyInit;
use log::{debug, info};
use zeroize::Zeroize;

use crate::header::{HeaderError, VolumeHeader};
use crate::kdf;
use crate::layout::{self, FieldReader, HEADER_SIZE};
use crate::xts::{Xts128, XtsError};

#[derive(Debug)]
pub enum VolumeError {
    /// Input ended before a full header could be read.
    TooSmall { actual: usize },
    /// A header validation gate failed.
    Header(HeaderError),
    /// The tweakable cipher rejected a buffer.
    Cipher(XtsError),
    /// Caller-supplied offset/length violates alignment or range.
    InvalidArgument(String),
    /// Read, write or seek failure on the underlying source or sink.
    Io(io::Error),
}

impl fmt::Display for VolumeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VolumeError::TooSmall { actual } => {
                write!(
                    f,
                    "volume too small: {} bytes, the header alone is {} bytes",
                    actual, HEADER_SIZE
                )
            }
            VolumeError::Header(e) => write!(f, "{}", e),
            VolumeError::Cipher(e) => write!(f, "{}", e),
            VolumeError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            VolumeError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for VolumeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VolumeError::Header(e) => Some(e),
            VolumeError::Cipher(e) => Some(e),
            VolumeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HeaderError> for VolumeError {
    fn from(e: HeaderError) -> Self {
        VolumeError::Header(e)
    }
}

impl From<XtsError> for VolumeError {
    fn from(e: XtsError) -> Self {
        VolumeError::Cipher(e)
    }
}

impl From<io::Error> for VolumeError {
    fn from(e: io::Error) -> Self {
        VolumeError::Io(e)
    }
}

/// An opened, validated volume. Owns the input source for its lifetime
/// and the data-region cipher built from the header's key region.
pub struct Volume<R> {
    source: R,
    header_version: u16,
    min_program_version: u16,
    volume_size: u64,
    sector_size: u32,
    master_key_scope_offset: u64,
    master_key_encryption_size: u64,
    volume_creation_time: u64,
    header_creation_time: u64,
    flags: u32,
    data_cipher: Xts128<Aes256>,
}

impl<R> fmt::Debug for Volume<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("header_version", &self.header_version)
            .field("min_program_version", &self.min_program_version)
            .field("volume_size", &self.volume_size)
            .field("sector_size", &self.sector_size)
            .field("master_key_scope_offset", &self.master_key_scope_offset)
            .field("master_key_encryption_size", &self.master_key_encryption_size)
            .field("volume_creation_time", &self.volume_creation_time)
            .field("header_creation_time", &self.header_creation_time)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl Volume<File> {
    /// Opens a volume file from a path.
    pub fn open_path<P: AsRef<Path>>(path: P, password: &str) -> Result<Self, VolumeError> {
        let file = File::open(path)?;
        Self::open(file, password)
    }
}

impl<R: Read + Seek> Volume<R> {
    /// Reads and validates the header, then returns the usable volume.
    pub fn open(mut source: R, password: &str) -> Result<Self, VolumeError> {
        let mut raw = [0u8; HEADER_SIZE];
        source.seek(SeekFrom::Start(0))?;
        let got = read_until_full(&mut source, &mut raw)?;
        if got < HEADER_SIZE {
            return Err(VolumeError::TooSmall { actual: got });
        }

        let mut salt = [0u8; kdf::SALT_SIZE];
        salt.copy_from_slice(FieldReader::<BigEndian>::new(&raw).bytes(layout::SALT));

        debug!("deriving header keys ({} iterations)", kdf::PBKDF2_ITERATIONS);
        let key_material = kdf::derive_header_keys(password.as_bytes(), &salt);
        let (hk1, hk2) = key_material.split_at(32);
        let header_cipher = Xts128::new(Aes256::new(hk1.into()), Aes256::new(hk2.into()));

        // The salt is never encrypted; only [64, 512) is, as sector 0.
        let mut decrypted = [0u8; HEADER_SIZE];
        decrypted[..64].copy_from_slice(&raw[..64]);
        header_cipher.decrypt(&raw[64..], &mut decrypted[64..], 0)?;

        let parsed = VolumeHeader::parse(&decrypted);
        decrypted.zeroize();
        let header = parsed?;

        let (dk1, dk2) = header.data_keys[..64].split_at(32);
        let data_cipher = Xts128::new(Aes256::new(dk1.into()), Aes256::new(dk2.into()));

        info!(
            "opened volume: header version {}, {} bytes, sector size {}",
            header.header_version, header.volume_size, header.sector_size
        );
        debug!(
            "master key scope offset {}, encryption size {}, flags {:#010x}, \
             volume/header creation time {}/{}",
            header.master_key_scope_offset,
            header.master_key_encryption_size,
            header.flags,
            header.volume_creation_time,
            header.header_creation_time
        );

        Ok(Volume {
            source,
            header_version: header.header_version,
            min_program_version: header.min_program_version,
            volume_size: header.volume_size,
            sector_size: header.sector_size,
            master_key_scope_offset: header.master_key_scope_offset,
            master_key_encryption_size: header.master_key_encryption_size,
            volume_creation_time: header.volume_creation_time,
            header_creation_time: header.header_creation_time,
            flags: header.flags,
            data_cipher,
        })
        // `header` drops here and wipes its key region.
    }

    /// Decrypts `[data_offset, data_offset + length)` of the data region
    /// into `sink`, sector by sector.
    ///
    /// Both `data_offset` and `length` must be multiples of the sector
    /// size and the range must stay inside the encrypted region; a
    /// violation fails before any I/O. `progress` observes the cumulative
    /// byte count: once with 0 before the first sector (also for a
    /// zero-length request), then after every sector. An error from the
    /// callback or from I/O aborts the call; bytes already written to the
    /// sink stay written.
    pub fn read_data_bytes<W, F>(
        &mut self,
        sink: &mut W,
        data_offset: u64,
        length: u64,
        mut progress: F,
    ) -> Result<(), VolumeError>
    where
        W: Write,
        F: FnMut(u64) -> io::Result<()>,
    {
        let sector_size = u64::from(self.sector_size);
        if data_offset % sector_size != 0 {
            return Err(VolumeError::InvalidArgument(format!(
                "data offset {} is not a multiple of sector size {}",
                data_offset, sector_size
            )));
        }
        if length % sector_size != 0 {
            return Err(VolumeError::InvalidArgument(format!(
                "length {} is not a multiple of sector size {}",
                length, sector_size
            )));
        }
        if data_offset > self.master_key_encryption_size {
            return Err(VolumeError::InvalidArgument(format!(
                "data offset {} is past the encrypted region of {} bytes",
                data_offset, self.master_key_encryption_size
            )));
        }
        let end = data_offset.checked_add(length).ok_or_else(|| {
            VolumeError::InvalidArgument(format!(
                "data offset {} plus length {} overflows",
                data_offset, length
            ))
        })?;
        if end > self.master_key_encryption_size {
            return Err(VolumeError::InvalidArgument(format!(
                "range end {} is past the encrypted region of {} bytes",
                end, self.master_key_encryption_size
            )));
        }

        let start = self.master_key_scope_offset + data_offset;
        self.source.seek(SeekFrom::Start(start))?;
        // Sector numbers are absolute within the container, not relative
        // to the data region.
        let mut sector_num = start / sector_size;

        progress(0)?;

        let mut ciphertext = vec![0u8; sector_size as usize];
        let mut plaintext = vec![0u8; sector_size as usize];
        let mut done: u64 = 0;
        while done < length {
            let got = read_until_full(&mut self.source, &mut ciphertext)?;
            if got < ciphertext.len() {
                return Err(VolumeError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "end of stream inside sector {}: {} of {} bytes",
                        sector_num, got, sector_size
                    ),
                )));
            }
            self.data_cipher
                .decrypt(&ciphertext, &mut plaintext, sector_num)?;
            sink.write_all(&plaintext)?;
            sector_num += 1;
            done += sector_size;
            progress(done)?;
        }
        sink.flush()?;
        Ok(())
    }
}

// Field accessors need no I/O capability from the source.
impl<R> Volume<R> {
    pub fn magic(&self) -> &'static str {
        // Guaranteed by the magic gate in `VolumeHeader::parse`.
        "VERA"
    }

    pub fn header_version(&self) -> u16 {
        self.header_version
    }

    pub fn min_program_version(&self) -> u16 {
        self.min_program_version
    }

    pub fn volume_size(&self) -> u64 {
        self.volume_size
    }

    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    pub fn master_key_scope_offset(&self) -> u64 {
        self.master_key_scope_offset
    }

    pub fn master_key_encryption_size(&self) -> u64 {
        self.master_key_encryption_size
    }

    pub fn volume_creation_time(&self) -> u64 {
        self.volume_creation_time
    }

    pub fn header_creation_time(&self) -> u64 {
        self.header_creation_time
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }
}

// Fills `buf` as far as the source allows, looping over short reads.
// Returns the number of bytes actually read; less than `buf.len()` only
// at end of stream.
fn read_until_full<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
