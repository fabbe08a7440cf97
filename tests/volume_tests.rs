// End-to-end tests over synthetic containers: a volume is assembled
// byte by byte (salt, header fields, checksums), encrypted with the
// crate's own XTS engine under PBKDF2-derived keys, then opened and
// decrypted through the public API.

use std::io::{Cursor, Write};
use std::sync::OnceLock;

use aes::Aes256;
use byteorder::{BigEndian, ByteOrder};
use cipher::KeyInit;

use veradump::xts::Xts128;
use veradump::{kdf, HeaderError, Volume, VolumeError};

const PASSWORD: &str = "test1";
const SECTOR_SIZE: u64 = 512;
const DATA_SECTORS: u64 = 8;
const DATA_LEN: u64 = DATA_SECTORS * SECTOR_SIZE;

fn payload_byte(i: usize) -> u8 {
    ((i * 7 + 13) % 251) as u8
}

fn expected_payload(offset: usize, len: usize) -> Vec<u8> {
    (offset..offset + len).map(payload_byte).collect()
}

// Builds a complete container: cleartext salt, encrypted header with
// valid checksums, and a data region placed directly after the header
// (master key scope offset 512, so data sectors start at absolute
// sector number 1). `mutate` runs on the plaintext header before the
// checksums are computed, so a mutated field still carries valid CRCs.
fn build_volume_with(password: &str, mutate: impl FnOnce(&mut [u8; 512])) -> Vec<u8> {
    let mut plain = [0u8; 512];
    for (i, byte) in plain[..64].iter_mut().enumerate() {
        *byte = (i as u8).wrapping_mul(3).wrapping_add(1);
    }
    plain[64..68].copy_from_slice(b"VERA");
    BigEndian::write_u16(&mut plain[68..70], 5);
    BigEndian::write_u16(&mut plain[70..72], 267);
    BigEndian::write_u64(&mut plain[100..108], DATA_LEN);
    BigEndian::write_u64(&mut plain[108..116], 512);
    BigEndian::write_u64(&mut plain[116..124], DATA_LEN);
    BigEndian::write_u32(&mut plain[128..132], SECTOR_SIZE as u32);
    for (i, byte) in plain[256..512].iter_mut().enumerate() {
        *byte = (i * 5 + 2) as u8;
    }
    mutate(&mut plain);
    let key_crc = crc32fast::hash(&plain[256..512]);
    BigEndian::write_u32(&mut plain[72..76], key_crc);
    let header_crc = crc32fast::hash(&plain[64..252]);
    BigEndian::write_u32(&mut plain[252..256], header_crc);

    let mut salt = [0u8; kdf::SALT_SIZE];
    salt.copy_from_slice(&plain[..64]);
    let key_material = kdf::derive_header_keys(password.as_bytes(), &salt);
    let (hk1, hk2) = key_material.split_at(32);
    let header_cipher = Xts128::new(Aes256::new(hk1.into()), Aes256::new(hk2.into()));

    let mut file = vec![0u8; 512 + DATA_LEN as usize];
    file[..64].copy_from_slice(&plain[..64]);
    header_cipher
        .encrypt(&plain[64..512], &mut file[64..512], 0)
        .unwrap();

    let (dk1, dk2) = plain[256..320].split_at(32);
    let data_cipher = Xts128::new(Aes256::new(dk1.into()), Aes256::new(dk2.into()));
    for s in 0..DATA_SECTORS {
        let start = 512 + (s * SECTOR_SIZE) as usize;
        let sector_plain = expected_payload((s * SECTOR_SIZE) as usize, SECTOR_SIZE as usize);
        let sector_num = (512 + s * SECTOR_SIZE) / SECTOR_SIZE;
        data_cipher
            .encrypt(&sector_plain, &mut file[start..start + 512], sector_num)
            .unwrap();
    }
    file
}

// One shared container for the tests that do not mutate the header;
// PBKDF2 at 500k iterations is too slow to rebuild per test.
fn standard_volume() -> &'static [u8] {
    static VOLUME: OnceLock<Vec<u8>> = OnceLock::new();
    VOLUME.get_or_init(|| build_volume_with(PASSWORD, |_| {}))
}

fn open_standard() -> Volume<Cursor<&'static [u8]>> {
    Volume::open(Cursor::new(standard_volume()), PASSWORD).unwrap()
}

#[test]
fn open_reports_documented_fields() {
    let volume = open_standard();
    assert_eq!(volume.magic(), "VERA");
    assert_eq!(volume.header_version(), 5);
    assert_eq!(volume.min_program_version(), 267);
    assert_eq!(volume.volume_size(), DATA_LEN);
    assert_eq!(volume.sector_size(), SECTOR_SIZE as u32);
    assert_eq!(volume.master_key_scope_offset(), 512);
    assert_eq!(volume.master_key_encryption_size(), DATA_LEN);
    assert_eq!(volume.flags(), 0);
    assert_eq!(volume.volume_creation_time(), 0);
    assert_eq!(volume.header_creation_time(), 0);
}

#[test]
fn wrong_password_is_invalid_magic() {
    let err = Volume::open(Cursor::new(standard_volume()), "test2").unwrap_err();
    assert!(
        matches!(
            err,
            VolumeError::Header(HeaderError::InvalidMagic { .. })
        ),
        "unexpected error: {:?}",
        err
    );
}

#[test]
fn bit_flipped_password_never_opens() {
    // "test1" with one bit flipped in the first byte.
    let err = Volume::open(Cursor::new(standard_volume()), "uest1").unwrap_err();
    assert!(
        matches!(
            err,
            VolumeError::Header(
                HeaderError::InvalidMagic { .. }
                    | HeaderError::KeyChecksumMismatch { .. }
                    | HeaderError::HeaderChecksumMismatch { .. }
            )
        ),
        "unexpected error: {:?}",
        err
    );
}

#[test]
fn hidden_volume_never_partially_opens() {
    let bytes = build_volume_with(PASSWORD, |plain| {
        BigEndian::write_u64(&mut plain[92..100], 4096);
    });
    let err = Volume::open(Cursor::new(bytes.as_slice()), PASSWORD).unwrap_err();
    assert!(
        matches!(
            err,
            VolumeError::Header(HeaderError::UnsupportedFeature {
                hidden_volume_size: 4096
            })
        ),
        "unexpected error: {:?}",
        err
    );
}

#[test]
fn legacy_format_rejected() {
    let bytes = build_volume_with(PASSWORD, |plain| {
        BigEndian::write_u16(&mut plain[70..72], 266);
    });
    let err = Volume::open(Cursor::new(bytes.as_slice()), PASSWORD).unwrap_err();
    assert!(
        matches!(
            err,
            VolumeError::Header(HeaderError::UnsupportedVersion {
                min_program_version: 266
            })
        ),
        "unexpected error: {:?}",
        err
    );
}

#[test]
fn input_shorter_than_header_is_too_small() {
    let err = Volume::open(Cursor::new(&standard_volume()[..100]), PASSWORD).unwrap_err();
    assert!(
        matches!(err, VolumeError::TooSmall { actual: 100 }),
        "unexpected error: {:?}",
        err
    );
}

#[test]
fn full_dump_matches_payload_and_progress_contract() {
    let mut volume = open_standard();
    let mut sink = Vec::new();
    let mut reports = Vec::new();
    volume
        .read_data_bytes(&mut sink, 0, DATA_LEN, |bytes| {
            reports.push(bytes);
            Ok(())
        })
        .unwrap();

    assert_eq!(sink, expected_payload(0, DATA_LEN as usize));
    // One initial zero, then one report per sector, cumulative and
    // strictly increasing.
    assert_eq!(reports.len() as u64, DATA_SECTORS + 1);
    assert_eq!(reports[0], 0);
    assert_eq!(*reports.last().unwrap(), DATA_LEN);
    assert!(reports.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn zero_length_read_reports_zero_once() {
    let mut volume = open_standard();
    let mut sink = Vec::new();
    let mut reports = Vec::new();
    volume
        .read_data_bytes(&mut sink, 0, 0, |bytes| {
            reports.push(bytes);
            Ok(())
        })
        .unwrap();
    assert!(sink.is_empty());
    assert_eq!(reports, vec![0]);
}

#[test]
fn misaligned_requests_fail_before_any_io() {
    let mut volume = open_standard();
    for (offset, length) in [(5u64, SECTOR_SIZE), (0, SECTOR_SIZE - 1)] {
        let mut sink = Vec::new();
        let mut called = false;
        let err = volume
            .read_data_bytes(&mut sink, offset, length, |_| {
                called = true;
                Ok(())
            })
            .unwrap_err();
        assert!(
            matches!(err, VolumeError::InvalidArgument(_)),
            "unexpected error: {:?}",
            err
        );
        assert!(sink.is_empty());
        assert!(!called, "progress ran for a rejected request");
    }
}

#[test]
fn out_of_range_requests_rejected() {
    let mut volume = open_standard();
    let mut sink = Vec::new();
    let err = volume
        .read_data_bytes(&mut sink, DATA_LEN + SECTOR_SIZE, 0, |_| Ok(()))
        .unwrap_err();
    assert!(matches!(err, VolumeError::InvalidArgument(_)));

    let err = volume
        .read_data_bytes(&mut sink, 0, DATA_LEN + SECTOR_SIZE, |_| Ok(()))
        .unwrap_err();
    assert!(matches!(err, VolumeError::InvalidArgument(_)));
}

#[test]
fn aligned_middle_range_decrypts_correctly() {
    // A nonzero offset shifts the absolute sector number; a wrong tweak
    // here would yield garbage, not an error.
    let mut volume = open_standard();
    let mut sink = Vec::new();
    volume
        .read_data_bytes(&mut sink, 2 * SECTOR_SIZE, 2 * SECTOR_SIZE, |_| Ok(()))
        .unwrap();
    assert_eq!(
        sink,
        expected_payload(2 * SECTOR_SIZE as usize, 2 * SECTOR_SIZE as usize)
    );
}

#[test]
fn repeated_reads_are_identical() {
    let mut volume = open_standard();
    let mut first = Vec::new();
    let mut second = Vec::new();
    volume
        .read_data_bytes(&mut first, SECTOR_SIZE, 3 * SECTOR_SIZE, |_| Ok(()))
        .unwrap();
    volume
        .read_data_bytes(&mut second, SECTOR_SIZE, 3 * SECTOR_SIZE, |_| Ok(()))
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn progress_error_aborts_decrypt() {
    let mut volume = open_standard();
    let mut sink = Vec::new();
    let err = volume
        .read_data_bytes(&mut sink, 0, DATA_LEN, |bytes| {
            if bytes >= SECTOR_SIZE {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "observer gave up"))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
    assert!(matches!(err, VolumeError::Io(_)));
    // The sector decrypted before the abort stays written.
    assert_eq!(sink, expected_payload(0, SECTOR_SIZE as usize));
}

#[test]
fn truncated_data_region_is_io_error() {
    let mut bytes = standard_volume().to_vec();
    bytes.truncate(bytes.len() - 100);
    let mut volume = Volume::open(Cursor::new(bytes.as_slice()), PASSWORD).unwrap();
    let mut sink = Vec::new();
    let err = volume
        .read_data_bytes(&mut sink, 0, DATA_LEN, |_| Ok(()))
        .unwrap_err();
    assert!(
        matches!(&err, VolumeError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof),
        "unexpected error: {:?}",
        err
    );
}

#[test]
fn open_path_reads_a_real_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(standard_volume()).unwrap();
    file.flush().unwrap();

    let mut volume = Volume::open_path(file.path(), PASSWORD).unwrap();
    assert_eq!(volume.volume_size(), DATA_LEN);

    let mut sink = Vec::new();
    volume
        .read_data_bytes(&mut sink, 0, SECTOR_SIZE, |_| Ok(()))
        .unwrap();
    assert_eq!(sink, expected_payload(0, SECTOR_SIZE as usize));
}
