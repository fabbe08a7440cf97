// Tweakable block-cipher engine (XTS) over two independently keyed
// 128-bit block ciphers. The mode lives here; the block primitive is
// whatever implements the RustCrypto `cipher` traits (AES-256 in this
// crate). Ported from the golang x/crypto XTS construction.

use cipher::consts::U16;
use cipher::{Block, BlockDecrypt, BlockEncrypt, BlockSizeUser};
use std::fmt;

/// Cipher block size. The tweak update below is specific to 128-bit blocks.
pub const BLOCK_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XtsError {
    /// Input length is not a multiple of the block size.
    InvalidLength { len: usize },
    /// Input and output buffers differ in length.
    LengthMismatch { input: usize, output: usize },
}

impl fmt::Display for XtsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            XtsError::InvalidLength { len } => {
                write!(f, "invalid length {}, must be a multiple of {}", len, BLOCK_SIZE)
            }
            XtsError::LengthMismatch { input, output } => {
                write!(f, "input length {} does not match output length {}", input, output)
            }
        }
    }
}

impl std::error::Error for XtsError {}

/// XTS cipher: `k1` transforms the data blocks, `k2` only derives the
/// initial tweak. Holds no per-sector state; every call is seeded from the
/// sector number alone, so sectors can be processed in any order.
pub struct Xts128<C> {
    k1: C,
    k2: C,
}

impl<C> Xts128<C>
where
    C: BlockEncrypt + BlockDecrypt + BlockSizeUser<BlockSize = U16>,
{
    pub fn new(k1: C, k2: C) -> Self {
        Self { k1, k2 }
    }

    /// Encrypts `plaintext` into `ciphertext` as the given sector. Both
    /// buffers must be the same multiple of [`BLOCK_SIZE`].
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        ciphertext: &mut [u8],
        sector_num: u64,
    ) -> Result<(), XtsError> {
        self.check_lengths(plaintext.len(), ciphertext.len())?;

        let mut tweak = self.init_tweak(sector_num);
        for (src, dst) in plaintext
            .chunks(BLOCK_SIZE)
            .zip(ciphertext.chunks_mut(BLOCK_SIZE))
        {
            for i in 0..BLOCK_SIZE {
                dst[i] = src[i] ^ tweak[i];
            }
            self.k1.encrypt_block(Block::<C>::from_mut_slice(dst));
            for i in 0..BLOCK_SIZE {
                dst[i] ^= tweak[i];
            }
            gf_mul_x(&mut tweak);
        }
        Ok(())
    }

    /// Decrypts `ciphertext` into `plaintext` as the given sector. Both
    /// buffers must be the same multiple of [`BLOCK_SIZE`].
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        plaintext: &mut [u8],
        sector_num: u64,
    ) -> Result<(), XtsError> {
        self.check_lengths(ciphertext.len(), plaintext.len())?;

        let mut tweak = self.init_tweak(sector_num);
        for (src, dst) in ciphertext
            .chunks(BLOCK_SIZE)
            .zip(plaintext.chunks_mut(BLOCK_SIZE))
        {
            for i in 0..BLOCK_SIZE {
                dst[i] = src[i] ^ tweak[i];
            }
            self.k1.decrypt_block(Block::<C>::from_mut_slice(dst));
            for i in 0..BLOCK_SIZE {
                dst[i] ^= tweak[i];
            }
            gf_mul_x(&mut tweak);
        }
        Ok(())
    }

    fn check_lengths(&self, input: usize, output: usize) -> Result<(), XtsError> {
        if input % BLOCK_SIZE != 0 {
            return Err(XtsError::InvalidLength { len: input });
        }
        if input != output {
            return Err(XtsError::LengthMismatch { input, output });
        }
        Ok(())
    }

    // Initial tweak: the sector number encoded little-endian into one full
    // block, zero-padded, then encrypted under k2.
    fn init_tweak(&self, sector_num: u64) -> [u8; BLOCK_SIZE] {
        let mut tweak = [0u8; BLOCK_SIZE];
        tweak[..8].copy_from_slice(&sector_num.to_le_bytes());
        self.k2.encrypt_block(Block::<C>::from_mut_slice(&mut tweak));
        tweak
    }
}

// Multiply the tweak by x in GF(2^128): shift left one bit across the whole
// array, carry propagating byte to byte, and fold a carry out of the last
// byte back into the first byte with the reduction constant 0x87.
fn gf_mul_x(tweak: &mut [u8; BLOCK_SIZE]) {
    let mut carry = 0u8;
    for byte in tweak.iter_mut() {
        let next_carry = *byte >> 7;
        *byte = (*byte << 1) | carry;
        carry = next_carry;
    }
    if carry != 0 {
        tweak[0] ^= 0x87;
    }
}
