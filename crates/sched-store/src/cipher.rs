//! Symmetric encryption of store files.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use sched_core::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Fixed initialization vector shared by every store file.
const IV: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
];

/// Encrypts and decrypts whole store files under an account key.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plain: &[u8], key: &[u8]) -> Result<Vec<u8>>;

    /// Fails with [`Error::WrongPassword`] when the data cannot have been
    /// produced under `key`.
    fn decrypt(&self, data: &[u8], key: &[u8]) -> Result<Vec<u8>>;
}

/// AES-256 in CBC mode with PKCS#7 padding and a fixed IV.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aes256Cbc;

impl Cipher for Aes256Cbc {
    fn encrypt(&self, plain: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        let enc = Aes256CbcEnc::new_from_slices(key, &IV).map_err(|_| Error::WrongPassword)?;
        Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plain))
    }

    fn decrypt(&self, data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        let dec = Aes256CbcDec::new_from_slices(key, &IV).map_err(|_| Error::WrongPassword)?;
        dec.decrypt_padded_vec_mut::<Pkcs7>(data)
            .map_err(|_| Error::WrongPassword)
    }
}
