//! Per-direction symmetric stream cipher state.
//!
//! Two methods are supported: `table`, a keyed substitution cipher in the
//! spirit of the original tool's legacy default, and `rc4`, backed by the
//! `rc4` crate's `StreamCipher` implementation. Both expose the same
//! in-place `encrypt`/`decrypt` shape so a [`Session`](crate::session::Session)
//! never needs to know which one it holds.

use cipher::{KeyInit, StreamCipher as _};
use md5::{Digest, Md5};
use rc4::Rc4;

use crate::error::{Error, Result};

/// Number of bytes of keystream/table state derived from the passphrase.
/// 16 bytes matches the original tool's default key length (MD5 digest size).
const KEY_LEN: usize = 16;

/// A cipher method, keyed once at startup and shared read-only across all
/// sessions (behind an `Arc`). Each session asks it for a fresh, independent
/// `(Encryptor, Decryptor)` pair.
#[derive(Clone)]
pub enum CipherMethod {
    Table(TableKey),
    Rc4(Rc4Key),
}

impl CipherMethod {
    /// Looks up a cipher method by name (case-insensitive) and derives its
    /// key material from `password`.
    pub fn new(name: &str, password: &str) -> Result<Self> {
        let key = derive_key(password.as_bytes(), KEY_LEN);
        match name.to_ascii_lowercase().as_str() {
            "table" => Ok(CipherMethod::Table(TableKey::new(&key))),
            "rc4" => Ok(CipherMethod::Rc4(Rc4Key(key))),
            other => Err(Error::UnknownMethod(other.to_string())),
        }
    }

    /// Creates a fresh, independently-keyed encrypt/decrypt context pair.
    pub fn new_contexts(&self) -> (Encryptor, Decryptor) {
        match self {
            CipherMethod::Table(key) => (
                Encryptor::Table(TableCipher { table: key.encrypt_table }),
                Decryptor::Table(TableCipher { table: key.decrypt_table }),
            ),
            CipherMethod::Rc4(key) => (
                Encryptor::Rc4(Rc4::new_from_slice(&key.0).expect("16-byte key is valid")),
                Decryptor::Rc4(Rc4::new_from_slice(&key.0).expect("16-byte key is valid")),
            ),
        }
    }
}

/// Derives `key_len` bytes from `password` by repeated MD5 digesting, the
/// same `EVP_BytesToKey`-style schedule the original tool uses to turn a
/// passphrase into key material.
fn derive_key(password: &[u8], key_len: usize) -> Vec<u8> {
    let mut result = Vec::with_capacity(key_len + Md5::output_size());
    let mut prev: Vec<u8> = Vec::new();

    while result.len() < key_len {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password);
        let digest = hasher.finalize();
        prev = digest.to_vec();
        result.extend_from_slice(&digest);
    }

    result.truncate(key_len);
    result
}

/// A pair of mutually-inverse 256-byte substitution tables derived from the
/// key. `encrypt_table[x]` and `decrypt_table[x]` undo each other.
#[derive(Clone, Copy)]
pub struct TableKey {
    encrypt_table: [u8; 256],
    decrypt_table: [u8; 256],
}

impl TableKey {
    fn new(key: &[u8]) -> Self {
        let seed = splitmix64_seed(key);
        let mut encrypt_table = [0u8; 256];
        for (i, slot) in encrypt_table.iter_mut().enumerate() {
            *slot = i as u8;
        }

        // Keyed Fisher-Yates shuffle: deterministic for a given key, and
        // trivially invertible (see `decrypt_table` below).
        let mut state = seed;
        for i in (1..256usize).rev() {
            state = splitmix64_next(state);
            let j = (state % (i as u64 + 1)) as usize;
            encrypt_table.swap(i, j);
        }

        let mut decrypt_table = [0u8; 256];
        for (i, &v) in encrypt_table.iter().enumerate() {
            decrypt_table[v as usize] = i as u8;
        }

        TableKey { encrypt_table, decrypt_table }
    }
}

fn splitmix64_seed(key: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    for (i, b) in key.iter().take(8).enumerate() {
        buf[i] = *b;
    }
    u64::from_le_bytes(buf)
}

fn splitmix64_next(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[derive(Clone, Copy)]
struct TableCipher {
    table: [u8; 256],
}

impl TableCipher {
    fn apply(&self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.table[*b as usize];
        }
    }
}

#[derive(Clone)]
pub struct Rc4Key(Vec<u8>);

/// A session's encrypt context. Advances internal state by the number of
/// bytes processed on every call.
pub enum Encryptor {
    Table(TableCipher),
    Rc4(Rc4),
}

impl Encryptor {
    /// Encrypts `buf` in place. Bytes in equals bytes out.
    pub fn encrypt(&mut self, buf: &mut [u8]) {
        match self {
            Encryptor::Table(cipher) => cipher.apply(buf),
            Encryptor::Rc4(cipher) => cipher.apply_keystream(buf),
        }
    }
}

/// A session's decrypt context. Advances internal state by the number of
/// bytes processed on every call.
pub enum Decryptor {
    Table(TableCipher),
    Rc4(Rc4),
}

impl Decryptor {
    /// Decrypts `buf` in place. Bytes in equals bytes out.
    pub fn decrypt(&mut self, buf: &mut [u8]) {
        match self {
            Decryptor::Table(cipher) => cipher.apply(buf),
            Decryptor::Rc4(cipher) => cipher.apply_keystream(buf),
        }
    }
}
