//! Encryption at rest for account secrets.
//!
//! Secrets are sealed with ChaCha20-Poly1305 under a per-installation master
//! key. Each sealed value is `base64(nonce || ciphertext || tag)` with a fresh
//! random nonce; the owning account id is bound as associated data so a sealed
//! key copied onto another row fails to open.

use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use log::{info, warn};
use rand::rngs::OsRng;
use rand::RngCore;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of the master key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;
/// Size of the ChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the Poly1305 tag in bytes.
pub const TAG_SIZE: usize = 16;
/// File name of the master key inside the data directory.
pub const MASTER_KEY_FILE_NAME: &str = "master.key";

#[derive(Debug)]
pub enum VaultError {
    Io(std::io::Error),
    /// Key file exists but does not hold a base64 encoded 32-byte key.
    MalformedKey(String),
    /// Sealed value is not valid base64 or is too short.
    MalformedSealed(String),
    /// Wrong key, wrong associated data or tampered ciphertext.
    Decrypt,
    Encrypt,
    /// Decrypted bytes are not UTF-8.
    InvalidUtf8,
}

impl Display for VaultError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "master key I/O error: {err}"),
            Self::MalformedKey(details) => write!(f, "malformed master key: {details}"),
            Self::MalformedSealed(details) => write!(f, "malformed sealed value: {details}"),
            Self::Decrypt => write!(f, "decryption failed (wrong key or tampered data)"),
            Self::Encrypt => write!(f, "encryption failed"),
            Self::InvalidUtf8 => write!(f, "decrypted value is not valid UTF-8"),
        }
    }
}

impl Error for VaultError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VaultError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Symmetric master key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_SIZE]);

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

impl MasterKey {
    /// Generates a key from the OS entropy source.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Loads the key at `path`, creating it on first use.
    ///
    /// # Side effects
    /// - Writes a new key file (mode 0600 on Unix) when `path` is missing.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, VaultError> {
        let path = path.as_ref();
        if path.exists() {
            let text = Zeroizing::new(std::fs::read_to_string(path)?);
            return Self::decode(text.trim());
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let key = Self::generate();
        let encoded = Zeroizing::new(STANDARD.encode(key.0));

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(encoded.as_bytes())?;
        file.sync_all()?;

        info!(
            "event=master_key_created module=vault status=ok path={}",
            path.display()
        );
        Ok(key)
    }

    fn decode(encoded: &str) -> Result<Self, VaultError> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(encoded)
                .map_err(|err| VaultError::MalformedKey(err.to_string()))?,
        );
        if bytes.len() != KEY_SIZE {
            warn!(
                "event=master_key_load module=vault status=error key_len={}",
                bytes.len()
            );
            return Err(VaultError::MalformedKey(format!(
                "expected {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }
}

/// Seals and opens short string secrets.
pub struct Vault {
    cipher: ChaCha20Poly1305,
}

impl Vault {
    pub fn new(key: &MasterKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key.0)),
        }
    }

    /// Encrypts `plaintext` bound to `aad`; returns base64 text.
    pub fn seal(&self, plaintext: &str, aad: &[u8]) -> Result<String, VaultError> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad,
                },
            )
            .map_err(|_| VaultError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Decrypts a value produced by [`Vault::seal`] with the same `aad`.
    pub fn open(&self, sealed: &str, aad: &[u8]) -> Result<String, VaultError> {
        let raw = STANDARD
            .decode(sealed.trim())
            .map_err(|err| VaultError::MalformedSealed(err.to_string()))?;
        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(VaultError::MalformedSealed(format!(
                "expected at least {} bytes, got {}",
                NONCE_SIZE + TAG_SIZE,
                raw.len()
            )));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| VaultError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| VaultError::InvalidUtf8)
    }
}
