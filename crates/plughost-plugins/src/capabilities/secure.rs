//! Secure storage
//!
//! Values are encrypted at rest when an [`Encryptor`] is available. Each
//! entry records whether it was encrypted, so values written while
//! encryption was unavailable remain readable later.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use plughost_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::storage::{read_object, write_object};

const NONCE_LEN: usize = 12;

/// Platform encryption facility
pub trait Encryptor: Send + Sync {
    fn is_available(&self) -> bool;
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

/// AES-256-GCM keyed by the SHA-256 of a host secret.
///
/// Output is base64 of `nonce || ciphertext`, with a fresh random 96-bit
/// nonce per value.
pub struct AesGcmEncryptor {
    cipher: Aes256Gcm,
}

impl AesGcmEncryptor {
    pub fn from_secret(secret: &str) -> Result<Self> {
        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| Error::Encryption(format!("invalid key: {}", e)))?;
        Ok(Self { cipher })
    }
}

impl Encryptor for AesGcmEncryptor {
    fn is_available(&self) -> bool {
        true
    }

    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    fn decrypt(&self, encoded: &str) -> Result<String> {
        let blob = BASE64
            .decode(encoded)
            .map_err(|e| Error::Encryption(format!("invalid base64: {}", e)))?;
        if blob.len() < NONCE_LEN {
            return Err(Error::Encryption("ciphertext too short".to_string()));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Encryption("decryption failed".to_string()))?;
        String::from_utf8(plaintext).map_err(|e| Error::Encryption(e.to_string()))
    }
}

/// Used when no secret is configured
pub struct NoEncryption;

impl Encryptor for NoEncryption {
    fn is_available(&self) -> bool {
        false
    }

    fn encrypt(&self, _plaintext: &str) -> Result<String> {
        Err(Error::Unavailable("encryption".to_string()))
    }

    fn decrypt(&self, _ciphertext: &str) -> Result<String> {
        Err(Error::Unavailable("encryption".to_string()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SecureEntry {
    value: String,
    encrypted: bool,
}

/// Secure storage handle scoped to one plugin
#[derive(Clone)]
pub struct SecureStorage {
    path: PathBuf,
    encryptor: Arc<dyn Encryptor>,
    lock: Arc<Mutex<()>>,
}

impl SecureStorage {
    pub(crate) fn new(storage_dir: &Path, plugin_id: &str, encryptor: Arc<dyn Encryptor>) -> Self {
        Self {
            path: storage_dir.join(format!("{}.secure.json", plugin_id)),
            encryptor,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Whether new values will be encrypted
    pub fn is_encryption_available(&self) -> bool {
        self.encryptor.is_available()
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let data = read_object(&self.path).await?;
        let entry = match data.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(plain)) => return Ok(Some(plain.clone())),
            Some(other) => serde_json::from_value::<SecureEntry>(other.clone())?,
        };
        if entry.encrypted {
            self.encryptor.decrypt(&entry.value).map(Some)
        } else {
            Ok(Some(entry.value))
        }
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let entry = if self.encryptor.is_available() {
            SecureEntry {
                value: self.encryptor.encrypt(value)?,
                encrypted: true,
            }
        } else {
            SecureEntry {
                value: value.to_string(),
                encrypted: false,
            }
        };

        let _guard = self.lock.lock().await;
        let mut data = read_object(&self.path).await?;
        data.insert(key.to_string(), serde_json::to_value(entry)?);
        write_object(&self.path, &data).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut data = read_object(&self.path).await?;
        let existed = data.remove(key).is_some();
        write_object(&self.path, &data).await?;
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes_roundtrip_uses_fresh_nonce() {
        let enc = AesGcmEncryptor::from_secret("host secret").unwrap();
        let a = enc.encrypt("api-key-123").unwrap();
        let b = enc.encrypt("api-key-123").unwrap();

        assert_ne!(a, b);
        assert_eq!(enc.decrypt(&a).unwrap(), "api-key-123");

        let other = AesGcmEncryptor::from_secret("different").unwrap();
        assert!(matches!(other.decrypt(&a), Err(Error::Encryption(_))));
    }

    #[tokio::test]
    async fn test_values_are_not_stored_in_clear() {
        let dir = tempfile::tempdir().unwrap();
        let enc: Arc<dyn Encryptor> = Arc::new(AesGcmEncryptor::from_secret("s3cret").unwrap());
        let secure = SecureStorage::new(dir.path(), "mail", enc);

        assert!(secure.is_encryption_available());
        secure.set("password", "hunter2").await.unwrap();
        assert_eq!(secure.get("password").await.unwrap().as_deref(), Some("hunter2"));

        let raw = std::fs::read_to_string(dir.path().join("mail.secure.json")).unwrap();
        assert!(!raw.contains("hunter2"));
        assert!(raw.contains("\"encrypted\": true"));
    }

    #[tokio::test]
    async fn test_unavailable_encryption_falls_back_to_plain() {
        let dir = tempfile::tempdir().unwrap();
        let plain = SecureStorage::new(dir.path(), "mail", Arc::new(NoEncryption));
        assert!(!plain.is_encryption_available());
        plain.set("token", "abc").await.unwrap();

        // An entry written without encryption stays readable once a key exists
        let enc: Arc<dyn Encryptor> = Arc::new(AesGcmEncryptor::from_secret("k").unwrap());
        let secure = SecureStorage::new(dir.path(), "mail", enc);
        assert_eq!(secure.get("token").await.unwrap().as_deref(), Some("abc"));
        assert!(secure.delete("token").await.unwrap());
        assert_eq!(secure.get("token").await.unwrap(), None);
    }
}
