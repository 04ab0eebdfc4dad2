use crate::constants::buffers::{CRYPTO_IV_SIZE, CRYPTO_KEY_SIZE, CRYPTO_TAG_SIZE};
use crate::errors::CommandError;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use base64::Engine;
use rand::RngCore;
use std::path::Path;

fn decode_key(raw: &str) -> Option<Vec<u8>> {
    let trimmed = raw.trim();
    let decoded = if trimmed.len() == CRYPTO_KEY_SIZE * 2 {
        hex::decode(trimmed).ok()?
    } else if trimmed.len() == CRYPTO_KEY_SIZE {
        trimmed.as_bytes().to_vec()
    } else {
        base64::engine::general_purpose::STANDARD
            .decode(trimmed.as_bytes())
            .ok()?
    };
    (decoded.len() == CRYPTO_KEY_SIZE).then_some(decoded)
}

/// AES-256-GCM sealing for secret values at rest. Sealed form is
/// `<iv_hex>:<tag_hex>:<data_hex>`.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// Key precedence: `ENCRYPTION_KEY`, then the key file, then a freshly
    /// generated key written to the key file with mode 0600.
    pub fn load(key_path: &Path) -> Result<Self, CommandError> {
        if let Ok(raw) = std::env::var("ENCRYPTION_KEY") {
            if let Some(key) = decode_key(&raw) {
                return Self::from_key_bytes(&key);
            }
        }
        if key_path.exists() {
            let stored = std::fs::read_to_string(key_path).map_err(|err| {
                CommandError::internal(format!(
                    "Failed to read encryption key {}: {}",
                    key_path.display(),
                    err
                ))
            })?;
            let key = decode_key(&stored).ok_or_else(|| {
                CommandError::internal(format!(
                    "Encryption key file {} is malformed",
                    key_path.display()
                ))
                .with_hint("Restore the original key file or set ENCRYPTION_KEY; stored credentials cannot be decrypted with a new key")
            })?;
            return Self::from_key_bytes(&key);
        }
        let mut generated = vec![0u8; CRYPTO_KEY_SIZE];
        OsRng.fill_bytes(&mut generated);
        crate::utils::fs_atomic::atomic_write_text_file(key_path, &hex::encode(&generated), 0o600)
            .map_err(|err| {
                CommandError::internal(format!("Failed to persist encryption key: {}", err))
            })?;
        Self::from_key_bytes(&generated)
    }

    pub fn from_key_bytes(key: &[u8]) -> Result<Self, CommandError> {
        if key.len() != CRYPTO_KEY_SIZE {
            return Err(CommandError::invalid_params(format!(
                "Encryption key must be {} bytes",
                CRYPTO_KEY_SIZE
            )));
        }
        let key = aes_gcm::Key::<Aes256Gcm>::from_slice(key);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    pub fn seal(&self, plain: &str) -> Result<String, CommandError> {
        let mut iv = [0u8; CRYPTO_IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        let nonce = aes_gcm::Nonce::from_slice(&iv);
        let mut data = self
            .cipher
            .encrypt(nonce, plain.as_bytes())
            .map_err(|_| CommandError::internal("Failed to encrypt secret value"))?;
        if data.len() < CRYPTO_TAG_SIZE {
            return Err(CommandError::internal("Failed to encrypt secret value"));
        }
        let tag = data.split_off(data.len() - CRYPTO_TAG_SIZE);
        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(data)
        ))
    }

    pub fn unseal(&self, sealed: &str) -> Result<String, CommandError> {
        let malformed = || {
            CommandError::internal("Stored secret has an invalid format")
                .with_hint("Expected \"<iv_hex>:<tag_hex>:<data_hex>\"")
        };
        let mut parts = sealed.split(':');
        let (Some(iv), Some(tag), Some(data), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        let iv = hex::decode(iv).map_err(|_| malformed())?;
        let tag = hex::decode(tag).map_err(|_| malformed())?;
        let mut combined = hex::decode(data).map_err(|_| malformed())?;
        if iv.len() != CRYPTO_IV_SIZE || tag.len() != CRYPTO_TAG_SIZE {
            return Err(malformed());
        }
        combined.extend_from_slice(&tag);
        let nonce = aes_gcm::Nonce::from_slice(&iv);
        let plain = self
            .cipher
            .decrypt(nonce, combined.as_ref())
            .map_err(|_| {
                CommandError::internal("Failed to decrypt secret value").with_hint(
                    "ENCRYPTION_KEY or the key file no longer matches the one used to store credentials",
                )
            })?;
        String::from_utf8(plain).map_err(|_| CommandError::internal("Secret value is not UTF-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::from_key_bytes(&[7u8; CRYPTO_KEY_SIZE]).expect("cipher")
    }

    #[test]
    fn sealed_values_open_with_the_same_key() {
        let c = cipher();
        let sealed = c.seal("Bearer abc.def").expect("seal");
        assert!(!sealed.contains("abc"));
        assert_eq!(c.unseal(&sealed).expect("unseal"), "Bearer abc.def");
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let sealed = cipher().seal("secret").unwrap();
        let other = SecretCipher::from_key_bytes(&[9u8; CRYPTO_KEY_SIZE]).unwrap();
        assert!(other.unseal(&sealed).is_err());
    }

    #[test]
    fn malformed_payload_is_rejected() {
        assert!(cipher().unseal("not-sealed").is_err());
        assert!(cipher().unseal("aa:bb:cc:dd").is_err());
    }

    #[test]
    fn decode_key_accepts_hex_and_raw() {
        assert_eq!(decode_key(&"ab".repeat(32)).map(|k| k.len()), Some(32));
        assert_eq!(decode_key(&"k".repeat(32)).map(|k| k.len()), Some(32));
        assert!(decode_key("short").is_none());
    }
}
