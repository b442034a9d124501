//! Symmetric encryption of secrets at rest and password hashing

use std::path::Path;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use tracing::info;

use crate::error::{AuthError, AuthResult};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// AES-256-GCM cipher over a key loaded from a protected key file
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// Load the key file, creating it with owner-only permissions on first
    /// start.
    pub fn load_or_create(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref();
        let key_bytes = if path.exists() {
            let raw = std::fs::read(path)
                .map_err(|e| AuthError::KeyFile(format!("read {}: {}", path.display(), e)))?;
            if raw.len() != KEY_LEN {
                return Err(AuthError::KeyFile(format!(
                    "{}: expected {} bytes, found {}",
                    path.display(),
                    KEY_LEN,
                    raw.len()
                )));
            }
            raw
        } else {
            let mut key = vec![0u8; KEY_LEN];
            rand::thread_rng().fill_bytes(&mut key);
            std::fs::write(path, &key)
                .map_err(|e| AuthError::KeyFile(format!("create {}: {}", path.display(), e)))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                    .map_err(|e| AuthError::KeyFile(format!("chmod {}: {}", path.display(), e)))?;
            }
            info!(path = %path.display(), "created encryption key file");
            key
        };

        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt to base64(nonce || ciphertext)
    pub fn encrypt(&self, plaintext: &[u8]) -> AuthResult<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| AuthError::crypto(format!("encrypt: {}", e)))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> AuthResult<Vec<u8>> {
        let raw = BASE64
            .decode(encoded)
            .map_err(|e| AuthError::crypto(format!("decode: {}", e)))?;
        if raw.len() <= NONCE_LEN {
            return Err(AuthError::crypto("ciphertext too short"));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| AuthError::crypto(format!("decrypt: {}", e)))
    }

    pub fn encrypt_str(&self, plaintext: &str) -> AuthResult<String> {
        self.encrypt(plaintext.as_bytes())
    }

    pub fn decrypt_str(&self, encoded: &str) -> AuthResult<String> {
        let raw = self.decrypt(encoded)?;
        String::from_utf8(raw).map_err(|e| AuthError::crypto(format!("utf8: {}", e)))
    }
}

/// Hash a password with argon2id and a fresh per-record salt
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::crypto(format!("hash: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> AuthResult<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::crypto(format!("hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("test.key");
        let cipher = SecretCipher::load_or_create(&key_path).unwrap();

        let sealed = cipher.encrypt_str("client-secret-value").unwrap();
        assert_ne!(sealed, "client-secret-value");
        assert!(!sealed.contains("client-secret"));
        assert_eq!(cipher.decrypt_str(&sealed).unwrap(), "client-secret-value");

        // Same plaintext encrypts differently (fresh nonce)
        let sealed2 = cipher.encrypt_str("client-secret-value").unwrap();
        assert_ne!(sealed, sealed2);
    }

    #[test]
    fn test_key_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("test.key");

        let sealed = SecretCipher::load_or_create(&key_path)
            .unwrap()
            .encrypt_str("persists")
            .unwrap();
        let reopened = SecretCipher::load_or_create(&key_path).unwrap();
        assert_eq!(reopened.decrypt_str(&sealed).unwrap(), "persists");
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("test.key");
        SecretCipher::load_or_create(&key_path).unwrap();
        let mode = std::fs::metadata(&key_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("hunter3", &hash).unwrap());
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cipher = SecretCipher::load_or_create(dir.path().join("k")).unwrap();
        let mut sealed = cipher.encrypt_str("value").unwrap();
        sealed.replace_range(0..1, if sealed.starts_with('A') { "B" } else { "A" });
        assert!(cipher.decrypt_str(&sealed).is_err());
    }
}
