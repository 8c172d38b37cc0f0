// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! af-secrets
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// JSON file backend with atomic writes and hot reload.
pub mod file;

use std::collections::BTreeMap;
use std::sync::Mutex;

pub use file::FileBackend;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by secrets providers.
#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    /// No secret stored under the given key.
    #[error("secret not found: {key}")]
    NotFound {
        /// The requested key.
        key: String,
    },

    /// The key violates the `[A-Za-z0-9_-]{{1,255}}` grammar.
    #[error("invalid secret key: {key}")]
    InvalidKey {
        /// The offending key.
        key: String,
    },

    /// The backing store could not be reached or parsed.
    #[error("secrets provider unavailable: {reason}")]
    Unavailable {
        /// Human-readable failure detail. Never contains secret material.
        reason: String,
    },

    /// The backing store exists but is not accessible with safe permissions.
    #[error("permission denied for secrets store: {reason}")]
    PermissionDenied {
        /// Human-readable failure detail.
        reason: String,
    },

    /// The backend does not support the requested operation.
    #[error("operation not supported by this backend: {operation}")]
    Unsupported {
        /// Name of the unsupported operation.
        operation: String,
    },
}

// ---------------------------------------------------------------------------
// Key grammar & masking
// ---------------------------------------------------------------------------

/// Returns `true` when `key` matches `[A-Za-z0-9_-]{1,255}`.
#[must_use]
pub fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 255
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub(crate) fn check_key(key: &str) -> Result<(), SecretsError> {
    if valid_key(key) {
        Ok(())
    } else {
        Err(SecretsError::InvalidKey {
            key: key.to_string(),
        })
    }
}

/// Mask a secret value for logging: first two + last two characters with an
/// ellipsis, or all asterisks for values of four characters or fewer.
///
/// # Examples
///
/// ```
/// assert_eq!(af_secrets::mask("supersecretvalue"), "su…ue");
/// assert_eq!(af_secrets::mask("key1"), "****");
/// assert_eq!(af_secrets::mask(""), "");
/// ```
#[must_use]
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}…{tail}")
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Uniform interface over secret backends.
///
/// Implementations must never log secret bodies; use [`mask`] at every
/// diagnostic site.
pub trait SecretsProvider: Send + Sync {
    /// Fetch the secret stored under `key`.
    ///
    /// # Errors
    ///
    /// [`SecretsError::NotFound`] when absent, [`SecretsError::InvalidKey`]
    /// on grammar violations, [`SecretsError::Unavailable`] on store failure.
    fn get(&self, key: &str) -> Result<String, SecretsError>;

    /// Store `value` under `key`.
    ///
    /// # Errors
    ///
    /// Same kinds as [`get`](Self::get).
    fn set(&self, key: &str, value: &str) -> Result<(), SecretsError>;

    /// Remove the secret stored under `key`.
    ///
    /// # Errors
    ///
    /// [`SecretsError::NotFound`] when the key was never stored.
    fn delete(&self, key: &str) -> Result<(), SecretsError>;

    /// List all stored keys in deterministic order.
    ///
    /// # Errors
    ///
    /// [`SecretsError::Unavailable`] on store failure.
    fn list(&self) -> Result<Vec<String>, SecretsError>;

    /// Replace the secret under `key` with fresh random material and return
    /// the new value.
    ///
    /// # Errors
    ///
    /// [`SecretsError::Unsupported`] for backends without rotation.
    fn rotate(&self, key: &str) -> Result<String, SecretsError>;
}

// ---------------------------------------------------------------------------
// Process-environment backend
// ---------------------------------------------------------------------------

/// Backend over prefixed process-environment variables.
///
/// Mutations land in a process-local overlay and never touch the parent
/// environment; `rotate` is unsupported. Intended for development and
/// container deployments where secrets arrive via the environment.
pub struct EnvBackend {
    prefix: String,
    // Overlay over the inherited environment. `None` marks a deletion.
    overlay: Mutex<BTreeMap<String, Option<String>>>,
}

impl EnvBackend {
    /// Create a backend reading variables under `prefix` (e.g. `AF_SECRET_`).
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            overlay: Mutex::new(BTreeMap::new()),
        }
    }

    fn env_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl SecretsProvider for EnvBackend {
    fn get(&self, key: &str) -> Result<String, SecretsError> {
        check_key(key)?;
        let overlay = self.overlay.lock().expect("overlay lock poisoned");
        match overlay.get(key) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(SecretsError::NotFound {
                key: key.to_string(),
            }),
            None => std::env::var(self.env_name(key)).map_err(|_| SecretsError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SecretsError> {
        check_key(key)?;
        let mut overlay = self.overlay.lock().expect("overlay lock poisoned");
        overlay.insert(key.to_string(), Some(value.to_string()));
        tracing::debug!(key, value = %mask(value), "secret set (process-local)");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), SecretsError> {
        check_key(key)?;
        let mut overlay = self.overlay.lock().expect("overlay lock poisoned");
        let in_overlay = matches!(overlay.get(key), Some(Some(_)));
        let in_env = std::env::var(self.env_name(key)).is_ok();
        if !in_overlay && !in_env {
            return Err(SecretsError::NotFound {
                key: key.to_string(),
            });
        }
        overlay.insert(key.to_string(), None);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, SecretsError> {
        let overlay = self.overlay.lock().expect("overlay lock poisoned");
        let mut keys: std::collections::BTreeSet<String> = std::env::vars()
            .filter_map(|(name, _)| name.strip_prefix(&self.prefix).map(str::to_string))
            .filter(|k| valid_key(k))
            .collect();
        for (key, entry) in overlay.iter() {
            match entry {
                Some(_) => {
                    keys.insert(key.clone());
                }
                None => {
                    keys.remove(key);
                }
            }
        }
        Ok(keys.into_iter().collect())
    }

    fn rotate(&self, _key: &str) -> Result<String, SecretsError> {
        Err(SecretsError::Unsupported {
            operation: "rotate".to_string(),
        })
    }
}

/// Generate fresh rotation material: 32 random bytes, hex encoded.
#[must_use]
pub fn rotation_material() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Key grammar -----------------------------------------------------

    #[test]
    fn key_grammar() {
        assert!(valid_key("api_key"));
        assert!(valid_key("API-KEY-2"));
        assert!(valid_key(&"k".repeat(255)));
        assert!(!valid_key(""));
        assert!(!valid_key(&"k".repeat(256)));
        assert!(!valid_key("has space"));
        assert!(!valid_key("dot.key"));
        assert!(!valid_key("päth"));
    }

    // -- Masking ---------------------------------------------------------

    #[test]
    fn masks_long_values() {
        assert_eq!(mask("supersecret"), "su…et");
        assert_eq!(mask("abcde"), "ab…de");
    }

    #[test]
    fn masks_short_values_entirely() {
        assert_eq!(mask("abcd"), "****");
        assert_eq!(mask("x"), "*");
        assert_eq!(mask(""), "");
    }

    #[test]
    fn mask_never_reveals_middle() {
        let secret = "aa-very-sensitive-core-zz";
        let masked = mask(secret);
        assert!(!masked.contains("sensitive"));
        assert_eq!(masked, "aa…zz");
    }

    // -- Env backend -----------------------------------------------------

    #[test]
    fn env_backend_set_get_delete_cycle() {
        let backend = EnvBackend::new("AF_SECRET_");
        backend.set("cycle_key", "value-1").unwrap();
        assert_eq!(backend.get("cycle_key").unwrap(), "value-1");

        backend.set("cycle_key", "value-2").unwrap();
        assert_eq!(backend.get("cycle_key").unwrap(), "value-2");

        backend.delete("cycle_key").unwrap();
        assert!(matches!(
            backend.get("cycle_key"),
            Err(SecretsError::NotFound { .. })
        ));
    }

    #[test]
    fn env_backend_missing_key_not_found() {
        let backend = EnvBackend::new("AF_SECRET_");
        assert!(matches!(
            backend.get("never_set"),
            Err(SecretsError::NotFound { .. })
        ));
        assert!(matches!(
            backend.delete("never_set"),
            Err(SecretsError::NotFound { .. })
        ));
    }

    #[test]
    fn env_backend_rejects_bad_keys() {
        let backend = EnvBackend::new("AF_SECRET_");
        assert!(matches!(
            backend.get("bad key"),
            Err(SecretsError::InvalidKey { .. })
        ));
        assert!(matches!(
            backend.set("", "v"),
            Err(SecretsError::InvalidKey { .. })
        ));
    }

    #[test]
    fn env_backend_rotate_unsupported() {
        let backend = EnvBackend::new("AF_SECRET_");
        assert!(matches!(
            backend.rotate("any"),
            Err(SecretsError::Unsupported { .. })
        ));
    }

    #[test]
    fn env_backend_list_reflects_overlay() {
        let backend = EnvBackend::new("AF_SECRET_TEST_LIST_");
        backend.set("alpha", "1").unwrap();
        backend.set("beta", "2").unwrap();
        backend.delete("beta").unwrap();
        let keys = backend.list().unwrap();
        assert!(keys.contains(&"alpha".to_string()));
        assert!(!keys.contains(&"beta".to_string()));
    }

    // -- Rotation material ------------------------------------------------

    #[test]
    fn rotation_material_is_32_byte_hex() {
        let a = rotation_material();
        let b = rotation_material();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
