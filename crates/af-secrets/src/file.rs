// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON file backend.
//!
//! The store is a flat JSON object persisted with 0600 permissions. Writes
//! go through temp → fsync → atomic rename so readers never observe a torn
//! document; reads compare the file's mtime against the cached snapshot and
//! reload transparently when an external writer has touched the file.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use crate::{SecretsError, SecretsProvider, check_key, mask, rotation_material};

#[derive(Default)]
struct FileState {
    doc: BTreeMap<String, String>,
    // Mtime of the snapshot currently held in `doc`. `None` until first load
    // or while the file does not exist yet.
    loaded_mtime: Option<SystemTime>,
}

/// Secrets backend over a single JSON file.
pub struct FileBackend {
    path: PathBuf,
    state: RwLock<FileState>,
}

impl FileBackend {
    /// Open (or lazily create on first write) the store at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(FileState::default()),
        }
    }

    /// The path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn current_mtime(&self) -> Result<Option<SystemTime>, SecretsError> {
        match fs::metadata(&self.path) {
            Ok(meta) => {
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let mode = meta.permissions().mode();
                    if mode & 0o077 != 0 {
                        return Err(SecretsError::PermissionDenied {
                            reason: format!(
                                "{} must be 0600, found {:o}",
                                self.path.display(),
                                mode & 0o777
                            ),
                        });
                    }
                }
                let mtime = meta.modified().map_err(|e| SecretsError::Unavailable {
                    reason: format!("stat {}: {e}", self.path.display()),
                })?;
                Ok(Some(mtime))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SecretsError::Unavailable {
                reason: format!("stat {}: {e}", self.path.display()),
            }),
        }
    }

    fn reload(&self, state: &mut FileState) -> Result<(), SecretsError> {
        let mtime = self.current_mtime()?;
        if mtime == state.loaded_mtime {
            return Ok(());
        }
        state.doc = match mtime {
            None => BTreeMap::new(),
            Some(_) => {
                let raw = fs::read_to_string(&self.path).map_err(|e| {
                    SecretsError::Unavailable {
                        reason: format!("read {}: {e}", self.path.display()),
                    }
                })?;
                serde_json::from_str(&raw).map_err(|e| SecretsError::Unavailable {
                    reason: format!("parse {}: {e}", self.path.display()),
                })?
            }
        };
        state.loaded_mtime = mtime;
        tracing::debug!(path = %self.path.display(), entries = state.doc.len(), "secrets file reloaded");
        Ok(())
    }

    fn persist(&self, state: &mut FileState) -> Result<(), SecretsError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| {
            SecretsError::Unavailable {
                reason: format!("create temp file in {}: {e}", parent.display()),
            }
        })?;

        let body = serde_json::to_string_pretty(&state.doc).map_err(|e| {
            SecretsError::Unavailable {
                reason: format!("encode secrets document: {e}"),
            }
        })?;
        tmp.write_all(body.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| SecretsError::Unavailable {
                reason: format!("write temp file: {e}"),
            })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| SecretsError::Unavailable {
                    reason: format!("chmod temp file: {e}"),
                })?;
        }

        tmp.persist(&self.path)
            .map_err(|e| SecretsError::Unavailable {
                reason: format!("rename into {}: {e}", self.path.display()),
            })?;

        state.loaded_mtime = self.current_mtime()?;
        Ok(())
    }

    /// Run `f` under the write lock with a fresh snapshot, then persist.
    ///
    /// Holding the lock across reload + mutate + persist keeps concurrent
    /// mutations from interleaving on a stale document.
    fn mutate<F>(&self, f: F) -> Result<(), SecretsError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> Result<(), SecretsError>,
    {
        let mut state = self.state.write().expect("secrets lock poisoned");
        self.reload(&mut state)?;
        f(&mut state.doc)?;
        self.persist(&mut state)
    }
}

impl SecretsProvider for FileBackend {
    fn get(&self, key: &str) -> Result<String, SecretsError> {
        check_key(key)?;
        {
            let state = self.state.read().expect("secrets lock poisoned");
            if self.current_mtime()? == state.loaded_mtime {
                return state
                    .doc
                    .get(key)
                    .cloned()
                    .ok_or_else(|| SecretsError::NotFound {
                        key: key.to_string(),
                    });
            }
        }
        // Stale snapshot: upgrade to the write lock and reload.
        let mut state = self.state.write().expect("secrets lock poisoned");
        self.reload(&mut state)?;
        state
            .doc
            .get(key)
            .cloned()
            .ok_or_else(|| SecretsError::NotFound {
                key: key.to_string(),
            })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SecretsError> {
        check_key(key)?;
        self.mutate(|doc| {
            doc.insert(key.to_string(), value.to_string());
            Ok(())
        })?;
        tracing::debug!(key, value = %mask(value), "secret persisted");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), SecretsError> {
        check_key(key)?;
        self.mutate(|doc| {
            if doc.remove(key).is_none() {
                return Err(SecretsError::NotFound {
                    key: key.to_string(),
                });
            }
            Ok(())
        })
    }

    fn list(&self) -> Result<Vec<String>, SecretsError> {
        let mut state = self.state.write().expect("secrets lock poisoned");
        self.reload(&mut state)?;
        Ok(state.doc.keys().cloned().collect())
    }

    fn rotate(&self, key: &str) -> Result<String, SecretsError> {
        check_key(key)?;
        let fresh = rotation_material();
        let rotated = fresh.clone();
        self.mutate(move |doc| {
            if !doc.contains_key(key) {
                return Err(SecretsError::NotFound {
                    key: key.to_string(),
                });
            }
            doc.insert(key.to_string(), fresh);
            Ok(())
        })?;
        tracing::info!(key, "secret rotated");
        Ok(rotated)
    }
}
