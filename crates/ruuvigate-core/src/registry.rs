//! Persisted RuuviTag registry.
//!
//! The registry is the list of devices the gateway polls. It lives in
//! memory behind a single async mutex and is mirrored to a plain text
//! file, one MAC per line. Every public operation holds the lock for its
//! whole duration, including the file write, so memory and disk never
//! disagree for an observer.
//!
//! Writes go to a sibling temporary file which is synced and then renamed
//! over the store, so a crash leaves either the old or the new list on
//! disk, never a torn one.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::DeviceId;

/// The set of RuuviTags to poll, in insertion order.
#[derive(Debug)]
pub struct DeviceRegistry {
    path: PathBuf,
    devices: Mutex<Vec<DeviceId>>,
}

impl DeviceRegistry {
    /// Load the registry from `path`, creating an empty store if the file
    /// does not exist.
    ///
    /// Blank lines are skipped. Any other line that is not a valid MAC
    /// address fails the whole load.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let devices = run_blocking({
            let path = path.clone();
            move || load_or_create(&path)
        })
        .await?;

        info!(path = %path.display(), count = devices.len(), "loaded RuuviTags");
        Ok(Self {
            path,
            devices: Mutex::new(devices),
        })
    }

    /// Add `id` and persist. Returns `false` if it is already present.
    pub async fn add(&self, id: DeviceId) -> Result<bool, CoreError> {
        let mut devices = self.devices.lock().await;
        if devices.contains(&id) {
            debug!(mac = %id, "RuuviTag already registered");
            return Ok(false);
        }

        let mut next = devices.clone();
        next.push(id);
        *devices = self.commit(next).await?;
        Ok(true)
    }

    /// Remove `id` and persist. Returns `false` if it was not present.
    pub async fn remove(&self, id: &DeviceId) -> Result<bool, CoreError> {
        let mut devices = self.devices.lock().await;
        let Some(index) = devices.iter().position(|d| d == id) else {
            debug!(mac = %id, "RuuviTag not registered");
            return Ok(false);
        };

        let mut next = devices.clone();
        next.remove(index);
        *devices = self.commit(next).await?;
        Ok(true)
    }

    /// Snapshot of the registered devices.
    pub async fn list(&self) -> Vec<DeviceId> {
        self.devices.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.devices.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.lock().await.is_empty()
    }

    /// Path of the backing store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `next` to disk and read it back. Called with the lock held;
    /// on error the caller's list is left untouched.
    async fn commit(&self, next: Vec<DeviceId>) -> Result<Vec<DeviceId>, CoreError> {
        let path = self.path.clone();
        let persisted = run_blocking(move || {
            let contents = render(&next);
            safe_write_all(&path, contents.as_bytes()).map_err(|source| {
                CoreError::Persistence {
                    path: path.clone(),
                    source,
                }
            })?;
            Ok(reconcile(&path, next))
        })
        .await?;

        debug!(path = %self.path.display(), count = persisted.len(), "persisted RuuviTags");
        Ok(persisted)
    }
}

/// Read back a store that was just written with `written`.
///
/// The rename has already happened, so `written` is what is on disk even
/// if the read fails; in that case it is adopted as committed.
fn reconcile(path: &Path, written: Vec<DeviceId>) -> Vec<DeviceId> {
    match load(path) {
        Ok(reloaded) => {
            if reloaded != written {
                warn!(path = %path.display(), "RuuviTags file differs from memory after write");
            }
            reloaded
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read back RuuviTags file, keeping written list");
            written
        }
    }
}

// ── Store format ─────────────────────────────────────────────────────

fn render(devices: &[DeviceId]) -> String {
    devices.iter().fold(String::new(), |mut out, id| {
        out.push_str(id.as_str());
        out.push('\n');
        out
    })
}

fn parse(path: &Path, contents: &str) -> Result<Vec<DeviceId>, CoreError> {
    let mut devices = Vec::new();
    for (index, line) in contents.split('\n').enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let id = DeviceId::parse(line).map_err(|_| CoreError::RegistryLoad {
            path: path.to_path_buf(),
            line: index + 1,
            content: line.to_owned(),
        })?;
        devices.push(id);
    }
    Ok(devices)
}

fn load(path: &Path) -> Result<Vec<DeviceId>, CoreError> {
    let contents = fs::read_to_string(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(path, &contents)
}

fn load_or_create(path: &Path) -> Result<Vec<DeviceId>, CoreError> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => {
            info!(path = %path.display(), "created empty RuuviTags file");
            Ok(Vec::new())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => load(path),
        Err(source) => Err(CoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Write `buf` to a temporary sibling of `path`, sync it, and rename it
/// into place.
fn safe_write_all(path: &Path, buf: &[u8]) -> io::Result<()> {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(format!(".tmp-{suffix}"));
    let tmp_path = path.with_file_name(tmp_name);

    let result = write_and_rename(&tmp_path, path, buf);
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn write_and_rename(tmp_path: &Path, path: &Path, buf: &[u8]) -> io::Result<()> {
    let mut tmp_file = fs::File::create(tmp_path)?;
    tmp_file.write_all(buf)?;
    tmp_file.flush()?;
    tmp_file.sync_all()?;
    drop(tmp_file);
    fs::rename(tmp_path, path)
}

async fn run_blocking<F, T>(f: F) -> Result<T, CoreError>
where
    F: FnOnce() -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CoreError::Io {
            path: PathBuf::new(),
            source: io::Error::other(e),
        })?
}
