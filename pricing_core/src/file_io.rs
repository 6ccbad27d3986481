//! # Workbook Files
//!
//! Saving and loading [`Workbook`]s:
//! - **Atomic saves**: write to `.tmp`, fsync, rename over the target
//! - **File locking**: OS lock plus a visible `.lock` sidecar so a resync
//!   on one machine doesn't race an edit on another
//! - **Version validation**: refuse files from a newer schema
//!
//! ## Example
//!
//! ```rust,no_run
//! use pricing_core::file_io::{load_workbook, save_workbook, FileLock};
//! use std::path::Path;
//!
//! let path = Path::new("harbour.pbook");
//! let lock = FileLock::acquire(path, "sam@harbourdrapes.test")?;
//! let mut workbook = load_workbook(path)?;
//! workbook.touch();
//! save_workbook(&workbook, path)?;
//! drop(lock);
//! # Ok::<(), pricing_core::errors::PricingError>(())
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{PricingError, PricingResult};
use crate::price_book::{Workbook, SCHEMA_VERSION};

/// Conventional extension for workbook files
pub const WORKBOOK_EXTENSION: &str = "pbook";

/// Locks older than this are considered abandoned
const STALE_LOCK_HOURS: i64 = 24;

/// Metadata stored in `.lock` sidecar files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// User identifier (email or username)
    pub user_id: String,
    /// Machine name where lock was acquired
    pub machine: String,
    pub pid: u32,
    pub locked_at: DateTime<Utc>,
}

impl LockInfo {
    pub fn new(user_id: impl Into<String>) -> Self {
        LockInfo {
            user_id: user_id.into(),
            machine: hostname().unwrap_or_else(|| "unknown".to_string()),
            pid: std::process::id(),
            locked_at: Utc::now(),
        }
    }
}

fn hostname() -> Option<String> {
    #[cfg(windows)]
    {
        std::env::var("COMPUTERNAME").ok()
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOSTNAME")
            .ok()
            .or_else(|| std::env::var("HOST").ok())
    }
}

/// Exclusive lock on a workbook, released on drop.
pub struct FileLock {
    workbook_path: PathBuf,
    lock_path: PathBuf,
    _lock_file: File,
    pub info: LockInfo,
}

impl FileLock {
    /// Acquire an exclusive lock on a workbook file.
    ///
    /// Returns [`PricingError::FileLocked`] if another live process holds it.
    pub fn acquire(path: &Path, user_id: impl Into<String>) -> PricingResult<Self> {
        let lock_path = lock_path_for(path);
        let info = LockInfo::new(user_id);

        if lock_path.exists() {
            if let Ok(existing) = read_lock_info(&lock_path) {
                if !is_lock_stale(&existing) {
                    return Err(PricingError::file_locked(
                        path.display().to_string(),
                        format!("{} ({})", existing.user_id, existing.machine),
                        existing.locked_at.to_rfc3339(),
                    ));
                }
                warn!(
                    path = %path.display(),
                    owner = %existing.user_id,
                    "Taking over stale workbook lock"
                );
            }
        }

        let mut lock_file = OpenOptions::new()
            .write(true)
            .read(true)
            .create(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|e| io_error("create lock", &lock_path, e))?;

        lock_file.try_lock_exclusive().map_err(|_| {
            PricingError::file_locked(path.display().to_string(), "another process", "unknown")
        })?;

        let lock_json = serde_json::to_string_pretty(&info)?;
        lock_file
            .write_all(lock_json.as_bytes())
            .and_then(|_| lock_file.sync_all())
            .map_err(|e| io_error("write lock", &lock_path, e))?;

        debug!(path = %path.display(), user = %info.user_id, "Acquired workbook lock");

        Ok(FileLock {
            workbook_path: path.to_path_buf(),
            lock_path,
            _lock_file: lock_file,
            info,
        })
    }

    /// Lock holder for a workbook, if a live lock exists.
    pub fn check(path: &Path) -> Option<LockInfo> {
        let info = read_lock_info(&lock_path_for(path)).ok()?;
        (!is_lock_stale(&info)).then_some(info)
    }

    pub fn workbook_path(&self) -> &Path {
        &self.workbook_path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // OS lock goes with the file handle
        let _ = fs::remove_file(&self.lock_path);
    }
}

fn io_error(operation: &str, path: &Path, e: std::io::Error) -> PricingError {
    PricingError::file_error(operation, path.display().to_string(), e.to_string())
}

fn lock_path_for(workbook_path: &Path) -> PathBuf {
    let mut lock_path = workbook_path.to_path_buf();
    let extension = lock_path
        .extension()
        .map(|e| format!("{}.lock", e.to_string_lossy()))
        .unwrap_or_else(|| "lock".to_string());
    lock_path.set_extension(extension);
    lock_path
}

fn read_text(path: &Path, operation: &str) -> PricingResult<String> {
    let mut file = File::open(path).map_err(|e| io_error(operation, path, e))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| io_error(operation, path, e))?;
    Ok(contents)
}

fn read_lock_info(lock_path: &Path) -> PricingResult<LockInfo> {
    let contents = read_text(lock_path, "read lock")?;
    Ok(serde_json::from_str(&contents)?)
}

/// A lock is stale when its process is gone (same host) or it is too old.
fn is_lock_stale(info: &LockInfo) -> bool {
    #[cfg(target_os = "linux")]
    {
        let same_host = hostname().is_some_and(|ours| ours == info.machine);
        if same_host && fs::metadata(format!("/proc/{}", info.pid)).is_err() {
            return true;
        }
    }

    (Utc::now() - info.locked_at).num_hours() > STALE_LOCK_HOURS
}

/// Write `contents` to `path` through a temp file and rename.
fn write_atomic(path: &Path, contents: &[u8]) -> PricingResult<()> {
    let tmp_path = tmp_path_for(path);

    let mut tmp_file = File::create(&tmp_path)
        .map_err(|e| io_error("create temp file", &tmp_path, e))?;
    tmp_file
        .write_all(contents)
        .and_then(|_| tmp_file.sync_all())
        .map_err(|e| io_error("write temp file", &tmp_path, e))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        PricingError::file_error("rename to final", path.display().to_string(), e.to_string())
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Save a workbook with atomic write semantics.
pub fn save_workbook(workbook: &Workbook, path: &Path) -> PricingResult<()> {
    let json = serde_json::to_string_pretty(workbook)?;
    write_atomic(path, json.as_bytes())?;
    debug!(path = %path.display(), treatments = workbook.treatment_count(), "Saved workbook");
    Ok(())
}

/// Load a workbook, checking its schema version and price book.
///
/// Returns [`PricingError::VersionMismatch`] for files from an incompatible
/// schema and [`PricingError::SerializationError`] for malformed JSON.
pub fn load_workbook(path: &Path) -> PricingResult<Workbook> {
    let contents = read_text(path, "read")?;
    let workbook: Workbook =
        serde_json::from_str(&contents).map_err(|e| PricingError::SerializationError {
            reason: format!("Invalid JSON in {}: {}", path.display(), e),
        })?;

    validate_version(&workbook.meta.version)?;
    workbook.price_book.validate()?;
    Ok(workbook)
}

/// Load a workbook and report whether someone else holds its lock.
pub fn load_workbook_with_lock_check(path: &Path) -> PricingResult<(Workbook, Option<LockInfo>)> {
    let workbook = load_workbook(path)?;
    Ok((workbook, FileLock::check(path)))
}

fn validate_version(file_version: &str) -> PricingResult<()> {
    let parse = |v: &str| -> Vec<u32> { v.split('.').filter_map(|p| p.parse().ok()).collect() };
    let file_parts = parse(file_version);
    let current_parts = parse(SCHEMA_VERSION);

    let mismatch = || PricingError::VersionMismatch {
        file_version: file_version.to_string(),
        expected_version: SCHEMA_VERSION.to_string(),
    };

    let (Some(file_major), Some(current_major)) = (file_parts.first(), current_parts.first()) else {
        return Err(mismatch());
    };
    if file_major != current_major {
        return Err(mismatch());
    }

    // 0.x: a newer minor may carry breaking changes
    if *current_major == 0 {
        if let (Some(file_minor), Some(current_minor)) = (file_parts.get(1), current_parts.get(1)) {
            if file_minor > current_minor {
                return Err(mismatch());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::treatment::{Material, TreatmentRecord};

    fn workbook_path(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        dir.path().join(format!("{}.{}", name, WORKBOOK_EXTENSION))
    }

    #[test]
    fn test_lock_path_generation() {
        let lock_path = lock_path_for(Path::new("/books/harbour.pbook"));
        assert_eq!(lock_path, Path::new("/books/harbour.pbook.lock"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = workbook_path(&dir, "roundtrip");

        let mut workbook = Workbook::new("Harbour Drapes");
        let rail = workbook
            .price_book
            .add_material(Material::flat_priced("Track", "hardware", 30.0));
        workbook.add_treatment(TreatmentRecord::new("Hall", 0.0, 0.0, rail));
        save_workbook(&workbook, &path).unwrap();

        let loaded = load_workbook(&path).unwrap();
        assert_eq!(loaded.meta.account, "Harbour Drapes");
        assert_eq!(loaded.treatment_count(), 1);
        assert!(!tmp_path_for(&path).exists());
    }

    #[test]
    fn test_invalid_settings_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = workbook_path(&dir, "bad_settings");

        let mut workbook = Workbook::new("Harbour Drapes");
        workbook.price_book.settings.default_markup_percentage = -250.0;
        save_workbook(&workbook, &path).unwrap();

        let err = load_workbook(&path).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_duplicate_active_grids_rejected_on_load() {
        use crate::grid::{GridKey, GridTable};

        let dir = tempfile::tempdir().unwrap();
        let path = workbook_path(&dir, "two_active");

        let grid = |prices: [f64; 3]| {
            GridTable::from_matrix(
                GridKey::new("a", "b", "c"),
                vec![100.0, 150.0, 200.0],
                vec![vec![200.0, prices[0], prices[1], prices[2]]],
            )
            .unwrap()
        };
        let mut workbook = Workbook::new("Harbour Drapes");
        let cheap = grid([50.0, 70.0, 90.0]);
        let cheap_id = cheap.id;
        workbook.price_book.grids.insert(cheap).unwrap();
        workbook.price_book.grids.insert(grid([500.0, 700.0, 900.0])).unwrap();

        // Re-activate the superseded grid directly in the file
        let mut json = serde_json::to_value(&workbook).unwrap();
        json["price_book"]["grids"][cheap_id.to_string()]["active"] = serde_json::Value::Bool(true);
        fs::write(&path, serde_json::to_string_pretty(&json).unwrap()).unwrap();

        let err = load_workbook(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = workbook_path(&dir, "garbage");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_workbook(&path).unwrap_err().error_code(), "SERIALIZATION_ERROR");
    }

    #[test]
    fn test_file_lock_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = workbook_path(&dir, "locked");
        save_workbook(&Workbook::new("A"), &path).unwrap();

        let lock = FileLock::acquire(&path, "sam@example.com").unwrap();
        assert_eq!(lock.info.user_id, "sam@example.com");
        assert!(lock_path_for(&path).exists());

        let (_, holder) = load_workbook_with_lock_check(&path).unwrap();
        assert_eq!(holder.map(|h| h.user_id), Some("sam@example.com".to_string()));

        drop(lock);
        assert!(!lock_path_for(&path).exists());
        assert!(FileLock::check(&path).is_none());
    }

    #[test]
    fn test_version_validation() {
        assert!(validate_version(SCHEMA_VERSION).is_ok());
        assert!(validate_version("0.1.7").is_ok());
        assert!(validate_version("1.0.0").is_err());
        assert!(validate_version("0.2.0").is_err());
        assert!(validate_version("garbage").is_err());
    }
}
