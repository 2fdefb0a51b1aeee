//! Content-addressed on-disk cache.
//!
//! Everything lives under one cache directory (default `.arcana`):
//!
//! - `<dir>/<md5hex(profile)>` — the record file for one profile.
//!   Bytes `[0..16)` hold the binary MD5 of the profile identifier;
//!   the rest is a sequence of 32-byte records `{ path_md5, content_md5 }`.
//!   A zeroed record is a tombstone.
//! - `<dir>/script/<md5hex(jobname)><index><ext>` — generated
//!   per-instruction scripts, rewritten only when their content hash
//!   changes.
//!
//! Records are appended, never rewritten in place; clearing a key
//! zeroes its slot. Offsets are byte-exact.

use crate::error::CacheError;
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const DIGEST_SIZE: usize = 16;
const RECORD_SIZE: usize = 32;
/// Offset of the first file record (right after the profile header).
const RECORDS_START: u64 = DIGEST_SIZE as u64;

/// Computes the 16-byte binary MD5 of a buffer.
#[must_use]
pub fn md5_bin(data: &[u8]) -> [u8; DIGEST_SIZE] {
    Md5::digest(data).into()
}

/// Computes the lowercase-hex MD5 of a buffer.
#[must_use]
pub fn md5_hex(data: &[u8]) -> String {
    md5_bin(data).iter().map(|b| format!("{b:02x}")).collect()
}

fn md5_of_file(path: &Path) -> [u8; DIGEST_SIZE] {
    // Unreadable files hash like empty ones; the record then flips as
    // soon as the file becomes readable.
    let content = fs::read(path).unwrap_or_default();
    md5_bin(&content)
}

fn io_err(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Profile-keyed record store plus script directory.
pub struct CacheManager {
    dir: PathBuf,
    script_dir: PathBuf,
    record_path: PathBuf,
    file: Option<File>,
    /// `path_md5 -> (record offset, content_md5)`.
    records: BTreeMap<[u8; DIGEST_SIZE], (u64, [u8; DIGEST_SIZE])>,
}

impl CacheManager {
    /// Creates a manager rooted at the given cache directory. Nothing
    /// touches the disk until [`CacheManager::load`].
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let script_dir = dir.join("script");

        Self {
            dir,
            script_dir,
            record_path: PathBuf::new(),
            file: None,
            records: BTreeMap::new(),
        }
    }

    /// Directory the generated scripts land in.
    #[must_use]
    pub fn script_dir(&self) -> &Path {
        &self.script_dir
    }

    /// Removes the whole cache tree from disk.
    pub fn erase(&mut self) {
        self.file = None;
        self.records.clear();

        if self.dir.is_dir() {
            if let Err(e) = fs::remove_dir_all(&self.dir) {
                tracing::warn!(dir = %self.dir.display(), error = %e, "cache erase failed");
            }
        }
    }

    /// Opens (or creates) the record file for a profile and loads its
    /// records. A missing or foreign profile header resets the file.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] when the cache layout cannot be
    /// created or the record file cannot be opened.
    pub fn load(&mut self, profile: &str) -> Result<(), CacheError> {
        fs::create_dir_all(&self.script_dir).map_err(|e| io_err(&self.script_dir, e))?;

        self.record_path = self.dir.join(md5_hex(profile.as_bytes()));
        self.records.clear();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.record_path)
            .map_err(|e| io_err(&self.record_path, e))?;

        let profile_digest = md5_bin(profile.as_bytes());

        let mut header = [0u8; DIGEST_SIZE];
        let header_ok = file
            .seek(SeekFrom::Start(0))
            .and_then(|_| file.read_exact(&mut header))
            .is_ok();

        if !header_ok || header != profile_digest {
            // Fresh or foreign file: stamp the profile and drop any
            // stale records.
            file.set_len(0).map_err(|e| io_err(&self.record_path, e))?;
            file.seek(SeekFrom::Start(0))
                .and_then(|_| file.write_all(&profile_digest))
                .map_err(|e| io_err(&self.record_path, e))?;
            self.file = Some(file);
            return Ok(());
        }

        let size = file
            .metadata()
            .map_err(|e| io_err(&self.record_path, e))?
            .len();

        // A trailing partial record marks the file corrupt; keep the
        // header and ignore the records.
        if (size - RECORDS_START) % RECORD_SIZE as u64 != 0 {
            tracing::warn!(file = %self.record_path.display(), "cache record file truncated");
            self.file = Some(file);
            return Ok(());
        }

        let mut offset = RECORDS_START;
        let mut record = [0u8; RECORD_SIZE];

        while offset + RECORD_SIZE as u64 <= size {
            file.seek(SeekFrom::Start(offset))
                .and_then(|_| file.read_exact(&mut record))
                .map_err(|e| io_err(&self.record_path, e))?;

            if record.iter().any(|b| *b != 0) {
                let mut key = [0u8; DIGEST_SIZE];
                let mut value = [0u8; DIGEST_SIZE];
                key.copy_from_slice(&record[..DIGEST_SIZE]);
                value.copy_from_slice(&record[DIGEST_SIZE..]);

                // Later records win on duplicate keys.
                self.records.insert(key, (offset, value));
            }

            offset += RECORD_SIZE as u64;
        }

        self.file = Some(file);
        Ok(())
    }

    /// Checks whether a tracked file changed since the last snapshot,
    /// updating the record when it did.
    ///
    /// Returns `true` for unknown paths and content mismatches; right
    /// after a `true` an unchanged file reports `false`.
    pub fn has_file_changed(&mut self, path: &str) -> bool {
        let key = md5_bin(path.as_bytes());
        let content = md5_of_file(Path::new(path));

        if let Some((_, cached)) = self.records.get(&key) {
            if *cached == content {
                return false;
            }
        }

        let Some(file) = self.file.as_mut() else {
            return true;
        };

        let mut record = [0u8; RECORD_SIZE];
        record[..DIGEST_SIZE].copy_from_slice(&key);
        record[DIGEST_SIZE..].copy_from_slice(&content);

        let appended = file.seek(SeekFrom::End(0)).and_then(|offset| {
            file.write_all(&record)?;
            file.flush()?;
            Ok(offset)
        });

        match appended {
            Ok(offset) => {
                self.records.insert(key, (offset, content));
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "cache record append failed");
            }
        }

        true
    }

    /// Tombstones the records of the given keys (zeroes their slots)
    /// and forgets them in memory.
    pub fn clear(&mut self, keys: &[String]) {
        for key in keys {
            let digest = md5_bin(key.as_bytes());

            let Some((offset, _)) = self.records.remove(&digest) else {
                continue;
            };

            if let Some(file) = self.file.as_mut() {
                let zeros = [0u8; RECORD_SIZE];
                let result = file
                    .seek(SeekFrom::Start(offset))
                    .and_then(|_| file.write_all(&zeros))
                    .and_then(|_| file.flush());

                if let Err(e) = result {
                    tracing::warn!(key, error = %e, "cache tombstone failed");
                }
            }
        }
    }

    /// Raw record bytes at the slot a key maps to, for inspection.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotLoaded`] before [`CacheManager::load`]
    /// and [`CacheError::Io`] on read failures.
    pub fn read_record_at(&mut self, offset: u64) -> Result<[u8; RECORD_SIZE], CacheError> {
        let file = self.file.as_mut().ok_or(CacheError::NotLoaded)?;

        let mut record = [0u8; RECORD_SIZE];
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.read_exact(&mut record))
            .map_err(|e| io_err(&self.record_path, e))?;

        Ok(record)
    }

    /// Offset of the live record for a tracked path, if any.
    #[must_use]
    pub fn record_offset(&self, path: &str) -> Option<u64> {
        self.records
            .get(&md5_bin(path.as_bytes()))
            .map(|(offset, _)| *offset)
    }

    /// Writes one instruction script, rewriting the file only when its
    /// content hash differs.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] when the script cannot be written.
    pub fn write_script(
        &self,
        jobname: &str,
        idx: usize,
        content: &str,
        ext: &str,
    ) -> Result<PathBuf, CacheError> {
        let filename = format!("{}{idx}{ext}", md5_hex(jobname.as_bytes()));
        let path = self.script_dir.join(filename);

        if path.is_file() {
            let old = fs::read(&path).map_err(|e| io_err(&path, e))?;
            if md5_bin(&old) == md5_bin(content.as_bytes()) {
                return Ok(path);
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        fs::write(&path, content).map_err(|e| io_err(&path, e))?;

        Ok(path)
    }
}
