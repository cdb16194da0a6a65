//! The staging index (`.git/index`), version 2.
//!
//! Binary layout: a 12-byte header (`DIRC`, version, entry count), entries
//! sorted by path, and a trailing SHA-1 over everything before it. Each
//! entry carries 62 fixed bytes of stat metadata, hash, and flags,
//! followed by the NUL-terminated path padded to the next 8-byte boundary
//! counted from the entry start.

use crate::{ObjectId, Result, StorageError};
use sha1::{Digest, Sha1};
use std::fs;
use std::path::Path;

const INDEX_SIGNATURE: &[u8; 4] = b"DIRC";
const INDEX_VERSION: u32 = 2;
/// Byte length of the fixed-width part of an entry.
const ENTRY_FIXED_LEN: usize = 62;

/// One staged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Change time, seconds part.
    pub ctime_secs: u32,
    /// Change time, nanoseconds part.
    pub ctime_nanos: u32,
    /// Modification time, seconds part.
    pub mtime_secs: u32,
    /// Modification time, nanoseconds part.
    pub mtime_nanos: u32,
    /// Device number.
    pub dev: u32,
    /// Inode number.
    pub ino: u32,
    /// File mode.
    pub mode: u32,
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// On-disk size in bytes.
    pub size: u32,
    /// Blob hash of the staged contents.
    pub id: ObjectId,
    /// Repository-relative path, forward slashes.
    pub path: String,
}

/// In-memory staging index, kept sorted by path.
#[derive(Debug, Clone, Default)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    /// Loads an index file; a missing file yields an empty index.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default())
            }
            Err(err) => return Err(err.into()),
        };
        Self::parse(&data)
    }

    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 12 + ObjectId::LEN {
            return Err(StorageError::MalformedIndex(
                "index file too small".to_string(),
            ));
        }
        let (body, trailer) = data.split_at(data.len() - ObjectId::LEN);
        let mut hasher = Sha1::new();
        hasher.update(body);
        if hasher.finalize().as_slice() != trailer {
            return Err(StorageError::MalformedIndex(
                "checksum mismatch".to_string(),
            ));
        }

        if &body[..4] != INDEX_SIGNATURE {
            return Err(StorageError::MalformedIndex(format!(
                "bad signature: {}",
                String::from_utf8_lossy(&body[..4])
            )));
        }
        let version = read_u32(body, 4);
        if version != INDEX_VERSION {
            return Err(StorageError::MalformedIndex(format!(
                "unsupported version: {}",
                version
            )));
        }
        let count = read_u32(body, 8) as usize;

        let mut entries = Vec::with_capacity(count);
        let mut pos = 12;
        for _ in 0..count {
            if body.len() < pos + ENTRY_FIXED_LEN {
                return Err(StorageError::MalformedIndex(
                    "truncated entry".to_string(),
                ));
            }
            let fields: Vec<u32> = (0..10).map(|i| read_u32(body, pos + i * 4)).collect();
            let mut id_bytes = [0u8; 20];
            id_bytes.copy_from_slice(&body[pos + 40..pos + 60]);
            // flags at pos + 60..62; the low 12 bits repeat the path
            // length, which the NUL terminator already gives us.

            let name_start = pos + ENTRY_FIXED_LEN;
            let nul = body[name_start..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| {
                    StorageError::MalformedIndex("unterminated entry path".to_string())
                })?;
            let path = String::from_utf8(body[name_start..name_start + nul].to_vec())
                .map_err(|_| StorageError::MalformedIndex("non-UTF-8 path".to_string()))?;

            entries.push(IndexEntry {
                ctime_secs: fields[0],
                ctime_nanos: fields[1],
                mtime_secs: fields[2],
                mtime_nanos: fields[3],
                dev: fields[4],
                ino: fields[5],
                mode: fields[6],
                uid: fields[7],
                gid: fields[8],
                size: fields[9],
                id: ObjectId::from_bytes(id_bytes),
                path,
            });
            // Entries are padded with 1-8 NULs to an 8-byte boundary.
            pos += (ENTRY_FIXED_LEN + nul + 8) & !7;
        }
        Ok(Self { entries })
    }

    /// Writes the index, appending the SHA-1 trailer.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut out = Vec::new();
        out.extend_from_slice(INDEX_SIGNATURE);
        out.extend_from_slice(&INDEX_VERSION.to_be_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        for entry in &self.entries {
            let start = out.len();
            for field in [
                entry.ctime_secs,
                entry.ctime_nanos,
                entry.mtime_secs,
                entry.mtime_nanos,
                entry.dev,
                entry.ino,
                entry.mode,
                entry.uid,
                entry.gid,
                entry.size,
            ] {
                out.extend_from_slice(&field.to_be_bytes());
            }
            out.extend_from_slice(entry.id.as_bytes());
            let name_len = entry.path.len().min(0xFFF) as u16;
            out.extend_from_slice(&name_len.to_be_bytes());
            out.extend_from_slice(entry.path.as_bytes());
            let padded = (out.len() - start + 8) & !7;
            out.resize(start + padded, 0);
        }
        let mut hasher = Sha1::new();
        hasher.update(&out);
        let checksum = hasher.finalize();
        out.extend_from_slice(&checksum);
        fs::write(path, out)?;
        Ok(())
    }

    /// Returns the entries, sorted by path.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Inserts an entry, replacing any existing entry for the same path.
    pub fn upsert(&mut self, entry: IndexEntry) {
        match self
            .entries
            .binary_search_by(|e| e.path.as_str().cmp(entry.path.as_str()))
        {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    /// Looks up an entry by path.
    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries
            .binary_search_by(|e| e.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_u32(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]])
}
