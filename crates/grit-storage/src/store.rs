//! Loose-object store rooted at a `.git/objects` directory.

use crate::object::{self, Object, ObjectType};
use crate::{zlib, ObjectId, Result, StorageError};
use bytes::Bytes;
use std::fs;
use std::path::PathBuf;

/// Content-addressed on-disk object store.
///
/// A loose object lives at `<objects>/<xx>/<yyyy...>` where `xx` is the
/// first two hex characters of its name. The file holds the
/// zlib-compressed canonical envelope. The store is additive: an object
/// at a given name is immutable once written.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    objects_dir: PathBuf,
}

impl ObjectStore {
    /// Opens a store rooted at the given `objects` directory.
    pub fn new(objects_dir: impl Into<PathBuf>) -> Self {
        Self {
            objects_dir: objects_dir.into(),
        }
    }

    fn object_paths(&self, id: &ObjectId) -> (PathBuf, PathBuf) {
        let hex = id.to_hex();
        let (dir, file) = hex.split_at(2);
        let dir_path = self.objects_dir.join(dir);
        let file_path = dir_path.join(file);
        (dir_path, file_path)
    }

    /// Checks whether an object exists on disk.
    pub fn exists(&self, id: &ObjectId) -> bool {
        let (_, file_path) = self.object_paths(id);
        file_path.is_file()
    }

    /// Reads and parses a loose object.
    pub fn read(&self, id: &ObjectId) -> Result<Object> {
        let (object_type, payload) = self.read_raw(id)?;
        Object::parse_body(object_type, &payload)
    }

    /// Reads a loose object without interpreting its body.
    ///
    /// A missing fan-out directory and a missing object file produce
    /// distinct diagnostics.
    pub fn read_raw(&self, id: &ObjectId) -> Result<(ObjectType, Bytes)> {
        let (dir_path, file_path) = self.object_paths(id);
        if !dir_path.is_dir() {
            return Err(StorageError::NotFound(format!(
                "no object directory {}",
                dir_path.display()
            )));
        }
        let compressed = fs::read(&file_path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(format!("no object file {}", file_path.display()))
            } else {
                StorageError::Io(err)
            }
        })?;
        let (envelope, _) = zlib::decompress_from(&compressed, 0)?;
        let (object_type, payload) = object::parse_envelope(&envelope)?;
        Ok((object_type, Bytes::copy_from_slice(payload)))
    }

    /// Writes a payload as a loose object, returning its name.
    ///
    /// Idempotent: an object that already exists is overwritten with
    /// identical bytes.
    pub fn write(&self, object_type: ObjectType, payload: &[u8]) -> Result<ObjectId> {
        let id = ObjectId::hash_object(object_type, payload);
        let mut envelope = Vec::with_capacity(payload.len() + 16);
        envelope.extend_from_slice(object_type.as_str().as_bytes());
        envelope.push(b' ');
        envelope.extend_from_slice(payload.len().to_string().as_bytes());
        envelope.push(0);
        envelope.extend_from_slice(payload);
        let compressed = zlib::compress(&envelope)?;

        let (dir_path, file_path) = self.object_paths(&id);
        fs::create_dir_all(&dir_path)?;
        fs::write(&file_path, compressed)?;
        Ok(id)
    }

    /// Serializes and writes a typed object.
    pub fn write_object(&self, object: &Object) -> Result<ObjectId> {
        self.write(object.object_type(), &object.payload())
    }

    /// Expands an abbreviated hex hash to the unique name it prefixes.
    pub fn expand_prefix(&self, prefix: &str) -> Result<ObjectId> {
        if prefix.len() < 2
            || prefix.len() > 40
            || !prefix.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(StorageError::MalformedObject(format!(
                "invalid object prefix: {}",
                prefix
            )));
        }
        if prefix.len() == 40 {
            return ObjectId::from_hex(prefix);
        }
        let (dir, rest) = prefix.split_at(2);
        let dir_path = self.objects_dir.join(dir);
        let entries = match fs::read_dir(&dir_path) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(format!(
                    "no object matching {}",
                    prefix
                )))
            }
            Err(err) => return Err(err.into()),
        };
        let mut found = None;
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with(rest) {
                if found.is_some() {
                    return Err(StorageError::AmbiguousPrefix(prefix.to_string()));
                }
                found = Some(format!("{}{}", dir, name));
            }
        }
        match found {
            Some(hex) => ObjectId::from_hex(&hex),
            None => Err(StorageError::NotFound(format!(
                "no object matching {}",
                prefix
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha1::{Digest, Sha1};

    fn store() -> (tempfile::TempDir, ObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path().join("objects"));
        (dir, store)
    }

    #[test]
    fn test_write_empty_blob_path() {
        let (dir, store) = store();
        let id = store.write(ObjectType::Blob, b"").unwrap();
        assert_eq!(id.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        let path = dir
            .path()
            .join("objects/e6/9de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        assert!(path.is_file());
        assert!(store.exists(&id));
    }

    #[test]
    fn test_write_read_roundtrip() {
        let (_dir, store) = store();
        let id = store.write(ObjectType::Blob, b"Hello, World!").unwrap();
        let Object::Blob(data) = store.read(&id).unwrap() else {
            panic!("expected blob");
        };
        assert_eq!(data.as_ref(), b"Hello, World!");
    }

    #[test]
    fn test_write_idempotent() {
        let (_dir, store) = store();
        let first = store.write(ObjectType::Blob, b"same bytes").unwrap();
        let second = store.write(ObjectType::Blob, b"same bytes").unwrap();
        assert_eq!(first, second);
        assert!(store.exists(&first));
    }

    #[test]
    fn test_hash_integrity_on_disk() {
        // Reading the file back, decompressing, parsing, and
        // re-serializing must reproduce bytes that hash to the name.
        let (dir, store) = store();
        let id = store.write(ObjectType::Blob, b"integrity check").unwrap();
        let hex = id.to_hex();
        let path = dir.path().join("objects").join(&hex[..2]).join(&hex[2..]);
        let compressed = fs::read(path).unwrap();
        let (envelope, _) = zlib::decompress_from(&compressed, 0).unwrap();
        let object = Object::parse(&envelope).unwrap();

        let mut hasher = Sha1::new();
        hasher.update(object.serialize());
        assert_eq!(hasher.finalize().as_slice(), id.as_bytes());
    }

    #[test]
    fn test_read_not_found_distinguishes_dir_and_file() {
        let (_dir, store) = store();
        let id = ObjectId::from_bytes([0xAB; 20]);
        let err = store.read(&id).unwrap_err();
        let StorageError::NotFound(message) = err else {
            panic!("expected NotFound");
        };
        assert!(message.contains("object directory"));

        // Create the fan-out directory; the file is still missing.
        fs::create_dir_all(store.objects_dir.join("ab")).unwrap();
        let err = store.read(&id).unwrap_err();
        let StorageError::NotFound(message) = err else {
            panic!("expected NotFound");
        };
        assert!(message.contains("object file"));
    }

    #[test]
    fn test_expand_prefix() {
        let (_dir, store) = store();
        let id = store.write(ObjectType::Blob, b"prefix me").unwrap();
        let hex = id.to_hex();
        assert_eq!(store.expand_prefix(&hex[..8]).unwrap(), id);
        assert_eq!(store.expand_prefix(&hex).unwrap(), id);
    }

    #[test]
    fn test_expand_prefix_not_found() {
        let (_dir, store) = store();
        store.write(ObjectType::Blob, b"something").unwrap();
        let result = store.expand_prefix("0000");
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_expand_prefix_ambiguous() {
        let (_dir, store) = store();
        // Find two payloads whose hashes share the first two hex chars.
        let first = store.write(ObjectType::Blob, b"collide-a").unwrap();
        let mut ambiguous_prefix = None;
        for i in 0..4096u32 {
            let payload = format!("collide-{}", i);
            let id = ObjectId::hash_object(ObjectType::Blob, payload.as_bytes());
            if id != first && id.to_hex()[..2] == first.to_hex()[..2] {
                store.write(ObjectType::Blob, payload.as_bytes()).unwrap();
                ambiguous_prefix = Some(first.to_hex()[..2].to_string());
                break;
            }
        }
        let prefix = ambiguous_prefix.expect("no two-char collision in 4096 tries");
        let result = store.expand_prefix(&prefix);
        assert!(matches!(result, Err(StorageError::AmbiguousPrefix(_))));
    }

    #[test]
    fn test_expand_prefix_rejects_garbage() {
        let (_dir, store) = store();
        assert!(store.expand_prefix("g123").is_err());
        assert!(store.expand_prefix("a").is_err());
    }
}
