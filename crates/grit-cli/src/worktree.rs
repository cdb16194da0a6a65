//! Working-tree materialization and status.

use crate::commands::{CliError, Result};
use grit_storage::{
    Commit, Index, IndexEntry, Object, ObjectId, ObjectType, Repository, StorageError, TreeEntry,
};
use std::fs;
use std::path::Path;

const MODE_REGULAR: u32 = 0o100644;
const MODE_EXECUTABLE: u32 = 0o100755;

/// Materializes a commit's tree into the repository's working tree.
pub fn checkout(repo: &Repository, commit: &Commit) -> Result<()> {
    let Object::Tree(entries) = repo.objects().read(&commit.tree)? else {
        return Err(
            StorageError::MalformedObject(format!("{} is not a tree", commit.tree)).into(),
        );
    };
    write_tree(repo, repo.root(), &entries)
}

fn write_tree(repo: &Repository, dir: &Path, entries: &[TreeEntry]) -> Result<()> {
    for entry in entries {
        let name = String::from_utf8_lossy(&entry.name).to_string();
        let path = dir.join(&name);
        if entry.is_tree() {
            let Object::Tree(children) = repo.objects().read(&entry.id)? else {
                return Err(StorageError::MalformedObject(format!(
                    "{} is not a tree",
                    entry.id
                ))
                .into());
            };
            fs::create_dir_all(&path)?;
            write_tree(repo, &path, &children)?;
        } else {
            let Object::Blob(data) = repo.objects().read(&entry.id)? else {
                return Err(StorageError::MalformedObject(format!(
                    "{} is not a blob",
                    entry.id
                ))
                .into());
            };
            fs::write(&path, &data)?;
            #[cfg(unix)]
            if entry.mode == MODE_EXECUTABLE {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
            }
        }
    }
    Ok(())
}

/// Writes a file's contents as a blob and builds its index entry.
pub fn stage_file(repo: &Repository, path: &Path) -> Result<IndexEntry> {
    let contents = fs::read(path)?;
    let id = repo.objects().write(ObjectType::Blob, &contents)?;
    let metadata = fs::metadata(path)?;
    let (mtime_secs, mtime_nanos) = system_time_parts(metadata.modified().ok());
    let (ctime_secs, ctime_nanos) = system_time_parts(metadata.created().ok());

    #[cfg(unix)]
    let (dev, ino, mode, uid, gid) = {
        use std::os::unix::fs::MetadataExt;
        let mode = if metadata.mode() & 0o111 != 0 {
            MODE_EXECUTABLE
        } else {
            MODE_REGULAR
        };
        (
            metadata.dev() as u32,
            metadata.ino() as u32,
            mode,
            metadata.uid(),
            metadata.gid(),
        )
    };
    #[cfg(not(unix))]
    let (dev, ino, mode, uid, gid) = (0, 0, MODE_REGULAR, 0, 0);

    Ok(IndexEntry {
        ctime_secs,
        ctime_nanos,
        mtime_secs,
        mtime_nanos,
        dev,
        ino,
        mode,
        uid,
        gid,
        size: contents.len() as u32,
        id,
        path: relative_path(repo, path)?,
    })
}

/// Differences between the index and the working tree.
#[derive(Debug, Default)]
pub struct StatusReport {
    /// Tracked files whose contents changed.
    pub modified: Vec<String>,
    /// Tracked files missing from the working tree.
    pub deleted: Vec<String>,
    /// Files present on disk but absent from the index.
    pub untracked: Vec<String>,
}

impl StatusReport {
    /// True when nothing differs.
    pub fn is_clean(&self) -> bool {
        self.modified.is_empty() && self.deleted.is_empty() && self.untracked.is_empty()
    }
}

/// Compares the index against the working tree by re-hashing contents.
pub fn status(repo: &Repository, index: &Index) -> Result<StatusReport> {
    let mut report = StatusReport::default();
    for entry in index.entries() {
        let path = repo.root().join(&entry.path);
        match fs::read(&path) {
            Ok(contents) => {
                if ObjectId::hash_object(ObjectType::Blob, &contents) != entry.id {
                    report.modified.push(entry.path.clone());
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                report.deleted.push(entry.path.clone());
            }
            Err(err) => return Err(err.into()),
        }
    }
    collect_untracked(repo.root(), repo.root(), index, &mut report.untracked)?;
    report.untracked.sort();
    Ok(report)
}

fn collect_untracked(
    root: &Path,
    dir: &Path,
    index: &Index,
    out: &mut Vec<String>,
) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name() == ".git" {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_untracked(root, &path, index, out)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            if index.get(&rel).is_none() {
                out.push(rel);
            }
        }
    }
    Ok(())
}

fn system_time_parts(time: Option<std::time::SystemTime>) -> (u32, u32) {
    let Some(time) = time else {
        return (0, 0);
    };
    match time.duration_since(std::time::UNIX_EPOCH) {
        Ok(duration) => (duration.as_secs() as u32, duration.subsec_nanos()),
        Err(_) => (0, 0),
    }
}

fn relative_path(repo: &Repository, path: &Path) -> Result<String> {
    let canonical = fs::canonicalize(path)?;
    let rel = canonical.strip_prefix(repo.root()).map_err(|_| {
        CliError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is outside the repository", path.display()),
        ))
    })?;
    Ok(rel.to_string_lossy().replace('\\', "/"))
}
