//! Repository context.
//!
//! The worktree root and git directory are canonicalized once, at open
//! time, and carried on this value rather than in process-global state.

use crate::index::Index;
use crate::refs::RefStore;
use crate::store::ObjectStore;
use crate::{Result, StorageError};
use std::fs;
use std::path::{Path, PathBuf};

/// An opened repository: worktree root plus the `.git` layout under it.
#[derive(Debug, Clone)]
pub struct Repository {
    root: PathBuf,
    git_dir: PathBuf,
    objects: ObjectStore,
    refs: RefStore,
}

impl Repository {
    /// Creates the `.git` skeleton under `root` and opens it.
    pub fn init(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root.join(".git/objects"))?;
        fs::create_dir_all(root.join(".git/refs/heads"))?;
        fs::create_dir_all(root.join(".git/refs/tags"))?;
        let repo = Self::open(root)?;
        repo.refs().write_head_symbolic("refs/heads/master")?;
        Ok(repo)
    }

    /// Opens an existing repository rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = fs::canonicalize(root.as_ref())?;
        let git_dir = root.join(".git");
        if !git_dir.is_dir() {
            return Err(StorageError::NotFound(format!(
                "no git directory under {}",
                root.display()
            )));
        }
        let objects = ObjectStore::new(git_dir.join("objects"));
        let refs = RefStore::new(&git_dir);
        Ok(Self {
            root,
            git_dir,
            objects,
            refs,
        })
    }

    /// Walks up from `start` looking for an enclosing repository.
    pub fn discover(start: impl AsRef<Path>) -> Result<Self> {
        let mut dir = fs::canonicalize(start.as_ref())?;
        loop {
            if dir.join(".git").is_dir() {
                return Self::open(&dir);
            }
            if !dir.pop() {
                return Err(StorageError::NotFound(
                    "no git directory in this or any parent directory".to_string(),
                ));
            }
        }
    }

    /// The worktree root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `.git` directory.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// The object store.
    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// The reference store.
    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    /// Path of the staging index file.
    pub fn index_path(&self) -> PathBuf {
        self.git_dir.join("index")
    }

    /// Loads the staging index; missing file yields an empty index.
    pub fn load_index(&self) -> Result<Index> {
        Index::load(&self.index_path())
    }
}
