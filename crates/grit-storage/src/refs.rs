//! Reference file I/O under the git directory.

use crate::{ObjectId, Result, StorageError};
use std::fs;
use std::path::PathBuf;

/// The two shapes of `HEAD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// `ref: refs/heads/<name>`.
    Symbolic(String),
    /// A literal commit hash.
    Detached(ObjectId),
}

/// File-backed reference store rooted at a git directory.
///
/// Direct refs are written as the bare 40-hex hash; readers accept an
/// optional trailing newline.
#[derive(Debug, Clone)]
pub struct RefStore {
    git_dir: PathBuf,
}

impl RefStore {
    /// Opens a ref store rooted at `git_dir`.
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
        }
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        self.git_dir.join(name)
    }

    /// Writes a direct ref.
    pub fn write_ref(&self, name: &str, id: &ObjectId) -> Result<()> {
        let path = self.ref_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, id.to_hex())?;
        Ok(())
    }

    /// Reads a direct ref.
    pub fn read_ref(&self, name: &str) -> Result<ObjectId> {
        let path = self.ref_path(name);
        let text = fs::read_to_string(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(format!("no such ref: {}", name))
            } else {
                StorageError::Io(err)
            }
        })?;
        ObjectId::from_hex(text.trim_end())
            .map_err(|_| StorageError::InvalidRef(format!("unparseable ref {}: {}", name, text)))
    }

    /// Points HEAD at a branch.
    pub fn write_head_symbolic(&self, refname: &str) -> Result<()> {
        fs::write(self.git_dir.join("HEAD"), format!("ref: {}\n", refname))?;
        Ok(())
    }

    /// Reads HEAD, which is either a symbolic ref or a literal hash.
    pub fn read_head(&self) -> Result<Head> {
        let text = fs::read_to_string(self.git_dir.join("HEAD"))?;
        let text = text.trim_end();
        if let Some(refname) = text.strip_prefix("ref: ") {
            Ok(Head::Symbolic(refname.to_string()))
        } else {
            let id = ObjectId::from_hex(text)
                .map_err(|_| StorageError::InvalidRef(format!("unparseable HEAD: {}", text)))?;
            Ok(Head::Detached(id))
        }
    }

    /// Resolves HEAD to a commit id, following one symbolic hop.
    pub fn resolve_head(&self) -> Result<ObjectId> {
        match self.read_head()? {
            Head::Detached(id) => Ok(id),
            Head::Symbolic(refname) => self.read_ref(&refname),
        }
    }
}
