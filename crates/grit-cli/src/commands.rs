//! CLI command implementations.

use crate::worktree;
use grit_protocol::{Credentials, FetchDriver, ProtocolError};
use grit_storage::{Object, ObjectId, ObjectType, Repository};
use std::path::Path;
use thiserror::Error;

/// Environment variable holding the basic-auth username.
const USERNAME_VAR: &str = "GRIT_USERNAME";
/// Environment variable holding the basic-auth password.
const PASSWORD_VAR: &str = "GRIT_PASSWORD";

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Storage(#[from] grit_storage::StorageError),

    #[error("{0}")]
    Protocol(#[from] grit_protocol::ProtocolError),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Initialize a new repository.
pub fn init(path: Option<&str>) -> Result<()> {
    let root = Path::new(path.unwrap_or("."));
    std::fs::create_dir_all(root)?;
    let repo = Repository::init(root)?;
    println!(
        "Initialized empty grit repository in {}",
        repo.git_dir().display()
    );
    Ok(())
}

/// Clone a repository over smart HTTP.
pub fn clone(url: &str, path: Option<&str>) -> Result<()> {
    let credentials = credentials_from_env()?;
    let dest = match path {
        Some(path) => path.to_string(),
        None => default_clone_dir(url),
    };
    tracing::info!(url = %url, dest = %dest, "cloning");

    std::fs::create_dir_all(&dest)?;
    let repo = Repository::init(&dest)?;
    let driver = FetchDriver::new(&repo, url, credentials)?;
    let (head_id, commit) = driver.fetch()?;
    worktree::checkout(&repo, &commit)?;

    println!("Cloned {} at {}", url, head_id);
    Ok(())
}

/// Stage file contents in the index.
pub fn add(paths: &[String]) -> Result<()> {
    let repo = Repository::discover(".")?;
    let mut index = repo.load_index()?;
    for path in paths {
        let entry = worktree::stage_file(&repo, Path::new(path))?;
        tracing::debug!(path = %entry.path, id = %entry.id, "staged");
        index.upsert(entry);
    }
    index.save(&repo.index_path())?;
    Ok(())
}

/// Summarize differences between the index and the working tree.
pub fn status() -> Result<()> {
    let repo = Repository::discover(".")?;
    let index = repo.load_index()?;
    let report = worktree::status(&repo, &index)?;
    for path in &report.modified {
        println!("modified:  {}", path);
    }
    for path in &report.deleted {
        println!("deleted:   {}", path);
    }
    for path in &report.untracked {
        println!("untracked: {}", path);
    }
    if report.is_clean() {
        println!("nothing to report, working tree clean");
    }
    Ok(())
}

/// Walk commit history from HEAD, first parents only.
pub fn log(count: usize) -> Result<()> {
    let repo = Repository::discover(".")?;
    let mut next = Some(repo.refs().resolve_head()?);
    let mut shown = 0;
    while let Some(id) = next {
        if shown >= count {
            break;
        }
        let Object::Commit(commit) = repo.objects().read(&id)? else {
            return Err(grit_storage::StorageError::MalformedObject(format!(
                "{} is not a commit",
                id
            ))
            .into());
        };
        println!("commit {}", id);
        println!("author {}", commit.author);
        println!();
        println!("    {}", String::from_utf8_lossy(&commit.message).trim_end());
        println!();
        next = commit.parents.first().copied();
        shown += 1;
    }
    Ok(())
}

/// Pretty-print an object located by full or abbreviated hash.
pub fn cat_file(prefix: &str) -> Result<()> {
    use std::io::Write;

    let repo = Repository::discover(".")?;
    let id = repo.objects().expand_prefix(prefix)?;
    match repo.objects().read(&id)? {
        Object::Blob(data) | Object::Tag(data) => {
            std::io::stdout().write_all(&data)?;
        }
        Object::Tree(entries) => {
            for entry in &entries {
                let kind = if entry.is_tree() { "tree" } else { "blob" };
                println!(
                    "{:06o} {} {}\t{}",
                    entry.mode,
                    kind,
                    entry.id,
                    String::from_utf8_lossy(&entry.name)
                );
            }
        }
        Object::Commit(commit) => {
            println!("tree {}", commit.tree);
            for parent in &commit.parents {
                println!("parent {}", parent);
            }
            println!("author {}", commit.author);
            println!("committer {}", commit.committer);
            println!();
            println!("{}", String::from_utf8_lossy(&commit.message));
        }
    }
    Ok(())
}

/// Hash a file as a blob, optionally writing it into the store.
pub fn hash_object(file: &str, write: bool) -> Result<()> {
    let contents = std::fs::read(file)?;
    if write {
        let repo = Repository::discover(".")?;
        let id = repo.objects().write(ObjectType::Blob, &contents)?;
        println!("{}", id);
    } else {
        println!("{}", ObjectId::hash_object(ObjectType::Blob, &contents));
    }
    Ok(())
}

fn credentials_from_env() -> Result<Credentials> {
    let username = std::env::var(USERNAME_VAR)
        .map_err(|_| ProtocolError::AuthMissing(format!("{} is not set", USERNAME_VAR)))?;
    let password = std::env::var(PASSWORD_VAR)
        .map_err(|_| ProtocolError::AuthMissing(format!("{} is not set", PASSWORD_VAR)))?;
    Ok(Credentials { username, password })
}

fn default_clone_dir(url: &str) -> String {
    let name = url.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    let name = name.trim_end_matches(".git");
    if name.is_empty() {
        "repository".to_string()
    } else {
        name.to_string()
    }
}
