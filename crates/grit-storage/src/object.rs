//! Typed git objects and their canonical serialization.
//!
//! Every object is stored and hashed as the envelope
//! `type SP size NUL payload`; the SHA-1 of the envelope is the object's
//! name.

use crate::{ObjectId, Result, StorageError};
use bytes::Bytes;
use std::fmt;

/// Mode of a tree entry that names a subtree.
const TREE_MODE: u32 = 0o40000;

/// Git object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    /// File content.
    Blob,
    /// Directory listing.
    Tree,
    /// Commit object.
    Commit,
    /// Annotated tag.
    Tag,
}

impl ObjectType {
    /// Returns the string representation used in git.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// Parses an object type from an envelope header field.
    pub fn parse_bytes(s: &[u8]) -> Result<Self> {
        match s {
            b"blob" => Ok(Self::Blob),
            b"tree" => Ok(Self::Tree),
            b"commit" => Ok(Self::Commit),
            b"tag" => Ok(Self::Tag),
            _ => Err(StorageError::MalformedObject(format!(
                "unknown object type: {}",
                String::from_utf8_lossy(s)
            ))),
        }
    }

    /// Returns the type code used in pack files.
    pub fn pack_type(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Parses an object type from a pack record type code.
    ///
    /// Code 5 is reserved and codes 6/7 are deltas, which carry no base
    /// type of their own; the error reports the raw 3-bit value.
    pub fn from_pack_type(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            _ => Err(StorageError::UnknownObjectType(format!(
                "pack type {}",
                code
            ))),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(mode, name, id)` row of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// File mode, e.g. `0o100644` for a regular file or `0o40000` for a
    /// subtree.
    pub mode: u32,
    /// Entry name. Names are bytes; git does not require UTF-8.
    pub name: Vec<u8>,
    /// Hash of the referenced blob or subtree.
    pub id: ObjectId,
}

impl TreeEntry {
    /// Returns true if the entry names a subtree.
    pub fn is_tree(&self) -> bool {
        self.mode == TREE_MODE
    }
}

/// An author or committer line: identity, seconds since the epoch, and
/// timezone offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// `Name <email>` as it appears on the wire.
    pub who: String,
    /// Unix timestamp in seconds.
    pub time: u64,
    /// Timezone offset, e.g. `+0000`.
    pub tz: String,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.who, self.time, self.tz)
    }
}

/// Commit metadata and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Root tree of the committed snapshot.
    pub tree: ObjectId,
    /// Parent commits, in arrival order.
    pub parents: Vec<ObjectId>,
    /// Author line.
    pub author: Signature,
    /// Committer line.
    pub committer: Signature,
    /// Message body, without the single canonical trailing newline.
    pub message: Vec<u8>,
}

/// A git object (blob, tree, commit, or tag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    /// Opaque file content.
    Blob(Bytes),
    /// Ordered directory listing.
    Tree(Vec<TreeEntry>),
    /// Commit with metadata.
    Commit(Commit),
    /// Annotated tag, accepted during ingest but not interpreted.
    Tag(Bytes),
}

impl Object {
    /// Returns the object's type tag.
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Blob(_) => ObjectType::Blob,
            Self::Tree(_) => ObjectType::Tree,
            Self::Commit(_) => ObjectType::Commit,
            Self::Tag(_) => ObjectType::Tag,
        }
    }

    /// Serializes the type-specific body.
    ///
    /// Tree entries are emitted in canonical order (sorted by name) no
    /// matter how the value was built.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::Blob(data) | Self::Tag(data) => data.to_vec(),
            Self::Tree(entries) => {
                let mut sorted: Vec<&TreeEntry> = entries.iter().collect();
                sorted.sort_by(|a, b| a.name.cmp(&b.name));
                let mut out = Vec::new();
                for entry in sorted {
                    out.extend_from_slice(format!("{:o} ", entry.mode).as_bytes());
                    out.extend_from_slice(&entry.name);
                    out.push(0);
                    out.extend_from_slice(entry.id.as_bytes());
                }
                out
            }
            Self::Commit(commit) => {
                let mut out = Vec::new();
                out.extend_from_slice(format!("tree {}\n", commit.tree).as_bytes());
                for parent in &commit.parents {
                    out.extend_from_slice(format!("parent {}\n", parent).as_bytes());
                }
                out.extend_from_slice(format!("author {}\n", commit.author).as_bytes());
                out.extend_from_slice(format!("committer {}\n", commit.committer).as_bytes());
                out.push(b'\n');
                out.extend_from_slice(&commit.message);
                out.push(b'\n');
                out
            }
        }
    }

    /// Serializes the canonical envelope `type SP size NUL payload`.
    pub fn serialize(&self) -> Vec<u8> {
        let payload = self.payload();
        let mut out = Vec::with_capacity(payload.len() + 16);
        out.extend_from_slice(self.object_type().as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(payload.len().to_string().as_bytes());
        out.push(0);
        out.extend_from_slice(&payload);
        out
    }

    /// Computes the object's name from its canonical envelope.
    pub fn id(&self) -> ObjectId {
        ObjectId::hash_object(self.object_type(), &self.payload())
    }

    /// Parses a canonical envelope.
    pub fn parse(bytes: &[u8]) -> Result<Object> {
        let (object_type, payload) = parse_envelope(bytes)?;
        Self::parse_body(object_type, payload)
    }

    /// Parses a type-specific body.
    pub fn parse_body(object_type: ObjectType, payload: &[u8]) -> Result<Object> {
        match object_type {
            ObjectType::Blob => Ok(Object::Blob(Bytes::copy_from_slice(payload))),
            ObjectType::Tag => Ok(Object::Tag(Bytes::copy_from_slice(payload))),
            ObjectType::Tree => parse_tree(payload),
            ObjectType::Commit => parse_commit(payload),
        }
    }
}

/// Splits an envelope into its type and payload, validating the declared
/// size against the actual payload length.
pub(crate) fn parse_envelope(bytes: &[u8]) -> Result<(ObjectType, &[u8])> {
    let nul = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| StorageError::MalformedObject("missing header terminator".to_string()))?;
    let header = &bytes[..nul];
    let space = header
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| StorageError::MalformedObject("missing space in header".to_string()))?;
    let object_type = ObjectType::parse_bytes(&header[..space])?;
    let size = std::str::from_utf8(&header[space + 1..])
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            StorageError::MalformedObject(format!(
                "invalid size field: {}",
                String::from_utf8_lossy(&header[space + 1..])
            ))
        })?;
    let payload = &bytes[nul + 1..];
    if payload.len() != size {
        return Err(StorageError::MalformedObject(format!(
            "header declares {} bytes, payload has {}",
            size,
            payload.len()
        )));
    }
    Ok((object_type, payload))
}

fn parse_tree(payload: &[u8]) -> Result<Object> {
    let mut entries = Vec::new();
    let mut rest = payload;
    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| StorageError::MalformedObject("tree entry missing mode".to_string()))?;
        let mode = std::str::from_utf8(&rest[..space])
            .ok()
            .and_then(|s| u32::from_str_radix(s, 8).ok())
            .ok_or_else(|| {
                StorageError::MalformedObject(format!(
                    "invalid tree entry mode: {}",
                    String::from_utf8_lossy(&rest[..space])
                ))
            })?;
        rest = &rest[space + 1..];
        let nul = rest.iter().position(|&b| b == 0).ok_or_else(|| {
            StorageError::MalformedObject("tree entry missing name terminator".to_string())
        })?;
        let name = rest[..nul].to_vec();
        rest = &rest[nul + 1..];
        let id_bytes = rest.get(..ObjectId::LEN).ok_or_else(|| {
            StorageError::MalformedObject("tree entry truncated before hash".to_string())
        })?;
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(id_bytes);
        entries.push(TreeEntry {
            mode,
            name,
            id: ObjectId::from_bytes(bytes),
        });
        rest = &rest[ObjectId::LEN..];
    }
    Ok(Object::Tree(entries))
}

fn parse_commit(payload: &[u8]) -> Result<Object> {
    let mut tree = None;
    let mut parents = Vec::new();
    let mut author = None;
    let mut committer = None;

    let mut rest = payload;
    loop {
        let line_end = rest.iter().position(|&b| b == b'\n').ok_or_else(|| {
            StorageError::MalformedObject("unterminated commit header".to_string())
        })?;
        let line = &rest[..line_end];
        rest = &rest[line_end + 1..];
        if line.is_empty() {
            break;
        }
        let space = line.iter().position(|&b| b == b' ').ok_or_else(|| {
            StorageError::MalformedObject(format!(
                "malformed commit header: {}",
                String::from_utf8_lossy(line)
            ))
        })?;
        let (key, value) = (&line[..space], &line[space + 1..]);
        match key {
            b"tree" => tree = Some(parse_header_id(value)?),
            b"parent" => parents.push(parse_header_id(value)?),
            b"author" => author = Some(parse_signature(value)?),
            b"committer" => committer = Some(parse_signature(value)?),
            _ => {
                return Err(StorageError::MalformedObject(format!(
                    "unknown commit header: {}",
                    String::from_utf8_lossy(key)
                )))
            }
        }
    }

    let mut message = rest.to_vec();
    if message.last() == Some(&b'\n') {
        message.pop();
    }

    Ok(Object::Commit(Commit {
        tree: tree
            .ok_or_else(|| StorageError::MalformedObject("commit missing tree".to_string()))?,
        parents,
        author: author
            .ok_or_else(|| StorageError::MalformedObject("commit missing author".to_string()))?,
        committer: committer
            .ok_or_else(|| StorageError::MalformedObject("commit missing committer".to_string()))?,
        message,
    }))
}

fn parse_header_id(value: &[u8]) -> Result<ObjectId> {
    let hex = std::str::from_utf8(value).map_err(|_| {
        StorageError::MalformedObject("non-UTF-8 hash in commit header".to_string())
    })?;
    ObjectId::from_hex(hex)
}

fn parse_signature(line: &[u8]) -> Result<Signature> {
    let text = std::str::from_utf8(line)
        .map_err(|_| StorageError::MalformedObject("non-UTF-8 signature line".to_string()))?;
    let gt = text
        .rfind('>')
        .ok_or_else(|| StorageError::MalformedObject(format!("signature missing email: {}", text)))?;
    let who = text[..=gt].to_string();
    let mut fields = text[gt + 1..].split_whitespace();
    let time = fields
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| {
            StorageError::MalformedObject(format!("signature missing timestamp: {}", text))
        })?;
    let tz = fields
        .next()
        .ok_or_else(|| {
            StorageError::MalformedObject(format!("signature missing timezone: {}", text))
        })?
        .to_string();
    Ok(Signature { who, time, tz })
}
