//! Git object types and identifiers.

use crate::{Result, StorageError};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};
use std::fmt;

/// A 20-byte SHA-1 object identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// The all-zero id used by the wire protocol as a "no object" sentinel
    /// (ref creation and deletion commands).
    pub const ZERO: ObjectId = ObjectId([0u8; 20]);

    /// Creates an id from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Parses an id from a 40-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != 40 {
            return Err(StorageError::InvalidObjectId(format!(
                "expected 40 hex chars, got {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex, &mut bytes)
            .map_err(|e| StorageError::InvalidObjectId(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns the hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// True if this is the all-zero sentinel.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Computes the id of an object: SHA-1 over `"<type> <len>\0"` + data.
    pub fn hash_object(kind: ObjectKind, data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(format!("{} {}\0", kind.as_str(), data.len()).as_bytes());
        hasher.update(data);
        let digest = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ObjectId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ObjectId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// The four storable git object kinds.
///
/// Delta representations (ofs-delta, ref-delta) are a pack-transfer
/// encoding, not a storable kind, and live in the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Commit object.
    Commit,
    /// Directory listing.
    Tree,
    /// File content.
    Blob,
    /// Annotated tag.
    Tag,
}

impl ObjectKind {
    /// The string form used in object headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }

    /// Parses the header string form.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "commit" => Ok(Self::Commit),
            "tree" => Ok(Self::Tree),
            "blob" => Ok(Self::Blob),
            "tag" => Ok(Self::Tag),
            _ => Err(StorageError::InvalidObject(format!(
                "unknown object kind: {s}"
            ))),
        }
    }
}

/// A git object with its computed id.
#[derive(Debug, Clone)]
pub struct GitObject {
    /// SHA-1 of header + data.
    pub id: ObjectId,
    /// Object kind.
    pub kind: ObjectKind,
    /// Raw object data, uncompressed, without header.
    pub data: Bytes,
}

impl GitObject {
    /// Creates an object, computing its id from the data.
    pub fn new(kind: ObjectKind, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let id = ObjectId::hash_object(kind, &data);
        Self { id, kind, data }
    }

    /// Creates a blob from file content.
    pub fn blob(content: impl Into<Bytes>) -> Self {
        Self::new(ObjectKind::Blob, content)
    }

    /// Creates a commit object from its parts.
    pub fn commit(tree: &ObjectId, parents: &[ObjectId], author: &str, message: &str) -> Self {
        let mut content = format!("tree {tree}\n");
        for parent in parents {
            content.push_str(&format!("parent {parent}\n"));
        }
        content.push_str(&format!("author {author}\ncommitter {author}\n\n{message}"));
        Self::new(ObjectKind::Commit, content.into_bytes())
    }

    /// Size of the object data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// For commits, the parent ids from the header. Empty for root
    /// commits and every other kind.
    pub fn parent_ids(&self) -> Vec<ObjectId> {
        if self.kind != ObjectKind::Commit {
            return Vec::new();
        }
        let mut out = Vec::new();
        let content = String::from_utf8_lossy(&self.data);
        for line in content.lines() {
            if line.is_empty() {
                break;
            }
            if let Some(hex) = line.strip_prefix("parent ") {
                if let Ok(id) = ObjectId::from_hex(hex.trim()) {
                    out.push(id);
                }
            }
        }
        out
    }

    /// For commits, the object ids named in the header lines
    /// (`tree` and `parent`). Empty for every other kind.
    pub fn linked_ids(&self) -> Vec<ObjectId> {
        if self.kind != ObjectKind::Commit {
            return Vec::new();
        }
        let mut out = Vec::new();
        let content = String::from_utf8_lossy(&self.data);
        for line in content.lines() {
            if line.is_empty() {
                break;
            }
            let target = line
                .strip_prefix("tree ")
                .or_else(|| line.strip_prefix("parent "));
            if let Some(hex) = target {
                if let Ok(id) = ObjectId::from_hex(hex.trim()) {
                    out.push(id);
                }
            }
        }
        out
    }
}
