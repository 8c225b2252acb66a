//! Git pack container reading and writing.
//!
//! A pack is `"PACK"`, a big-endian version, a big-endian object
//! count, that many entries (variable-length type+size header followed
//! by a zlib payload), and a trailing SHA-1 over everything before it.
//! See: https://git-scm.com/docs/pack-format

use crate::{GitError, Result};
use berth_storage::{GitObject, ObjectId, ObjectKind};
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};
use std::io::{Read, Write};

/// Magic bytes at the start of a pack.
const PACK_SIGNATURE: &[u8; 4] = b"PACK";
/// Pack versions we accept.
const SUPPORTED_VERSIONS: [u32; 2] = [2, 3];
/// Version written by [`PackBuilder`].
const WRITE_VERSION: u32 = 2;

/// Decoded pack container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackHeader {
    /// Container format version.
    pub version: u32,
    /// Number of entries that follow.
    pub object_count: u32,
}

/// The kind of a single pack entry.
///
/// Deltas are carried through with their base reference decoded but
/// their instruction stream unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackEntryKind {
    /// Commit object.
    Commit,
    /// Tree object.
    Tree,
    /// Blob object.
    Blob,
    /// Annotated tag object.
    Tag,
    /// Delta against an earlier entry, addressed by backward offset.
    OfsDelta {
        /// Distance from this entry's own offset back to its base.
        base_offset: u64,
    },
    /// Delta against an object addressed by id.
    RefDelta {
        /// Id of the base object.
        base: ObjectId,
    },
}

impl PackEntryKind {
    /// The storable object kind, or None for delta entries.
    pub fn object_kind(&self) -> Option<ObjectKind> {
        match self {
            Self::Commit => Some(ObjectKind::Commit),
            Self::Tree => Some(ObjectKind::Tree),
            Self::Blob => Some(ObjectKind::Blob),
            Self::Tag => Some(ObjectKind::Tag),
            Self::OfsDelta { .. } | Self::RefDelta { .. } => None,
        }
    }

    /// True for delta entries.
    pub fn is_delta(&self) -> bool {
        self.object_kind().is_none()
    }
}

fn kind_code(kind: ObjectKind) -> u8 {
    match kind {
        ObjectKind::Commit => 1,
        ObjectKind::Tree => 2,
        ObjectKind::Blob => 3,
        ObjectKind::Tag => 4,
    }
}

/// One decoded pack entry: its kind and inflated payload.
///
/// For delta entries the payload is the inflated delta instruction
/// stream, not object content.
#[derive(Debug, Clone)]
pub struct PackRecord {
    /// Entry kind.
    pub kind: PackEntryKind,
    /// Inflated payload.
    pub data: Bytes,
}

/// Lazy, single-pass reader over a pack byte buffer.
///
/// Entries are decoded one at a time by [`PackReader::next_record`]; a
/// running digest covers every byte consumed so far and is checked
/// against the trailing checksum by [`PackReader::finish`]. The reader
/// cannot be restarted.
pub struct PackReader<'a> {
    data: &'a [u8],
    pos: usize,
    body_end: usize,
    hasher: Sha1,
    header: PackHeader,
    remaining: u32,
}

impl<'a> PackReader<'a> {
    /// Validates the container header and positions the reader at the
    /// first entry.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(GitError::MalformedPackHeader(format!(
                "{} bytes is shorter than the 12-byte header",
                data.len()
            )));
        }
        if &data[0..4] != PACK_SIGNATURE {
            return Err(GitError::MalformedPackHeader(
                "signature is not PACK".to_string(),
            ));
        }

        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(GitError::MalformedPackHeader(format!(
                "unsupported version {version}"
            )));
        }

        let object_count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        // Entries may not read into the trailing checksum. A stream
        // too short to even hold the checksum is handled at finish so
        // that a truncated entry reports as such first.
        let body_end = if data.len() >= 32 {
            data.len() - 20
        } else {
            data.len()
        };

        let mut hasher = Sha1::new();
        hasher.update(&data[..12]);

        Ok(Self {
            data,
            pos: 12,
            body_end,
            hasher,
            header: PackHeader {
                version,
                object_count,
            },
            remaining: object_count,
        })
    }

    /// The decoded container header.
    pub fn header(&self) -> PackHeader {
        self.header
    }

    /// Decodes the next entry, or `None` once `object_count` entries
    /// have been yielded.
    pub fn next_record(&mut self) -> Result<Option<PackRecord>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let start = self.pos;
        let (code, size) = self.read_entry_header()?;
        let kind = match code {
            1 => PackEntryKind::Commit,
            2 => PackEntryKind::Tree,
            3 => PackEntryKind::Blob,
            4 => PackEntryKind::Tag,
            6 => PackEntryKind::OfsDelta {
                base_offset: self.read_ofs_base()?,
            },
            7 => PackEntryKind::RefDelta {
                base: self.read_base_id()?,
            },
            other => {
                return Err(GitError::MalformedPackHeader(format!(
                    "unknown entry type {other}"
                )))
            }
        };

        let payload = self.inflate(size)?;
        self.hasher.update(&self.data[start..self.pos]);
        self.remaining -= 1;

        Ok(Some(PackRecord {
            kind,
            data: payload.into(),
        }))
    }

    /// Drains any remaining entries, then verifies the trailing
    /// checksum against the running digest.
    pub fn finish(mut self) -> Result<()> {
        while self.next_record()?.is_some() {}

        if self.data.len() < self.pos + 20 {
            return Err(GitError::TruncatedObject(
                "stream ends before the pack checksum".to_string(),
            ));
        }
        if self.data.len() > self.pos + 20 {
            return Err(GitError::ProtocolViolation(
                "trailing bytes after the pack checksum".to_string(),
            ));
        }

        let expected = &self.data[self.pos..self.pos + 20];
        let computed = self.hasher.finalize();
        if computed.as_slice() != expected {
            return Err(GitError::ChecksumMismatch);
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8> {
        if self.pos >= self.body_end {
            return Err(GitError::TruncatedObject(
                "stream ends inside an entry header".to_string(),
            ));
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Entry header: low nibble of the first byte starts the size,
    /// bits 4-6 carry the type, the MSB continues into 7-bit groups.
    fn read_entry_header(&mut self) -> Result<(u8, usize)> {
        let first = self.read_byte()?;
        let code = (first >> 4) & 0x07;
        let mut size = (first & 0x0F) as usize;
        let mut shift = 4;
        let mut byte = first;

        while byte & 0x80 != 0 {
            byte = self.read_byte()?;
            if shift > 63 {
                return Err(GitError::MalformedPackHeader(
                    "entry size varint too long".to_string(),
                ));
            }
            size |= ((byte & 0x7F) as usize) << shift;
            shift += 7;
        }
        Ok((code, size))
    }

    /// Negative-offset encoding used by ofs-delta bases.
    fn read_ofs_base(&mut self) -> Result<u64> {
        let mut byte = self.read_byte()?;
        let mut value = (byte & 0x7F) as u64;
        while byte & 0x80 != 0 {
            byte = self.read_byte()?;
            value = ((value + 1) << 7) | (byte & 0x7F) as u64;
        }
        Ok(value)
    }

    fn read_base_id(&mut self) -> Result<ObjectId> {
        if self.pos + 20 > self.body_end {
            return Err(GitError::TruncatedObject(
                "stream ends inside a ref-delta base id".to_string(),
            ));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&self.data[self.pos..self.pos + 20]);
        self.pos += 20;
        Ok(ObjectId::from_bytes(bytes))
    }

    fn inflate(&mut self, size: usize) -> Result<Vec<u8>> {
        let remaining = &self.data[self.pos..self.body_end];
        let mut decoder = ZlibDecoder::new(remaining);

        let mut payload = vec![0u8; size];
        decoder.read_exact(&mut payload).map_err(|e| {
            GitError::TruncatedObject(format!("entry declared {size} bytes: {e}"))
        })?;

        // Drive the decoder to the end of the zlib stream so the
        // trailer is consumed and total_in covers the whole entry.
        let mut probe = [0u8; 1];
        match decoder.read(&mut probe) {
            Ok(0) => {}
            Ok(_) => {
                return Err(GitError::MalformedPackHeader(
                    "inflated payload exceeds declared size".to_string(),
                ))
            }
            Err(e) => {
                return Err(GitError::TruncatedObject(format!(
                    "zlib stream did not terminate: {e}"
                )))
            }
        }

        self.pos += decoder.total_in() as usize;
        Ok(payload)
    }
}

/// Builds a pack from whole objects (no deltas).
pub struct PackBuilder {
    objects: Vec<GitObject>,
}

impl PackBuilder {
    /// Creates a new pack builder.
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    /// Adds an object to the pack.
    pub fn add(&mut self, object: GitObject) {
        self.objects.push(object);
    }

    /// Serializes the pack: header, entries, trailing checksum.
    pub fn build(self) -> Result<Vec<u8>> {
        let mut pack = Vec::new();
        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&WRITE_VERSION.to_be_bytes());
        pack.extend_from_slice(&(self.objects.len() as u32).to_be_bytes());

        for object in &self.objects {
            Self::write_entry(&mut pack, object)?;
        }

        let mut hasher = Sha1::new();
        hasher.update(&pack);
        let checksum = hasher.finalize();
        pack.extend_from_slice(&checksum);

        Ok(pack)
    }

    fn write_entry(pack: &mut Vec<u8>, object: &GitObject) -> Result<()> {
        let code = kind_code(object.kind);
        let size = object.data.len();

        let mut first = (code << 4) | ((size & 0x0F) as u8);
        let mut rest = size >> 4;
        if rest > 0 {
            first |= 0x80;
        }
        pack.push(first);

        while rest > 0 {
            let mut byte = (rest & 0x7F) as u8;
            rest >>= 7;
            if rest > 0 {
                byte |= 0x80;
            }
            pack.push(byte);
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&object.data)
            .map_err(|e| GitError::TruncatedObject(e.to_string()))?;
        let compressed = encoder
            .finish()
            .map_err(|e| GitError::TruncatedObject(e.to_string()))?;
        pack.extend_from_slice(&compressed);

        Ok(())
    }
}

impl Default for PackBuilder {
    fn default() -> Self {
        Self::new()
    }
}
