//! Persistent cache backends
//!
//! The engine talks to storage only through [`CacheBackend`]. [`BlobStore`]
//! keeps compressed, header-validated blobs on disk so cached outputs survive
//! process restarts; [`MemoryStore`] keeps them in memory.

use dashmap::{DashMap, DashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Payloads larger than this are zstd-compressed when that makes them smaller.
const COMPRESS_THRESHOLD: usize = 4 * 1024;

const ZSTD_LEVEL: i32 = 3;

/// Errors raised by cache backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An I/O error occurred while reading or writing the store
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error
        path: PathBuf,
        /// The underlying I/O error
        source: io::Error,
    },

    /// The key cannot be mapped to a storage location
    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),

    /// A stored blob failed validation
    #[error("corrupt blob {key}: {reason}")]
    Corrupt {
        /// Key of the damaged blob
        key: String,
        /// What was wrong with it
        reason: String,
    },
}

/// Key/value store for cached outputs
///
/// Implementations must tolerate concurrent callers and treat repeated
/// `set` calls for one key as idempotent.
pub trait CacheBackend: Send + Sync {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` under `key`
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Whether a value is stored under `key`
    fn has(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}

/// Blob header format (version 1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHeaderV1 {
    /// Flags: bit0=compressed, bit1-7=reserved
    pub flags: u8,
    /// Original size (before compression)
    pub orig_len: u64,
    /// Stored size (after compression, if compressed)
    pub stored_len: u64,
}

impl BlobHeaderV1 {
    const MAGIC: [u8; 4] = *b"SFB1";
    const FLAG_COMPRESSED: u8 = 0b0000_0001;

    /// Encoded size: magic(4) + flags(1) + orig_len(8) + stored_len(8)
    pub const LEN: usize = 21;

    /// Create a new blob header
    pub fn new(orig_len: u64, stored_len: u64, compressed: bool) -> Self {
        let flags = if compressed { Self::FLAG_COMPRESSED } else { 0 };
        Self {
            flags,
            orig_len,
            stored_len,
        }
    }

    /// Check if blob is compressed
    pub fn is_compressed(&self) -> bool {
        (self.flags & Self::FLAG_COMPRESSED) != 0
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[..4].copy_from_slice(&Self::MAGIC);
        out[4] = self.flags;
        out[5..13].copy_from_slice(&self.orig_len.to_le_bytes());
        out[13..21].copy_from_slice(&self.stored_len.to_le_bytes());
        out
    }

    /// Deserialize header from bytes, returning the reason on failure
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() < Self::LEN {
            return Err(format!("truncated header ({} bytes)", bytes.len()));
        }
        if bytes[..4] != Self::MAGIC {
            return Err("bad magic".to_string());
        }

        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[5..13]);
        let orig_len = u64::from_le_bytes(word);
        word.copy_from_slice(&bytes[13..21]);
        let stored_len = u64::from_le_bytes(word);

        Ok(Self {
            flags: bytes[4],
            orig_len,
            stored_len,
        })
    }
}

/// Encode a payload as header + (possibly compressed) body
pub fn encode_blob(data: &[u8]) -> Result<Vec<u8>, io::Error> {
    let compressed = if data.len() > COMPRESS_THRESHOLD {
        let packed = zstd::bulk::compress(data, ZSTD_LEVEL)?;
        (packed.len() < data.len()).then_some(packed)
    } else {
        None
    };

    let (body, is_compressed) = match compressed {
        Some(ref packed) => (packed.as_slice(), true),
        None => (data, false),
    };

    let header = BlobHeaderV1::new(data.len() as u64, body.len() as u64, is_compressed);
    let mut out = Vec::with_capacity(BlobHeaderV1::LEN + body.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

/// Decode a payload produced by [`encode_blob`]
pub fn decode_blob(raw: &[u8]) -> Result<Vec<u8>, String> {
    let header = BlobHeaderV1::from_bytes(raw)?;
    let body = &raw[BlobHeaderV1::LEN..];
    if body.len() as u64 != header.stored_len {
        return Err(format!(
            "stored length mismatch: header says {}, found {}",
            header.stored_len,
            body.len()
        ));
    }

    // The header length is untrusted until the body has been decoded
    let data = if header.is_compressed() {
        zstd::stream::decode_all(body).map_err(|e| e.to_string())?
    } else {
        body.to_vec()
    };

    if data.len() as u64 != header.orig_len {
        return Err(format!(
            "original length mismatch: header says {}, found {}",
            header.orig_len,
            data.len()
        ));
    }
    Ok(data)
}

/// On-disk blob storage
///
/// Layout:
/// ```text
/// <root>/
///   objects/<hh>/<rest>
///   tmp/
/// ```
pub struct BlobStore {
    root: PathBuf,
    /// Keys known to be present on disk
    known: DashSet<String>,
}

impl BlobStore {
    /// Open (creating if needed) a blob store rooted at `root`
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        for dir in [root.join("objects"), root.join("tmp")] {
            fs::create_dir_all(&dir).map_err(|source| StoreError::Io { path: dir, source })?;
        }
        Ok(Self {
            root: root.to_path_buf(),
            known: DashSet::new(),
        })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the filesystem path for a blob
    pub fn blob_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = key.len() > 2
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let (prefix, rest) = key.split_at(2);
        Ok(self.root.join("objects").join(prefix).join(rest))
    }
}

impl CacheBackend for BlobStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.blob_path(key)?;
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let data = decode_blob(&raw).map_err(|reason| StoreError::Corrupt {
            key: key.to_string(),
            reason,
        })?;
        self.known.insert(key.to_string());
        Ok(Some(data))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.blob_path(key)?;
        let encoded = encode_blob(value).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        atomic_write(&self.root.join("tmp"), &path, &encoded)
            .map_err(|source| StoreError::Io { path, source })?;

        self.known.insert(key.to_string());
        Ok(())
    }

    fn has(&self, key: &str) -> Result<bool, StoreError> {
        if self.known.contains(key) {
            return Ok(true);
        }
        Ok(self.blob_path(key)?.is_file())
    }
}

/// In-memory cache backend
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no values
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheBackend for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Atomic write helper
///
/// Writes data to a temporary file, fsyncs it, then renames it to the target
/// path. `tmp_dir` must be on the same filesystem as `target`.
pub fn atomic_write(tmp_dir: &Path, target: &Path, data: &[u8]) -> io::Result<()> {
    fs::create_dir_all(tmp_dir)?;
    let tmp_path = tmp_dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));

    let result = (|| {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp_path, target)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result?;

    #[cfg(unix)]
    if let Some(parent) = target.parent() {
        fs::File::open(parent)?.sync_all()?;
    }
    Ok(())
}
