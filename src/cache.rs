//! Content-addressable disk cache for decompiled text.
//!
//! Layout: `<root>/<cache_key>/<bucket>/<raw_unit_name>.<ext>`. The key hashes the
//! artifact contents, the engine version and the decompile settings, so changing
//! any of them lands in a fresh namespace. Nothing is ever evicted.

use crate::error::QueryError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Decompiler settings that influence output and therefore the cache key.
///
/// Field order is the canonical encoding order; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompileSettings {
    pub deobfuscation: bool,
    pub inline_methods: bool,
    pub show_inconsistent_code: bool,
}

impl Default for DecompileSettings {
    fn default() -> Self {
        Self {
            deobfuscation: false,
            inline_methods: true,
            show_inconsistent_code: true,
        }
    }
}

impl DecompileSettings {
    /// Compact JSON with fields in declaration order.
    pub fn canonical_json(&self) -> String {
        format!(
            r#"{{"deobfuscation":{},"inline_methods":{},"show_inconsistent_code":{}}}"#,
            self.deobfuscation, self.inline_methods, self.show_inconsistent_code
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Source,
    Disasm,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Disasm => "disasm",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Source => "java",
            Self::Disasm => "smali",
        }
    }
}

/// Lowercase hex SHA-256 of the artifact bytes.
pub fn hash_artifact(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// `sha256(artifact_hash|engine_version|canonical_settings)` as lowercase hex.
pub fn cache_key(artifact_hash: &str, engine_version: &str, settings: &DecompileSettings) -> String {
    let material = format!(
        "{}|{}|{}",
        artifact_hash,
        engine_version,
        settings.canonical_json()
    );
    format!("{:x}", Sha256::digest(material.as_bytes()))
}

/// Disk-backed blob store shared by every session.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the entry path, rejecting names that would escape the bucket.
    fn entry_path(&self, key: &str, bucket: Bucket, raw_name: &str) -> Option<PathBuf> {
        let valid_key = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric());
        let valid_name = !raw_name.is_empty()
            && !raw_name.contains('\\')
            && raw_name
                .split('/')
                .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
        if !valid_key || !valid_name {
            return None;
        }

        let mut path = self.root.join(key).join(bucket.as_str());
        for seg in raw_name.split('/') {
            path.push(seg);
        }
        let file_name = format!(
            "{}.{}",
            path.file_name()?.to_string_lossy(),
            bucket.extension()
        );
        path.set_file_name(file_name);
        Some(path)
    }

    /// Stored blob, or `None` when absent or unreadable.
    pub fn get(&self, key: &str, bucket: Bucket, raw_name: &str) -> Option<String> {
        let path = self.entry_path(key, bucket, raw_name)?;
        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(bucket = bucket.as_str(), name = %raw_name, "Cache hit");
                Some(text)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable cache entry");
                None
            }
        }
    }

    /// Store a blob, replacing any previous entry.
    ///
    /// The blob is written to a temporary file next to the target and renamed
    /// into place.
    pub fn put(&self, key: &str, bucket: Bucket, raw_name: &str, blob: &str) -> Result<(), QueryError> {
        let path = self.entry_path(key, bucket, raw_name).ok_or_else(|| {
            QueryError::InvalidParams(format!("invalid cache entry name: {raw_name}"))
        })?;
        let parent = path
            .parent()
            .ok_or_else(|| QueryError::Internal("cache entry has no parent".to_string()))?;

        let write = || -> io::Result<()> {
            fs::create_dir_all(parent)?;
            let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
            tmp.write_all(blob.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        };
        write().map_err(|e| QueryError::Internal(format!("cache write {}: {e}", path.display())))?;

        debug!(bucket = bucket.as_str(), name = %raw_name, bytes = blob.len(), "Cache put");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn test_cache_key_is_deterministic() {
        let settings = DecompileSettings::default();
        let k1 = cache_key(HASH, "1.5.1", &settings);
        assert_eq!(k1, cache_key(HASH, "1.5.1", &settings));
        assert_eq!(k1.len(), 64);
        assert!(k1.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_cache_key_changes_with_each_input() {
        let settings = DecompileSettings::default();
        let base = cache_key(HASH, "1.5.1", &settings);
        assert_ne!(base, cache_key("00", "1.5.1", &settings));
        assert_ne!(base, cache_key(HASH, "1.5.2", &settings));
        let flipped = DecompileSettings {
            deobfuscation: true,
            ..settings.clone()
        };
        assert_ne!(base, cache_key(HASH, "1.5.1", &flipped));
    }

    #[test]
    fn test_canonical_settings_encoding() {
        assert_eq!(
            DecompileSettings::default().canonical_json(),
            r#"{"deobfuscation":false,"inline_methods":true,"show_inconsistent_code":true}"#
        );
        // Same encoding serde produces, so clients can reproduce keys.
        assert_eq!(
            serde_json::to_string(&DecompileSettings::default()).unwrap(),
            DecompileSettings::default().canonical_json()
        );
    }

    #[test]
    fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        let key = cache_key(HASH, "1.5.1", &DecompileSettings::default());

        assert!(cache.get(&key, Bucket::Source, "com/test/Child$Inner").is_none());

        cache
            .put(&key, Bucket::Source, "com/test/Child$Inner", "class Inner {}")
            .unwrap();
        assert_eq!(
            cache.get(&key, Bucket::Source, "com/test/Child$Inner").as_deref(),
            Some("class Inner {}")
        );
        assert!(dir
            .path()
            .join(&key)
            .join("source/com/test/Child$Inner.java")
            .is_file());

        // Buckets are disjoint.
        assert!(cache.get(&key, Bucket::Disasm, "com/test/Child$Inner").is_none());

        cache
            .put(&key, Bucket::Source, "com/test/Child$Inner", "class Inner { int x; }")
            .unwrap();
        assert_eq!(
            cache.get(&key, Bucket::Source, "com/test/Child$Inner").as_deref(),
            Some("class Inner { int x; }")
        );
    }

    #[test]
    fn test_rejects_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        assert!(cache.put("abc", Bucket::Source, "../evil", "x").is_err());
        assert!(cache.put("abc", Bucket::Source, "a//b", "x").is_err());
        assert!(cache.put("../abc", Bucket::Source, "a", "x").is_err());
        assert!(cache.get("abc", Bucket::Source, "../evil").is_none());
    }
}
