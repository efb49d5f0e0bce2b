//! Incremental build cache.
//!
//! One JSON document per project, read once at the start of a batch and
//! written once at the end:
//!
//! ```json
//! { "version": "1", "files": { "contracts/Token.ts": { "hash": "…", "depHashes": { "struct:Order": "…" }, "artifacts": [ … ] } } }
//! ```
//!
//! A file is reused when its content hash (source text plus compiler
//! settings) is unchanged and every shared definition it depended on
//! still has the recorded hash. Invalidation is per file: any change to a
//! dependency recompiles every file that used it.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::OptimizerConfig;
use crate::error::CacheCorruptionError;
use crate::hash::sha256_hex;

pub const CACHE_VERSION: &str = "1";
pub const CACHE_FILE: &str = ".skittles-cache.json";

/// Output for one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArtifact {
    pub contract_name: String,
    pub abi: serde_json::Value,
    /// Hex without `0x`.
    pub bytecode: String,
    pub solidity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub hash: String,
    /// Definition key (`struct:Order`) to the hash it had when compiled.
    pub dep_hashes: BTreeMap<String, String>,
    pub artifacts: Vec<BuildArtifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheDocument {
    pub version: String,
    pub files: BTreeMap<String, CacheEntry>,
}

impl Default for CacheDocument {
    fn default() -> Self {
        CacheDocument {
            version: CACHE_VERSION.to_string(),
            files: BTreeMap::new(),
        }
    }
}

/// Where a file is in the current batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileState {
    #[default]
    Unknown,
    Hashed,
    CacheHit,
    CacheMiss,
    Compiled,
    Failed,
}

/// Hash of a source file under the given compiler settings.
pub fn content_hash(source: &str, settings: &str) -> String {
    sha256_hex(&[source.as_bytes(), settings.as_bytes()])
}

/// Everything besides the source text that changes the produced bytecode.
pub fn settings_fingerprint(optimizer: &OptimizerConfig) -> String {
    format!(
        "skittles {} optimizer={} runs={}",
        env!("CARGO_PKG_VERSION"),
        optimizer.enabled,
        optimizer.runs
    )
}

#[derive(Debug, Default)]
pub struct BuildCache {
    document: CacheDocument,
    states: BTreeMap<String, FileState>,
}

impl BuildCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the document at `path`.
    pub fn load(path: &Path) -> Result<Self, CacheCorruptionError> {
        let text = fs::read_to_string(path)?;
        let document: CacheDocument = serde_json::from_str(&text)?;
        if document.version != CACHE_VERSION {
            return Err(CacheCorruptionError::VersionMismatch {
                found: document.version,
                expected: CACHE_VERSION.to_string(),
            });
        }
        Ok(BuildCache {
            document,
            states: BTreeMap::new(),
        })
    }

    /// Like [`BuildCache::load`], but any problem yields an empty cache.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(cache) => {
                debug!(files = cache.document.files.len(), "loaded build cache");
                cache
            }
            Err(CacheCorruptionError::Unreadable(err)) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no build cache yet");
                Self::new()
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring corrupt build cache");
                Self::new()
            }
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&self.document).map_err(std::io::Error::other)?;
        fs::write(path, text)
    }

    pub fn state(&self, file: &str) -> FileState {
        self.states.get(file).copied().unwrap_or_default()
    }

    pub fn mark_hashed(&mut self, file: &str) {
        self.states.insert(file.to_string(), FileState::Hashed);
    }

    /// Decide whether `file` must be compiled again. `definitions` holds
    /// the current hash of every shared definition in the project.
    pub fn should_recompile(&mut self, file: &str, hash: &str, definitions: &BTreeMap<String, String>) -> bool {
        let hit = self.document.files.get(file).is_some_and(|entry| {
            entry.hash == hash
                && entry
                    .dep_hashes
                    .iter()
                    .all(|(key, dep)| definitions.get(key) == Some(dep))
        });
        let state = if hit { FileState::CacheHit } else { FileState::CacheMiss };
        debug!(file, ?state, "cache lookup");
        self.states.insert(file.to_string(), state);
        !hit
    }

    pub fn artifacts(&self, file: &str) -> Option<&[BuildArtifact]> {
        self.document
            .files
            .get(file)
            .map(|entry| entry.artifacts.as_slice())
    }

    /// Replace the entry of a successfully compiled file.
    pub fn record_result(
        &mut self,
        file: &str,
        hash: &str,
        dep_hashes: BTreeMap<String, String>,
        artifacts: Vec<BuildArtifact>,
    ) {
        self.document.files.insert(
            file.to_string(),
            CacheEntry {
                hash: hash.to_string(),
                dep_hashes,
                artifacts,
            },
        );
        self.states.insert(file.to_string(), FileState::Compiled);
    }

    /// A failed file keeps no entry, so the next batch retries it.
    pub fn record_failure(&mut self, file: &str) {
        self.document.files.remove(file);
        self.states.insert(file.to_string(), FileState::Failed);
    }

    /// Drop entries for files no longer in the source set.
    pub fn retain_files(&mut self, files: &BTreeSet<String>) {
        self.document.files.retain(|file, _| files.contains(file));
        self.states.retain(|file, _| files.contains(file));
    }

    pub fn states(&self) -> &BTreeMap<String, FileState> {
        &self.states
    }

    pub fn document(&self) -> &CacheDocument {
        &self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(name: &str) -> BuildArtifact {
        BuildArtifact {
            contract_name: name.to_string(),
            abi: serde_json::json!([]),
            bytecode: "6080".to_string(),
            solidity: "contract X {}".to_string(),
        }
    }

    fn definitions(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn hits_only_when_content_and_dependencies_match() {
        let mut cache = BuildCache::new();
        let defs = definitions(&[("struct:Order", "o1"), ("enum:Status", "s1")]);
        assert!(cache.should_recompile("a.ts", "h1", &defs));
        assert_eq!(cache.state("a.ts"), FileState::CacheMiss);

        cache.record_result("a.ts", "h1", definitions(&[("struct:Order", "o1")]), vec![artifact("A")]);
        assert_eq!(cache.state("a.ts"), FileState::Compiled);

        assert!(!cache.should_recompile("a.ts", "h1", &defs));
        assert_eq!(cache.state("a.ts"), FileState::CacheHit);
        assert!(cache.should_recompile("a.ts", "h2", &defs));

        let changed = definitions(&[("struct:Order", "o2"), ("enum:Status", "s1")]);
        assert!(cache.should_recompile("a.ts", "h1", &changed));
        let removed = definitions(&[("enum:Status", "s1")]);
        assert!(cache.should_recompile("a.ts", "h1", &removed));
    }

    #[test]
    fn failures_and_removed_files_lose_their_entries() {
        let mut cache = BuildCache::new();
        cache.record_result("a.ts", "h", BTreeMap::new(), vec![artifact("A")]);
        cache.record_result("b.ts", "h", BTreeMap::new(), vec![artifact("B")]);
        cache.record_failure("a.ts");
        assert!(cache.artifacts("a.ts").is_none());
        assert_eq!(cache.state("a.ts"), FileState::Failed);

        cache.retain_files(&BTreeSet::from(["c.ts".to_string()]));
        assert!(cache.document().files.is_empty());
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("build").join(CACHE_FILE);
        let mut cache = BuildCache::new();
        cache.record_result("a.ts", "h", definitions(&[("const:FEE", "f")]), vec![artifact("A")]);
        cache.save(&path).expect("save");

        let text = fs::read_to_string(&path).expect("read");
        assert!(text.contains("\"depHashes\""));
        assert!(text.contains("\"contractName\": \"A\""));

        let loaded = BuildCache::load(&path).expect("load");
        assert_eq!(loaded.document(), cache.document());
    }

    #[test]
    fn corrupt_documents_become_empty_caches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(CACHE_FILE);

        fs::write(&path, "{ not json").expect("write");
        assert!(matches!(BuildCache::load(&path), Err(CacheCorruptionError::Malformed(_))));
        assert!(BuildCache::load_or_empty(&path).document().files.is_empty());

        fs::write(&path, r#"{ "version": "0", "files": {} }"#).expect("write");
        assert!(matches!(
            BuildCache::load(&path),
            Err(CacheCorruptionError::VersionMismatch { .. })
        ));

        let missing = dir.path().join("missing.json");
        assert!(BuildCache::load_or_empty(&missing).document().files.is_empty());
    }

    #[test]
    fn settings_change_the_content_hash() {
        let plain = settings_fingerprint(&OptimizerConfig::default());
        let tuned = settings_fingerprint(&OptimizerConfig { enabled: true, runs: 200 });
        assert_ne!(content_hash("class A {}", &plain), content_hash("class A {}", &tuned));
    }
}
