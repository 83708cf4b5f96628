//! Proof artifacts and the proof-store port.
//!
//! Proof refs are content addresses (`sha256:<hex>`), so the same artifact
//! always yields the same ref and storage is naturally deduplicated.
//! Implementations own their call timeouts; the engine maps any port
//! failure to `ProofStoreUnavailable` and fails fast without mutating
//! state. Retries belong to the caller.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ProofError, ProofStoreError};

/// Content address of a stored proof artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofRef(String);

impl ProofRef {
    /// Compute the content address for an artifact.
    pub fn for_bytes(bytes: &[u8]) -> Self {
        Self(format!("sha256:{}", hex::encode(Sha256::digest(bytes))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex digest without the scheme prefix.
    pub fn hex_digest(&self) -> &str {
        self.0.strip_prefix("sha256:").unwrap_or(&self.0)
    }
}

impl fmt::Display for ProofRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata accompanying a proof artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofMetadata {
    pub content_type: String,
    pub size_bytes: u64,
}

impl ProofMetadata {
    pub fn new(content_type: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            content_type: content_type.into(),
            size_bytes,
        }
    }
}

/// Validation limits for submitted artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProofPolicy {
    pub max_bytes: u64,
    pub allowed_types: Vec<String>,
}

impl Default for ProofPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
            allowed_types: vec!["image/jpeg".into(), "image/png".into()],
        }
    }
}

impl ProofPolicy {
    pub fn validate(&self, bytes: &[u8], metadata: &ProofMetadata) -> Result<(), ProofError> {
        if bytes.is_empty() {
            return Err(ProofError::Empty);
        }
        let size_bytes = bytes.len() as u64;
        if size_bytes > self.max_bytes {
            return Err(ProofError::TooLarge {
                size_bytes,
                max_bytes: self.max_bytes,
            });
        }
        if !self
            .allowed_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&metadata.content_type))
        {
            return Err(ProofError::UnsupportedType {
                content_type: metadata.content_type.clone(),
            });
        }
        Ok(())
    }
}

/// Persistence port for proof artifacts.
pub trait ProofStore: Send + Sync {
    fn put(&self, bytes: &[u8], metadata: &ProofMetadata) -> Result<ProofRef, ProofStoreError>;
    fn exists(&self, proof_ref: &ProofRef) -> Result<bool, ProofStoreError>;
}

/// Metadata-only store for tests and ephemeral use.
#[derive(Debug, Default)]
pub struct InMemoryProofStore {
    objects: Mutex<HashMap<ProofRef, ProofMetadata>>,
}

impl InMemoryProofStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProofStore for InMemoryProofStore {
    fn put(&self, bytes: &[u8], metadata: &ProofMetadata) -> Result<ProofRef, ProofStoreError> {
        let proof_ref = ProofRef::for_bytes(bytes);
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(proof_ref.clone(), metadata.clone());
        Ok(proof_ref)
    }

    fn exists(&self, proof_ref: &ProofRef) -> Result<bool, ProofStoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(proof_ref))
    }
}

/// Filesystem store: blobs under `objects/<aa>/<rest-of-digest>` with a
/// JSON metadata sidecar.
#[derive(Debug)]
pub struct FsProofStore {
    root: PathBuf,
}

impl FsProofStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ProofStoreError> {
        let root = root.into();
        std::fs::create_dir_all(root.join("objects"))?;
        Ok(Self { root })
    }

    fn blob_path(&self, proof_ref: &ProofRef) -> PathBuf {
        let digest = proof_ref.hex_digest();
        let (shard, rest) = digest.split_at(digest.len().min(2));
        self.root.join("objects").join(shard).join(rest)
    }
}

impl ProofStore for FsProofStore {
    fn put(&self, bytes: &[u8], metadata: &ProofMetadata) -> Result<ProofRef, ProofStoreError> {
        let proof_ref = ProofRef::for_bytes(bytes);
        let path = self.blob_path(&proof_ref);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        let sidecar = path.with_extension("meta.json");
        let json = serde_json::to_string(metadata)
            .map_err(|e| ProofStoreError::Backend(e.to_string()))?;
        std::fs::write(sidecar, json)?;
        Ok(proof_ref)
    }

    fn exists(&self, proof_ref: &ProofRef) -> Result<bool, ProofStoreError> {
        Ok(self.blob_path(proof_ref).exists())
    }
}
