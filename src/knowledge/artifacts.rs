//! Persisted knowledge base artifacts
//!
//! Layout of the artifacts directory:
//! - `manifest.json`    - counts, model, dimension and BLAKE3 hashes of both payloads
//! - `vectors.json.zst` - zstd-compressed JSON array of embeddings
//! - `chunks.json.zst`  - zstd-compressed JSON array of chunk texts
//!
//! The two payloads are written and verified together; a load that finds them
//! out of step with each other or with the manifest is rejected.

use crate::error::{RegconError, Result};
use crate::knowledge::KnowledgeBase;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "manifest.json";
const VECTORS_FILE: &str = "vectors.json.zst";
const CHUNKS_FILE: &str = "chunks.json.zst";
const SCHEMA_VERSION: u32 = 1;
const COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub embedding_model: String,
    pub dimension: usize,
    pub count: usize,
    pub vectors_hash: String,
    pub chunks_hash: String,
}

/// Reads and writes knowledge base artifacts in one directory
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// All three artifact files are present
    pub fn exists(&self) -> bool {
        [MANIFEST_FILE, VECTORS_FILE, CHUNKS_FILE]
            .iter()
            .all(|name| self.dir.join(name).exists())
    }

    /// Artifacts are missing or older than the raw documents they were built from
    pub fn is_stale(&self, raw_documents: &Path) -> bool {
        if !self.exists() {
            return true;
        }

        let modified = |path: &Path| fs::metadata(path).and_then(|m| m.modified()).ok();

        match (modified(raw_documents), modified(&self.manifest_path())) {
            (Some(raw), Some(built)) => raw > built,
            // No raw documents to compare against: keep what we have
            (None, Some(_)) => false,
            _ => true,
        }
    }

    /// Persist a knowledge base, payloads first and manifest last
    pub fn save(&self, knowledge_base: &KnowledgeBase) -> Result<ArtifactManifest> {
        fs::create_dir_all(&self.dir).map_err(|e| RegconError::Io {
            source: e,
            context: format!("Failed to create artifacts directory: {}", self.dir.display()),
        })?;

        let vectors_hash = self.write_payload(VECTORS_FILE, &knowledge_base.vectors)?;
        let chunks_hash = self.write_payload(CHUNKS_FILE, knowledge_base.chunks.as_slice())?;

        let manifest = ArtifactManifest {
            schema_version: SCHEMA_VERSION,
            created_at: Utc::now(),
            embedding_model: knowledge_base.embedding_model.clone(),
            dimension: knowledge_base.dimension,
            count: knowledge_base.len(),
            vectors_hash,
            chunks_hash,
        };

        let manifest_json = serde_json::to_vec_pretty(&manifest).map_err(|e| RegconError::Json {
            source: e,
            context: "Failed to serialize artifact manifest".to_string(),
        })?;
        self.write_atomic(MANIFEST_FILE, &manifest_json)?;

        tracing::info!(
            "Saved {} chunks to {}",
            manifest.count,
            self.dir.display()
        );

        Ok(manifest)
    }

    /// Load and verify a knowledge base
    pub fn load(&self) -> Result<KnowledgeBase> {
        if !self.exists() {
            return Err(RegconError::Artifacts(format!(
                "No artifacts found in {}",
                self.dir.display()
            )));
        }

        let manifest_bytes = self.read_file(MANIFEST_FILE)?;
        let manifest: ArtifactManifest =
            serde_json::from_slice(&manifest_bytes).map_err(|e| RegconError::Json {
                source: e,
                context: "Failed to parse artifact manifest".to_string(),
            })?;

        if manifest.schema_version != SCHEMA_VERSION {
            return Err(RegconError::Artifacts(format!(
                "Unsupported artifact schema version {}",
                manifest.schema_version
            )));
        }

        let vectors: Vec<Vec<f32>> = self.read_payload(VECTORS_FILE, &manifest.vectors_hash)?;
        let chunks: Vec<String> = self.read_payload(CHUNKS_FILE, &manifest.chunks_hash)?;

        if vectors.len() != manifest.count || chunks.len() != manifest.count {
            return Err(RegconError::ArtifactMismatch {
                vectors: vectors.len(),
                chunks: chunks.len(),
                expected: manifest.count,
            });
        }

        tracing::info!(
            "Loaded {} chunks from {} (model {})",
            manifest.count,
            self.dir.display(),
            manifest.embedding_model
        );

        KnowledgeBase::new(chunks, vectors, manifest.embedding_model, manifest.dimension)
    }

    fn write_payload<T: Serialize + ?Sized>(&self, name: &str, payload: &T) -> Result<String> {
        let json = serde_json::to_vec(payload).map_err(|e| RegconError::Json {
            source: e,
            context: format!("Failed to serialize {}", name),
        })?;
        let hash = blake3::hash(&json).to_hex().to_string();

        let compressed = zstd::encode_all(&json[..], COMPRESSION_LEVEL).map_err(|e| RegconError::Io {
            source: e,
            context: format!("Failed to compress {}", name),
        })?;
        self.write_atomic(name, &compressed)?;

        Ok(hash)
    }

    fn read_payload<T: DeserializeOwned>(&self, name: &str, expected_hash: &str) -> Result<T> {
        let compressed = self.read_file(name)?;
        let json = zstd::decode_all(&compressed[..]).map_err(|e| RegconError::Io {
            source: e,
            context: format!("Failed to decompress {}", name),
        })?;

        let hash = blake3::hash(&json).to_hex().to_string();
        if hash != expected_hash {
            return Err(RegconError::Artifacts(format!(
                "{} does not match its manifest hash (rebuild required)",
                name
            )));
        }

        serde_json::from_slice(&json).map_err(|e| RegconError::Json {
            source: e,
            context: format!("Failed to parse {}", name),
        })
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(name);
        fs::read(&path).map_err(|e| RegconError::Io {
            source: e,
            context: format!("Failed to read artifact: {}", path.display()),
        })
    }

    /// Write through a temporary file and rename into place
    fn write_atomic(&self, name: &str, data: &[u8]) -> Result<()> {
        let final_path = self.dir.join(name);
        let temp_path = self.dir.join(format!("{}.tmp", name));

        fs::write(&temp_path, data).map_err(|e| RegconError::Io {
            source: e,
            context: format!("Failed to write artifact: {}", temp_path.display()),
        })?;
        fs::rename(&temp_path, &final_path).map_err(|e| RegconError::Io {
            source: e,
            context: format!(
                "Failed to move artifact into place: {} -> {}",
                temp_path.display(),
                final_path.display()
            ),
        })
    }
}
