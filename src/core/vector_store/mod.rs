//! Namespaced vector store with cosine top-k search, payload filtering,
//! and JSON-lines persistence.
//!
//! The default build searches with an exact scan; the `ann` feature adds
//! an HNSW accelerator with identical result semantics. The store is a
//! process singleton owned by the composition root; writes are serialized
//! behind the writer lock, reads are concurrent.

#[cfg(feature = "ann")]
mod index;

use crate::core::embedding::cosine_similarity;
use crate::core::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use signalbox_types::{ErrorCategory, Namespace};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};

/// One stored record. `(namespace, id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub namespace: Namespace,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

/// A search result, best first.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: Map<String, Value>,
}

/// Store health snapshot for `get_status`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub backend: &'static str,
    pub persistent: bool,
    pub records: HashMap<String, usize>,
}

#[derive(Default)]
struct NamespaceData {
    records: HashMap<String, VectorRecord>,
    #[cfg(feature = "ann")]
    index: Option<index::AnnIndex>,
}

pub struct VectorStore {
    namespaces: RwLock<HashMap<Namespace, NamespaceData>>,
    dir: Option<PathBuf>,
}

impl VectorStore {
    /// Open a persistent store rooted at `dir`, migrating any legacy
    /// single-file layout first.
    pub fn open(dir: &Path) -> Result<Self, AppError> {
        fs::create_dir_all(dir).map_err(|err| {
            AppError::new(
                ErrorCategory::VectorStoreError,
                format!("failed to create store directory {}: {}", dir.display(), err),
            )
            .with_code("RTR-VEC-001")
        })?;
        migrate_legacy_layout(dir)?;

        let mut namespaces = HashMap::new();
        for namespace in Namespace::ALL {
            let mut data = NamespaceData::default();
            let path = namespace_path(dir, namespace);
            if path.exists() {
                let text = fs::read_to_string(&path)?;
                for (line_no, line) in text.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<VectorRecord>(line) {
                        Ok(record) => {
                            data.records.insert(record.id.clone(), record);
                        }
                        Err(err) => {
                            warn!(
                                path = %path.display(),
                                line = line_no + 1,
                                error = %err,
                                "skipping unreadable store record"
                            );
                        }
                    }
                }
            }
            #[cfg(feature = "ann")]
            {
                data.index = index::AnnIndex::build(data.records.values());
            }
            namespaces.insert(namespace, data);
        }

        info!(dir = %dir.display(), "vector store opened");
        Ok(VectorStore {
            namespaces: RwLock::new(namespaces),
            dir: Some(dir.to_path_buf()),
        })
    }

    /// Purely in-memory store with the same semantics; used when the
    /// backing directory is unavailable and in tests.
    pub fn in_memory() -> Self {
        let mut namespaces = HashMap::new();
        for namespace in Namespace::ALL {
            namespaces.insert(namespace, NamespaceData::default());
        }
        VectorStore {
            namespaces: RwLock::new(namespaces),
            dir: None,
        }
    }

    /// Open `dir`, falling back to the in-memory store when the backend
    /// cannot be prepared.
    pub fn open_or_memory(dir: &Path) -> Self {
        match VectorStore::open(dir) {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "vector store unavailable; using in-memory fallback");
                VectorStore::in_memory()
            }
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.dir.is_some()
    }

    /// Insert or replace records by `(namespace, id)`.
    pub fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), AppError> {
        let mut touched = Vec::new();
        {
            let mut guard = self.namespaces.write().expect("store lock poisoned");
            for record in records {
                let data = guard.entry(record.namespace).or_default();
                data.records.insert(record.id.clone(), record.clone());
                if !touched.contains(&record.namespace) {
                    touched.push(record.namespace);
                }
            }
            #[cfg(feature = "ann")]
            for namespace in &touched {
                if let Some(data) = guard.get_mut(namespace) {
                    data.index = index::AnnIndex::build(data.records.values());
                }
            }
        }
        for namespace in touched {
            self.persist(namespace)?;
        }
        Ok(())
    }

    /// Cosine search: threshold filter, then payload equality filter, then
    /// top-k descending.
    pub fn search(
        &self,
        namespace: Namespace,
        query: &[f32],
        top_k: usize,
        threshold: f32,
        metadata_filter: Option<&Map<String, Value>>,
    ) -> Vec<SearchHit> {
        let guard = self.namespaces.read().expect("store lock poisoned");
        let Some(data) = guard.get(&namespace) else {
            return Vec::new();
        };

        #[cfg(feature = "ann")]
        let candidates = index::candidates(
            data.index.as_ref(),
            &data.records,
            query,
            top_k,
            metadata_filter.is_some(),
        );
        #[cfg(not(feature = "ann"))]
        let candidates: Vec<&VectorRecord> = data.records.values().collect();

        let mut hits: Vec<SearchHit> = candidates
            .into_iter()
            .filter_map(|record| {
                let score = cosine_similarity(query, &record.vector);
                if score < threshold {
                    return None;
                }
                if let Some(filter) = metadata_filter {
                    for (field, expected) in filter {
                        if record.payload.get(field) != Some(expected) {
                            return None;
                        }
                    }
                }
                Some(SearchHit {
                    id: record.id.clone(),
                    score,
                    payload: record.payload.clone(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        hits
    }

    pub fn delete(&self, namespace: Namespace, id: &str) -> Result<bool, AppError> {
        let removed = {
            let mut guard = self.namespaces.write().expect("store lock poisoned");
            let Some(data) = guard.get_mut(&namespace) else {
                return Ok(false);
            };
            let removed = data.records.remove(id).is_some();
            #[cfg(feature = "ann")]
            if removed {
                data.index = index::AnnIndex::build(data.records.values());
            }
            removed
        };
        if removed {
            self.persist(namespace)?;
        }
        Ok(removed)
    }

    pub fn clear(&self, namespace: Namespace) -> Result<(), AppError> {
        {
            let mut guard = self.namespaces.write().expect("store lock poisoned");
            if let Some(data) = guard.get_mut(&namespace) {
                data.records.clear();
                #[cfg(feature = "ann")]
                {
                    data.index = None;
                }
            }
        }
        self.persist(namespace)
    }

    pub fn stats(&self) -> StoreStats {
        let guard = self.namespaces.read().expect("store lock poisoned");
        let records = guard
            .iter()
            .map(|(namespace, data)| (namespace.as_str().to_string(), data.records.len()))
            .collect();
        StoreStats {
            backend: if cfg!(feature = "ann") { "hnsw" } else { "scan" },
            persistent: self.dir.is_some(),
            records,
        }
    }

    fn persist(&self, namespace: Namespace) -> Result<(), AppError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let guard = self.namespaces.read().expect("store lock poisoned");
        let Some(data) = guard.get(&namespace) else {
            return Ok(());
        };

        let path = namespace_path(dir, namespace);
        let tmp = path.with_extension("jsonl.tmp");
        let mut file = fs::File::create(&tmp)?;
        let mut ids: Vec<&String> = data.records.keys().collect();
        ids.sort();
        for id in ids {
            let line = serde_json::to_string(&data.records[id])?;
            writeln!(file, "{}", line)?;
        }
        file.flush()?;
        drop(file);
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn namespace_path(dir: &Path, namespace: Namespace) -> PathBuf {
    dir.join(format!("{}.jsonl", namespace.as_str()))
}

/// Split a pre-namespacing `store.json` (flat record array) into the
/// per-namespace layout, then set it aside.
fn migrate_legacy_layout(dir: &Path) -> Result<(), AppError> {
    let legacy = dir.join("store.json");
    if !legacy.exists() {
        return Ok(());
    }
    let text = fs::read_to_string(&legacy)?;
    let records: Vec<VectorRecord> = serde_json::from_str(&text).map_err(|err| {
        AppError::new(
            ErrorCategory::VectorStoreError,
            format!("legacy store {} is unreadable: {}", legacy.display(), err),
        )
        .with_code("RTR-VEC-002")
    })?;

    let mut by_namespace: HashMap<Namespace, Vec<VectorRecord>> = HashMap::new();
    for record in records {
        by_namespace.entry(record.namespace).or_default().push(record);
    }
    for (namespace, records) in by_namespace {
        let path = namespace_path(dir, namespace);
        let mut file = fs::File::create(&path)?;
        for record in records {
            writeln!(file, "{}", serde_json::to_string(&record)?)?;
        }
    }
    fs::rename(&legacy, dir.join("store.json.migrated"))?;
    info!(dir = %dir.display(), "migrated legacy vector store layout");
    Ok(())
}
