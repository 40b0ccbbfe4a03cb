/// Vector store trait and the local HNSW implementation
use async_trait::async_trait;
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::catalog::{CatalogRecord, StableIdentity};

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Index not initialized: {0}")]
    NotInitialized(String),

    #[error("Vector store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vector store returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to persist index at {path}: {source}")]
    Persistence {
        path: String,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// One vector keyed by the record's stable identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: StableIdentity,
    pub vector: Vec<f32>,
    pub payload: CatalogRecord,
}

/// Nearest-neighbor search result
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: StableIdentity,
    /// Cosine similarity in [-1, 1], higher is more similar
    pub score: f32,
    pub payload: CatalogRecord,
}

/// Storage for record vectors
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the index for `dimension`-wide cosine vectors if it is absent
    async fn ensure_index(&self, dimension: usize) -> Result<(), VectorIndexError>;

    /// Insert or overwrite points keyed by their identity
    async fn upsert(&self, points: &[VectorPoint]) -> Result<(), VectorIndexError>;

    /// The `k` nearest points, most similar first
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>, VectorIndexError>;
}

/// HNSW tuning
#[derive(Debug, Clone)]
pub struct HnswSettings {
    /// Connections per layer
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    /// Capacity hint for layer sizing
    pub max_elements: usize,
}

impl Default for HnswSettings {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            max_elements: 10_000,
        }
    }
}

const MAX_LAYERS: usize = 16;

/// On-disk form: only live points, rebuilt into HNSW on open
#[derive(Serialize, Deserialize)]
struct Snapshot {
    dimension: usize,
    points: Vec<VectorPoint>,
}

struct Slot {
    point: VectorPoint,
    live: bool,
}

struct IndexState {
    dimension: usize,
    hnsw: Hnsw<'static, f32, DistCosine>,
    /// Indexed by HNSW data id
    slots: Vec<Slot>,
    /// Identity to its current slot
    live: HashMap<StableIdentity, usize>,
}

impl IndexState {
    fn new(dimension: usize, settings: &HnswSettings) -> Self {
        let hnsw = Hnsw::<f32, DistCosine>::new(
            settings.m,
            settings.max_elements,
            MAX_LAYERS,
            settings.ef_construction,
            DistCosine,
        );
        Self {
            dimension,
            hnsw,
            slots: Vec::new(),
            live: HashMap::new(),
        }
    }

    /// HNSW has no delete; a superseded slot is tombstoned instead
    fn insert(&mut self, point: VectorPoint) {
        let data_id = self.slots.len();
        self.hnsw.insert((&point.vector, data_id));

        if let Some(old) = self.live.insert(point.id.clone(), data_id) {
            self.slots[old].live = false;
        }
        self.slots.push(Slot { point, live: true });
    }

    fn tombstones(&self) -> usize {
        self.slots.len() - self.live.len()
    }

    fn live_points(&self) -> Vec<VectorPoint> {
        self.slots
            .iter()
            .filter(|s| s.live)
            .map(|s| s.point.clone())
            .collect()
    }

    /// Rebuild without tombstones once they outnumber live points
    fn compact_if_needed(&mut self, settings: &HnswSettings) {
        if self.tombstones() <= self.live.len().max(64) {
            return;
        }
        debug!("Compacting HNSW index ({} tombstones)", self.tombstones());
        let points = self.live_points();
        let mut rebuilt = IndexState::new(self.dimension, settings);
        for point in points {
            rebuilt.insert(point);
        }
        *self = rebuilt;
    }
}

/// Local cosine index backed by `hnsw_rs`
///
/// With a path, the live points are snapshotted to JSON after every upsert so
/// separate runs share the index.
pub struct HnswVectorStore {
    settings: HnswSettings,
    path: Option<PathBuf>,
    state: RwLock<Option<IndexState>>,
    persist_lock: Mutex<()>,
}

impl HnswVectorStore {
    /// Create an index that lives only in memory
    pub fn in_memory(settings: HnswSettings) -> Self {
        Self {
            settings,
            path: None,
            state: RwLock::new(None),
            persist_lock: Mutex::new(()),
        }
    }

    /// Open the index persisted at `path`, or start empty if there is none
    pub async fn open(
        path: impl Into<PathBuf>,
        settings: HnswSettings,
    ) -> Result<Self, VectorIndexError> {
        let path = path.into();
        let mut state = None;

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let body = tokio::fs::read(&path)
                .await
                .map_err(|source| VectorIndexError::Persistence {
                    path: path.display().to_string(),
                    source,
                })?;
            let snapshot: Snapshot = serde_json::from_slice(&body)
                .map_err(|e| VectorIndexError::Serialization(e.to_string()))?;

            let mut loaded = IndexState::new(snapshot.dimension, &settings);
            for point in snapshot.points {
                loaded.insert(point);
            }
            info!("Loaded {} vectors from {}", loaded.live.len(), path.display());
            state = Some(loaded);
        }

        Ok(Self {
            settings,
            path: Some(path),
            state: RwLock::new(state),
            persist_lock: Mutex::new(()),
        })
    }

    /// Number of live points
    pub async fn len(&self) -> usize {
        self.state
            .read()
            .await
            .as_ref()
            .map(|s| s.live.len())
            .unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self) -> Result<(), VectorIndexError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock().await;

        let body = {
            let state = self.state.read().await;
            let Some(state) = state.as_ref() else {
                return Ok(());
            };
            let snapshot = Snapshot {
                dimension: state.dimension,
                points: state.live_points(),
            };
            serde_json::to_vec(&snapshot)
                .map_err(|e| VectorIndexError::Serialization(e.to_string()))?
        };

        let io_err = |source| VectorIndexError::Persistence {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, body).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for HnswVectorStore {
    async fn ensure_index(&self, dimension: usize) -> Result<(), VectorIndexError> {
        let mut state = self.state.write().await;
        match state.as_ref() {
            Some(existing) if existing.dimension != dimension => {
                Err(VectorIndexError::InvalidDimension {
                    expected: existing.dimension,
                    actual: dimension,
                })
            }
            Some(_) => Ok(()),
            None => {
                info!("Creating HNSW index (dimension {})", dimension);
                *state = Some(IndexState::new(dimension, &self.settings));
                Ok(())
            }
        }
    }

    async fn upsert(&self, points: &[VectorPoint]) -> Result<(), VectorIndexError> {
        {
            let mut guard = self.state.write().await;
            let state = guard.as_mut().ok_or_else(|| {
                VectorIndexError::NotInitialized("call ensure_index first".to_string())
            })?;

            for point in points {
                if point.vector.len() != state.dimension {
                    return Err(VectorIndexError::InvalidDimension {
                        expected: state.dimension,
                        actual: point.vector.len(),
                    });
                }
            }
            for point in points {
                state.insert(point.clone());
            }
            state.compact_if_needed(&self.settings);
        }

        self.persist().await
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<VectorMatch>, VectorIndexError> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or_else(|| {
            VectorIndexError::NotInitialized("index has not been built".to_string())
        })?;

        if vector.len() != state.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: state.dimension,
                actual: vector.len(),
            });
        }
        if k == 0 || state.live.is_empty() {
            return Ok(Vec::new());
        }

        // Over-fetch so tombstoned neighbors do not starve the result
        let fetch = (k + state.tombstones()).min(state.slots.len());
        let ef = self.settings.ef_search.max(fetch);
        let neighbours = state.hnsw.search(vector, fetch, ef);

        let mut matches: Vec<VectorMatch> = neighbours
            .into_iter()
            .filter_map(|n| {
                let slot = state.slots.get(n.d_id)?;
                slot.live.then(|| VectorMatch {
                    id: slot.point.id.clone(),
                    score: 1.0 - n.distance,
                    payload: slot.point.payload.clone(),
                })
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(k);
        Ok(matches)
    }
}
