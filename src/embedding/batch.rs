/// Batch indexing: catalog records to vector store points
use super::{build_search_text, EmbeddingClient, VectorPoint, VectorStore};
use crate::catalog::{CatalogRecord, StableIdentity};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// A record ready to embed
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub id: StableIdentity,
    pub text: String,
    pub record: CatalogRecord,
}

/// Search documents for `records`, dropping repeated identities.
///
/// Returns the documents in first-seen order and the number of repeats dropped.
pub fn prepare_documents(records: Vec<CatalogRecord>) -> (Vec<PreparedDocument>, usize) {
    let mut seen = HashSet::new();
    let mut duplicates = 0;
    let mut documents = Vec::with_capacity(records.len());

    for record in records {
        let id = record.identity();
        if !seen.insert(id.clone()) {
            duplicates += 1;
            continue;
        }
        documents.push(PreparedDocument {
            id,
            text: build_search_text(&record),
            record,
        });
    }

    (documents, duplicates)
}

/// Outcome of one indexing run
#[derive(Debug, Clone)]
pub struct IndexReport {
    pub processed: usize,
    pub failed: Vec<StableIdentity>,
    pub duplicates_skipped: usize,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl IndexReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Distinct records attempted
    pub fn total(&self) -> usize {
        self.processed + self.failed.len()
    }
}

#[derive(Default)]
struct ChunkOutcome {
    processed: usize,
    failed: Vec<StableIdentity>,
}

/// Embeds and upserts records in concurrent batches
///
/// A failing passage only fails itself (the client splits failing batches);
/// a failing upsert fails its batch. Neither aborts the run.
pub struct BatchProcessor {
    client: Arc<EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    batch_size: usize,
    max_concurrent: usize,
}

impl BatchProcessor {
    /// Create a new batch processor
    ///
    /// # Arguments
    /// * `client` - Embedding client (passage mode is used)
    /// * `store` - Vector store receiving the points
    /// * `batch_size` - Number of records embedded per provider call
    /// * `max_concurrent` - Maximum batches in flight
    pub fn new(
        client: Arc<EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        batch_size: usize,
        max_concurrent: usize,
    ) -> Self {
        Self {
            client,
            store,
            batch_size: batch_size.max(1),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Index every record
    ///
    /// Fails only when the index itself cannot be prepared; per-record
    /// failures are listed in the report.
    pub async fn process(&self, records: Vec<CatalogRecord>) -> Result<IndexReport> {
        let started_at = Utc::now();
        let start = std::time::Instant::now();

        self.store.ensure_index(self.client.dimension()).await?;

        let (documents, duplicates_skipped) = prepare_documents(records);
        if duplicates_skipped > 0 {
            warn!("Skipped {} records with repeated identities", duplicates_skipped);
        }

        let (documents, empty): (Vec<_>, Vec<_>) = documents
            .into_iter()
            .partition(|d| !d.text.trim().is_empty());
        let mut failed: Vec<StableIdentity> = empty.into_iter().map(|d| d.id).collect();
        if !failed.is_empty() {
            warn!("{} records have no searchable text", failed.len());
        }

        info!(
            "Starting indexing of {} records in batches of {}",
            documents.len(),
            self.batch_size
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        let mut pending: Vec<Option<Vec<StableIdentity>>> = Vec::new();

        for (index, chunk) in documents.chunks(self.batch_size).enumerate() {
            pending.push(Some(chunk.iter().map(|d| d.id.clone()).collect()));

            let chunk = chunk.to_vec();
            let client = self.client.clone();
            let store = self.store.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => Self::process_chunk(&client, store.as_ref(), chunk).await,
                    Err(_) => ChunkOutcome {
                        processed: 0,
                        failed: chunk.into_iter().map(|d| d.id).collect(),
                    },
                };
                (index, outcome)
            });
        }

        let mut processed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    pending[index] = None;
                    processed += outcome.processed;
                    failed.extend(outcome.failed);
                }
                Err(e) => warn!("Indexing task aborted: {}", e),
            }
        }
        // Chunks whose task panicked never reported back
        failed.extend(pending.into_iter().flatten().flatten());

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Indexing complete: {} processed, {} failed, {} duplicates skipped, {}ms",
            processed,
            failed.len(),
            duplicates_skipped,
            duration_ms
        );

        Ok(IndexReport {
            processed,
            failed,
            duplicates_skipped,
            duration_ms,
            started_at,
        })
    }

    async fn process_chunk(
        client: &EmbeddingClient,
        store: &dyn VectorStore,
        chunk: Vec<PreparedDocument>,
    ) -> ChunkOutcome {
        let texts: Vec<String> = chunk.iter().map(|d| d.text.clone()).collect();
        let results = client.embed_passages_isolated(&texts).await;

        let mut outcome = ChunkOutcome::default();
        let mut points = Vec::with_capacity(chunk.len());

        for (document, result) in chunk.into_iter().zip(results) {
            match result {
                Ok(vector) => points.push(VectorPoint {
                    id: document.id,
                    vector,
                    payload: document.record,
                }),
                Err(e) => {
                    warn!("Failed to embed '{}' ({}): {}", document.record.name, document.id, e);
                    outcome.failed.push(document.id);
                }
            }
        }

        if points.is_empty() {
            return outcome;
        }

        match store.upsert(&points).await {
            Ok(()) => {
                debug!("Upserted batch of {} points", points.len());
                outcome.processed = points.len();
            }
            Err(e) => {
                warn!("Failed to upsert batch of {}: {}", points.len(), e);
                outcome.failed.extend(points.into_iter().map(|p| p.id));
            }
        }
        outcome
    }
}
