use std::collections::HashMap;
use std::time::Instant;

use crate::{
    db::{RecommendationSink, StaleScope},
    error::{AppError, AppResult},
    models::Recommendation,
};

/// Collapses records sharing a (user_id, movie_id) key; the later record wins
///
/// The surviving record keeps the position of the first occurrence, so the
/// output order is stable and running this twice changes nothing.
pub fn deduplicate(records: Vec<Recommendation>) -> Vec<Recommendation> {
    let mut positions: HashMap<(String, String), usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<Recommendation> = Vec::with_capacity(records.len());

    for record in records {
        let key = (record.user_id.clone(), record.movie_id.clone());
        match positions.get(&key) {
            Some(&pos) => unique[pos] = record,
            None => {
                positions.insert(key, unique.len());
                unique.push(record);
            }
        }
    }

    unique
}

/// What a persistence pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistReport {
    pub written: usize,
    pub batches: usize,
    /// Zero-based indices of batches that failed after retries
    pub failed_batches: Vec<usize>,
    pub stale_deleted: u64,
}

/// Writes recommendations in bounded batches with upsert semantics
pub struct Persister<'a> {
    sink: &'a dyn RecommendationSink,
    batch_size: usize,
    retries: u32,
}

impl<'a> Persister<'a> {
    pub fn new(sink: &'a dyn RecommendationSink, batch_size: usize, retries: u32) -> Self {
        Self {
            sink,
            batch_size: batch_size.max(1),
            retries,
        }
    }

    /// Upserts every chunk, recording the ones that still fail after retrying
    pub async fn write_batches(&self, records: &[Recommendation]) -> PersistReport {
        let mut report = PersistReport::default();

        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            report.batches += 1;

            let mut attempt = 0;
            loop {
                match self.sink.upsert_batch(batch).await {
                    Ok(_) => {
                        report.written += batch.len();
                        break;
                    }
                    Err(e) if attempt < self.retries => {
                        attempt += 1;
                        tracing::warn!(error = %e, batch = index, attempt, "Batch write failed, retrying");
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            batch = index,
                            records = batch.len(),
                            "Batch write failed"
                        );
                        report.failed_batches.push(index);
                        break;
                    }
                }
            }
        }

        report
    }

    /// Writes all records, then removes rows this run did not rewrite
    ///
    /// Stale rows are only removed when every batch landed. An empty input
    /// performs no writes at all.
    pub async fn persist(
        &self,
        records: Vec<Recommendation>,
        stale: &StaleScope,
    ) -> AppResult<PersistReport> {
        if records.is_empty() {
            tracing::warn!("No recommendations to persist, leaving stored rows untouched");
            return Ok(PersistReport::default());
        }

        let start = Instant::now();
        let records = deduplicate(records);
        let mut report = self.write_batches(&records).await;

        if !report.failed_batches.is_empty() {
            return Err(AppError::Persistence {
                failed_batches: report.failed_batches,
                total_batches: report.batches,
            });
        }

        report.stale_deleted = self.sink.delete_stale(stale).await?;

        tracing::info!(
            written = report.written,
            batches = report.batches,
            stale_deleted = report.stale_deleted,
            elapsed_ms = start.elapsed().as_millis(),
            "Recommendations persisted"
        );

        Ok(report)
    }
}
