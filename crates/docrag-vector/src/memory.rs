//! In-process store with exact similarity search.

use async_trait::async_trait;
use tokio::sync::RwLock;

use docrag_core::{IndexSpec, Metric, MetadataFilter, ProvisioningError, ScoredMatch, StoreError, VectorRecord, VectorStore};

use crate::cosine_similarity;

pub struct MemoryStore {
    spec: IndexSpec,
    records: RwLock<Vec<VectorRecord>>,
}

impl MemoryStore {
    pub fn new(spec: IndexSpec) -> Self {
        Self { spec, records: RwLock::new(Vec::new()) }
    }

    pub async fn len(&self) -> usize { self.records.read().await.len() }

    pub async fn is_empty(&self) -> bool { self.records.read().await.is_empty() }

    pub async fn get(&self, id: &str) -> Option<VectorRecord> {
        self.records.read().await.iter().find(|r| r.id == id).cloned()
    }

    fn check_dimension(&self, len: usize) -> Result<(), StoreError> {
        if len == self.spec.dimension { Ok(()) } else { Err(StoreError::Dimension { expected: self.spec.dimension, actual: len }) }
    }

    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.spec.metric {
            Metric::Cosine => cosine_similarity(a, b),
            Metric::Dotproduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            Metric::Euclidean => {
                let d: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt();
                1.0 / (1.0 + d)
            }
        }
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    fn spec(&self) -> &IndexSpec { &self.spec }

    async fn ensure_index(&self) -> Result<(), ProvisioningError> {
        if self.spec.dimension == 0 {
            return Err(ProvisioningError::new(&self.spec.name, "dimension must be greater than 0"));
        }
        Ok(())
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), StoreError> {
        for r in records { self.check_dimension(r.vector.len())?; }
        let mut stored = self.records.write().await;
        for r in records {
            match stored.iter_mut().find(|s| s.id == r.id) {
                Some(existing) => *existing = r.clone(),
                None => stored.push(r.clone()),
            }
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize, filter: Option<&MetadataFilter>) -> Result<Vec<ScoredMatch>, StoreError> {
        self.check_dimension(vector.len())?;
        let stored = self.records.read().await;
        let mut matches: Vec<ScoredMatch> = stored
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| ScoredMatch { id: r.id.clone(), score: self.score(vector, &r.vector), metadata: r.metadata.clone() })
            .collect();
        // stable: equal scores keep insertion order
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        Ok(matches)
    }
}
