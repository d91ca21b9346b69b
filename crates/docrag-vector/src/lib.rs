//! docrag-vector
//!
//! Vector Store Adapter backends. Each store owns one named index and
//! implements [`docrag_core::VectorStore`]:
//! - [`PineconeStore`]: Pinecone control and data plane over HTTP
//! - [`LanceDbStore`]: local on-disk LanceDB table
//! - [`MemoryStore`]: exact in-process scan, for tests and experiments

pub mod lance;
pub mod memory;
pub mod pinecone;
pub mod schema;
pub mod table;

pub use lance::LanceDbStore;
pub use memory::MemoryStore;
pub use pinecone::PineconeStore;

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}
