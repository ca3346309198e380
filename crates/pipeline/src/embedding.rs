//! Embedding I/O boundary. The `vector` comparator and the `lsh` blocking
//! strategy both operate on `NormalizedRecord::embeddings`, but computing an
//! embedding is an external call (a model server, a cached feature store) the
//! orchestrator should never assume synchronously. Mirrors the async
//! I/O-boundary shape the lineage sink uses for the same reason.

use async_trait::async_trait;

use mdm_core::error::MdmResult;
use mdm_core::types::AttributeValue;

/// Computes an embedding vector for one field's text value.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, field: &str, value: &AttributeValue) -> MdmResult<Option<Vec<f32>>>;
}

/// Default provider for configurations that name no `vector` comparator
/// fields: every call returns `None`, so `vector`-comparator and `lsh`
/// blocking simply see no embeddings rather than failing. Swap in a real
/// provider (a gRPC client to an embedding service, say) at this seam
/// without touching the orchestrator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for NoopEmbeddingProvider {
    async fn embed(&self, _field: &str, _value: &AttributeValue) -> MdmResult<Option<Vec<f32>>> {
        Ok(None)
    }
}
