//! Content diffing contract.

use webvigil_model::DiffResult;

/// Produces a structured diff between two content buffers.
///
/// Implementations choose strategy by `content_type` (line-based for text,
/// byte-based otherwise). Pure and synchronous; callers offload to a
/// blocking pool if inputs are large.
pub trait Differ: Send + Sync {
    fn generate_diff(
        &self,
        old: &[u8],
        new: &[u8],
        content_type: &str,
        old_hash: &str,
        new_hash: &str,
    ) -> anyhow::Result<DiffResult>;
}
