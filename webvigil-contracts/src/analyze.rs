//! JavaScript analysis contract.

/// One candidate URL or path yielded by JavaScript analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsFinding {
    /// The raw string as it appeared in the source.
    pub url: String,
    /// Analyzer-specific classification, when the analyzer has one.
    pub finding_type: Option<String>,
    /// Source text surrounding the finding.
    pub source_snippet: String,
}

/// Yields candidate URLs from JavaScript string literals, call expressions
/// and assignment targets.
///
/// Analyzers are best-effort: syntactically broken input produces an empty
/// result, not an error.
pub trait JsAnalyzer: Send + Sync {
    fn analyze(&self, bytes: &[u8]) -> anyhow::Result<Vec<JsFinding>>;
}
