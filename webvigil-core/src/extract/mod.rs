//! Path extraction from monitored content.
//!
//! Two strategies merged by deduplication on the absolute URL: structured
//! analysis of JavaScript through the injected [`JsAnalyzer`], and a
//! configured regex scan over the full content. Every candidate passes
//! URL validation and the allow/deny filters before it is kept.

pub mod js;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, warn};
use url::Url;
use webvigil_contracts::JsAnalyzer;
use webvigil_model::ExtractedPath;

use crate::config::{ExtractorConfig, PathExtractorConfig};
use crate::validate;

/// Type label applied when the analyzer has no classification of its own.
pub const DEFAULT_FINDING_TYPE: &str = "jsluice_default_unknown_type";

const JS_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs"];

/// Extracts referenced paths/URLs from fetched content.
pub struct PathExtractor {
    analyzer: Option<Arc<dyn JsAnalyzer>>,
    /// Compiled scan patterns, keyed by their configured 0-based index.
    patterns: Vec<(usize, Regex)>,
    allowlist: Vec<Regex>,
    denylist: Vec<Regex>,
    config: PathExtractorConfig,
}

impl std::fmt::Debug for PathExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathExtractor")
            .field("analyzer", &self.analyzer.is_some())
            .field("patterns", &self.patterns.len())
            .field("allowlist", &self.allowlist.len())
            .field("denylist", &self.denylist.len())
            .field("config", &self.config)
            .finish()
    }
}

impl PathExtractor {
    /// Compile patterns once. Unparsable patterns are logged and skipped;
    /// the surviving ones keep their configured indices.
    pub fn new(
        config: PathExtractorConfig,
        filters: &ExtractorConfig,
        analyzer: Option<Arc<dyn JsAnalyzer>>,
    ) -> Self {
        Self {
            analyzer,
            patterns: compile_indexed(&filters.custom_regexes, "custom_regexes"),
            allowlist: compile_all(&filters.allowlist, "allowlist"),
            denylist: compile_all(&filters.denylist, "denylist"),
            config,
        }
    }

    /// Run both strategies over `bytes` and return deduplicated paths.
    pub fn extract(
        &self,
        source_url: &Url,
        bytes: &[u8],
        content_type: &str,
    ) -> Vec<ExtractedPath> {
        if bytes.len() > self.config.max_content_size {
            debug!(
                url = %source_url,
                size = bytes.len(),
                cap = self.config.max_content_size,
                "content too large for extraction"
            );
            return Vec::new();
        }

        let content = String::from_utf8_lossy(bytes);
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();

        if self.config.enable_js_analysis && is_javascript(source_url, content_type) {
            self.run_analyzer(source_url, bytes, &mut seen, &mut out);
        }
        if self.config.enable_manual_regex {
            self.run_regex_scan(source_url, &content, &mut seen, &mut out);
        }

        out
    }

    fn run_analyzer(
        &self,
        source_url: &Url,
        bytes: &[u8],
        seen: &mut HashSet<String>,
        out: &mut Vec<ExtractedPath>,
    ) {
        let Some(analyzer) = self.analyzer.as_deref() else {
            return;
        };
        let findings = match analyzer.analyze(bytes) {
            Ok(findings) => findings,
            Err(error) => {
                debug!(url = %source_url, %error, "JS analysis failed");
                return;
            }
        };
        for finding in findings {
            let Some(absolute) = self.admit(&finding.url, source_url, seen) else {
                continue;
            };
            out.push(ExtractedPath {
                source_url: source_url.to_string(),
                raw_path: finding.url,
                absolute_url: absolute,
                context: finding.source_snippet,
                path_type: finding
                    .finding_type
                    .unwrap_or_else(|| DEFAULT_FINDING_TYPE.to_string()),
                discovered_at: Utc::now(),
            });
        }
    }

    fn run_regex_scan(
        &self,
        source_url: &Url,
        content: &str,
        seen: &mut HashSet<String>,
        out: &mut Vec<ExtractedPath>,
    ) {
        for (index, pattern) in &self.patterns {
            for matched in pattern.find_iter(content) {
                let raw = matched.as_str();
                let Some(absolute) = self.admit(raw, source_url, seen) else {
                    continue;
                };
                let at = content.find(raw).unwrap_or(matched.start());
                out.push(ExtractedPath {
                    source_url: source_url.to_string(),
                    raw_path: raw.to_string(),
                    absolute_url: absolute,
                    context: snippet_around(content, at, raw.len(), self.config.context_snippet_size),
                    path_type: format!("manual_config_regex_{index}"),
                    discovered_at: Utc::now(),
                });
            }
        }
    }

    /// Validate, apply allow/deny filters and claim the dedupe slot.
    /// Returns the absolute URL when the candidate should be recorded.
    fn admit(&self, raw: &str, source_url: &Url, seen: &mut HashSet<String>) -> Option<String> {
        let absolute = match validate::validate(raw, Some(source_url), Some(source_url)) {
            Ok(url) => url.to_string(),
            Err(reason) => {
                debug!(raw, %reason, "rejected extracted path");
                return None;
            }
        };
        if self.denylist.iter().any(|re| re.is_match(&absolute)) {
            debug!(url = %absolute, "extracted path denied by denylist");
            return None;
        }
        if !self.allowlist.is_empty() && !self.allowlist.iter().any(|re| re.is_match(&absolute)) {
            debug!(url = %absolute, "extracted path not in allowlist");
            return None;
        }
        if !seen.insert(absolute.clone()) {
            return None;
        }
        Some(absolute)
    }
}

fn compile_indexed(patterns: &[String], field: &str) -> Vec<(usize, Regex)> {
    patterns
        .iter()
        .enumerate()
        .filter_map(|(index, pattern)| match Regex::new(pattern) {
            Ok(compiled) => Some((index, compiled)),
            Err(error) => {
                warn!(field, index, pattern, %error, "skipping unparsable pattern");
                None
            }
        })
        .collect()
}

fn compile_all(patterns: &[String], field: &str) -> Vec<Regex> {
    compile_indexed(patterns, field)
        .into_iter()
        .map(|(_, compiled)| compiled)
        .collect()
}

fn is_javascript(source_url: &Url, content_type: &str) -> bool {
    if content_type.to_ascii_lowercase().contains("javascript") {
        return true;
    }
    let path = source_url.path();
    path.rsplit('.')
        .next()
        .is_some_and(|ext| JS_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        && path.contains('.')
}

/// ±`radius` characters around the match, clamped to char boundaries.
fn snippet_around(content: &str, at: usize, match_len: usize, radius: usize) -> String {
    let mut start = at.saturating_sub(radius);
    while start > 0 && !content.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (at + match_len + radius).min(content.len());
    while end < content.len() && !content.is_char_boundary(end) {
        end += 1;
    }
    content[start..end].to_string()
}
