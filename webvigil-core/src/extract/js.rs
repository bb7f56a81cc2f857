//! Default JavaScript analyzer over tree-sitter.
//!
//! Walks the syntax tree collecting string and template literals that look
//! like paths or URLs, classifying each by its nearest enclosing call or
//! assignment expression. Parsers are reused per thread; tree-sitter
//! parsers are not `Sync` and re-creating one per call is wasteful.

use std::cell::RefCell;

use tracing::trace;
use webvigil_contracts::{JsAnalyzer, JsFinding};

/// How far up the tree to look for a classifying ancestor.
const MAX_ANCESTOR_DEPTH: usize = 6;
/// Cap on snippet text captured from an enclosing expression.
const MAX_SNIPPET_BYTES: usize = 160;

thread_local! {
    static JS_PARSER: RefCell<Option<tree_sitter::Parser>> = const { RefCell::new(None) };
}

fn with_js_parser<F, R>(f: F) -> anyhow::Result<R>
where
    F: FnOnce(&mut tree_sitter::Parser) -> R,
{
    JS_PARSER.with(|cell| {
        let mut parser_ref = cell.borrow_mut();
        if parser_ref.is_none() {
            let mut parser = tree_sitter::Parser::new();
            parser.set_language(&tree_sitter_javascript::language())?;
            *parser_ref = Some(parser);
        }
        Ok(f(parser_ref
            .as_mut()
            .expect("parser initialized immediately above")))
    })
}

/// Tree-sitter-backed [`JsAnalyzer`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TreeSitterAnalyzer;

impl TreeSitterAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl JsAnalyzer for TreeSitterAnalyzer {
    fn analyze(&self, bytes: &[u8]) -> anyhow::Result<Vec<JsFinding>> {
        let tree = with_js_parser(|parser| parser.parse(bytes, None))?;
        let Some(tree) = tree else {
            trace!("tree-sitter produced no tree; skipping analysis");
            return Ok(Vec::new());
        };

        let mut findings = Vec::new();
        collect(&tree.root_node(), bytes, &mut findings);
        Ok(findings)
    }
}

fn collect(node: &tree_sitter::Node, source: &[u8], findings: &mut Vec<JsFinding>) {
    match node.kind() {
        "string" => {
            if let Some(literal) = string_fragment_text(node, source)
                && looks_like_path(&literal)
            {
                findings.push(build_finding(node, source, literal));
            }
        }
        "template_string" => {
            // Only templates without substitutions carry a usable literal.
            if let Some(literal) = template_literal_text(node, source)
                && looks_like_path(&literal)
            {
                findings.push(build_finding(node, source, literal));
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect(&child, source, findings);
    }
}

fn build_finding(node: &tree_sitter::Node, source: &[u8], literal: String) -> JsFinding {
    let (finding_type, snippet_node) = classify(node);
    let snippet = node_text_capped(&snippet_node, source, MAX_SNIPPET_BYTES);
    JsFinding {
        url: literal,
        finding_type,
        source_snippet: snippet,
    }
}

/// Nearest enclosing call or assignment gives the finding its type and its
/// snippet; otherwise the literal itself is the snippet.
fn classify<'tree>(
    node: &tree_sitter::Node<'tree>,
) -> (Option<String>, tree_sitter::Node<'tree>) {
    let mut current = *node;
    for _ in 0..MAX_ANCESTOR_DEPTH {
        let Some(parent) = current.parent() else { break };
        match parent.kind() {
            "call_expression" => return (Some("call_expression".into()), parent),
            "assignment_expression" | "augmented_assignment_expression" => {
                return (Some("assignment_expression".into()), parent);
            }
            "variable_declarator" => return (Some("variable_declarator".into()), parent),
            _ => current = parent,
        }
    }
    (None, *node)
}

fn string_fragment_text(node: &tree_sitter::Node, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "string_fragment" {
            return node_text(&child, source);
        }
    }
    None
}

fn template_literal_text(node: &tree_sitter::Node, source: &[u8]) -> Option<String> {
    let mut fragment = None;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "template_substitution" => return None,
            "string_fragment" => {
                if fragment.is_some() {
                    return None;
                }
                fragment = node_text(&child, source);
            }
            _ => {}
        }
    }
    fragment
}

fn node_text(node: &tree_sitter::Node, source: &[u8]) -> Option<String> {
    source
        .get(node.byte_range())
        .map(|slice| String::from_utf8_lossy(slice).into_owned())
}

fn node_text_capped(node: &tree_sitter::Node, source: &[u8], cap: usize) -> String {
    let range = node.byte_range();
    let end = range.end.min(range.start + cap).min(source.len());
    let start = range.start.min(end);
    String::from_utf8_lossy(&source[start..end]).into_owned()
}

/// Cheap pre-filter; full validation happens in the extractor.
fn looks_like_path(candidate: &str) -> bool {
    if candidate.len() < 2 || candidate.chars().any(char::is_whitespace) {
        return false;
    }
    if candidate.starts_with("http://")
        || candidate.starts_with("https://")
        || candidate.starts_with("//")
        || candidate.starts_with('/')
        || candidate.starts_with("./")
        || candidate.starts_with("../")
    {
        return true;
    }
    candidate.contains('/') && candidate.contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(source: &str) -> Vec<JsFinding> {
        TreeSitterAnalyzer::new().analyze(source.as_bytes()).unwrap()
    }

    #[test]
    fn collects_call_argument_literals() {
        let findings = analyze("fetch('/api/v1'); fetch('/api/v2');");
        let urls: Vec<&str> = findings.iter().map(|f| f.url.as_str()).collect();
        assert_eq!(urls, vec!["/api/v1", "/api/v2"]);
        assert!(
            findings
                .iter()
                .all(|f| f.finding_type.as_deref() == Some("call_expression"))
        );
        assert!(findings[0].source_snippet.contains("fetch"));
    }

    #[test]
    fn collects_assignment_targets() {
        let findings = analyze("window.location = 'https://cdn.example/next';");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].url, "https://cdn.example/next");
        assert_eq!(
            findings[0].finding_type.as_deref(),
            Some("assignment_expression")
        );
    }

    #[test]
    fn collects_plain_templates_but_not_substituted_ones() {
        let findings = analyze("const a = `/static/app.css`; const b = `/user/${id}`;");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].url, "/static/app.css");
    }

    #[test]
    fn ignores_prose_strings() {
        let findings = analyze("const msg = 'hello world'; const mime = 'application/json';");
        assert!(findings.is_empty());
    }

    #[test]
    fn broken_source_yields_findings_not_errors() {
        // tree-sitter is error-tolerant; analysis must not fail.
        let result = TreeSitterAnalyzer::new().analyze(b"fetch('/ok'); function {{{");
        assert!(result.is_ok());
    }
}
