//! Search service: sanitized full-text queries, snippets, scope filtering.
//!
//! The query pipeline rejects oversized or control-token-bearing input
//! before anything reaches the store; the surviving terms are quoted and
//! bound to `MATCH ?`. Results pass through the scope filter, then get
//! BM25 order and highlighted snippets.

use std::time::{Duration, Instant};

use regex::{Regex, RegexBuilder};
use tracing::debug;

use dotwork_core::issue::Issue;
use dotwork_core::scope::ScopeFilter;
use dotwork_storage::{fts, UnitOfWork};

use crate::error::{Result, ServiceError};
use crate::scope::{matches_scope, ScopeCache};

/// Maximum accepted query length.
const MAX_QUERY_LEN: usize = 500;

/// Maximum number of terms per query.
const MAX_TERMS: usize = 10;

/// Substrings that end a query's life immediately, both modes.
const FORBIDDEN_SUBSTRINGS: &[&str] = &["--", ";", "/*", "*/", "*", ":", "^", "{", "}"];

/// FTS operator tokens; allowed only in advanced mode (NEAR never).
const OPERATOR_TOKENS: &[&str] = &["AND", "OR", "NOT", "NEAR"];

/// Characters of context kept around each hit in a snippet.
const SNIPPET_WINDOW: usize = 40;

/// Maximum highlighted hits per document.
const SNIPPET_MAX_HITS: usize = 3;

/// Query interpretation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// Bare terms only: `[A-Za-z0-9_.-]`, implicitly OR-combined.
    #[default]
    Simple,
    /// Opt-in: quotes, parentheses, AND/OR/NOT, balance-checked.
    Advanced,
}

/// Wall-clock budget for a long-running read.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.0
    }
}

/// Search request knobs.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub mode: QueryMode,
    pub scope: ScopeFilter,
    pub limit: u32,
    pub deadline: Option<Deadline>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            mode: QueryMode::Simple,
            scope: ScopeFilter::everything(),
            limit: 50,
            deadline: None,
        }
    }
}

/// One search result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub issue: Issue,
    /// BM25 rank; lower is more relevant.
    pub rank: f64,
    /// Highlighted context around the matched terms.
    pub snippet: String,
}

/// Search over one unit of work.
pub struct SearchService<'a> {
    uow: &'a UnitOfWork,
    scope_cache: &'a ScopeCache,
}

impl<'a> SearchService<'a> {
    pub fn new(uow: &'a UnitOfWork, scope_cache: &'a ScopeCache) -> Self {
        Self { uow, scope_cache }
    }

    /// Runs the full pipeline: sanitize, match, scope-filter, snippet.
    pub fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        let sanitized = sanitize_query(query, opts.mode)?;
        let highlighter = build_highlighter(&sanitized.terms)?;

        if let Some(deadline) = &opts.deadline {
            if deadline.expired() {
                return Err(ServiceError::DeadlineExceeded);
            }
        }

        // Over-fetch so scope filtering can drop rows without starving the
        // requested window.
        let fetch = opts.limit.saturating_mul(4).max(opts.limit);
        let raw_hits = fts::search(self.uow.session(), &sanitized.match_expr, fetch)
            .map_err(ServiceError::from)?;
        debug!(hits = raw_hits.len(), "full-text candidates");

        let sets = if opts.scope.is_unrestricted() {
            None
        } else {
            Some(self.scope_cache.resolve(self.uow, &opts.scope, true)?)
        };

        let mut results = Vec::new();
        for hit in raw_hits {
            if let Some(deadline) = &opts.deadline {
                if deadline.expired() {
                    return Err(ServiceError::DeadlineExceeded);
                }
            }
            if let Some(sets) = &sets {
                if !matches_scope(&hit.issue_id, sets) {
                    continue;
                }
            }
            let issue = self.uow.issues().get(&hit.issue_id)?;
            let snippet = build_snippet(&issue, &highlighter);
            results.push(SearchHit {
                issue,
                rank: hit.rank,
                snippet,
            });
            if results.len() as u32 >= opts.limit {
                break;
            }
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Sanitizer
// ---------------------------------------------------------------------------

/// A validated query, ready to bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedQuery {
    /// The expression bound to `MATCH ?`.
    pub match_expr: String,
    /// The bare search terms, for highlighting.
    pub terms: Vec<String>,
}

/// Validates a query and produces the bindable match expression.
pub fn sanitize_query(query: &str, mode: QueryMode) -> Result<SanitizedQuery> {
    if query.len() > MAX_QUERY_LEN {
        return Err(ServiceError::InvalidQuery(format!(
            "query exceeds {MAX_QUERY_LEN} characters"
        )));
    }
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidQuery("query is empty".into()));
    }
    for forbidden in FORBIDDEN_SUBSTRINGS {
        if trimmed.contains(forbidden) {
            return Err(ServiceError::InvalidQuery(format!(
                "query contains forbidden sequence {forbidden:?}"
            )));
        }
    }
    // The NEAR operator (only uppercase is an operator in FTS5) is never
    // allowed; ordinary words like "nearby" are fine.
    if trimmed
        .split_whitespace()
        .any(|token| token == "NEAR" || token.starts_with("NEAR("))
    {
        return Err(ServiceError::InvalidQuery(
            "NEAR queries are not supported".into(),
        ));
    }

    match mode {
        QueryMode::Simple => sanitize_simple(trimmed),
        QueryMode::Advanced => sanitize_advanced(trimmed),
    }
}

fn is_simple_term(term: &str) -> bool {
    !term.is_empty()
        && term
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

fn sanitize_simple(query: &str) -> Result<SanitizedQuery> {
    let terms: Vec<&str> = query.split_whitespace().collect();
    if terms.len() > MAX_TERMS {
        return Err(ServiceError::InvalidQuery(format!(
            "too many terms (max {MAX_TERMS})"
        )));
    }
    for term in &terms {
        if OPERATOR_TOKENS.contains(term) {
            return Err(ServiceError::InvalidQuery(format!(
                "operator {term} requires advanced mode"
            )));
        }
        if !is_simple_term(term) {
            return Err(ServiceError::InvalidQuery(format!(
                "term contains unsupported characters: {term}"
            )));
        }
    }

    // Quote every term: injection-proof even before binding.
    let match_expr = terms
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" OR ");
    Ok(SanitizedQuery {
        match_expr,
        terms: terms.into_iter().map(str::to_owned).collect(),
    })
}

fn sanitize_advanced(query: &str) -> Result<SanitizedQuery> {
    // Quotes must pair up.
    if query.matches('"').count() % 2 != 0 {
        return Err(ServiceError::InvalidQuery("unbalanced quotes".into()));
    }
    // Parentheses must balance.
    let mut depth: i32 = 0;
    for ch in query.chars() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(ServiceError::InvalidQuery("unbalanced parentheses".into()));
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ServiceError::InvalidQuery("unbalanced parentheses".into()));
    }

    let mut terms = Vec::new();
    for token in query.split_whitespace() {
        let bare = token.trim_matches(|c| matches!(c, '(' | ')' | '"'));
        if bare.is_empty() || OPERATOR_TOKENS[..3].contains(&bare) {
            continue;
        }
        if !is_simple_term(bare) {
            return Err(ServiceError::InvalidQuery(format!(
                "term contains unsupported characters: {bare}"
            )));
        }
        terms.push(bare.to_owned());
    }
    if terms.len() > MAX_TERMS {
        return Err(ServiceError::InvalidQuery(format!(
            "too many terms (max {MAX_TERMS})"
        )));
    }
    if terms.is_empty() {
        return Err(ServiceError::InvalidQuery("query has no terms".into()));
    }

    Ok(SanitizedQuery {
        match_expr: query.to_owned(),
        terms,
    })
}

// ---------------------------------------------------------------------------
// Snippets
// ---------------------------------------------------------------------------

/// One alternation over all terms, compiled once per query and reused for
/// every snippet.
fn build_highlighter(terms: &[String]) -> Result<Regex> {
    let alternation = terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&alternation)
        .case_insensitive(true)
        .build()
        .map_err(|e| ServiceError::InvalidQuery(e.to_string()))
}

/// Builds a highlighted snippet for one issue: up to three hit windows with
/// surrounding context, collected as parts and joined once.
fn build_snippet(issue: &Issue, highlighter: &Regex) -> String {
    let text = if highlighter.is_match(&issue.description) {
        &issue.description
    } else {
        &issue.title
    };

    let mut parts: Vec<String> = Vec::new();
    for hit in highlighter.find_iter(text).take(SNIPPET_MAX_HITS) {
        let mut start = hit.start().saturating_sub(SNIPPET_WINDOW);
        while start > 0 && !text.is_char_boundary(start) {
            start -= 1;
        }
        let mut end = (hit.end() + SNIPPET_WINDOW).min(text.len());
        while end < text.len() && !text.is_char_boundary(end) {
            end += 1;
        }

        let window = &text[start..end];
        // One highlighting pass over the window.
        let highlighted = highlighter.replace_all(window, "**$0**");

        let prefix = if start > 0 { "…" } else { "" };
        let suffix = if end < text.len() { "…" } else { "" };
        parts.push(format!("{prefix}{highlighted}{suffix}"));
    }
    parts.join(" ")
}
