//! arXiv export API query source.
//!
//! Queries are passed through verbatim as `search_query`; results come back
//! newest-submitted first. The Atom feed is small and flat, so entries are
//! pulled out with a tag scanner rather than a full XML parser.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::{error::HeraldError, query::SearchResult, traits::QuerySource};
use std::time::Duration;
use tracing::{debug, warn};

/// Query source backed by `export.arxiv.org/api/query`.
pub struct ArxivSource {
    client: reqwest::Client,
    api_url: String,
}

impl ArxivSource {
    pub fn new(api_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self { client, api_url }
    }
}

#[async_trait]
impl QuerySource for ArxivSource {
    fn name(&self) -> &str {
        "arxiv"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, HeraldError> {
        debug!("arxiv: search_query={query:?} max_results={max_results}");
        let max_results = max_results.to_string();
        let resp = self
            .client
            .get(&self.api_url)
            .query(&[
                ("search_query", query),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
            ])
            .send()
            .await
            .map_err(|e| HeraldError::Query(format!("arxiv request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(HeraldError::Query(format!("arxiv returned {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| HeraldError::Query(format!("arxiv: failed to read response: {e}")))?;

        parse_feed(&body)
    }
}

/// Extract entries from an Atom feed, in document order.
///
/// The API reports malformed queries as a single entry whose id points at
/// `/api/errors`; that becomes an error. Entries missing a field or with an
/// unparseable date are skipped.
pub fn parse_feed(xml: &str) -> Result<Vec<SearchResult>, HeraldError> {
    let mut results = Vec::new();
    for entry in blocks(xml, "entry") {
        let Some(entry_id) = element(entry, "id")
            .map(decode_entities)
            .filter(|id| !id.trim().is_empty())
        else {
            warn!("arxiv: entry without id, skipping");
            continue;
        };
        if entry_id.contains("/api/errors") {
            let reason = element(entry, "summary")
                .map(|s| collapse_whitespace(&decode_entities(s)))
                .unwrap_or_else(|| "unknown error".into());
            return Err(HeraldError::Query(format!("arxiv rejected query: {reason}")));
        }

        let title = element(entry, "title")
            .map(|t| collapse_whitespace(&decode_entities(t)))
            .unwrap_or_default();
        let published = element(entry, "published")
            .and_then(|p| DateTime::parse_from_rfc3339(p.trim()).ok())
            .map(|p| p.with_timezone(&Utc));

        match published {
            Some(published) => results.push(SearchResult {
                entry_id: entry_id.trim().to_string(),
                title,
                published,
            }),
            None => warn!("arxiv: entry {entry_id} has no usable published date, skipping"),
        }
    }
    Ok(results)
}

/// Inner text of every `<tag ...>...</tag>` block at any depth.
fn blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some((body, after)) = next_block(rest, tag, &close) {
        out.push(body);
        rest = after;
    }
    out
}

/// Inner text of the first `<tag>` block.
fn element<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    next_block(xml, tag, &format!("</{tag}>")).map(|(body, _)| body)
}

fn next_block<'a>(xml: &'a str, tag: &str, close: &str) -> Option<(&'a str, &'a str)> {
    let open = format!("<{tag}");
    let mut search_from = 0;
    loop {
        let start = search_from + xml[search_from..].find(&open)?;
        let after_name = start + open.len();
        // `<id` must not match `<idx>`; the name ends at `>`, `/` or whitespace.
        if !matches!(
            xml[after_name..].chars().next(),
            Some('>' | '/' | ' ' | '\t' | '\n' | '\r')
        ) {
            search_from = after_name;
            continue;
        }
        let tag_end = after_name + xml[after_name..].find('>')?;
        let body_start = tag_end + 1;
        // `<tag/>` and `<tag a="b"/>` are empty elements with no closing tag.
        if xml[..tag_end].ends_with('/') {
            return Some(("", &xml[body_start..]));
        }
        let body_len = xml[body_start..].find(close)?;
        let body_end = body_start + body_len;
        return Some((&xml[body_start..body_end], &xml[body_end + close.len()..]));
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Titles arrive hard-wrapped; fold runs of whitespace into single spaces.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
