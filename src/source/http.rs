use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;

use super::{SampleSource, SourceError};
use crate::model::{is_valid_region, TOP_ITEMS_LIMIT};

const COUNT_PATTERN: &str = r#"data-marker="page-title/count"[^>]*>([^<]*)<"#;
const ITEM_PATTERN: &str = r#"data-marker="item""#;
const ANCHOR_PATTERN: &str = r#"<a\b[^>]*>"#;
const HREF_PATTERN: &str = r#"\bhref="([^"]*)""#;

/// Scrapes the listing search page `{base}/{region}?q={query}`.
pub struct HttpSource {
    client: reqwest::Client,
    base: Url,
    timeout: Duration,
    count_re: Regex,
    item_re: Regex,
    anchor_re: Regex,
    href_re: Regex,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| SourceError::Transport(format!("invalid base URL '{base_url}': {e}")))?;
        // `Url::join` replaces the last path segment unless the path ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("listing-tracker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base,
            timeout,
            count_re: compile(COUNT_PATTERN)?,
            item_re: compile(ITEM_PATTERN)?,
            anchor_re: compile(ANCHOR_PATTERN)?,
            href_re: compile(HREF_PATTERN)?,
        })
    }

    fn search_url(&self, region: &str, query: &str) -> Result<Url, SourceError> {
        // Anything but a plain slug could make `join` leave the source host.
        if !is_valid_region(region) {
            return Err(SourceError::Transport(format!("invalid region '{region}'")));
        }
        let mut url = self
            .base
            .join(region)
            .map_err(|e| SourceError::Transport(format!("bad region '{region}': {e}")))?;
        url.query_pairs_mut().append_pair("q", query);
        Ok(url)
    }

    async fn fetch_page(&self, region: &str, query: &str) -> Result<String, SourceError> {
        let url = self.search_url(region, query)?;
        tracing::debug!(%url, "fetching search page");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout(self.timeout)
            } else {
                SourceError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))
    }

    fn parse_count(&self, html: &str) -> Result<u64, SourceError> {
        let raw = self
            .count_re
            .captures(html)
            .and_then(|c| c.get(1))
            .ok_or_else(|| SourceError::Unparsable("count marker not found".into()))?
            .as_str();

        let digits: String = raw
            .replace("&nbsp;", "")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        digits
            .parse()
            .map_err(|_| SourceError::Unparsable(format!("count text '{}'", raw.trim())))
    }

    fn parse_top_items(&self, html: &str) -> Vec<String> {
        let starts: Vec<usize> = self.item_re.find_iter(html).map(|m| m.start()).collect();

        starts
            .iter()
            .enumerate()
            .take(TOP_ITEMS_LIMIT)
            .filter_map(|(i, &start)| {
                let end = starts.get(i + 1).copied().unwrap_or(html.len());
                // Only the item's first anchor counts; without an href the item is skipped.
                let anchor = self.anchor_re.find(&html[start..end])?.as_str();
                let href = self.href_re.captures(anchor)?.get(1)?.as_str();
                // Relative links become absolute against the source.
                self.base.join(href).ok().map(String::from)
            })
            .collect()
    }
}

fn compile(pattern: &str) -> Result<Regex, SourceError> {
    Regex::new(pattern).map_err(|e| SourceError::Unparsable(format!("bad pattern: {e}")))
}

#[async_trait]
impl SampleSource for HttpSource {
    async fn fetch_count(&self, region: &str, query: &str) -> Result<u64, SourceError> {
        let html = self.fetch_page(region, query).await?;
        self.parse_count(&html)
    }

    async fn fetch_top_items(&self, region: &str, query: &str) -> Result<Vec<String>, SourceError> {
        let html = self.fetch_page(region, query).await?;
        Ok(self.parse_top_items(&html))
    }
}
