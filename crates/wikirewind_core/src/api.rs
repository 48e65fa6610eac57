use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const NS_MAIN: i32 = 0;
pub const DEFAULT_MAXLAG: u32 = 5;
pub const DEFAULT_API_URL_TEMPLATE: &str = "https://{lang}.wikipedia.org/w/api.php";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

const REVISION_PROPS: &str = "ids|timestamp|content";
const REVISION_SLOT: &str = "main";
const REVISION_DIR_OLDER: &str = "older";

/// `list=search` request for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub srsearch: String,
    pub srlimit: usize,
    pub srnamespace: i32,
    pub redirects: bool,
    pub maxlag: u32,
}

impl SearchQuery {
    pub fn new(query: &str, limit: usize) -> Self {
        Self {
            srsearch: query.to_string(),
            srlimit: limit,
            srnamespace: NS_MAIN,
            redirects: true,
            maxlag: DEFAULT_MAXLAG,
        }
    }

    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("action", "query".to_string()),
            ("list", "search".to_string()),
            ("srsearch", self.srsearch.clone()),
            ("srlimit", self.srlimit.to_string()),
            ("srnamespace", self.srnamespace.to_string()),
            ("redirects", u8::from(self.redirects).to_string()),
            ("maxlag", self.maxlag.to_string()),
        ]
    }
}

/// `prop=revisions` request for the newest revision of one page at or before `rvstart`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionQuery {
    pub pageid: i64,
    pub rvstart: String,
    pub rvlimit: u32,
    pub rvdir: &'static str,
    pub rvprop: &'static str,
    pub rvslots: &'static str,
    pub maxlag: u32,
}

impl RevisionQuery {
    pub fn new(pageid: i64, rvstart: &str) -> Self {
        Self {
            pageid,
            rvstart: rvstart.to_string(),
            rvlimit: 1,
            rvdir: REVISION_DIR_OLDER,
            rvprop: REVISION_PROPS,
            rvslots: REVISION_SLOT,
            maxlag: DEFAULT_MAXLAG,
        }
    }

    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("action", "query".to_string()),
            ("prop", "revisions".to_string()),
            ("pageids", self.pageid.to_string()),
            ("rvlimit", self.rvlimit.to_string()),
            ("rvdir", self.rvdir.to_string()),
            ("rvstart", self.rvstart.clone()),
            ("rvprop", self.rvprop.to_string()),
            ("rvslots", self.rvslots.to_string()),
            ("maxlag", self.maxlag.to_string()),
        ]
    }
}

/// A single revision as returned by the API, content trimmed but otherwise raw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionSnapshot {
    pub page_id: i64,
    pub title: String,
    pub revision_id: i64,
    pub timestamp: String,
    pub content: Option<String>,
}

pub trait WikiHistoryApi {
    fn search_page_ids(&mut self, query: &SearchQuery) -> Result<Vec<i64>>;
    fn revision_before(&mut self, query: &RevisionQuery) -> Result<Option<RevisionSnapshot>>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub access_token: Option<String>,
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    request_count: usize,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            request_count: 0,
        })
    }

    fn request_json_get(&mut self, params: &[(&'static str, String)]) -> Result<Value> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid MediaWiki API URL: {}", self.config.api_url))?;

        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format", "json".to_string()));
        pairs.push(("formatversion", "2".to_string()));
        pairs.extend(params.iter().cloned());

        let mut request = self
            .client
            .get(base_url)
            .header("User-Agent", self.config.user_agent.clone())
            .query(&pairs);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        self.request_count += 1;
        tracing::debug!(
            api_url = %self.config.api_url,
            request = self.request_count,
            "calling MediaWiki API"
        );
        let response = request.send().context("failed to call MediaWiki API")?;
        let status = response.status();
        if !status.is_success() {
            bail!("MediaWiki API request failed with HTTP {status}");
        }

        let payload: Value = response
            .json()
            .context("failed to decode MediaWiki API JSON response")?;
        if let Some(error) = payload.get("error") {
            let code = error
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            let info = error
                .get("info")
                .and_then(Value::as_str)
                .unwrap_or("unknown info");
            bail!("MediaWiki API error [{code}]: {info}");
        }
        Ok(payload)
    }
}

impl WikiHistoryApi for MediaWikiClient {
    fn search_page_ids(&mut self, query: &SearchQuery) -> Result<Vec<i64>> {
        let response = self.request_json_get(&query.params())?;
        parse_search_page_ids(response)
    }

    fn revision_before(&mut self, query: &RevisionQuery) -> Result<Option<RevisionSnapshot>> {
        let response = self.request_json_get(&query.params())?;
        parse_revision_snapshot(response, query.pageid)
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

/// Expand an API URL template such as `https://{lang}.wikipedia.org/w/api.php`.
pub fn api_url_for_language(template: &str, lang: &str) -> Result<String> {
    let lang = lang.trim();
    let valid = !lang.is_empty()
        && lang
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-');
    if !valid {
        bail!("invalid language code: {lang:?}");
    }
    Ok(template.replace("{lang}", &lang.to_ascii_lowercase()))
}

pub fn parse_search_page_ids(payload: Value) -> Result<Vec<i64>> {
    let parsed: SearchResponse =
        serde_json::from_value(payload).context("failed to decode search API response")?;
    Ok(parsed.query.search.into_iter().map(|hit| hit.pageid).collect())
}

pub fn parse_revision_snapshot(
    payload: Value,
    requested_page_id: i64,
) -> Result<Option<RevisionSnapshot>> {
    let parsed: RevisionResponse =
        serde_json::from_value(payload).context("failed to decode revisions API response")?;

    let page = match parsed.query.pages.into_iter().next() {
        Some(page) => page,
        None => return Ok(None),
    };
    if page.missing.unwrap_or(false) || page.invalid.unwrap_or(false) {
        return Ok(None);
    }
    let revision = match page.revisions.into_iter().next() {
        Some(revision) => revision,
        None => return Ok(None),
    };
    let content = revision
        .slots
        .and_then(|slots| slots.main)
        .and_then(|slot| slot.content)
        .map(|content| content.trim().to_string());

    Ok(Some(RevisionSnapshot {
        page_id: page.pageid.unwrap_or(requested_page_id),
        title: page.title,
        revision_id: revision.revid,
        timestamp: revision.timestamp,
        content,
    }))
}

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    query: SearchPayload,
}

#[derive(Debug, Deserialize, Default)]
struct SearchPayload {
    #[serde(default)]
    search: Vec<SearchQueryItem>,
}

#[derive(Debug, Deserialize)]
struct SearchQueryItem {
    pageid: i64,
}

#[derive(Debug, Deserialize, Default)]
struct RevisionResponse {
    #[serde(default)]
    query: RevisionPayload,
}

#[derive(Debug, Deserialize, Default)]
struct RevisionPayload {
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    pageid: Option<i64>,
    #[serde(default)]
    title: String,
    missing: Option<bool>,
    invalid: Option<bool>,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    revid: i64,
    timestamp: String,
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    content: Option<String>,
}
