//! The `search_wikipedia` tool surface: request parsing, result rendering and
//! error reporting. Everything here returns text; nothing escapes as an error.

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::api::WikiHistoryApi;
use crate::history::{ArticleRecord, HistorySettings, WikipediaHistory};
use crate::timestamp::{CutoffDateError, PointInTime, parse_cutoff_date};

pub const TOOL_NAME: &str = "search_wikipedia";
pub const TOOL_TITLE: &str = "Search Wikipedia with time travel";
pub const TOOL_DESCRIPTION: &str = "Search Wikipedia and retrieve articles as they existed before a specific date. \
Useful for historical timelines, biographical data, scientific concepts, reference statistics, and base rates.";
pub const TOOL_INSTRUCTIONS: &str = "Use this tool to search Wikipedia articles as they existed at a specific point in time. \
This is useful for historical research, fact-checking, and getting information from a specific date. \
The tool retrieves article content from Wikipedia's revision history before the specified cutoff date.";

pub const MAX_CONTENT_CHARS: usize = 50_000;
pub const TRUNCATION_MARKER: &str = "[Article truncated due to length...]";
pub const NO_CONTENT_MARKER: &str = "[No content available for this revision]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub query: String,
    #[serde(default)]
    pub cutoff_date: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
}

impl ToolRequest {
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            cutoff_date: None,
            lang: None,
        }
    }

    pub fn with_cutoff_date(mut self, cutoff_date: &str) -> Self {
        self.cutoff_date = Some(cutoff_date.to_string());
        self
    }

    pub fn with_lang(mut self, lang: &str) -> Self {
        self.lang = Some(lang.to_string());
        self
    }

    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value).context("invalid search_wikipedia arguments")
    }

    fn cutoff_date_or_today(&self) -> String {
        self.cutoff_date.clone().unwrap_or_else(today_cutoff_date)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub instructions: &'static str,
    pub input_schema: Value,
}

pub fn tool_descriptor() -> ToolDescriptor {
    ToolDescriptor {
        name: TOOL_NAME,
        title: TOOL_TITLE,
        description: TOOL_DESCRIPTION,
        instructions: TOOL_INSTRUCTIONS,
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query string"
                },
                "cutoff_date": {
                    "type": "string",
                    "description": "ISO format date (YYYY-MM-DD) - retrieve articles as they existed before this date",
                    "format": "date"
                },
                "lang": {
                    "type": "string",
                    "description": "Two letter language code",
                    "default": crate::config::DEFAULT_LANG
                }
            },
            "required": ["query"]
        }),
    }
}

pub fn today_cutoff_date() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Run the tool against the live API.
pub fn search_wikipedia(request: &ToolRequest, settings: &HistorySettings) -> String {
    let settings = match &request.lang {
        Some(lang) if !lang.trim().is_empty() => settings.clone().with_language(lang.trim()),
        _ => settings.clone(),
    };
    let history = WikipediaHistory::new(settings);
    run_tool(request, |query, end_date| history.search(query, end_date))
}

/// Run the tool against any API implementation; `request.lang` is the caller's concern.
pub fn search_wikipedia_with_api<A: WikiHistoryApi>(
    request: &ToolRequest,
    history: &WikipediaHistory,
    api: &mut A,
) -> String {
    run_tool(request, |query, end_date| {
        history.search_with_api(api, query, end_date)
    })
}

fn run_tool<F>(request: &ToolRequest, search: F) -> String
where
    F: FnOnce(&str, PointInTime) -> Result<Vec<ArticleRecord>>,
{
    let cutoff_date = request.cutoff_date_or_today();
    let outcome = parse_cutoff_date(&cutoff_date)
        .map_err(anyhow::Error::from)
        .and_then(|end_date| search(&request.query, end_date));

    match outcome {
        Ok(records) => render_articles(&request.query, &cutoff_date, &records),
        Err(error) => render_error(&cutoff_date, &error),
    }
}

pub fn render_articles(query: &str, cutoff_date: &str, records: &[ArticleRecord]) -> String {
    if records.is_empty() {
        return format!("No Wikipedia articles found for query: {query}");
    }
    records
        .iter()
        .map(|record| render_article(record, cutoff_date))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_article(record: &ArticleRecord, cutoff_date: &str) -> String {
    let content = match record.content.as_deref() {
        Some(content) => truncate_content(content),
        None => NO_CONTENT_MARKER.to_string(),
    };
    format!(
        "=== {} ===\nLast revision before {}: {}\n\n{}\n",
        record.title, cutoff_date, record.timestamp, content
    )
}

pub fn truncate_content(content: &str) -> String {
    match content.char_indices().nth(MAX_CONTENT_CHARS) {
        Some((cut, _)) => format!("{}\n\n{TRUNCATION_MARKER}", &content[..cut]),
        None => content.to_string(),
    }
}

fn render_error(cutoff_date: &str, error: &anyhow::Error) -> String {
    if let Some(date_error) = error.downcast_ref::<CutoffDateError>() {
        tracing::warn!(%cutoff_date, "rejected cutoff date");
        return format!(
            "Error parsing date '{cutoff_date}'. Please use ISO format (YYYY-MM-DD): {date_error}"
        );
    }
    let detail = format!("{error:#}");
    tracing::error!(error = %detail, "wikipedia search failed");
    format!("Error searching Wikipedia: {detail}")
}
