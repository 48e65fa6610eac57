use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::api::{
    DEFAULT_API_URL_TEMPLATE, DEFAULT_TIMEOUT_MS, MediaWikiClient, MediaWikiClientConfig,
    RevisionQuery, RevisionSnapshot, SearchQuery, WikiHistoryApi, api_url_for_language,
};
use crate::config::{DEFAULT_LANG, DEFAULT_LIMIT, DEFAULT_USER_AGENT};
use crate::markup::{MarkupStripper, WikitextStripper};
use crate::timestamp::{PointInTime, format_timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub page_id: i64,
    pub title: String,
    pub revision_id: i64,
    pub timestamp: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistorySettings {
    pub lang: String,
    pub limit: usize,
    pub strip_markup: bool,
    pub api_url_template: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            lang: DEFAULT_LANG.to_string(),
            limit: DEFAULT_LIMIT,
            strip_markup: true,
            api_url_template: DEFAULT_API_URL_TEMPLATE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            access_token: None,
        }
    }
}

impl HistorySettings {
    pub fn with_language(mut self, lang: &str) -> Self {
        self.lang = lang.to_string();
        self
    }

    pub fn client_config(&self) -> Result<MediaWikiClientConfig> {
        Ok(MediaWikiClientConfig {
            api_url: api_url_for_language(&self.api_url_template, &self.lang)?,
            user_agent: self.user_agent.clone(),
            timeout_ms: self.timeout_ms,
            access_token: self.access_token.clone(),
        })
    }
}

/// Looks up articles as they stood at a point in time.
pub struct WikipediaHistory {
    settings: HistorySettings,
    stripper: Box<dyn MarkupStripper>,
}

impl WikipediaHistory {
    pub fn new(settings: HistorySettings) -> Self {
        Self {
            settings,
            stripper: Box::new(WikitextStripper),
        }
    }

    pub fn with_stripper(mut self, stripper: impl MarkupStripper + 'static) -> Self {
        self.stripper = Box::new(stripper);
        self
    }

    /// Runs the search against the live API. The HTTP client lives for this
    /// call only and is shared by every request it makes.
    pub fn search(
        &self,
        query: &str,
        end_date: impl Into<PointInTime>,
    ) -> Result<Vec<ArticleRecord>> {
        let mut client = MediaWikiClient::new(self.settings.client_config()?)?;
        self.search_with_api(&mut client, query, end_date)
    }

    pub fn search_with_api<A: WikiHistoryApi>(
        &self,
        api: &mut A,
        query: &str,
        end_date: impl Into<PointInTime>,
    ) -> Result<Vec<ArticleRecord>> {
        let cutoff = format_timestamp(end_date);
        let limit = self.settings.limit;
        let page_ids = api.search_page_ids(&SearchQuery::new(query, limit))?;
        tracing::debug!(%query, %cutoff, hits = page_ids.len(), "search returned page ids");

        let mut records = Vec::with_capacity(page_ids.len().min(limit));
        for page_id in page_ids.into_iter().take(limit) {
            match api.revision_before(&RevisionQuery::new(page_id, &cutoff))? {
                Some(snapshot) => records.push(self.to_record(snapshot)),
                None => {
                    tracing::debug!(page_id, %cutoff, "no revision at or before cutoff, skipping");
                }
            }
        }

        tracing::info!(
            %query,
            %cutoff,
            lang = %self.settings.lang,
            articles = records.len(),
            requests = api.request_count(),
            "wikipedia history search complete"
        );
        Ok(records)
    }

    fn to_record(&self, snapshot: RevisionSnapshot) -> ArticleRecord {
        let content = match snapshot.content {
            Some(content) if self.settings.strip_markup => {
                Some(self.stripper.strip(&content).trim().to_string())
            }
            Some(content) => Some(content),
            None => {
                tracing::warn!(
                    page_id = snapshot.page_id,
                    revision_id = snapshot.revision_id,
                    "revision carries no content"
                );
                None
            }
        };

        ArticleRecord {
            page_id: snapshot.page_id,
            title: snapshot.title,
            revision_id: snapshot.revision_id,
            timestamp: snapshot.timestamp,
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{HistorySettings, WikipediaHistory};
    use crate::api::WikiHistoryApi;
    use crate::testing::{MockApi, snapshot};

    fn cutoff() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).expect("date")
    }

    fn settings(limit: usize, strip_markup: bool) -> HistorySettings {
        HistorySettings {
            limit,
            strip_markup,
            ..Default::default()
        }
    }

    fn seeded_api() -> MockApi {
        let mut api = MockApi::default();
        api.search_hits = vec![736, 42, 9];
        api.insert(snapshot(736, "Albert Einstein", 100, "2022-06-01T10:00:00Z", Some("'''Albert''' [[physicist]]")));
        api.insert(snapshot(42, "Future page", 101, "2023-05-01T00:00:00Z", Some("created later")));
        api.insert(snapshot(9, "Relativity", 102, "2021-01-01T00:00:00Z", Some("{{Infobox}}Theory")));
        api
    }

    #[test]
    fn search_formats_cutoff_and_bounds_search_by_limit() {
        let mut api = seeded_api();
        let history = WikipediaHistory::new(settings(3, true));

        history
            .search_with_api(&mut api, "Einstein", cutoff())
            .expect("search");

        assert_eq!(api.search_queries.len(), 1);
        assert_eq!(api.search_queries[0].srsearch, "Einstein");
        assert_eq!(api.search_queries[0].srlimit, 3);
        assert!(
            api.revision_queries
                .iter()
                .all(|query| query.rvstart == "2023-01-01T00:00:00Z")
        );
    }

    #[test]
    fn pages_without_qualifying_revision_are_dropped_in_order() {
        let mut api = seeded_api();
        let history = WikipediaHistory::new(settings(3, false));

        let records = history
            .search_with_api(&mut api, "Einstein", cutoff())
            .expect("search");

        let titles = records
            .iter()
            .map(|record| record.title.as_str())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["Albert Einstein", "Relativity"]);
        assert_eq!(
            api.revision_queries
                .iter()
                .map(|query| query.pageid)
                .collect::<Vec<_>>(),
            vec![736, 42, 9]
        );
        assert!(
            records
                .iter()
                .all(|record| record.timestamp.as_str() <= "2023-01-01T00:00:00Z")
        );
        assert_eq!(api.request_count(), 4);
    }

    #[test]
    fn output_never_exceeds_limit_or_hit_count() {
        let mut api = seeded_api();
        let history = WikipediaHistory::new(settings(1, false));
        let records = history
            .search_with_api(&mut api, "Einstein", cutoff())
            .expect("search");
        assert_eq!(records.len(), 1);
        assert_eq!(api.revision_queries.len(), 1);

        let mut api = seeded_api();
        api.search_hits = vec![736];
        let history = WikipediaHistory::new(settings(5, false));
        let records = history
            .search_with_api(&mut api, "Einstein", cutoff())
            .expect("search");
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn empty_search_yields_empty_records_without_revision_calls() {
        let mut api = MockApi::default();
        let history = WikipediaHistory::new(settings(2, true));
        let records = history
            .search_with_api(&mut api, "xyzabcnotarealwikipediaarticle123456", cutoff())
            .expect("search");
        assert!(records.is_empty());
        assert!(api.revision_queries.is_empty());
    }

    #[test]
    fn markup_is_stripped_only_when_enabled() {
        let mut api = seeded_api();
        let stripped = WikipediaHistory::new(settings(1, true))
            .search_with_api(&mut api, "Einstein", cutoff())
            .expect("search");
        assert_eq!(stripped[0].content.as_deref(), Some("Albert physicist"));

        let mut api = seeded_api();
        let raw = WikipediaHistory::new(settings(1, false))
            .search_with_api(&mut api, "Einstein", cutoff())
            .expect("search");
        assert_eq!(raw[0].content.as_deref(), Some("'''Albert''' [[physicist]]"));
    }

    #[test]
    fn injected_stripper_replaces_builtin() {
        let mut api = seeded_api();
        let history = WikipediaHistory::new(settings(1, true))
            .with_stripper(|text: &str| format!("  <{}>  ", text.len()));
        let records = history
            .search_with_api(&mut api, "Einstein", cutoff())
            .expect("search");
        assert_eq!(records[0].content.as_deref(), Some("<26>"));
    }

    #[test]
    fn absent_content_skips_stripping() {
        let mut api = MockApi::default();
        api.search_hits = vec![5];
        api.insert(snapshot(5, "Hidden", 55, "2020-01-01T00:00:00Z", None));
        let history = WikipediaHistory::new(settings(1, true)).with_stripper(|_: &str| -> String {
            panic!("stripper must not run without content")
        });
        let records = history
            .search_with_api(&mut api, "Hidden", cutoff())
            .expect("search");
        assert_eq!(records.len(), 1);
        assert!(records[0].content.is_none());
    }

    #[test]
    fn revision_failure_aborts_the_whole_search() {
        let mut api = seeded_api();
        api.fail_revision_for = Some(42);
        let history = WikipediaHistory::new(settings(3, false));
        let error = history
            .search_with_api(&mut api, "Einstein", cutoff())
            .expect_err("must fail");
        assert!(error.to_string().contains("HTTP 503"));
        assert_eq!(api.revision_queries.len(), 2);
    }

    #[test]
    fn repeated_searches_are_identical() {
        let history = WikipediaHistory::new(settings(3, true));
        let mut api = seeded_api();
        let first = history
            .search_with_api(&mut api, "Einstein", cutoff())
            .expect("first");
        let second = history
            .search_with_api(&mut api, "Einstein", cutoff())
            .expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn client_config_follows_language_and_token() {
        let settings = HistorySettings {
            access_token: Some("secret".to_string()),
            ..Default::default()
        }
        .with_language("fr");
        let config = settings.client_config().expect("config");
        assert_eq!(config.api_url, "https://fr.wikipedia.org/w/api.php");
        assert_eq!(config.access_token.as_deref(), Some("secret"));

        assert!(HistorySettings::default().with_language("../").client_config().is_err());
    }
}
