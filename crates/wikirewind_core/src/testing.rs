use std::collections::BTreeMap;

use anyhow::{Result, bail};

use crate::api::{RevisionQuery, RevisionSnapshot, SearchQuery, WikiHistoryApi};

/// In-memory stand-in for the MediaWiki API. Each page holds a single
/// revision, returned only when it is not newer than `rvstart`.
#[derive(Default)]
pub(crate) struct MockApi {
    pub search_hits: Vec<i64>,
    pub revisions: BTreeMap<i64, RevisionSnapshot>,
    pub fail_search: bool,
    pub fail_revision_for: Option<i64>,
    pub search_queries: Vec<SearchQuery>,
    pub revision_queries: Vec<RevisionQuery>,
    pub request_count: usize,
}

impl MockApi {
    pub fn insert(&mut self, snapshot: RevisionSnapshot) {
        self.revisions.insert(snapshot.page_id, snapshot);
    }
}

impl WikiHistoryApi for MockApi {
    fn search_page_ids(&mut self, query: &SearchQuery) -> Result<Vec<i64>> {
        self.request_count += 1;
        self.search_queries.push(query.clone());
        if self.fail_search {
            bail!("failed to call MediaWiki API: connection refused");
        }
        Ok(self.search_hits.clone())
    }

    fn revision_before(&mut self, query: &RevisionQuery) -> Result<Option<RevisionSnapshot>> {
        self.request_count += 1;
        self.revision_queries.push(query.clone());
        if self.fail_revision_for == Some(query.pageid) {
            bail!("MediaWiki API request failed with HTTP 503 Service Unavailable");
        }
        Ok(self
            .revisions
            .get(&query.pageid)
            .filter(|revision| revision.timestamp.as_str() <= query.rvstart.as_str())
            .cloned())
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

pub(crate) fn snapshot(
    page_id: i64,
    title: &str,
    revision_id: i64,
    timestamp: &str,
    content: Option<&str>,
) -> RevisionSnapshot {
    RevisionSnapshot {
        page_id,
        title: title.to_string(),
        revision_id,
        timestamp: timestamp.to_string(),
        content: content.map(ToString::to_string),
    }
}
