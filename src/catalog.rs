use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::config::ClientConfig;
use crate::error::FetchError;
use crate::formats::{ChapterRecord, MangaRef};
use crate::range::ChapterFilter;
use crate::transport::{Transport, get_json};

pub const MAX_SEARCH_LIMIT: usize = 20;
pub const MAX_CHAPTER_PAGE_SIZE: usize = 100;

/// One page of a chapter listing.
#[derive(Debug, Clone, Default)]
pub struct ChapterPage {
    /// Records left after the filter.
    pub records: Vec<ChapterRecord>,
    /// Records the service returned before filtering.
    pub returned: usize,
    pub total: Option<usize>,
}

impl ChapterPage {
    pub fn has_more(&self, limit: usize, offset: usize) -> bool {
        if self.returned == 0 {
            return false;
        }
        match self.total {
            Some(total) => offset.saturating_add(self.returned) < total,
            None => self.returned >= limit,
        }
    }
}

pub struct CatalogClient {
    transport: Arc<dyn Transport>,
    api_url: String,
    uploads_url: String,
    language: String,
}

impl CatalogClient {
    pub fn new(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            api_url: config.api_url.clone(),
            uploads_url: config.uploads_url.clone(),
            language: config.language.clone(),
        }
    }

    pub fn search_by_title(
        &self,
        title: &str,
        result_limit: usize,
    ) -> Result<Vec<MangaRef>, FetchError> {
        let limit = result_limit.clamp(1, MAX_SEARCH_LIMIT);
        let mut url = endpoint(&self.api_url, &["manga"])?;
        url.query_pairs_mut()
            .append_pair("title", title.trim())
            .append_pair("limit", &limit.to_string())
            .append_pair("includes[]", "cover_art");

        tracing::info!(title, limit, "searching catalog");
        let value = get_json(self.transport.as_ref(), &url)?;
        let results = parse_search_results(&value, &self.uploads_url);
        if results.is_empty() && value.get("data").and_then(Value::as_array).is_none() {
            tracing::warn!(%url, "search response has no `data` array; treating as no matches");
        }
        Ok(results)
    }

    pub fn try_list_chapters(
        &self,
        manga_id: &str,
        limit: usize,
        offset: usize,
        filter: ChapterFilter,
    ) -> Result<ChapterPage, FetchError> {
        let limit = limit.clamp(1, MAX_CHAPTER_PAGE_SIZE);
        let mut url = endpoint(&self.api_url, &["chapter"])?;
        url.query_pairs_mut()
            .append_pair("manga", manga_id)
            .append_pair("translatedLanguage[]", &self.language)
            .append_pair("order[chapter]", "asc")
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());

        let value = get_json(self.transport.as_ref(), &url)?;
        let data = value
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::parse(url.as_str(), "missing `data` array"))?;

        let total = value
            .get("total")
            .and_then(Value::as_u64)
            .map(|total| total as usize);
        let records = data
            .iter()
            .filter_map(parse_chapter_record)
            .filter(|record| filter.matches(record.chapter.as_deref()))
            .collect::<Vec<_>>();

        tracing::debug!(
            manga_id,
            offset,
            returned = data.len(),
            kept = records.len(),
            %filter,
            "listed chapters"
        );

        Ok(ChapterPage {
            records,
            returned: data.len(),
            total,
        })
    }

    /// Failures are logged and reported as an empty page, which callers treat as end of data.
    pub fn list_chapters(
        &self,
        manga_id: &str,
        limit: usize,
        offset: usize,
        filter: ChapterFilter,
    ) -> Vec<ChapterRecord> {
        match self.try_list_chapters(manga_id, limit, offset, filter) {
            Ok(page) => page.records,
            Err(err) => {
                tracing::warn!(manga_id, offset, error = %err, "chapter listing failed");
                Vec::new()
            }
        }
    }
}

pub(crate) fn endpoint(base: &str, segments: &[&str]) -> Result<Url, FetchError> {
    let mut url = Url::parse(base).map_err(|err| FetchError::parse(base, err.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| FetchError::parse(base, "base url cannot carry a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn parse_search_results(value: &Value, uploads_url: &str) -> Vec<MangaRef> {
    let Some(data) = value.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };
    data.iter()
        .filter_map(|item| parse_manga_ref(item, uploads_url))
        .collect()
}

fn parse_manga_ref(item: &Value, uploads_url: &str) -> Option<MangaRef> {
    let id = item.get("id")?.as_str()?.trim();
    if id.is_empty() {
        return None;
    }
    let titles = item.pointer("/attributes/title")?.as_object()?;
    let title = resolve_title(titles)?;

    let cover_url = item
        .get("relationships")
        .and_then(Value::as_array)
        .and_then(|relationships| {
            relationships
                .iter()
                .find(|rel| rel.get("type").and_then(Value::as_str) == Some("cover_art"))
        })
        .and_then(|rel| rel.pointer("/attributes/fileName"))
        .and_then(Value::as_str)
        .map(|file_name| format!("{uploads_url}/covers/{id}/{file_name}"));

    Some(MangaRef {
        id: id.to_owned(),
        title,
        cover_url,
    })
}

/// English, then romanized Japanese, then the first usable label in key order.
fn resolve_title(titles: &serde_json::Map<String, Value>) -> Option<String> {
    let label = |key: &str| {
        titles
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    label("en")
        .or_else(|| label("ja-ro"))
        .or_else(|| {
            titles
                .values()
                .filter_map(Value::as_str)
                .map(str::trim)
                .find(|s| !s.is_empty())
        })
        .map(str::to_owned)
}

fn parse_chapter_record(item: &Value) -> Option<ChapterRecord> {
    let id = item.get("id")?.as_str()?.trim();
    if id.is_empty() {
        return None;
    }
    let attributes = item.get("attributes");
    let text = |key: &str| -> Option<String> {
        match attributes?.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };

    Some(ChapterRecord {
        id: id.to_owned(),
        chapter: text("chapter"),
        title: text("title").filter(|title| !title.trim().is_empty()),
        volume: text("volume"),
        pages: attributes
            .and_then(|attrs| attrs.get("pages"))
            .and_then(Value::as_u64)
            .and_then(|pages| u32::try_from(pages).ok()),
    })
}
