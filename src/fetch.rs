use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

use crate::assets::AssetResolver;
use crate::cancel::CancelToken;
use crate::error::FetchError;
use crate::formats::{AssetManifest, ChapterRecord};
use crate::range::parse_chapter_number;
use crate::sequence::{SequenceOrder, is_staging_name, sequenced_name};
use crate::transport::Transport;

const UNSAFE_PATH_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Written { bytes: usize },
    Skipped,
}

#[derive(Debug, Clone)]
pub struct PageFailure {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct ChapterDownload {
    pub dir: PathBuf,
    pub manifest: AssetManifest,
    pub fetched: usize,
    pub skipped: usize,
    pub failed: Vec<PageFailure>,
    /// The completeness shortcut fired and no page was requested.
    pub already_complete: bool,
}

impl ChapterDownload {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Fetcher {
    transport: Arc<dyn Transport>,
    resolver: AssetResolver,
    order: SequenceOrder,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, resolver: AssetResolver, order: SequenceOrder) -> Self {
        Self {
            transport,
            resolver,
            order,
        }
    }

    /// Existence of `destination` alone marks the page as done.
    pub fn fetch_asset(&self, url: &str, destination: &Path) -> Result<FetchOutcome, FetchError> {
        if destination.exists() {
            return Ok(FetchOutcome::Skipped);
        }

        let url = Url::parse(url).map_err(|err| FetchError::parse(url, err.to_string()))?;
        let bytes = self.transport.get(&url)?;
        std::fs::write(destination, &bytes)
            .map_err(|err| FetchError::filesystem(destination, err))?;
        Ok(FetchOutcome::Written { bytes: bytes.len() })
    }

    pub fn download_chapter(
        &self,
        chapter: &ChapterRecord,
        manga_title: &str,
        base_path: &Path,
        cancel: &CancelToken,
    ) -> Result<ChapterDownload, FetchError> {
        let dir = chapter_dir(base_path, manga_title, chapter);
        std::fs::create_dir_all(&dir).map_err(|err| FetchError::filesystem(&dir, err))?;

        let manifest = self.resolver.resolve_manifest(&chapter.id)?;
        let page_count = manifest.page_count();

        let mut download = ChapterDownload {
            dir,
            manifest,
            fetched: 0,
            skipped: 0,
            failed: Vec::new(),
            already_complete: false,
        };

        // Stray files inflate this count; accepted.
        let existing = count_files(&download.dir)?;
        if existing >= page_count {
            tracing::info!(
                chapter_id = %chapter.id,
                dir = %download.dir.display(),
                existing,
                page_count,
                "chapter already fully downloaded"
            );
            download.already_complete = true;
            return Ok(download);
        }

        for (idx, filename) in download.manifest.filenames.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            if !is_plain_file_name(filename) {
                tracing::warn!(chapter_id = %chapter.id, page = %filename, "refusing unsafe page filename");
                download.failed.push(PageFailure {
                    filename: filename.clone(),
                    error: "unsafe page filename".to_owned(),
                });
                continue;
            }

            if self.order == SequenceOrder::Manifest
                && download
                    .dir
                    .join(sequenced_name(idx, page_count, filename))
                    .exists()
            {
                download.skipped += 1;
                continue;
            }

            let url = download.manifest.page_url(filename);
            let destination = download.dir.join(filename);
            match self.fetch_asset(&url, &destination) {
                Ok(FetchOutcome::Written { bytes }) => {
                    tracing::debug!(page = %filename, bytes, "fetched page");
                    download.fetched += 1;
                }
                Ok(FetchOutcome::Skipped) => download.skipped += 1,
                Err(err) => {
                    tracing::warn!(chapter_id = %chapter.id, %url, error = %err, "page download failed");
                    download.failed.push(PageFailure {
                        filename: filename.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(download)
    }
}

/// `Ch. NNN` from the floored chapter number, else the raw value or `unknown`, plus ` - title`.
pub fn chapter_label(chapter: &ChapterRecord) -> String {
    let raw = chapter.chapter.as_deref().map(str::trim).unwrap_or_default();
    let mut label = match parse_chapter_number(raw) {
        Some(number) => format!("Ch. {:03}", number.floor() as i64),
        None if raw.is_empty() => "Ch. unknown".to_owned(),
        None => format!("Ch. {raw}"),
    };
    if let Some(title) = chapter.title.as_deref().filter(|t| !t.trim().is_empty()) {
        label.push_str(" - ");
        label.push_str(title.trim());
    }
    label
}

/// Strips `\ / * ? : " < > |`; a result that is empty or all dots becomes `_`.
pub fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| !UNSAFE_PATH_CHARS.contains(c)).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return "_".to_owned();
    }
    cleaned.to_owned()
}

pub fn chapter_dir(base_path: &Path, manga_title: &str, chapter: &ChapterRecord) -> PathBuf {
    base_path
        .join(sanitize_segment(manga_title))
        .join(sanitize_segment(&chapter_label(chapter)))
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

fn count_files(dir: &Path) -> Result<usize, FetchError> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir).map_err(|err| FetchError::filesystem(dir, err))? {
        let entry = entry.map_err(|err| FetchError::filesystem(dir, err))?;
        if is_staging_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        if entry.path().is_file() {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::catalog::tests::CannedTransport;
    use crate::config::ClientConfig;

    fn record(chapter: Option<&str>, title: Option<&str>) -> ChapterRecord {
        ChapterRecord {
            id: "c1".to_owned(),
            chapter: chapter.map(str::to_owned),
            title: title.map(str::to_owned),
            volume: None,
            pages: None,
        }
    }

    fn fetcher(transport: CannedTransport) -> (Fetcher, Arc<CannedTransport>) {
        let transport = Arc::new(transport);
        let config = ClientConfig::default()
            .with_overrides(Some("http://catalog.test"), None)
            .unwrap();
        let resolver = AssetResolver::new(transport.clone(), &config);
        (
            Fetcher::new(transport.clone(), resolver, SequenceOrder::Manifest),
            transport,
        )
    }

    fn chapter_transport() -> CannedTransport {
        CannedTransport::default()
            .with(
                "/at-home/server/c1",
                json!({
                    "baseUrl": "http://images.test",
                    "chapter": {"hash": "h", "data": ["p1.png", "p2.png", "p3.png"]}
                }),
            )
            .with("/data/h/p1.png", json!("one"))
            .with("/data/h/p3.png", json!("three"))
    }

    #[test]
    fn chapter_labels() {
        assert_eq!(chapter_label(&record(Some("7"), None)), "Ch. 007");
        assert_eq!(chapter_label(&record(Some("12.5"), None)), "Ch. 012");
        assert_eq!(
            chapter_label(&record(Some("3"), Some("The Start"))),
            "Ch. 003 - The Start"
        );
        assert_eq!(chapter_label(&record(Some("Extra"), None)), "Ch. Extra");
        assert_eq!(chapter_label(&record(Some(""), None)), "Ch. unknown");
        assert_eq!(chapter_label(&record(None, Some(" "))), "Ch. unknown");
    }

    #[test]
    fn sanitize_strips_path_unsafe_characters() {
        assert_eq!(sanitize_segment(r#"Who? What: <A/B> "C" | D\E*"#), "Who What AB C  DE");
        assert_eq!(sanitize_segment(".."), "_");
        assert_eq!(sanitize_segment("///"), "_");
    }

    #[test]
    fn chapter_dir_sanitizes_both_segments() {
        let dir = chapter_dir(
            Path::new("out"),
            "Re:Zero",
            &record(Some("1"), Some("Why? / Because")),
        );
        assert_eq!(dir, Path::new("out").join("ReZero").join("Ch. 001 - Why  Because"));
    }

    #[test]
    fn fetch_asset_skips_existing_file_without_network() {
        let temp = tempfile::TempDir::new().unwrap();
        let destination = temp.path().join("p1.png");
        std::fs::write(&destination, "local").unwrap();
        let (fetcher, transport) = fetcher(CannedTransport::default());

        let outcome = fetcher
            .fetch_asset("http://images.test/data/h/p1.png", &destination)
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Skipped);
        assert!(transport.requests.lock().unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "local");
    }

    #[test]
    fn failed_page_does_not_stop_the_rest() {
        let temp = tempfile::TempDir::new().unwrap();
        let (fetcher, _) = fetcher(chapter_transport());

        let download = fetcher
            .download_chapter(
                &record(Some("1"), None),
                "Foo",
                temp.path(),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(download.fetched, 2);
        assert_eq!(download.failed.len(), 1);
        assert_eq!(download.failed[0].filename, "p2.png");
        assert!(download.dir.join("p1.png").exists());
        assert!(download.dir.join("p3.png").exists());
    }

    #[test]
    fn sequenced_pages_are_not_fetched_again() {
        let temp = tempfile::TempDir::new().unwrap();
        let (fetcher, transport) = fetcher(chapter_transport());
        let dir = chapter_dir(temp.path(), "Foo", &record(Some("1"), None));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("001.png"), "one").unwrap();

        let download = fetcher
            .download_chapter(
                &record(Some("1"), None),
                "Foo",
                temp.path(),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(download.skipped, 1);
        let requested: Vec<String> = transport
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|url| url.path().to_owned())
            .collect();
        assert!(!requested.contains(&"/data/h/p1.png".to_owned()));
    }

    #[test]
    fn full_directory_short_circuits() {
        let temp = tempfile::TempDir::new().unwrap();
        let (fetcher, transport) = fetcher(chapter_transport());
        let dir = chapter_dir(temp.path(), "Foo", &record(Some("1"), None));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["001.png", "002.png", "003.png"] {
            std::fs::write(dir.join(name), name).unwrap();
        }

        let download = fetcher
            .download_chapter(
                &record(Some("1"), None),
                "Foo",
                temp.path(),
                &CancelToken::new(),
            )
            .unwrap();

        assert!(download.already_complete);
        assert_eq!(transport.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn leftover_staging_files_do_not_count_as_pages() {
        let temp = tempfile::TempDir::new().unwrap();
        let (fetcher, transport) = fetcher(chapter_transport());
        let dir = chapter_dir(temp.path(), "Foo", &record(Some("1"), None));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("001.png"), "one").unwrap();
        std::fs::write(dir.join(".renumber-abc-0"), "stale").unwrap();
        std::fs::write(dir.join(".renumber-abc-1"), "stale").unwrap();

        let download = fetcher
            .download_chapter(
                &record(Some("1"), None),
                "Foo",
                temp.path(),
                &CancelToken::new(),
            )
            .unwrap();

        assert!(!download.already_complete);
        assert_eq!(download.skipped, 1);
        assert_eq!(download.fetched, 1);
        assert!(transport.requests.lock().unwrap().len() > 1);
    }

    #[test]
    fn manifest_failure_is_surfaced() {
        let temp = tempfile::TempDir::new().unwrap();
        let (fetcher, _) = fetcher(CannedTransport::default().with(
            "/at-home/server/c1",
            json!({"baseUrl": "http://images.test", "chapter": {"hash": "h", "data": []}}),
        ));

        let err = fetcher
            .download_chapter(
                &record(Some("1"), None),
                "Foo",
                temp.path(),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, FetchError::Manifest { .. }));
    }

    #[test]
    fn cancellation_stops_before_next_page() {
        let temp = tempfile::TempDir::new().unwrap();
        let (fetcher, _) = fetcher(chapter_transport());
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = fetcher
            .download_chapter(&record(Some("1"), None), "Foo", temp.path(), &cancel)
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
    }
}
