use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;

use crate::assets::AssetResolver;
use crate::cancel::CancelToken;
use crate::catalog::{CatalogClient, ChapterPage, MAX_CHAPTER_PAGE_SIZE};
use crate::cli::{ChaptersArgs, DownloadArgs, SearchArgs};
use crate::config::ClientConfig;
use crate::error::FetchError;
use crate::fetch::{Fetcher, chapter_label};
use crate::formats::{ChapterRecord, MangaRef};
use crate::ledger::Ledger;
use crate::range::ChapterFilter;
use crate::sequence::{SequenceOrder, renumber};
use crate::transport::{HttpTransport, Transport};

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub out_dir: PathBuf,
    pub page_size: usize,
    pub offset: usize,
    pub filter: ChapterFilter,
}

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    PageListed {
        offset: usize,
        returned: usize,
        selected: usize,
    },
    ChapterSkipped {
        chapter_id: String,
        label: String,
    },
    ChapterStarted {
        chapter_id: String,
        label: String,
    },
    ChapterCompleted {
        chapter_id: String,
        dir: PathBuf,
        fetched: usize,
    },
    /// Left out of the ledger so the next run retries the missing pages.
    ChapterIncomplete {
        chapter_id: String,
        dir: PathBuf,
        failed_pages: usize,
    },
    ChapterFailed {
        chapter_id: String,
        error: String,
    },
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub completed: usize,
    pub skipped: usize,
    pub incomplete: usize,
    pub failed: usize,
    pub cancelled: bool,
}

pub struct Downloader {
    catalog: CatalogClient,
    fetcher: Fetcher,
    ledger: Ledger,
    order: SequenceOrder,
    cancel: CancelToken,
}

impl Downloader {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &ClientConfig,
        ledger: Ledger,
        order: SequenceOrder,
    ) -> Self {
        let catalog = CatalogClient::new(Arc::clone(&transport), config);
        let resolver = AssetResolver::new(Arc::clone(&transport), config);
        let fetcher = Fetcher::new(transport, resolver, order);
        Self {
            catalog,
            fetcher,
            ledger,
            order,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn catalog(&self) -> &CatalogClient {
        &self.catalog
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn search(&self, title: &str, limit: usize) -> Result<Vec<MangaRef>, FetchError> {
        self.catalog.search_by_title(title, limit)
    }

    /// Pages through the manga's chapters and downloads every one not yet in the ledger.
    pub fn download(
        &mut self,
        manga: &MangaRef,
        options: &DownloadOptions,
        on_event: &mut dyn FnMut(&DownloadEvent),
    ) -> DownloadSummary {
        let limit = options.page_size.clamp(1, MAX_CHAPTER_PAGE_SIZE);
        let mut offset = options.offset;
        let mut in_flight = HashSet::new();
        let mut summary = DownloadSummary::default();

        tracing::info!(manga_id = %manga.id, title = %manga.title, filter = %options.filter, "starting download");

        loop {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let page = match self
                .catalog
                .try_list_chapters(&manga.id, limit, offset, options.filter)
            {
                Ok(page) => page,
                Err(err) => {
                    tracing::warn!(offset, error = %err, "chapter listing failed; stopping");
                    break;
                }
            };
            on_event(&DownloadEvent::PageListed {
                offset,
                returned: page.returned,
                selected: page.records.len(),
            });
            if page.returned == 0 {
                tracing::info!(offset, "no more chapters");
                break;
            }

            for chapter in &page.records {
                if self.cancel.is_cancelled() {
                    summary.cancelled = true;
                    break;
                }
                if !in_flight.insert(chapter.id.clone()) {
                    tracing::debug!(chapter_id = %chapter.id, "chapter listed twice; ignoring");
                    continue;
                }
                self.process_chapter(manga, chapter, options, &mut summary, on_event);
            }
            if summary.cancelled || !page.has_more(limit, offset) {
                break;
            }
            offset += page.returned;
        }

        if summary.cancelled {
            on_event(&DownloadEvent::Cancelled);
        }
        tracing::info!(
            completed = summary.completed,
            skipped = summary.skipped,
            incomplete = summary.incomplete,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "download finished"
        );
        summary
    }

    fn process_chapter(
        &mut self,
        manga: &MangaRef,
        chapter: &ChapterRecord,
        options: &DownloadOptions,
        summary: &mut DownloadSummary,
        on_event: &mut dyn FnMut(&DownloadEvent),
    ) {
        let chapter_id = chapter.id.clone();
        let label = chapter_label(chapter);

        if self.ledger.contains(&chapter_id) {
            tracing::debug!(%chapter_id, %label, "already in ledger; skipping");
            summary.skipped += 1;
            on_event(&DownloadEvent::ChapterSkipped { chapter_id, label });
            return;
        }

        tracing::info!(%chapter_id, %label, "downloading chapter");
        on_event(&DownloadEvent::ChapterStarted {
            chapter_id: chapter_id.clone(),
            label,
        });

        let fail = |summary: &mut DownloadSummary, error: String| {
            summary.failed += 1;
            DownloadEvent::ChapterFailed {
                chapter_id: chapter_id.clone(),
                error,
            }
        };

        let download = match self.fetcher.download_chapter(
            chapter,
            &manga.title,
            &options.out_dir,
            &self.cancel,
        ) {
            Ok(download) => download,
            Err(FetchError::Cancelled) => {
                summary.cancelled = true;
                return;
            }
            Err(err) => {
                tracing::error!(%chapter_id, error = %err, "chapter download failed");
                on_event(&fail(summary, err.to_string()));
                return;
            }
        };

        // Lexicographic renumbering only runs on a complete chapter.
        if self.order == SequenceOrder::Lexicographic && !download.is_complete() {
            tracing::debug!(%chapter_id, "deferring renumber until the chapter is complete");
        } else if let Err(err) =
            renumber(&download.dir, self.order, &download.manifest.filenames)
        {
            tracing::error!(%chapter_id, error = %err, "renumbering failed");
            on_event(&fail(summary, err.to_string()));
            return;
        }

        if !download.is_complete() {
            summary.incomplete += 1;
            on_event(&DownloadEvent::ChapterIncomplete {
                chapter_id: chapter_id.clone(),
                dir: download.dir,
                failed_pages: download.failed.len(),
            });
            return;
        }

        if let Err(err) = self.ledger.record_completed(&chapter_id) {
            tracing::error!(%chapter_id, error = %err, "ledger update failed");
            on_event(&fail(summary, err.to_string()));
            return;
        }

        summary.completed += 1;
        on_event(&DownloadEvent::ChapterCompleted {
            chapter_id: chapter_id.clone(),
            dir: download.dir,
            fetched: download.fetched,
        });
    }
}

pub async fn search(args: SearchArgs) -> anyhow::Result<()> {
    let config = ClientConfig::from_env()
        .context("load config")?
        .with_overrides(args.api_url.as_deref(), None)?;
    let json = args.json;

    let results = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<MangaRef>> {
        let transport = HttpTransport::new(&config)?;
        let catalog = CatalogClient::new(Arc::new(transport), &config);
        Ok(catalog.search_by_title(&args.title, args.limit)?)
    })
    .await
    .context("join search worker")??;

    if results.is_empty() {
        if json {
            eprintln!("No manga found.");
        } else {
            println!("No manga found.");
        }
        return Ok(());
    }
    for manga in results {
        if json {
            println!("{}", serde_json::to_string(&manga).context("serialize search result")?);
        } else {
            println!(
                "{}\t{}\t{}",
                manga.id,
                manga.title,
                manga.cover_url.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

pub async fn chapters(args: ChaptersArgs) -> anyhow::Result<()> {
    let config = ClientConfig::from_env()
        .context("load config")?
        .with_overrides(args.api_url.as_deref(), args.language.as_deref())?;
    let filter: ChapterFilter = args
        .chapters
        .as_deref()
        .unwrap_or_default()
        .parse()
        .context("parse --chapters")?;

    let page = tokio::task::spawn_blocking(move || -> anyhow::Result<ChapterPage> {
        let transport = HttpTransport::new(&config)?;
        let catalog = CatalogClient::new(Arc::new(transport), &config);
        catalog
            .try_list_chapters(&args.manga_id, args.limit, args.offset, filter)
            .context("list chapters")
    })
    .await
    .context("join chapters worker")??;

    for record in &page.records {
        println!("{}", serde_json::to_string(record).context("serialize chapter record")?);
    }
    Ok(())
}

pub async fn run(args: DownloadArgs) -> anyhow::Result<()> {
    let config = ClientConfig::from_env()
        .context("load config")?
        .with_overrides(args.api_url.as_deref(), args.language.as_deref())?;
    let filter: ChapterFilter = args
        .chapters
        .as_deref()
        .unwrap_or_default()
        .parse()
        .context("parse --chapters")?;

    let cancel = CancelToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after the current request");
            on_ctrl_c.cancel();
        }
    });

    let (manga, summary) =
        tokio::task::spawn_blocking(move || run_blocking(args, config, filter, cancel))
            .await
            .context("join download worker")??;

    println!(
        "Downloaded {} chapter(s) of {} ({} already done, {} incomplete, {} failed{})",
        summary.completed,
        manga.title,
        summary.skipped,
        summary.incomplete,
        summary.failed,
        if summary.cancelled { ", cancelled" } else { "" }
    );
    Ok(())
}

fn run_blocking(
    args: DownloadArgs,
    config: ClientConfig,
    filter: ChapterFilter,
    cancel: CancelToken,
) -> anyhow::Result<(MangaRef, DownloadSummary)> {
    let transport = Arc::new(HttpTransport::new(&config)?);
    let ledger = Ledger::load(&args.ledger);
    tracing::debug!(path = %ledger.path().display(), entries = ledger.len(), "loaded ledger");

    let mut downloader =
        Downloader::new(transport, &config, ledger, args.order).with_cancel_token(cancel);

    let manga = match (args.manga_id, args.title) {
        (Some(id), title) => MangaRef {
            title: title.unwrap_or_else(|| id.clone()),
            id,
            cover_url: None,
        },
        (None, Some(title)) => pick_match(&downloader, &title, args.pick)?,
        (None, None) => anyhow::bail!("either --title or --manga-id is required"),
    };

    let options = DownloadOptions {
        out_dir: args.out,
        page_size: args.page_size,
        offset: args.offset,
        filter,
    };
    let summary = downloader.download(&manga, &options, &mut log_event);
    Ok((manga, summary))
}

fn pick_match(downloader: &Downloader, title: &str, pick: usize) -> anyhow::Result<MangaRef> {
    let pick = pick.max(1);
    let mut results = downloader
        .search(title, pick)
        .with_context(|| format!("search {title:?}"))?;
    if results.is_empty() {
        anyhow::bail!("no manga found matching {title:?}");
    }
    if pick > results.len() {
        anyhow::bail!("--pick {pick} but only {} match(es) for {title:?}", results.len());
    }
    let manga = results.swap_remove(pick - 1);
    tracing::info!(id = %manga.id, title = %manga.title, "selected manga");
    Ok(manga)
}

fn log_event(event: &DownloadEvent) {
    match event {
        DownloadEvent::PageListed {
            offset,
            returned,
            selected,
        } => tracing::info!(offset, returned, selected, "chapter page"),
        DownloadEvent::ChapterSkipped { label, .. } => {
            tracing::info!(%label, "skipping already downloaded chapter")
        }
        DownloadEvent::ChapterStarted { .. } => {}
        DownloadEvent::ChapterCompleted { dir, fetched, .. } => {
            tracing::info!(dir = %dir.display(), fetched, "chapter done")
        }
        DownloadEvent::ChapterIncomplete {
            dir, failed_pages, ..
        } => tracing::warn!(dir = %dir.display(), failed_pages, "chapter incomplete"),
        DownloadEvent::ChapterFailed { chapter_id, error } => {
            tracing::warn!(%chapter_id, %error, "chapter failed")
        }
        DownloadEvent::Cancelled => tracing::warn!("download cancelled"),
    }
}
