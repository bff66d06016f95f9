use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::sequence::SequenceOrder;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search the catalog by title.
    Search(SearchArgs),
    /// List one page of a manga's chapters as JSON lines.
    Chapters(ChaptersArgs),
    /// Download every chapter not yet recorded in the ledger.
    Download(DownloadArgs),
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Free-text title.
    #[arg(long)]
    pub title: String,

    /// Maximum results (the service caps this at 20).
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Print JSON lines instead of tab-separated columns.
    #[arg(long)]
    pub json: bool,

    /// Catalog API base URL (overrides MANGAFETCH_API_URL).
    #[arg(long)]
    pub api_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct ChaptersArgs {
    #[arg(long)]
    pub manga_id: String,

    /// `<number>` or `<number>-<number>`.
    #[arg(long)]
    pub chapters: Option<String>,

    #[arg(long, default_value_t = 100)]
    pub limit: usize,

    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Translated language code (overrides MANGAFETCH_LANGUAGE).
    #[arg(long)]
    pub language: Option<String>,

    #[arg(long)]
    pub api_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Title to search for; the first match is downloaded unless --pick says otherwise.
    #[arg(long, required_unless_present = "manga_id")]
    pub title: Option<String>,

    /// Download this catalog id directly, skipping the search.
    #[arg(long)]
    pub manga_id: Option<String>,

    /// 1-based index into the search results.
    #[arg(long, default_value_t = 1)]
    pub pick: usize,

    /// `<number>` for one chapter or `<number>-<number>` for an inclusive range.
    #[arg(long)]
    pub chapters: Option<String>,

    /// Output directory for `<manga>/<chapter>/` trees.
    #[arg(long, default_value = "manga-downloads")]
    pub out: PathBuf,

    /// Completion ledger shared across runs.
    #[arg(long, default_value = "log.json")]
    pub ledger: PathBuf,

    /// Chapters requested per listing page.
    #[arg(long, default_value_t = 5)]
    pub page_size: usize,

    /// Listing offset to start from.
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Page ordering used when renumbering downloaded files.
    #[arg(long, value_enum, default_value_t = SequenceOrder::Manifest)]
    pub order: SequenceOrder,

    #[arg(long)]
    pub language: Option<String>,

    #[arg(long)]
    pub api_url: Option<String>,
}
