use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    mangafetch::logging::init().context("init logging")?;

    let cli = mangafetch::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        mangafetch::cli::Command::Search(args) => {
            mangafetch::download::search(args).await.context("search")?;
        }
        mangafetch::cli::Command::Chapters(args) => {
            mangafetch::download::chapters(args)
                .await
                .context("chapters")?;
        }
        mangafetch::cli::Command::Download(args) => {
            mangafetch::download::run(args).await.context("download")?;
        }
    }

    Ok(())
}
