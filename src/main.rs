mod cli;

use clap::{CommandFactory, Parser};
use cli::{Cli, Mode};
use photos_dl::{AlbumDownloader, Config, Error, cancel_on_signal};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "photos_dl=debug"
    } else {
        "photos_dl=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(code = e.error_code(), error = %e, "run failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> photos_dl::Result<ExitCode> {
    let Some(mode) = cli.mode() else {
        Cli::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(dir) = cli.output_dir {
        config.download.output_dir = dir;
    }
    if let Some(token_file) = cli.token_file {
        config.auth.token_file = token_file;
    }

    let downloader = AlbumDownloader::new(config)?;
    let mut stdout = std::io::stdout().lock();

    match mode {
        Mode::List => {
            let (albums, err) = downloader.scan_albums().await;
            if err.is_none() || !albums.is_empty() {
                cli::print_albums(&mut stdout, &albums)?;
            }
            if let Some(e) = err {
                return Err(Error::Catalog(e));
            }
        }
        Mode::Album(album_id) => {
            tokio::spawn(cancel_on_signal(downloader.cancellation_token()));
            let report = downloader.download_album_by_id(&album_id).await?;
            cli::print_report(&mut stdout, &report)?;
        }
        Mode::All => {
            tokio::spawn(cancel_on_signal(downloader.cancellation_token()));
            let summary = downloader.download_all().await?;
            cli::print_summary(&mut stdout, &summary)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
