use clap::{ArgGroup, Parser};
use photos_dl::{Album, AlbumReport, FailureRecord, RunSummary};
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "photos-dl", version)]
#[command(about = "Download photo albums into zip archives", long_about = None)]
#[command(group(ArgGroup::new("mode").args(["list", "album_id", "all"])))]
pub struct Cli {
    /// List all album titles and IDs, then exit
    #[arg(long)]
    pub list: bool,

    /// Download a specific album by its ID
    #[arg(long, value_name = "ALBUM_ID")]
    pub album_id: Option<String>,

    /// Download all albums
    #[arg(long)]
    pub all: bool,

    /// Directory the archives are written to
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Authorized-user token file
    #[arg(long, value_name = "FILE")]
    pub token_file: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

/// What the user asked for
#[derive(Debug, PartialEq, Eq)]
pub enum Mode {
    List,
    Album(String),
    All,
}

impl Cli {
    pub fn mode(&self) -> Option<Mode> {
        if self.list {
            Some(Mode::List)
        } else if let Some(id) = &self.album_id {
            Some(Mode::Album(id.clone()))
        } else if self.all {
            Some(Mode::All)
        } else {
            None
        }
    }
}

const RULE: &str = "------------------------------";

pub fn print_albums(out: &mut impl Write, albums: &[Album]) -> io::Result<()> {
    if albums.is_empty() {
        return writeln!(out, "No albums found in your library.");
    }
    writeln!(out, "Available Albums:")?;
    writeln!(out, "{}", RULE)?;
    for album in albums {
        writeln!(out, "  Title: {}", album.display_title())?;
        writeln!(out, "  ID:    {}", album.id)?;
        writeln!(out, "{}", RULE)?;
    }
    Ok(())
}

pub fn print_report(out: &mut impl Write, report: &AlbumReport) -> io::Result<()> {
    let failed = report.failed_items().count();
    writeln!(
        out,
        "{} ({}): {} succeeded, {} failed [{:?}]",
        report.album.display_title(),
        report.album.id,
        report.succeeded,
        failed,
        report.status
    )?;
    if let Some(path) = &report.archive {
        writeln!(out, "  archive: {}", path.display())?;
    }
    for record in &report.failed {
        match record {
            FailureRecord::Item {
                item,
                kind,
                attempts,
                message,
            } => writeln!(
                out,
                "  failed: {} ({}, {} attempt(s)): {}",
                item.filename, kind, attempts, message
            )?,
            FailureRecord::CatalogFailed { message, .. } => {
                writeln!(out, "  listing stopped early: {}", message)?
            }
        }
    }
    if let Some(reason) = &report.aborted_reason {
        writeln!(out, "  aborted: {}", reason)?;
    }
    Ok(())
}

pub fn print_summary(out: &mut impl Write, summary: &RunSummary) -> io::Result<()> {
    for report in &summary.reports {
        print_report(out, report)?;
    }
    for (album, error) in &summary.errors {
        writeln!(out, "{} ({}): error: {}", album.display_title(), album.id, error)?;
    }
    if let Some(error) = &summary.listing_error {
        writeln!(out, "album listing stopped early: {}", error)?;
    }
    writeln!(
        out,
        "Finished {} album(s): {} item(s) downloaded, {} failed.",
        summary.reports.len(),
        summary.total_succeeded(),
        summary.total_failed()
    )
}
