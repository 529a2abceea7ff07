//! Report and export handlers.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use file_library::{FileLibrary, export_filename};

pub async fn run_report_command(library: &FileLibrary, qty: u32) -> Result<()> {
    for section in library.report().sections(qty).await? {
        println!("{}", section.render_text());
    }
    Ok(())
}

pub async fn run_export_command(library: &FileLibrary, user: i64, output: Option<PathBuf>) -> Result<()> {
    let requester = library.users().requester(user, None).await?;
    let report = library.report();

    if output.as_deref().is_some_and(|path| path.as_os_str() == "-") {
        report.export_counts_csv(&requester, io::stdout().lock()).await?;
        return Ok(());
    }

    let path = output.unwrap_or_else(|| PathBuf::from(export_filename(&library.config().site_url)));
    let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    let rows = report
        .export_counts_csv(&requester, BufWriter::new(file))
        .await?;
    eprintln!("Wrote {rows} rows to {}", path.display());
    Ok(())
}
