//! CLI entry point for the file library.

use anyhow::{Context, Result};
use clap::Parser;
use file_library::{FileLibrary, load_config};
use tracing::debug;

mod cli;
mod commands;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?cli, "CLI arguments parsed");

    let loaded = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    let library = FileLibrary::open(loaded.config.clone())
        .await
        .with_context(|| format!("failed to open {}", loaded.config.database_path.display()))?;

    let result = run(&library, &loaded, cli.command).await;
    library.close().await;
    result
}

async fn run(library: &FileLibrary, loaded: &file_library::LoadedConfig, command: Command) -> Result<()> {
    match command {
        Command::Init => commands::run_init_command(library, loaded),
        Command::Settings { command } => commands::run_settings_command(library, command).await,
        Command::User { command } => commands::run_user_command(library, command).await,
        Command::Term { command } => commands::run_term_command(library, command).await,
        Command::File { command } => commands::run_file_command(library, command).await,
        Command::BulkEdit(args) => commands::run_bulk_edit_command(library, &args).await,
        Command::Download(args) => commands::run_download_command(library, &args).await,
        Command::Log(args) => commands::run_log_command(library, &args).await,
        Command::Report { qty } => commands::run_report_command(library, qty).await,
        Command::Export { user, output } => commands::run_export_command(library, user, output).await,
        Command::Render(args) => commands::run_render_command(library, &args).await,
        Command::Uninstall => commands::run_uninstall_command(library).await,
    }
}
