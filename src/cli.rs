//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use file_library::files::{FileStatus, SortOrder};

/// Manage a library of downloadable files.
///
/// Files can be restricted to user roles or a user meta flag; every download
/// is counted and, with tracking enabled, logged for reports.
#[derive(Parser, Debug)]
#[command(name = "file-library")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to config.toml (defaults to $XDG_CONFIG_HOME/file-library/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database and print the effective configuration
    Init,

    /// Show or change persisted settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommand,
    },

    /// Manage taxonomy terms
    Term {
        #[command(subcommand)]
        command: TermCommand,
    },

    /// Manage file entries
    File {
        #[command(subcommand)]
        command: FileCommand,
    },

    /// Set the same requirements on several files
    BulkEdit(BulkEditArgs),

    /// Record a download as the given user and print the response
    Download(DownloadArgs),

    /// Show the download log
    Log(LogArgs),

    /// Show download reports
    Report {
        /// Rows per section (max 1000)
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..=1000))]
        qty: u32,
    },

    /// Export download counts as CSV
    Export {
        /// Acting user id (must be an administrator)
        #[arg(long)]
        user: i64,

        /// Output file (defaults to the site-derived filename in the current directory; `-` for stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render shortcodes in a piece of text
    Render(RenderArgs),

    /// Remove library data according to the delete-table setting
    Uninstall,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Print every setting with its effective value
    Show,
    /// Store a setting
    Set { name: String, value: String },
    /// Remove a setting so its default applies
    Unset { name: String },
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create a user
    Add {
        login: String,
        email: String,
        #[arg(long)]
        display_name: Option<String>,
        /// Role slug (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// Delete a user and its download history
    Delete { id: i64 },
    /// Set a user meta value
    Meta { id: i64, key: String, value: String },
}

#[derive(Subcommand, Debug)]
pub enum TermCommand {
    /// Create a term
    Add {
        taxonomy: String,
        name: String,
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Set the featured image of a term
    Image { term_id: i64, url: String },
}

#[derive(Subcommand, Debug)]
pub enum FileCommand {
    /// Create a file entry
    Add(FileAddArgs),
    /// Change fields of a file entry
    Update(FileUpdateArgs),
    /// Store a file on disk for an entry
    Upload {
        id: i64,
        path: PathBuf,
        /// Name to store under (defaults to the source file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Print a file entry as JSON
    Show { id: i64 },
    /// Delete a file entry, its stored file and its download history
    Delete { id: i64 },
    /// Print and clear pending upload notices
    Errors { id: i64 },
    /// List files like the file list shortcode does
    List(FileListArgs),
}

#[derive(Args, Debug)]
pub struct FileAddArgs {
    pub title: String,

    #[arg(long, default_value = "")]
    pub description: String,

    #[arg(long, default_value_t = FileStatus::Publish)]
    pub status: FileStatus,

    #[arg(long, default_value_t = 0)]
    pub author: i64,

    /// Required role slug (repeatable)
    #[arg(long = "role")]
    pub roles: Vec<String>,

    #[arg(long, default_value = "")]
    pub meta_key: String,

    /// Taxonomy term as `taxonomy=name` (repeatable)
    #[arg(long = "term")]
    pub terms: Vec<String>,
}

#[derive(Args, Debug)]
pub struct FileUpdateArgs {
    pub id: i64,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub status: Option<FileStatus>,

    /// Overwrite the download counter
    #[arg(long)]
    pub count: Option<i64>,

    /// Required role slug (repeatable); pass `--clear-roles` to remove all
    #[arg(long = "role")]
    pub roles: Vec<String>,

    #[arg(long)]
    pub clear_roles: bool,

    #[arg(long)]
    pub meta_key: Option<String>,

    #[arg(long)]
    pub image: Option<String>,
}

#[derive(Args, Debug)]
pub struct FileListArgs {
    /// Explicit file ids; other filters are ignored
    #[arg(long = "id", value_delimiter = ',')]
    pub ids: Vec<i64>,

    #[arg(long = "resource-type", value_delimiter = ',')]
    pub resource_types: Vec<String>,

    #[arg(long = "target-audience", value_delimiter = ',')]
    pub target_audiences: Vec<String>,

    #[arg(long = "format", value_delimiter = ',')]
    pub formats: Vec<String>,

    #[arg(long = "role", value_delimiter = ',')]
    pub roles: Vec<String>,

    #[arg(long = "meta-key", value_delimiter = ',')]
    pub meta_keys: Vec<String>,

    #[arg(long, default_value = "asc", value_parser = parse_sort_order)]
    pub order: SortOrder,

    /// Sort column: title, date, modified, id or downloads
    #[arg(long, default_value = "title")]
    pub orderby: String,

    /// Files per page; 0 lists every match
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(0..=500))]
    pub per_page: u32,

    #[arg(long, default_value_t = 1)]
    pub page: u32,
}

#[derive(Args, Debug)]
pub struct BulkEditArgs {
    /// Acting user id
    #[arg(long)]
    pub user: i64,

    /// File ids to edit
    #[arg(value_delimiter = ',')]
    pub ids: Vec<i64>,

    /// Required role slug (repeatable); none clears the requirement
    #[arg(long = "role")]
    pub roles: Vec<String>,

    #[arg(long, default_value = "")]
    pub meta_key: String,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    pub file_id: i64,

    /// Acting user id (0 for a guest)
    #[arg(long, default_value_t = 0)]
    pub user: i64,

    /// Client address of the request
    #[arg(long)]
    pub ip: Option<String>,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// User id, email, login or IP address
    #[arg(long)]
    pub user: Option<String>,

    #[arg(long)]
    pub file: Option<i64>,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,

    /// End date (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<String>,

    /// Term filter as `taxonomy=slug` (repeatable)
    #[arg(long = "term")]
    pub terms: Vec<String>,

    #[arg(long)]
    pub per_page: Option<u32>,

    #[arg(long, default_value_t = 1)]
    pub page: u64,

    /// Print the HTML table instead of plain rows
    #[arg(long)]
    pub html: bool,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Text containing shortcodes (reads stdin when omitted)
    pub text: Option<String>,

    /// Viewing user id (0 for a guest)
    #[arg(long, default_value_t = 0)]
    pub user: i64,

    /// Page custom field as `key=value` (repeatable)
    #[arg(long = "meta")]
    pub meta: Vec<String>,

    /// Value of the list page parameter
    #[arg(long, default_value_t = 1)]
    pub page: u64,

    /// URL of the rendering page
    #[arg(long, default_value = "")]
    pub permalink: String,
}

fn parse_sort_order(value: &str) -> Result<SortOrder, String> {
    Ok(SortOrder::parse(value))
}

/// Splits `key=value`, trimming both sides.
pub fn parse_pair(raw: &str) -> Option<(String, String)> {
    let (key, value) = raw.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Cli::try_parse_from(["file-library", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["file-library"]).is_err());
    }

    #[test]
    fn test_cli_global_flags_after_command() {
        let cli = Cli::try_parse_from(["file-library", "init", "-vv", "--config", "/tmp/c.toml"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Command::Init));
    }

    #[test]
    fn test_cli_file_add_collects_roles_and_terms() {
        let cli = Cli::try_parse_from([
            "file-library",
            "file",
            "add",
            "Guide",
            "--role",
            "editor",
            "--role",
            "subscriber",
            "--term",
            "erifl-resource-types=Guide",
            "--status",
            "draft",
        ])
        .unwrap();
        let Command::File {
            command: FileCommand::Add(args),
        } = cli.command
        else {
            panic!("expected file add");
        };
        assert_eq!(args.roles, vec!["editor", "subscriber"]);
        assert_eq!(args.terms, vec!["erifl-resource-types=Guide"]);
        assert_eq!(args.status, FileStatus::Draft);
    }

    #[test]
    fn test_cli_file_list_splits_commas() {
        let cli = Cli::try_parse_from(["file-library", "file", "list", "--id", "3,4", "--order", "DESC"]).unwrap();
        let Command::File {
            command: FileCommand::List(args),
        } = cli.command
        else {
            panic!("expected file list");
        };
        assert_eq!(args.ids, vec![3, 4]);
        assert_eq!(args.order, SortOrder::Desc);
        assert_eq!(args.per_page, 10);
    }

    #[test]
    fn test_cli_file_list_accepts_zero_per_page() {
        let cli = Cli::try_parse_from(["file-library", "file", "list", "--per-page", "0"]).unwrap();
        let Command::File {
            command: FileCommand::List(args),
        } = cli.command
        else {
            panic!("expected file list");
        };
        assert_eq!(args.per_page, 0);
        assert!(Cli::try_parse_from(["file-library", "file", "list", "--per-page", "501"]).is_err());
    }

    #[test]
    fn test_cli_download_defaults_to_guest() {
        let cli = Cli::try_parse_from(["file-library", "download", "7", "--ip", "203.0.113.5"]).unwrap();
        let Command::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.file_id, 7);
        assert_eq!(args.user, 0);
        assert_eq!(args.ip.as_deref(), Some("203.0.113.5"));
    }

    #[test]
    fn test_cli_report_qty_over_max_rejected() {
        let err = Cli::try_parse_from(["file-library", "report", "--qty", "1001"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_invalid_status_rejected() {
        assert!(Cli::try_parse_from(["file-library", "file", "add", "x", "--status", "gone"]).is_err());
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            parse_pair(" erifl-formats = pdf "),
            Some(("erifl-formats".to_string(), "pdf".to_string()))
        );
        assert_eq!(parse_pair("=x"), None);
        assert_eq!(parse_pair("novalue"), None);
    }
}
