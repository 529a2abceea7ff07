//! CLI command handlers.

mod directory;
mod downloads;
mod files;
mod render;
mod report;
mod settings;

pub use directory::{run_term_command, run_user_command};
pub use downloads::{run_bulk_edit_command, run_download_command, run_log_command};
pub use files::run_file_command;
pub use render::run_render_command;
pub use report::{run_export_command, run_report_command};
pub use settings::{run_init_command, run_settings_command, run_uninstall_command};
