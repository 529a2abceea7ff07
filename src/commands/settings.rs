//! Init, settings and uninstall handlers.

use anyhow::{Context, Result};
use file_library::settings::keys;
use file_library::{FileLibrary, LoadedConfig};

use crate::cli::SettingsCommand;

pub fn run_init_command(library: &FileLibrary, loaded: &LoadedConfig) -> Result<()> {
    let config = library.config();
    let resolved_path = loaded.path.as_ref().map_or_else(
        || "<unresolved>".to_string(),
        |path| path.display().to_string(),
    );
    println!("config_path = {resolved_path}");
    println!(
        "config_file = {}",
        if loaded.loaded_from_file {
            "loaded"
        } else {
            "not found (using defaults)"
        }
    );
    println!("database_path = {}", config.database_path.display());
    println!("uploads_dir = {}", config.uploads_dir.display());
    println!("base_url = {}", config.base_url);
    println!("site_url = {}", config.site_url);
    println!("download_table = {}", config.download_table());
    Ok(())
}

pub async fn run_settings_command(library: &FileLibrary, command: SettingsCommand) -> Result<()> {
    let settings = library.settings();
    match command {
        SettingsCommand::Show => {
            for key in keys::ALL {
                match settings.get(key).await? {
                    Some(value) => println!("{key} = {value}"),
                    None => println!("{key} = <default>"),
                }
            }
            let effective = settings.load().await?;
            println!("{}", serde_json::to_string_pretty(&effective)?);
        }
        SettingsCommand::Set { name, value } => match name.as_str() {
            keys::FOLDER => {
                let folder = settings
                    .set_folder_name(&library.config().uploads_dir, &value)
                    .await
                    .context("failed to change the upload folder")?;
                println!("{name} = {folder}");
            }
            keys::TRACKING => {
                library
                    .set_tracking(file_library::helpers::parse_bool(&value))
                    .await?;
                println!("{name} = {value}");
            }
            _ => {
                settings.set(&name, &value).await?;
                println!("{name} = {value}");
            }
        },
        SettingsCommand::Unset { name } => {
            if settings.delete(&name).await? {
                println!("{name} removed");
            } else {
                println!("{name} was not set");
            }
        }
    }
    Ok(())
}

pub async fn run_uninstall_command(library: &FileLibrary) -> Result<()> {
    let dropped = library.uninstall().await?;
    if dropped {
        println!("Dropped table {}", library.downloads().table());
    } else {
        println!("Kept table {}", library.downloads().table());
    }
    Ok(())
}
