//! User and term handlers.

use anyhow::Result;
use file_library::{FileLibrary, NewUser};

use crate::cli::{TermCommand, UserCommand};

pub async fn run_user_command(library: &FileLibrary, command: UserCommand) -> Result<()> {
    match command {
        UserCommand::Add {
            login,
            email,
            display_name,
            roles,
        } => {
            let id = library
                .users()
                .create(&NewUser {
                    login: &login,
                    email: &email,
                    display_name: display_name.as_deref().unwrap_or(&login),
                    roles: &roles,
                })
                .await?;
            println!("Created user {id}");
        }
        UserCommand::Delete { id } => {
            let removed = library.delete_user(id).await?;
            println!("Deleted user {id} ({removed} download records removed)");
        }
        UserCommand::Meta { id, key, value } => {
            library.users().set_meta(id, &key, &value).await?;
            println!("{key} = {value}");
        }
    }
    Ok(())
}

pub async fn run_term_command(library: &FileLibrary, command: TermCommand) -> Result<()> {
    let taxonomies = library.taxonomies();
    match command {
        TermCommand::Add {
            taxonomy,
            name,
            parent,
        } => {
            let term = taxonomies.insert_term(&name, &taxonomy, parent).await?;
            println!("Created term {} ({})", term.id, term.slug);
        }
        TermCommand::Image { term_id, url } => {
            taxonomies.set_featured_image(term_id, &url).await?;
            println!("Set image of term {term_id}");
        }
    }
    Ok(())
}
