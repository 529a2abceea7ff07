//! File entry handlers.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use file_library::files::{FileListQuery, FileOrderBy};
use file_library::helpers::format_bytes;
use file_library::listing::Pagination;
use file_library::{FileLibrary, FileUpdate, NewFile};

use crate::cli::{FileAddArgs, FileCommand, FileListArgs, FileUpdateArgs, parse_pair};

pub async fn run_file_command(library: &FileLibrary, command: FileCommand) -> Result<()> {
    match command {
        FileCommand::Add(args) => add(library, &args).await,
        FileCommand::Update(args) => update(library, &args).await,
        FileCommand::Upload { id, path, name } => {
            let name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("upload path has no file name")?,
            };
            let file = library.files().save_upload(id, &path, &name).await?;
            let url = library.files().file_url(id).await?.unwrap_or_default();
            println!(
                "Stored {} for file {}",
                file.file_name.as_deref().unwrap_or_default(),
                file.id
            );
            println!("{url}");
            Ok(())
        }
        FileCommand::Show { id } => {
            let file = library.files().require(id).await?;
            println!("{}", serde_json::to_string_pretty(&file)?);
            if let Some(size) = stored_size(library, id).await? {
                println!("File size: {size}");
            }
            Ok(())
        }
        FileCommand::Delete { id } => {
            library.files().delete(id).await?;
            println!("Deleted file {id}");
            Ok(())
        }
        FileCommand::Errors { id } => {
            let notices = library.files().take_upload_errors(id).await?;
            if notices.is_empty() {
                println!("No upload errors");
            }
            if let Some(name) = notices.duplicate_of {
                println!("Another file already exists with the same file name: {name}");
            }
            if let Some(message) = notices.storage_error {
                println!("Upload failed: {message}");
            }
            Ok(())
        }
        FileCommand::List(args) => list(library, &args).await,
    }
}

/// Human-readable size of the stored file, if one is on disk.
async fn stored_size(library: &FileLibrary, id: i64) -> Result<Option<String>> {
    let Some(path) = library.files().file_path(id).await? else {
        return Ok(None);
    };
    Ok(tokio::fs::metadata(&path)
        .await
        .ok()
        .map(|meta| format_bytes(meta.len())))
}

fn term_groups(raw: &[String]) -> Result<BTreeMap<String, Vec<String>>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in raw {
        let Some((taxonomy, name)) = parse_pair(item) else {
            bail!("invalid term `{item}`, expected taxonomy=name");
        };
        groups.entry(taxonomy).or_default().push(name);
    }
    Ok(groups)
}

async fn add(library: &FileLibrary, args: &FileAddArgs) -> Result<()> {
    let groups = term_groups(&args.terms)?;
    let file = library
        .files()
        .create(&NewFile {
            title: &args.title,
            status: args.status,
            author_id: args.author,
            description: &args.description,
            required_roles: &args.roles,
            required_meta_key: &args.meta_key,
        })
        .await?;
    for (taxonomy, names) in &groups {
        library
            .taxonomies()
            .set_file_terms(file.id, taxonomy, names)
            .await?;
    }
    if !groups.is_empty() {
        library.files().flush_lists();
    }

    let settings = library.settings().load().await?;
    println!("Created file {}", file.id);
    println!("{}", settings.shortcode_snippet(file.id));
    Ok(())
}

async fn update(library: &FileLibrary, args: &FileUpdateArgs) -> Result<()> {
    let required_roles = if args.clear_roles {
        Some(Vec::new())
    } else if args.roles.is_empty() {
        None
    } else {
        Some(args.roles.clone())
    };
    let file = library
        .files()
        .update_details(
            args.id,
            &FileUpdate {
                title: args.title.clone(),
                status: args.status,
                description: args.description.clone(),
                download_count: args.count,
                required_roles,
                required_meta_key: args.meta_key.clone(),
                featured_image: args.image.clone(),
            },
        )
        .await?;
    println!("Updated file {}", file.id);
    Ok(())
}

async fn list(library: &FileLibrary, args: &FileListArgs) -> Result<()> {
    let page = args.page.max(1);
    let mut query = FileListQuery {
        file_ids: args.ids.clone(),
        resource_types: args.resource_types.clone(),
        target_audiences: args.target_audiences.clone(),
        formats: args.formats.clone(),
        required_roles: args.roles.clone(),
        required_meta_keys: args.meta_keys.clone(),
        order: args.order,
        order_by: FileOrderBy::parse(&args.orderby),
        per_page: args.per_page,
        offset: (page - 1).saturating_mul(args.per_page),
    };
    let mut result = library.files().get_files(&query).await?;

    // A page size of 0 lists every match on one page.
    let (shown_page, total_pages) = if args.per_page == 0 {
        (1, 1)
    } else {
        let pagination = Pagination::new(
            u64::try_from(result.count).unwrap_or(0),
            args.per_page,
            u64::from(page),
        );
        if pagination.page < u64::from(page) {
            query.offset = u32::try_from(pagination.offset()).unwrap_or(u32::MAX);
            result = library.files().get_files(&query).await?;
        }
        (pagination.page, pagination.total_pages)
    };

    if result.files.is_empty() {
        println!("No files found");
        return Ok(());
    }
    for file in &result.files {
        let size = stored_size(library, file.id).await?.unwrap_or_else(|| "-".to_string());
        println!(
            "{:>6}  {:<40}  {:<8}  {:>6}  {}",
            file.id,
            file.title,
            file.status_str,
            file.download_count,
            size
        );
    }
    println!("Page {shown_page} of {total_pages}");
    Ok(())
}
