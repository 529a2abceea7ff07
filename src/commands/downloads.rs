//! Download, bulk edit and log handlers.
//!
//! Download and bulk edit go through the same endpoints a browser would hit,
//! with a nonce minted for the acting user.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use file_library::FileLibrary;
use file_library::ajax::{BULK_EDIT_NONCE_ACTION, FILE_NONCE_ACTION};
use serde_json::json;
use tracing::debug;

use crate::cli::{BulkEditArgs, DownloadArgs, LogArgs, parse_pair};

pub async fn run_download_command(library: &FileLibrary, args: &DownloadArgs) -> Result<()> {
    let requester = library.users().requester(args.user, args.ip.clone()).await?;
    let nonce = library.nonces().create(FILE_NONCE_ACTION, requester.user_id);
    let body = json!({ "nonce": nonce, "fileID": args.file_id });

    let response = library.ajax().dispatch("erifl_file", &body, &requester).await;
    println!("{}", serde_json::to_string(&response)?);
    if !response.success {
        bail!("download was not recorded");
    }
    Ok(())
}

pub async fn run_bulk_edit_command(library: &FileLibrary, args: &BulkEditArgs) -> Result<()> {
    let requester = library.users().requester(args.user, None).await?;
    let nonce = library.nonces().create(BULK_EDIT_NONCE_ACTION, requester.user_id);
    let roles = (!args.roles.is_empty()).then(|| args.roles.clone());
    let body = json!({
        "nonce": nonce,
        "post_ids": args.ids,
        "required_roles": roles,
        "required_meta_key": args.meta_key,
    });

    let response = library
        .ajax()
        .dispatch("erifl_save_bulk_edit", &body, &requester)
        .await;
    println!("{}", serde_json::to_string(&response)?);
    if !response.success {
        bail!("bulk edit was rejected");
    }
    Ok(())
}

pub async fn run_log_command(library: &FileLibrary, args: &LogArgs) -> Result<()> {
    let mut params = BTreeMap::new();
    let mut put = |key: &str, value: Option<String>| {
        if let Some(value) = value {
            params.insert(key.to_string(), value);
        }
    };
    put("user", args.user.clone());
    put("file", args.file.map(|id| id.to_string()));
    put("start_date", args.start.clone());
    put("end_date", args.end.clone());
    put("per_page", args.per_page.map(|n| n.to_string()));
    put("paged", Some(args.page.to_string()));
    for raw in &args.terms {
        let Some((taxonomy, slug)) = parse_pair(raw) else {
            bail!("invalid term filter `{raw}`, expected taxonomy=slug");
        };
        params.insert(taxonomy, slug);
    }
    debug!(?params, "log filters");

    let page = library.download_log_view().page_from_query(&params).await?;
    if args.html {
        println!("{}", page.render_html());
        return Ok(());
    }

    if page.rows.is_empty() {
        println!("No downloads found.");
        return Ok(());
    }
    for row in &page.rows {
        let terms: Vec<String> = row.terms.iter().map(|cell| cell.to_text()).collect();
        println!(
            "{}  {}  {}  {}",
            row.date,
            row.title_text(),
            row.user.to_text(),
            terms.join("  ")
        );
    }
    println!(
        "Page {} of {} ({} downloads, {} per page)",
        page.pagination.page, page.pagination.total_pages, page.pagination.total, page.pagination.per_page
    );
    Ok(())
}
