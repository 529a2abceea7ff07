//! Shortcode render handler.

use std::io::{self, Read};

use anyhow::{Result, bail};
use file_library::{FileLibrary, RenderContext};

use crate::cli::{RenderArgs, parse_pair};

pub async fn run_render_command(library: &FileLibrary, args: &RenderArgs) -> Result<()> {
    let text = match &args.text {
        Some(text) => text.clone(),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let mut ctx = RenderContext {
        requester: library.users().requester(args.user, None).await?,
        list_page: args.page,
        permalink: args.permalink.clone(),
        ..RenderContext::default()
    };
    for raw in &args.meta {
        let Some((key, value)) = parse_pair(raw) else {
            bail!("invalid meta `{raw}`, expected key=value");
        };
        ctx.page_meta.insert(key, value);
    }

    let rendered = library.shortcodes().render(&text, &ctx).await?;
    println!("{rendered}");
    Ok(())
}
