//! Gallery command handlers.

use std::path::Path;

use anyhow::Result;
use comfy_table::{ContentArrangement, Table};
use photobox_core::config::Config;
use photobox_core::gallery::{GalleryState, display_name, summary};

use super::{Services, open_store};

/// Set to skip launching a browser in `gallery open` (just print the URL).
const NO_BROWSER_ENV: &str = "PHOTOBOX_NO_BROWSER";

fn stored_token() -> Option<String> {
    open_store().access_token().ok().flatten()
}

pub async fn list(config: &Config) -> Result<()> {
    let services = Services::new(config)?;
    let token = stored_token();

    let mut state = GalleryState::default();
    services.gallery().refresh(&mut state, token.as_deref()).await;

    match state {
        GalleryState::Populated(images) => {
            println!("Image Gallery - {}", summary(images.len()));
            let mut table = Table::new();
            table
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["Name", "Title", "Uploaded", "URL"]);
            for image in &images {
                let uploaded = image
                    .created_at
                    .map_or_else(|| "-".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string());
                table.add_row(vec![
                    image.name.clone(),
                    display_name(&image.name),
                    uploaded,
                    image.url.clone(),
                ]);
            }
            println!("{table}");
            Ok(())
        }
        GalleryState::Empty => {
            println!("No images found");
            println!("Upload images to your bucket to get started.");
            Ok(())
        }
        GalleryState::Errored(message) => anyhow::bail!(message),
        GalleryState::Idle | GalleryState::Loading => {
            anyhow::bail!("Failed to load images. Please try again.")
        }
    }
}

pub async fn download(config: &Config, name: &str, out: &Path) -> Result<()> {
    let services = Services::new(config)?;
    let token = stored_token();
    let gallery = services.gallery();

    let image = gallery.find(name, token.as_deref()).await?;
    let written = gallery.download_image(&image, out).await?;
    println!("Saved {}", written.display());
    Ok(())
}

pub async fn open(config: &Config, name: &str) -> Result<()> {
    let services = Services::new(config)?;
    let token = stored_token();

    let image = services.gallery().find(name, token.as_deref()).await?;
    println!("{}", image.url);
    if std::env::var_os(NO_BROWSER_ENV).is_none()
        && let Err(e) = open::that(&image.url)
    {
        tracing::warn!(error = %e, url = %image.url, "Failed to open browser");
        eprintln!("Could not open a browser; use the URL above.");
    }
    Ok(())
}
