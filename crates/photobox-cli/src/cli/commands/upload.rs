//! Upload and delete command handlers.

use anyhow::{Result, anyhow};
use photobox_core::config::Config;
use photobox_core::upload::UploadCandidate;

use super::{Services, open_store};

pub async fn upload(config: &Config, path: &str) -> Result<()> {
    let candidate =
        UploadCandidate::from_path(path).map_err(|e| anyhow!("Upload failed: {e:#}"))?;
    let services = Services::new(config)?;
    let store = open_store();

    eprintln!("Uploading {}...", candidate.name);
    let uploaded = services
        .uploads()
        .upload(&store, candidate)
        .await
        .map_err(|e| anyhow!("Upload failed: {e}"))?;

    println!("Upload successful! The image is now available in your gallery.");
    println!("{}", uploaded.public_url);
    Ok(())
}

pub async fn delete(config: &Config, url: &str) -> Result<()> {
    let services = Services::new(config)?;
    let store = open_store();

    let key = services
        .uploads()
        .delete(&store, url)
        .await
        .map_err(|e| anyhow!("Delete failed: {e}"))?;

    tracing::info!(%key, "Image deleted");
    println!("Image deleted successfully!");
    Ok(())
}
