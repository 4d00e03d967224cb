//! Listing, naming and downloading images in the shared bucket.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::backend::{ObjectEntry, StorageApi};

/// Single page fetched per listing; there is no pagination.
pub const LIST_LIMIT: u32 = 100;

/// A displayable stored image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryImage {
    pub name: String,
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GalleryError {
    LoadFailed,
    NotFound(String),
    DownloadFailed(String),
}

impl fmt::Display for GalleryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GalleryError::LoadFailed => write!(f, "Failed to load images. Please try again."),
            GalleryError::NotFound(name) => write!(f, "No image named {name} in the gallery."),
            GalleryError::DownloadFailed(reason) => write!(f, "Download failed: {reason}"),
        }
    }
}

impl std::error::Error for GalleryError {}

/// `Idle → Loading → {Populated, Empty, Errored}`; a refresh re-enters `Loading`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GalleryState {
    #[default]
    Idle,
    Loading,
    Populated(Vec<GalleryImage>),
    Empty,
    Errored(String),
}

impl GalleryState {
    pub fn images(&self) -> &[GalleryImage] {
        match self {
            GalleryState::Populated(images) => images,
            _ => &[],
        }
    }
}

/// Drops folder placeholders and unnamed rows, keeping provider order.
fn displayable(entry: &ObjectEntry) -> Option<&str> {
    entry.id.as_ref()?;
    let name = entry.name.as_deref()?;
    (!name.is_empty() && !name.ends_with('/')).then_some(name)
}

pub struct GalleryClient {
    storage: StorageApi,
}

impl GalleryClient {
    pub fn new(storage: StorageApi) -> Self {
        Self { storage }
    }

    /// Lists the bucket root as displayable images.
    ///
    /// # Errors
    /// Returns [`GalleryError::LoadFailed`] for any backend failure.
    pub async fn list_images(
        &self,
        access_token: Option<&str>,
    ) -> Result<Vec<GalleryImage>, GalleryError> {
        let entries = self
            .storage
            .list(LIST_LIMIT, 0, access_token)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, bucket = self.storage.bucket(), "Error fetching images");
                GalleryError::LoadFailed
            })?;

        let images: Vec<GalleryImage> = entries
            .iter()
            .filter_map(|entry| {
                displayable(entry).map(|name| GalleryImage {
                    name: name.to_string(),
                    url: self.storage.public_url(name),
                    created_at: entry.created_at,
                })
            })
            .collect();
        tracing::debug!(listed = entries.len(), shown = images.len(), "Gallery listed");
        Ok(images)
    }

    /// Re-runs the listing and moves `state` through `Loading` to its result.
    pub async fn refresh(&self, state: &mut GalleryState, access_token: Option<&str>) {
        *state = GalleryState::Loading;
        *state = match self.list_images(access_token).await {
            Ok(images) if images.is_empty() => GalleryState::Empty,
            Ok(images) => GalleryState::Populated(images),
            Err(e) => GalleryState::Errored(e.to_string()),
        };
    }

    /// Looks `name` up in a fresh listing.
    ///
    /// # Errors
    /// Returns `LoadFailed` if listing fails, `NotFound` if no entry matches.
    pub async fn find(
        &self,
        name: &str,
        access_token: Option<&str>,
    ) -> Result<GalleryImage, GalleryError> {
        self.list_images(access_token)
            .await?
            .into_iter()
            .find(|image| image.name == name)
            .ok_or_else(|| GalleryError::NotFound(name.to_string()))
    }

    /// Saves the image's bytes as `dest_dir/<name>`. Returns the written path.
    ///
    /// # Errors
    /// Returns `DownloadFailed` if the fetch or the write fails.
    pub async fn download_image(
        &self,
        image: &GalleryImage,
        dest_dir: &Path,
    ) -> Result<PathBuf, GalleryError> {
        let file_name = Path::new(&image.name)
            .file_name()
            .ok_or_else(|| GalleryError::DownloadFailed(format!("bad name {}", image.name)))?;

        let bytes = self.storage.fetch_public(&image.url).await.map_err(|e| {
            tracing::error!(error = %e, url = %image.url, "Download failed");
            GalleryError::DownloadFailed(e.to_string())
        })?;

        let target = dest_dir.join(file_name);
        std::fs::create_dir_all(dest_dir)
            .and_then(|()| std::fs::write(&target, &bytes))
            .map_err(|e| {
                tracing::error!(error = %e, path = %target.display(), "Failed to save download");
                GalleryError::DownloadFailed(format!("{}: {e}", target.display()))
            })?;

        tracing::info!(path = %target.display(), size = bytes.len(), "Image downloaded");
        Ok(target)
    }
}

/// Human-friendly title for a stored file name: extension dropped, `-`/`_`
/// turned into spaces, each word capitalized.
pub fn display_name(file_name: &str) -> String {
    let stem = match file_name.rfind('.') {
        Some(idx) if idx + 1 < file_name.len() && !file_name[idx + 1..].contains('/') => {
            &file_name[..idx]
        }
        _ => file_name,
    };

    let mut out = String::with_capacity(stem.len());
    let mut at_word_start = true;
    for ch in stem.chars() {
        let ch = if ch == '-' || ch == '_' { ' ' } else { ch };
        if at_word_start && ch.is_alphanumeric() {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        at_word_start = !ch.is_alphanumeric();
    }
    out
}

/// Header line: "1 image stored", "3 images stored".
pub fn summary(count: usize) -> String {
    let plural = if count == 1 { "" } else { "s" };
    format!("{count} image{plural} stored")
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::backend::BackendConfig;

    fn client_for(server: &MockServer) -> GalleryClient {
        GalleryClient::new(StorageApi::new(
            BackendConfig::new(server.uri(), "anon-key"),
            reqwest::Client::new(),
            "public-uploads",
        ))
    }

    async fn mount_listing(server: &MockServer, status: u16, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/list/public-uploads"))
            .and(body_partial_json(
                serde_json::json!({"prefix": "", "limit": 100, "offset": 0}),
            ))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("my-summer_photo.jpg"), "My Summer Photo");
        assert_eq!(display_name("1700000000000_ab12cd.png"), "1700000000000 Ab12cd");
        assert_eq!(display_name("archive.tar.gz"), "Archive.Tar");
        assert_eq!(display_name("README"), "README");
        assert_eq!(display_name(".hidden"), "");
    }

    #[test]
    fn test_summary_pluralizes() {
        assert_eq!(summary(0), "0 images stored");
        assert_eq!(summary(1), "1 image stored");
        assert_eq!(summary(12), "12 images stored");
    }

    #[tokio::test]
    async fn test_list_filters_placeholders_and_keeps_order() {
        let server = MockServer::start().await;
        mount_listing(
            &server,
            200,
            serde_json::json!([
                {"name": "b.png", "id": "2", "created_at": "2024-05-02T10:00:00Z"},
                {"name": "folder/", "id": "3", "created_at": null},
                {"name": ".emptyFolderPlaceholder", "id": null},
                {"name": null, "id": "4"},
                {"name": "a.jpg", "id": "1", "created_at": "2024-05-01T10:00:00Z"}
            ]),
        )
        .await;

        let images = client_for(&server).list_images(None).await.unwrap();
        let names: Vec<&str> = images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["b.png", "a.jpg"]);
        assert_eq!(
            images[1].url,
            format!("{}/storage/v1/object/public/public-uploads/a.jpg", server.uri())
        );
        assert!(images[0].created_at.is_some());
    }

    #[tokio::test]
    async fn test_refresh_transitions() {
        let server = MockServer::start().await;
        mount_listing(&server, 200, serde_json::json!([])).await;
        let client = client_for(&server);

        let mut state = GalleryState::default();
        client.refresh(&mut state, None).await;
        assert_eq!(state, GalleryState::Empty);
        assert!(state.images().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_reports_failure() {
        let server = MockServer::start().await;
        mount_listing(
            &server,
            400,
            serde_json::json!({"error": "Bucket not found", "message": "Bucket not found"}),
        )
        .await;

        let mut state = GalleryState::Populated(vec![]);
        client_for(&server).refresh(&mut state, None).await;
        assert_eq!(
            state,
            GalleryState::Errored("Failed to load images. Please try again.".to_string())
        );
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/object/public/public-uploads/a.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let image = GalleryImage {
            name: "a.png".to_string(),
            url: format!("{}/storage/v1/object/public/public-uploads/a.png", server.uri()),
            created_at: None,
        };
        let dir = tempdir().unwrap();
        let written = client_for(&server)
            .download_image(&image, &dir.path().join("out"))
            .await
            .unwrap();
        assert_eq!(written, dir.path().join("out").join("a.png"));
        assert_eq!(std::fs::read(written).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_find_missing_image() {
        let server = MockServer::start().await;
        mount_listing(&server, 200, serde_json::json!([{"name": "a.png", "id": "1"}])).await;
        let err = client_for(&server).find("b.png", None).await.unwrap_err();
        assert_eq!(err, GalleryError::NotFound("b.png".to_string()));
    }
}
