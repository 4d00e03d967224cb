//! Image upload and deletion against the shared bucket.

use std::fmt;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use crate::backend::{AuthApi, BackendError, BackendErrorKind, StorageApi};
use crate::credentials::CredentialStore;
use crate::images::{
    extension_for_mime, mime_type_for_extension, normalize_input_path, sniff_mime_type,
};
use crate::kv::KeyValueStore;

/// MIME types accepted for upload (`image/jpg` is a non-standard alias some
/// pickers report).
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

/// 5 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

const KEY_SUFFIX_LEN: usize = 6;
const SNIFF_LEN: u64 = 512;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A file chosen for upload.
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    pub name: String,
    /// Declared content type (may be empty when unknown)
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadCandidate {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Reads a candidate from disk. The content type comes from the extension,
    /// falling back to sniffing the leading bytes. Files over
    /// [`MAX_UPLOAD_BYTES`] are rejected from their metadata without reading
    /// the contents.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or has no file name, or an
    /// [`UploadError`] when the file is oversized.
    pub fn from_path(raw: &str) -> Result<Self> {
        let path = normalize_input_path(raw);
        let name = file_name(&path)
            .with_context(|| format!("No file name in {}", path.display()))?;
        let size = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?
            .len();

        if size > MAX_UPLOAD_BYTES {
            let mime_type = match mime_type_for_extension(&name) {
                Some(mime) => Some(mime),
                None => sniff_mime_type(&read_head(&path)?),
            };
            let kind = if mime_type.is_some_and(|m| ALLOWED_MIME_TYPES.contains(&m)) {
                UploadErrorKind::TooLarge
            } else {
                UploadErrorKind::InvalidType
            };
            tracing::debug!(%name, size, ?kind, "Upload candidate rejected before reading");
            return Err(UploadError::new(kind).into());
        }

        let bytes =
            std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let mime_type = mime_type_for_extension(&name)
            .or_else(|| sniff_mime_type(&bytes))
            .unwrap_or_default();
        tracing::debug!(%name, %mime_type, size = bytes.len(), "Upload candidate loaded");

        Ok(Self::new(name, mime_type, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Leading bytes for content sniffing.
fn read_head(path: &Path) -> Result<Vec<u8>> {
    let file =
        std::fs::File::open(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut head = Vec::new();
    file.take(SNIFF_LEN)
        .read_to_end(&mut head)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(head)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

/// Classified upload / delete failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadErrorKind {
    InvalidType,
    TooLarge,
    NotSignedIn,
    SessionExpired,
    PermissionDenied,
    AlreadyExists,
    InvalidUrl,
    /// Any other failure, carrying the provider or transport message
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadError {
    pub kind: UploadErrorKind,
}

impl UploadError {
    pub fn new(kind: UploadErrorKind) -> Self {
        Self { kind }
    }

    pub fn message(&self) -> String {
        match &self.kind {
            UploadErrorKind::InvalidType => {
                "Please select a valid image file (JPG, PNG, GIF, WEBP)".to_string()
            }
            UploadErrorKind::TooLarge => "File size must be less than 5MB".to_string(),
            UploadErrorKind::NotSignedIn => "You must be logged in to upload files.".to_string(),
            UploadErrorKind::SessionExpired => {
                "Authentication required. Please sign in again.".to_string()
            }
            UploadErrorKind::PermissionDenied => {
                "Upload permission denied. Please check your storage bucket policies.".to_string()
            }
            UploadErrorKind::AlreadyExists => {
                "File with this name already exists. Please try again.".to_string()
            }
            UploadErrorKind::InvalidUrl => "Could not extract file name from URL".to_string(),
            UploadErrorKind::Other(message) => message.clone(),
        }
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for UploadError {}

impl From<UploadErrorKind> for UploadError {
    fn from(kind: UploadErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Maps a storage write failure onto upload error kinds.
pub fn classify_storage_error(error: &BackendError) -> UploadErrorKind {
    if error.message_contains("row-level security policy") || error.status == Some(403) {
        UploadErrorKind::PermissionDenied
    } else if error.message_contains("already exists") || error.status == Some(409) {
        UploadErrorKind::AlreadyExists
    } else {
        UploadErrorKind::Other(error.to_string())
    }
}

/// Checks type and size. Purely local; no request is made.
///
/// # Errors
/// Returns `InvalidType` or `TooLarge`.
pub fn validate(candidate: &UploadCandidate) -> Result<(), UploadError> {
    if !ALLOWED_MIME_TYPES.contains(&candidate.mime_type.as_str()) {
        return Err(UploadErrorKind::InvalidType.into());
    }
    if candidate.size() > MAX_UPLOAD_BYTES {
        return Err(UploadErrorKind::TooLarge.into());
    }
    Ok(())
}

/// Builds `<epochMillis>_<6 base36 chars>.<ext>`.
///
/// The extension is whatever follows the last `.` in `file_name`; names
/// without one borrow the canonical extension of `mime_type`.
pub fn generate_key(file_name: &str, mime_type: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = random_base36(KEY_SUFFIX_LEN);

    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
        .or_else(|| extension_for_mime(mime_type));

    match extension {
        Some(ext) => format!("{millis}_{suffix}.{ext}"),
        None => format!("{millis}_{suffix}"),
    }
}

fn random_base36(len: usize) -> String {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    bytes
        .iter()
        .take(len)
        .map(|b| char::from(BASE36[usize::from(*b) % BASE36.len()]))
        .collect()
}

/// Last path segment of a public URL, i.e. the object key.
///
/// # Errors
/// Returns `InvalidUrl` when the trailing segment is empty.
pub fn key_from_public_url(public_url: &str) -> Result<&str, UploadError> {
    match public_url.rsplit('/').next() {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(UploadErrorKind::InvalidUrl.into()),
    }
}

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub key: String,
    pub public_url: String,
}

pub struct UploadClient {
    storage: StorageApi,
    auth: AuthApi,
    cache_control_secs: u32,
}

impl UploadClient {
    pub fn new(storage: StorageApi, auth: AuthApi, cache_control_secs: u32) -> Self {
        Self {
            storage,
            auth,
            cache_control_secs,
        }
    }

    /// Validates `candidate`, re-checks the session, then writes it to the
    /// bucket root without overwriting.
    ///
    /// # Errors
    /// Returns a classified [`UploadError`].
    pub async fn upload<L: KeyValueStore, S: KeyValueStore>(
        &self,
        store: &CredentialStore<L, S>,
        candidate: UploadCandidate,
    ) -> Result<UploadedImage, UploadError> {
        validate(&candidate)?;

        let session = match store.load() {
            Ok(Some(session)) => session,
            Ok(None) => return Err(UploadErrorKind::NotSignedIn.into()),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "Could not read stored session");
                return Err(UploadErrorKind::SessionExpired.into());
            }
        };

        if let Err(e) = self.auth.get_user(&session.access_token).await {
            tracing::warn!(error = %e, "Session check failed before upload");
            return Err(match (e.kind, e.status) {
                (BackendErrorKind::HttpStatus, Some(401 | 403)) => UploadErrorKind::SessionExpired,
                _ => UploadErrorKind::Other(e.to_string()),
            }
            .into());
        }

        let key = generate_key(&candidate.name, &candidate.mime_type);
        tracing::info!(%key, size = candidate.size(), "Starting upload");

        let UploadCandidate {
            mime_type, bytes, ..
        } = candidate;
        self.storage
            .upload(
                &key,
                bytes,
                &mime_type,
                self.cache_control_secs,
                &session.access_token,
            )
            .await
            .map_err(|e| {
                tracing::error!(error = %e, %key, "Upload failed");
                UploadError::new(classify_storage_error(&e))
            })?;

        let public_url = self.storage.public_url(&key);
        tracing::info!(%public_url, "Upload successful");
        Ok(UploadedImage { key, public_url })
    }

    /// Removes the object behind `public_url`. Returns the removed key.
    ///
    /// # Errors
    /// Returns `InvalidUrl` for a URL without a trailing segment, or the
    /// provider's message when the delete is rejected.
    pub async fn delete<L: KeyValueStore, S: KeyValueStore>(
        &self,
        store: &CredentialStore<L, S>,
        public_url: &str,
    ) -> Result<String, UploadError> {
        let key = key_from_public_url(public_url)?;
        let token = store.access_token().ok().flatten();

        tracing::info!(%key, "Attempting delete");
        self.storage
            .remove(key, token.as_deref())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, %key, "Delete failed");
                UploadError::new(UploadErrorKind::Other(e.to_string()))
            })?;
        Ok(key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use wiremock::matchers::{body_json, header, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::backend::BackendConfig;
    use crate::credentials::Session;
    use crate::kv::MemoryStore;

    const PNG_HEADER: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn client_for(server: &MockServer) -> UploadClient {
        let config = BackendConfig::new(server.uri(), "anon-key");
        let http = reqwest::Client::new();
        UploadClient::new(
            StorageApi::new(config.clone(), http.clone(), "public-uploads"),
            AuthApi::new(config, http),
            3600,
        )
    }

    fn signed_in_store() -> CredentialStore<MemoryStore, MemoryStore> {
        let mut store = CredentialStore::new(MemoryStore::new(), MemoryStore::new());
        assert!(
            store
                .save(&Session {
                    user_id: "user-1".to_string(),
                    email: "me@example.com".to_string(),
                    access_token: "user-token".to_string(),
                    refresh_token: None,
                })
                .is_saved()
        );
        store
    }

    fn png(name: &str, size: usize) -> UploadCandidate {
        let mut bytes = PNG_HEADER.to_vec();
        bytes.resize(size.max(PNG_HEADER.len()), 0);
        UploadCandidate::new(name, "image/png", bytes)
    }

    async fn mount_valid_user(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer user-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "user-1", "email": "me@example.com"})),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn test_validate_type_and_size() {
        assert!(validate(&png("a.png", 10)).is_ok());
        assert!(validate(&UploadCandidate::new("a.jpg", "image/jpg", vec![0; 10])).is_ok());

        let err = validate(&UploadCandidate::new("notes.txt", "text/plain", vec![0; 10]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Please select a valid image file (JPG, PNG, GIF, WEBP)"
        );

        let exact = usize::try_from(MAX_UPLOAD_BYTES).unwrap();
        assert!(validate(&png("a.png", exact)).is_ok());
        let err = validate(&png("a.png", exact + 1)).unwrap_err();
        assert_eq!(err.to_string(), "File size must be less than 5MB");
    }

    #[test]
    fn test_generate_key_shape_and_uniqueness() {
        let pattern = regex::Regex::new(r"^\d{13}_[0-9a-z]{6}\.png$").unwrap();
        let a = generate_key("photo.png", "image/png");
        let b = generate_key("photo.png", "image/png");
        assert!(pattern.is_match(&a), "{a}");
        assert!(pattern.is_match(&b), "{b}");
        assert_ne!(a, b);
    }

    #[test]
    fn test_generate_key_extension_rules() {
        assert!(generate_key("archive.tar.GIF", "image/gif").ends_with(".GIF"));
        assert!(generate_key("IMG_0001", "image/jpeg").ends_with(".jpg"));
        assert!(!generate_key("IMG_0001", "").contains('.'));
    }

    #[test]
    fn test_key_from_public_url() {
        let url = "http://localhost:54321/storage/v1/object/public/public-uploads/1_abc.png";
        assert_eq!(key_from_public_url(url).unwrap(), "1_abc.png");
        let err = key_from_public_url("http://localhost/storage/").unwrap_err();
        assert_eq!(err.to_string(), "Could not extract file name from URL");
    }

    #[test]
    fn test_classify_storage_error() {
        let rls = BackendError::http_status(
            400,
            r#"{"message":"new row violates row-level security policy"}"#,
        );
        assert_eq!(classify_storage_error(&rls), UploadErrorKind::PermissionDenied);
        assert_eq!(
            classify_storage_error(&BackendError::http_status(403, "")),
            UploadErrorKind::PermissionDenied
        );
        assert_eq!(
            classify_storage_error(&BackendError::http_status(409, r#"{"message":"Duplicate"}"#)),
            UploadErrorKind::AlreadyExists
        );
        assert_eq!(
            classify_storage_error(&BackendError::http_status(500, r#"{"message":"boom"}"#)),
            UploadErrorKind::Other("HTTP 500: boom".to_string())
        );
    }

    #[test]
    fn test_from_path_detects_type() {
        let dir = tempdir().unwrap();
        let named = dir.path().join("My Photo.PNG");
        std::fs::write(&named, PNG_HEADER).unwrap();
        let candidate = UploadCandidate::from_path(named.to_str().unwrap()).unwrap();
        assert_eq!(candidate.name, "My Photo.PNG");
        assert_eq!(candidate.mime_type, "image/png");

        let bare = dir.path().join("scan");
        std::fs::write(&bare, PNG_HEADER).unwrap();
        let candidate = UploadCandidate::from_path(bare.to_str().unwrap()).unwrap();
        assert_eq!(candidate.mime_type, "image/png");

        assert!(UploadCandidate::from_path(dir.path().join("missing.png").to_str().unwrap()).is_err());
    }

    #[test]
    fn test_from_path_rejects_oversized_file_from_metadata() {
        let dir = tempdir().unwrap();
        let huge = dir.path().join("huge.png");
        let file = std::fs::File::create(&huge).unwrap();
        file.set_len(MAX_UPLOAD_BYTES * 16).unwrap();

        let err = UploadCandidate::from_path(huge.to_str().unwrap()).unwrap_err();
        let err = err.downcast_ref::<UploadError>().unwrap();
        assert_eq!(err.kind, UploadErrorKind::TooLarge);

        let blob = dir.path().join("disk-image");
        let file = std::fs::File::create(&blob).unwrap();
        file.set_len(MAX_UPLOAD_BYTES + 1).unwrap();
        let err = UploadCandidate::from_path(blob.to_str().unwrap()).unwrap_err();
        let err = err.downcast_ref::<UploadError>().unwrap();
        assert_eq!(err.kind, UploadErrorKind::InvalidType);

        let exact = dir.path().join("exact.png");
        let mut bytes = PNG_HEADER.to_vec();
        bytes.resize(usize::try_from(MAX_UPLOAD_BYTES).unwrap(), 0);
        std::fs::write(&exact, bytes).unwrap();
        let candidate = UploadCandidate::from_path(exact.to_str().unwrap()).unwrap();
        assert_eq!(candidate.size(), MAX_UPLOAD_BYTES);
    }

    #[tokio::test]
    async fn test_oversized_png_rejected_without_request() {
        let server = MockServer::start().await;
        Mock::given(path_regex(".*"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .upload(&signed_in_store(), png("big.png", 6 * 1024 * 1024))
            .await
            .unwrap_err();
        assert_eq!(err.kind, UploadErrorKind::TooLarge);
    }

    #[tokio::test]
    async fn test_upload_requires_session() {
        let server = MockServer::start().await;
        let store = CredentialStore::new(MemoryStore::new(), MemoryStore::new());
        let err = client_for(&server)
            .upload(&store, png("a.png", 64))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "You must be logged in to upload files.");
    }

    #[tokio::test]
    async fn test_upload_with_rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(serde_json::json!({"msg": "jwt expired"})),
            )
            .mount(&server)
            .await;

        let store = signed_in_store();
        let err = client_for(&server)
            .upload(&store, png("a.png", 64))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Authentication required. Please sign in again.");
        assert!(store.load().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_upload_success_returns_public_url() {
        let server = MockServer::start().await;
        mount_valid_user(&server).await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/storage/v1/object/public-uploads/\d+_[0-9a-z]{6}\.png$"))
            .and(header("x-upsert", "false"))
            .and(header("cache-control", "max-age=3600"))
            .and(header("content-type", "image/png"))
            .and(header("apikey", "anon-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"Key": "public-uploads/x.png"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let uploaded = client_for(&server)
            .upload(&signed_in_store(), png("holiday.png", 1024))
            .await
            .unwrap();
        assert_eq!(
            uploaded.public_url,
            format!(
                "{}/storage/v1/object/public/public-uploads/{}",
                server.uri(),
                uploaded.key
            )
        );
    }

    #[tokio::test]
    async fn test_upload_policy_and_duplicate_errors() {
        let server = MockServer::start().await;
        mount_valid_user(&server).await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/storage/v1/object/public-uploads/.+\.png$"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "statusCode": "403",
                "error": "Unauthorized",
                "message": "new row violates row-level security policy"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/storage/v1/object/public-uploads/.+\.gif$"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "error": "Duplicate",
                "message": "The resource already exists"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let store = signed_in_store();

        let err = client.upload(&store, png("a.png", 64)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Upload permission denied. Please check your storage bucket policies."
        );

        let gif = UploadCandidate::new("a.gif", "image/gif", b"GIF89a".to_vec());
        let err = client.upload(&store, gif).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "File with this name already exists. Please try again."
        );
    }

    #[tokio::test]
    async fn test_delete_removes_trailing_segment() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/storage/v1/object/public-uploads"))
            .and(body_json(serde_json::json!({"prefixes": ["1_abc.png"]})))
            .and(header("authorization", "Bearer user-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!(
            "{}/storage/v1/object/public/public-uploads/1_abc.png",
            server.uri()
        );
        let key = client_for(&server)
            .delete(&signed_in_store(), &url)
            .await
            .unwrap();
        assert_eq!(key, "1_abc.png");
    }

    #[tokio::test]
    async fn test_delete_rejects_url_without_name() {
        let server = MockServer::start().await;
        let store = CredentialStore::new(MemoryStore::new(), MemoryStore::new());
        let err = client_for(&server)
            .delete(&store, "https://example.com/bucket/")
            .await
            .unwrap_err();
        assert_eq!(err.kind, UploadErrorKind::InvalidUrl);
    }
}
