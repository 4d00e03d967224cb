//! CLI command handlers.

pub mod auth;
pub mod config;
pub mod gallery;
pub mod upload;

use anyhow::Result;
use photobox_core::auth::AuthClient;
use photobox_core::backend::{AuthApi, BackendConfig, StorageApi};
use photobox_core::config::Config;
use photobox_core::credentials::CredentialStore;
use photobox_core::gallery::GalleryClient;
use photobox_core::kv::{FileStore, MemoryStore};
use photobox_core::signout::SignOutFlow;
use photobox_core::upload::UploadClient;

/// Local storage persists in the photobox home; session storage lives for
/// one invocation.
pub type Store = CredentialStore<FileStore, MemoryStore>;

pub fn open_store() -> Store {
    CredentialStore::new(FileStore::open_default(), MemoryStore::new())
}

/// Clients sharing one HTTP connection pool.
pub struct Services<'a> {
    config: &'a Config,
    backend: BackendConfig,
    http: reqwest::Client,
}

impl<'a> Services<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        let backend = BackendConfig::from_config(config)?;
        let http = backend.http_client()?;
        Ok(Self {
            config,
            backend,
            http,
        })
    }

    fn auth_api(&self) -> AuthApi {
        AuthApi::new(self.backend.clone(), self.http.clone())
    }

    fn storage_api(&self) -> StorageApi {
        StorageApi::new(
            self.backend.clone(),
            self.http.clone(),
            self.config.storage.bucket.clone(),
        )
    }

    pub fn auth(&self) -> AuthClient {
        AuthClient::new(self.auth_api(), self.config.app.email_redirect_to.clone())
    }

    pub fn uploads(&self) -> UploadClient {
        UploadClient::new(
            self.storage_api(),
            self.auth_api(),
            self.config.storage.cache_control_secs,
        )
    }

    pub fn gallery(&self) -> GalleryClient {
        GalleryClient::new(self.storage_api())
    }
}

/// Sign-out only talks to the app server, so it works without an anon key.
/// Without a usable config or app URL it still clears local data.
pub fn sign_out_flow(config: Option<&Config>) -> SignOutFlow {
    let Some(config) = config else {
        return SignOutFlow::local_only();
    };
    let resolved = config.effective_app_url().and_then(|app_url| {
        let mut backend = BackendConfig::new(app_url.clone(), String::new());
        backend.timeout = config.request_timeout();
        Ok(SignOutFlow::new(backend.http_client()?, &app_url))
    });
    resolved.unwrap_or_else(|e| {
        tracing::warn!(error = %format!("{e:#}"), "App server unavailable, signing out locally only");
        SignOutFlow::local_only()
    })
}
