//! Configuration management for photobox.
//!
//! Loads configuration from ${PHOTOBOX_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backend::{resolve_anon_key, resolve_base_url};

pub mod paths {
    //! Path resolution for photobox configuration and data directories.
    //!
    //! PHOTOBOX_HOME resolution order:
    //! 1. PHOTOBOX_HOME environment variable (if set)
    //! 2. ~/.config/photobox (default)

    use std::path::PathBuf;

    /// Returns the photobox home directory.
    ///
    /// Checks PHOTOBOX_HOME env var first, falls back to ~/.config/photobox,
    /// and to a relative `.photobox` directory when no home is known.
    pub fn photobox_home() -> PathBuf {
        if let Ok(home) = std::env::var("PHOTOBOX_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".photobox"),
            |h| h.join(".config").join("photobox"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        photobox_home().join("config.toml")
    }

    /// Returns the path to the persistent key-value store ("local storage").
    pub fn local_storage_path() -> PathBuf {
        photobox_home().join("local_storage.json")
    }

    /// Returns the directory holding log files.
    pub fn logs_dir() -> PathBuf {
        photobox_home().join("logs")
    }
}

/// Hosted backend (identity provider + object store) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    /// Project URL, e.g. `https://<project>.supabase.co`
    pub url: String,
    /// Public anon key sent as `apikey` on every request
    pub anon_key: Option<String>,
    /// Request timeout in seconds (0 disables)
    pub timeout_secs: u32,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            url: Config::DEFAULT_BACKEND_URL.to_string(),
            anon_key: None,
            timeout_secs: Config::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Bucket holding uploaded photos
    pub bucket: String,
    /// `cache-control` max-age applied to uploads
    pub cache_control_secs: u32,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            bucket: Config::DEFAULT_BUCKET.to_string(),
            cache_control_secs: Config::DEFAULT_CACHE_CONTROL_SECS,
        }
    }
}

/// Companion web app settings (logout endpoint, confirmation redirect).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// Origin of the web app exposing `/api/auth/logout`
    pub url: String,
    /// Where confirmation emails should send the user back to
    pub email_redirect_to: Option<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            url: Config::DEFAULT_APP_URL.to_string(),
            email_redirect_to: None,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub app: AppSection,
}

impl Config {
    const DEFAULT_BACKEND_URL: &str = "http://localhost:54321";
    const DEFAULT_APP_URL: &str = "http://localhost:3000";
    pub const DEFAULT_BUCKET: &str = "public-uploads";
    const DEFAULT_CACHE_CONTROL_SECS: u32 = 3600;
    const DEFAULT_TIMEOUT_SECS: u32 = 30;

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Backend URL with precedence: env > config > default.
    ///
    /// # Errors
    /// Returns an error if the resolved URL is malformed.
    pub fn effective_backend_url(&self) -> Result<String> {
        resolve_base_url(
            Some(&self.backend.url),
            "PHOTOBOX_URL",
            Self::DEFAULT_BACKEND_URL,
            "backend",
        )
    }

    /// Anon key with precedence: config > env.
    ///
    /// # Errors
    /// Returns an error if neither source provides a key.
    pub fn effective_anon_key(&self) -> Result<String> {
        resolve_anon_key(self.backend.anon_key.as_deref(), "PHOTOBOX_ANON_KEY")
    }

    /// App origin with precedence: env > config > default.
    ///
    /// # Errors
    /// Returns an error if the resolved URL is malformed.
    pub fn effective_app_url(&self) -> Result<String> {
        resolve_base_url(
            Some(&self.app.url),
            "PHOTOBOX_APP_URL",
            Self::DEFAULT_APP_URL,
            "app",
        )
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        if self.backend.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(self.backend.timeout_secs)))
        }
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Generates a fresh config TOML from Rust defaults.
    ///
    /// Used by `xtask update-default-config` to keep `default_config.toml`
    /// in sync. The embedded template supplies structure and comments; values
    /// from `Config::default()` are merged over it.
    ///
    /// # Errors
    /// Returns an error if the template or the generated TOML fails to parse.
    pub fn generate() -> Result<String> {
        use toml_edit::DocumentMut;

        let config = Config::default();
        let generated_toml =
            toml::to_string(&config).context("Failed to serialize default config to TOML")?;

        let mut doc: DocumentMut = default_config_template()
            .parse()
            .context("Failed to parse default config template")?;
        let generated_doc: DocumentMut = generated_toml
            .parse()
            .context("Failed to parse generated config")?;

        merge_items(doc.as_table_mut(), generated_doc.as_table());

        Ok(doc.to_string())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses temp file + rename so a crash never leaves a half-written config.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

/// Returns the default config template with comments.
///
/// Embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Recursively merges items from source table into target table.
fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source {
        match value {
            Item::Value(v) => {
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    target[key] = Item::Table(src_table.clone());
                }
            }
            Item::ArrayOfTables(src_arr) => {
                target[key] = Item::ArrayOfTables(src_arr.clone());
            }
            Item::None => {}
        }
    }
}
