//! CLI subcommands and the state they share

pub mod config;
pub mod download;
pub mod list;
pub mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use notionfm_core::config::Config;
use notionfm_core::domain::PageId;
use notionfm_notion::client::NotionClient;
use notionfm_notion::provider::NotionRemoteStore;

/// Resolved configuration for one invocation
#[derive(Debug)]
pub struct Context {
    pub config_path: PathBuf,
    pub config: Config,
    /// Suppress per-event progress output
    pub quiet: bool,
}

impl Context {
    /// Loads the config file (defaults when it does not exist) and applies
    /// the command-line token override
    pub fn load(path: Option<&str>, token: Option<String>, quiet: bool) -> Result<Self> {
        let config_path = path.map(PathBuf::from).unwrap_or_else(Config::default_path);
        let mut config = if config_path.exists() {
            Config::load(&config_path).with_context(|| {
                format!("Failed to load configuration from {}", config_path.display())
            })?
        } else {
            Config::default()
        };
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            config.api.token = Some(token);
        }
        Ok(Self {
            config_path,
            config,
            quiet,
        })
    }

    /// Fails listing every invalid field of the loaded configuration
    pub fn ensure_valid(&self) -> Result<()> {
        let errors = self.config.validate();
        if errors.is_empty() {
            return Ok(());
        }
        let listed = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        bail!(
            "Invalid configuration ({}): {listed}",
            self.config_path.display()
        );
    }

    /// Builds the Notion adapter from the `api`, `rate_limiting` and
    /// `listing_cache` sections of a valid configuration
    pub fn remote_store(&self) -> Result<Arc<NotionRemoteStore>> {
        self.ensure_valid()?;
        let Some(token) = self.config.api.token.as_deref() else {
            bail!("No Notion token configured. Set NOTION_TOKEN, pass --token, or set api.token");
        };
        let client = NotionClient::from_config(token, &self.config.api, &self.config.rate_limiting)
            .context("Failed to build Notion client")?;
        Ok(Arc::new(
            NotionRemoteStore::new(client).with_page_size(self.config.listing_cache.page_size),
        ))
    }
}

/// Parses a page id given on the command line
pub fn parse_page(raw: &str) -> Result<PageId> {
    PageId::new(raw).with_context(|| format!("Invalid page id: {raw:?}"))
}
