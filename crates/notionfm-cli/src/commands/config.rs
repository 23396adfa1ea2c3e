//! Config command - View and manage notionfm configuration
//!
//! Provides the `notionfm config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON), token redacted
//! 2. Validates the configuration file and reports errors
//! 3. Writes a default configuration file

use anyhow::{bail, Context as _, Result};
use clap::Subcommand;
use notionfm_core::config::Config;
use tracing::info;

use super::Context;
use crate::output::{get_formatter, OutputFormat};

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCommand {
    /// Execute the config command
    pub async fn execute(&self, format: OutputFormat, ctx: &Context) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(format, ctx),
            ConfigCommand::Validate => self.execute_validate(format, ctx),
            ConfigCommand::Init { force } => self.execute_init(*force, format, ctx),
        }
    }

    fn execute_show(&self, format: OutputFormat, ctx: &Context) -> Result<()> {
        let formatter = get_formatter(format.is_json());
        let config = redacted(&ctx.config);

        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        if format.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;

            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    fn execute_validate(&self, format: OutputFormat, ctx: &Context) -> Result<()> {
        let formatter = get_formatter(format.is_json());
        let errors = ctx.config.validate();

        if format.is_json() {
            let json = serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": ctx.config_path.display().to_string(),
                "errors": errors
                    .iter()
                    .map(|e| serde_json::json!({"field": e.field, "message": e.message}))
                    .collect::<Vec<_>>(),
            });
            formatter.print_json(&json);
        } else if errors.is_empty() {
            formatter.success(&format!(
                "Configuration is valid ({})",
                ctx.config_path.display()
            ));
        } else {
            formatter.error(&format!(
                "Configuration has {} error(s) ({})",
                errors.len(),
                ctx.config_path.display()
            ));
            for e in &errors {
                formatter.info(&format!("{}: {}", e.field, e.message));
            }
        }

        if !errors.is_empty() {
            bail!("invalid configuration");
        }
        Ok(())
    }

    fn execute_init(&self, force: bool, format: OutputFormat, ctx: &Context) -> Result<()> {
        let formatter = get_formatter(format.is_json());
        let path = &ctx.config_path;

        if path.exists() && !force {
            bail!(
                "{} already exists (use --force to overwrite)",
                path.display()
            );
        }
        Config::default()
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "config_path": path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Wrote default configuration to {}", path.display()));
        }
        Ok(())
    }
}

/// Copy of `config` with the token masked
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if config.api.token.is_some() {
        config.api.token = Some("********".to_string());
    }
    config
}
