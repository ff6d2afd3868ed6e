//! Configuration management commands

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use crate::cli::output::{OutputFormat, print_formatted, print_success};
use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Get a specific config value
    Get {
        /// Config key (e.g., "broker.url", "screen.first_day_only")
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key (e.g., "broker.url", "screen.first_day_only")
        key: String,

        /// Value to set
        value: String,
    },

    /// Show config file path
    Path,
}

#[derive(Serialize)]
struct ConfigPathResult {
    path: String,
    exists: bool,
}

/// `explicit` is the `--config` path, if one was given
pub async fn run(
    command: ConfigCommands,
    explicit: Option<&Path>,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()?,
    };

    match command {
        ConfigCommands::Show => show(&path, format),
        ConfigCommands::Get { key } => get(&path, &key, format),
        ConfigCommands::Set { key, value } => set(&path, &key, &value, quiet),
        ConfigCommands::Path => show_path(path, format),
    }
}

fn show(path: &Path, format: OutputFormat) -> Result<()> {
    let config = Config::load_from(path)?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
    }

    Ok(())
}

fn get(path: &Path, key: &str, format: OutputFormat) -> Result<()> {
    let config = Config::load_from(path)?;
    let value = get_config_value(&config, key)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(&value)?);
        }
        OutputFormat::Text => {
            println!("{}", value);
        }
    }

    Ok(())
}

fn get_config_value(config: &Config, key: &str) -> Result<String> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["broker", "url"] => Ok(config.broker.url.clone()),
        ["broker", "topic"] => Ok(config.broker.topic.clone()),
        ["broker", "heartbeat_outgoing_ms"] => Ok(config.broker.heartbeat_outgoing_ms.to_string()),
        ["broker", "heartbeat_incoming_ms"] => Ok(config.broker.heartbeat_incoming_ms.to_string()),
        ["broker", "login"] => Ok(config
            .broker
            .login
            .clone()
            .unwrap_or_else(|| "<not set>".to_string())),
        ["broker", "passcode"] => Ok(if config.broker.passcode.is_some() {
            "<hidden>".to_string()
        } else {
            "<not set>".to_string()
        }),
        ["service", "base_url"] => Ok(config.service.base_url.clone()),
        ["service", "certify_path"] => Ok(config.service.certify_path.clone()),
        ["service", "codes_path"] => Ok(config.service.codes_path.clone()),
        ["service", "timeout_secs"] => Ok(config.service.timeout_secs.to_string()),
        ["screen", "in_progress_status"] => Ok(config.screen.in_progress_status.clone()),
        ["screen", "service_unavailable_message"] => {
            Ok(config.screen.service_unavailable_message.clone())
        }
        ["screen", "first_day_only"] => Ok(config.screen.first_day_only.to_string()),
        ["screen", "poll_interval_ms"] => Ok(config.screen.poll_interval_ms.to_string()),
        ["screen", "wait_timeout_secs"] => Ok(config.screen.wait_timeout_secs.to_string()),
        _ => anyhow::bail!("Unknown config key: {}", key),
    }
}

fn set(path: &Path, key: &str, value: &str, quiet: bool) -> Result<()> {
    let mut config = Config::load_from(path)?;

    set_config_value(&mut config, key, value)?;
    config.save_to(path)?;

    print_success(&format!("Set {} = {}", key, value), quiet);
    Ok(())
}

fn set_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["broker", "url"] => {
            config.broker.url = value.to_string();
        }
        ["broker", "topic"] => {
            config.broker.topic = value.to_string();
        }
        ["broker", "heartbeat_outgoing_ms"] => {
            config.broker.heartbeat_outgoing_ms = value.parse()?;
        }
        ["broker", "heartbeat_incoming_ms"] => {
            config.broker.heartbeat_incoming_ms = value.parse()?;
        }
        ["broker", "login"] => {
            config.broker.login = Some(value.to_string()).filter(|v| !v.is_empty());
        }
        ["broker", "passcode"] => {
            config.broker.passcode = Some(value.to_string()).filter(|v| !v.is_empty());
        }
        ["service", "base_url"] => {
            config.service.base_url = value.to_string();
        }
        ["service", "certify_path"] => {
            config.service.certify_path = value.to_string();
        }
        ["service", "codes_path"] => {
            config.service.codes_path = value.to_string();
        }
        ["service", "timeout_secs"] => {
            config.service.timeout_secs = value.parse()?;
        }
        ["screen", "in_progress_status"] => {
            config.screen.in_progress_status = value.to_string();
        }
        ["screen", "service_unavailable_message"] => {
            config.screen.service_unavailable_message = value.to_string();
        }
        ["screen", "first_day_only"] => {
            config.screen.first_day_only = value.parse()?;
        }
        ["screen", "poll_interval_ms"] => {
            config.screen.poll_interval_ms = value.parse()?;
        }
        ["screen", "wait_timeout_secs"] => {
            config.screen.wait_timeout_secs = value.parse()?;
        }
        _ => anyhow::bail!("Unknown config key: {}", key),
    }

    Ok(())
}

fn show_path(path: PathBuf, format: OutputFormat) -> Result<()> {
    let result = ConfigPathResult {
        exists: path.exists(),
        path: path.to_string_lossy().to_string(),
    };

    print_formatted(&result, format, |r| {
        format!("{}{}", r.path, if r.exists { "" } else { " (not found)" })
    });

    Ok(())
}
