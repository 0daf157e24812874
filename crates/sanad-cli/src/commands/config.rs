//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use sanad_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "backend": config.backend,
                    "data_dir": config.data_dir,
                    "api_url": config.api_url,
                    "api_key": config.api_key.as_ref().map(|_| "(set)"),
                    "realtime_url": config.realtime_url,
                    "page_size": config.page_size,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.backend);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  backend:      {}", config.backend);
            println!("  data_dir:     {}", config.data_dir.display());
            println!("  api_url:      {}", or_unset(config.api_url.as_deref()));
            println!(
                "  api_key:      {}",
                if config.api_key.is_some() { "(set)" } else { "(not set)" }
            );
            println!("  realtime_url: {}", or_unset(config.realtime_url.as_deref()));
            println!("  page_size:    {}", config.page_size);
            println!(
                "  log_file:     {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    config.set(&key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "api_key" { "(hidden)" } else { value.as_str() };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

fn or_unset(value: Option<&str>) -> &str {
    value.unwrap_or("(not set)")
}
