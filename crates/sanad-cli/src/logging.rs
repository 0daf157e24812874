//! Log setup
//!
//! Nothing is logged unless SANAD_LOG is set (e.g. `SANAD_LOG=debug`).
//! Plain commands log to stderr; the interactive chat owns the terminal, so
//! it logs to a file instead.

use std::fs::File;

use sanad_core::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SANAD_LOG";

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("sanad_core={},sanad={}", level, level))
}

/// Log to stderr for one-shot commands
pub fn init_stderr() {
    let Ok(log_level) = std::env::var(LOG_ENV) else {
        return;
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&log_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Log to `log_file` (or `{data_dir}/debug.log`) for the interactive chat
pub fn init_file(config: &Config) {
    let Ok(log_level) = std::env::var(LOG_ENV) else {
        return;
    };

    let log_path = config.log_path();
    let log_file = match File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            return;
        }
    };

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&log_level))
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();

    info!("Chat logging initialized to {:?}", log_path);
}
