//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`CONDUIT_REASONING_OPEN`,
//!    `CONDUIT_REASONING_CLOSE`, `CONDUIT_APPROVAL`, `CONDUIT_LOG`,
//!    `CONDUIT_PREVIEW_MAX_LINES`)
//! 2. TOML file specified via --config CLI flag
//! 3. ./conduit.toml in the current directory
//! 4. $XDG_CONFIG_HOME/conduit/conduit.toml (or ~/.config/conduit/conduit.toml)
//! 5. Built-in defaults

use crate::error::ConfigError;

mod defaults;
mod env;
mod loader;
mod sources;
mod types;

pub use env::ENV_LOG;
pub use loader::{load_config, load_config_with_source};
pub use sources::config_root_dir;
pub use types::{
    ApprovalConfig, ApprovalMode, Config, LoadedConfig, PreviewConfig, PromptConfig,
    SessionConfig, StreamConfig,
};

/// Reject configurations the stream adapter cannot run with.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let stream = &config.stream;
    if stream.reasoning_open.is_empty() || stream.reasoning_close.is_empty() {
        return Err(ConfigError::Invalid(
            "stream.reasoning_open and stream.reasoning_close must be non-empty".to_string(),
        ));
    }
    if stream.reasoning_open == stream.reasoning_close {
        return Err(ConfigError::Invalid(format!(
            "stream.reasoning_open and stream.reasoning_close must differ (both `{}`)",
            stream.reasoning_open
        )));
    }
    if config.preview.command_max_lines == 0 {
        return Err(ConfigError::Invalid(
            "preview.command_max_lines must be at least 1".to_string(),
        ));
    }
    if config.session.session_id.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "session.session_id must be non-empty".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
