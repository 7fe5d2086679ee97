//! Environment overrides.
//!
//! `CONDUIT_*` variables win over every file source.

use crate::error::ConfigError;

use super::{ApprovalMode, Config};

pub(super) const ENV_REASONING_OPEN: &str = "CONDUIT_REASONING_OPEN";
pub(super) const ENV_REASONING_CLOSE: &str = "CONDUIT_REASONING_CLOSE";
pub(super) const ENV_APPROVAL: &str = "CONDUIT_APPROVAL";
pub(super) const ENV_PREVIEW_MAX_LINES: &str = "CONDUIT_PREVIEW_MAX_LINES";
/// Tracing filter; read here and by the binary's subscriber setup.
pub const ENV_LOG: &str = "CONDUIT_LOG";

pub(super) fn apply_env_overrides<FEnv>(
    config: &mut Config,
    env_lookup: &FEnv,
) -> Result<(), ConfigError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    if let Some(open) = non_empty(env_lookup, ENV_REASONING_OPEN) {
        config.stream.reasoning_open = open;
    }
    if let Some(close) = non_empty(env_lookup, ENV_REASONING_CLOSE) {
        config.stream.reasoning_close = close;
    }
    if let Some(mode) = non_empty(env_lookup, ENV_APPROVAL) {
        config.approval.mode = mode
            .parse::<ApprovalMode>()
            .map_err(|err| ConfigError::Invalid(format!("{ENV_APPROVAL}: {err}")))?;
    }
    if let Some(lines) = non_empty(env_lookup, ENV_PREVIEW_MAX_LINES) {
        config.preview.command_max_lines = lines.trim().parse::<usize>().map_err(|_| {
            ConfigError::Invalid(format!(
                "invalid {ENV_PREVIEW_MAX_LINES} value `{lines}`: expected a positive integer"
            ))
        })?;
    }
    if let Some(level) = non_empty(env_lookup, ENV_LOG) {
        config.log_level = level;
    }
    Ok(())
}

fn non_empty<FEnv>(env_lookup: &FEnv, name: &str) -> Option<String>
where
    FEnv: Fn(&str) -> Option<String>,
{
    env_lookup(name).filter(|value| !value.trim().is_empty())
}
