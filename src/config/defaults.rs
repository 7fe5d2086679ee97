//! Default configuration constants.
//!
//! Keeping defaults in one module lets the type defaults, the loader and the
//! tests share the same literals.

/// Default tracing filter when neither `CONDUIT_LOG` nor `log_level` is set.
pub(super) const DEFAULT_LOG_LEVEL: &str = "warn";
/// Marker opening an inline reasoning span in assistant text.
pub(super) const DEFAULT_REASONING_OPEN: &str = "<think>";
/// Marker closing an inline reasoning span.
pub(super) const DEFAULT_REASONING_CLOSE: &str = "</think>";
/// Command output lines shown in a tool preview before truncation.
pub(super) const DEFAULT_COMMAND_MAX_LINES: usize = crate::preview::DEFAULT_COMMAND_MAX_LINES;
/// Characters kept per attached file when building a prompt.
pub(super) const DEFAULT_MAX_ATTACHMENT_CHARS: usize = 100_000;
/// Session id sent with prompts when none is configured.
pub(super) const DEFAULT_SESSION_ID: &str = "default";
/// Working directory reported to the agent.
pub(super) const DEFAULT_SESSION_CWD: &str = ".";
/// Config file name looked up locally and under the config root.
pub(super) const CONFIG_FILE_NAME: &str = "conduit.toml";
/// Directory under the config root holding the global config file.
pub(super) const CONFIG_DIR_NAME: &str = "conduit";
