//! CLI argument parsing via clap.

use clap::{Parser, Subcommand};

/// Streaming adapter between an agent session and a conversation document.
#[derive(Debug, Parser)]
#[command(name = "conduit", version)]
pub struct Args {
    /// Path to config file (default: ./conduit.toml or ~/.config/conduit/conduit.toml).
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<String>,

    /// Disable color output.
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Replay recorded agent frames (one JSON envelope per line) through the
    /// runtime and render the resulting document.
    ///
    /// The prompt is sent as request id 2 (id 1 is `initialize`), so a
    /// recording that ends the run by response should answer id 2.
    Replay {
        /// JSONL file of inbound frames.
        frames: String,

        /// Prompt text submitted before the frames are delivered.
        #[arg(short = 'p', long = "prompt", default_value = "replay")]
        prompt: String,

        /// Attach a file to the prompt. Repeatable.
        #[arg(long = "attach", value_name = "FILE")]
        attach: Vec<String>,

        /// Workspace file path listed in the prompt context. Repeatable.
        #[arg(long = "workspace-file", value_name = "PATH")]
        workspace_files: Vec<String>,

        /// Approval policy for permission and plan requests: ask, all, none.
        #[arg(long = "approve", value_name = "MODE")]
        approve: Option<String>,

        /// Print the final message as JSON on stdout instead of rendering.
        #[arg(long = "json")]
        json: bool,
    },
    /// Show the preview a tool block would render with.
    Preview {
        /// JSON file holding one tool block (`name`, `input`, `output`, `status`).
        tool: String,

        /// Maximum command output lines.
        #[arg(long = "max-lines")]
        max_lines: Option<usize>,

        /// Print the preview as JSON.
        #[arg(long = "json")]
        json: bool,
    },
    /// Print the effective configuration and where it came from.
    Config,
}

#[cfg(test)]
mod tests {
    use super::{Args, Command};
    use clap::Parser;

    #[test]
    fn replay_parses_repeatable_attachments() {
        let args = Args::parse_from([
            "conduit", "replay", "run.jsonl", "--attach", "a.rs", "--attach", "b.rs", "--json",
        ]);
        let Command::Replay {
            frames,
            attach,
            json,
            prompt,
            ..
        } = args.command
        else {
            panic!("expected replay");
        };
        assert_eq!(frames, "run.jsonl");
        assert_eq!(attach, vec!["a.rs", "b.rs"]);
        assert!(json);
        assert_eq!(prompt, "replay");
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let args = Args::parse_from(["conduit", "preview", "tool.json", "--no-color", "-c", "x.toml"]);
        assert!(args.no_color);
        assert_eq!(args.config.as_deref(), Some("x.toml"));
        assert!(matches!(args.command, Command::Preview { max_lines: None, .. }));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Args::try_parse_from(["conduit"]).is_err());
    }
}
