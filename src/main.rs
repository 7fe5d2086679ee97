//! CLI entry point for conduit.

mod cli;

use clap::Parser;
use cli::Command;
use conduit::config::{load_config_with_source, ApprovalMode, Config, LoadedConfig};
use conduit::document::{Message, ToolBlock};
use conduit::preview::extract_with_limit;
use conduit::prompt::{AttachedFile, PromptContext};
use conduit::render::TerminalRenderer;
use conduit::runtime::{spawn_runtime, RuntimeCommand, RuntimeEvent, RuntimeSpawnConfig};
use conduit::session::RpcAgentSession;
use conduit::transport::{FrameQueue, MemoryChannel, RawFrame, RecordingTransport, Transport};
use std::sync::Arc;
use tracing::{debug, info};

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();

    let loaded = match load_config_with_source(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(&loaded.config, !args.no_color);
    let color = !args.no_color;

    let result = match args.command {
        Command::Replay {
            frames,
            prompt,
            attach,
            workspace_files,
            approve,
            json,
        } => {
            let options = ReplayOptions {
                frames,
                prompt,
                attach,
                workspace_files,
                approve,
                json,
            };
            run_replay(loaded.config, options, color).await
        }
        Command::Preview {
            tool,
            max_lines,
            json,
        } => run_preview(&loaded.config, &tool, max_lines, json, color),
        Command::Config => print_config(&loaded),
    };

    if let Err(msg) = result {
        eprintln!("error: {msg}");
        std::process::exit(1);
    }
}

/// Logs go to stderr, filtered by `log_level` (which `CONDUIT_LOG` overrides).
fn init_tracing(config: &Config, ansi: bool) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .init();
}

struct ReplayOptions {
    frames: String,
    prompt: String,
    attach: Vec<String>,
    workspace_files: Vec<String>,
    approve: Option<String>,
    json: bool,
}

async fn run_replay(mut config: Config, options: ReplayOptions, color: bool) -> Result<(), String> {
    let text = std::fs::read_to_string(&options.frames)
        .map_err(|e| format!("failed to read {}: {e}", options.frames))?;
    let frames: Vec<RawFrame> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(RawFrame::from)
        .collect();
    info!(path = %options.frames, frames = frames.len(), "replaying recorded frames");

    if let Some(mode) = options.approve.as_deref() {
        config.approval.mode = mode.parse::<ApprovalMode>()?;
    }

    let mut attached_files = Vec::with_capacity(options.attach.len());
    for path in &options.attach {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read attachment {path}: {e}"))?;
        attached_files.push(AttachedFile::new(
            path.clone(),
            &content,
            config.prompt.max_attachment_chars,
        ));
    }
    let context = PromptContext {
        workspace_files: options.workspace_files,
        attached_files,
    };

    let channel = MemoryChannel::new();
    let queue = FrameQueue::attach(&channel);
    let (transport, mut outbound) = RecordingTransport::new();
    let transport: Arc<dyn Transport> = Arc::new(transport);
    let session = Arc::new(RpcAgentSession::new(
        Arc::clone(&transport),
        config.session.session_id.clone(),
        config.session.cwd.clone(),
    ));
    let renderer = TerminalRenderer::new(color, config.preview.command_max_lines);

    tokio::spawn(async move {
        while let Some(envelope) = outbound.recv().await {
            debug!(%envelope, "outbound envelope");
        }
    });

    let (handle, mut events) = spawn_runtime(RuntimeSpawnConfig {
        config,
        session,
        transport,
        frames: queue,
    });
    handle
        .send(RuntimeCommand::SubmitPrompt {
            prompt: options.prompt,
            context,
        })
        .await?;

    let mut pending_frames = Some(frames);
    let mut final_message: Option<Message> = None;
    while let Some(envelope) = events.recv().await {
        match &envelope.event {
            RuntimeEvent::RunStarted { .. } => {
                if let Some(frames) = pending_frames.take() {
                    // One batch, then close: a recording with no terminal
                    // frame ends the run as a transport fault.
                    channel.deliver(frames);
                    channel.close();
                }
            }
            RuntimeEvent::RunFinished { message, .. } | RuntimeEvent::RunFailed { message, .. } => {
                final_message = Some(message.clone());
            }
            _ => {}
        }
        if !options.json {
            renderer.render(&envelope);
        }
        if final_message.is_some() {
            break;
        }
    }
    let _ = handle.send(RuntimeCommand::Shutdown).await;

    let message = final_message.ok_or_else(|| "runtime stopped before the run ended".to_string())?;
    if options.json {
        let text = serde_json::to_string_pretty(&message)
            .map_err(|e| format!("failed to serialize message: {e}"))?;
        println!("{text}");
    }
    Ok(())
}

fn run_preview(
    config: &Config,
    path: &str,
    max_lines: Option<usize>,
    json: bool,
    color: bool,
) -> Result<(), String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("failed to read {path}: {e}"))?;
    let block: ToolBlock =
        serde_json::from_str(&text).map_err(|e| format!("invalid tool block in {path}: {e}"))?;
    let max_lines = max_lines.unwrap_or(config.preview.command_max_lines);

    if json {
        let preview = extract_with_limit(&block, max_lines);
        let text = serde_json::to_string_pretty(&preview)
            .map_err(|e| format!("failed to serialize preview: {e}"))?;
        println!("{text}");
        return Ok(());
    }
    for line in TerminalRenderer::new(color, max_lines).tool_lines(&block) {
        println!("{line}");
    }
    Ok(())
}

fn print_config(loaded: &LoadedConfig) -> Result<(), String> {
    match &loaded.source {
        Some(path) => println!("# source: {}", path.display()),
        None => println!("# source: built-in defaults"),
    }
    let text = toml::to_string_pretty(&loaded.config)
        .map_err(|e| format!("failed to serialize config: {e}"))?;
    print!("{text}");
    Ok(())
}
