use std::io::{self, BufRead, ErrorKind, Write};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use genimg_contracts::config::StorageConfig;
use genimg_contracts::tools::{
    ToolReply, ToolRequest, GENERATE_IMAGE, LIST_GENERATED_IMAGES, TOOL_CATALOG, TRANSFORM_IMAGE,
};
use genimg_engine::{GeminiBackend, Orchestrator, ToolServer};
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "genimg", version, about = "Prompt-to-image tools with remote/local delivery")]
struct Cli {
    /// Local output directory; overrides OUTPUT_IMAGE_PATH ("off" disables it).
    #[arg(long, global = true)]
    output_dir: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Answer JSON tool calls, one per stdin line.
    Serve,
    /// Print the tool catalogue.
    Tools,
    Generate(GenerateArgs),
    Transform(TransformArgs),
    List(ListArgs),
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
}

#[derive(Debug, Args)]
struct TransformArgs {
    /// Image file path or data:image/...;base64 URL.
    #[arg(long)]
    image: String,
    #[arg(long)]
    prompt: String,
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long)]
    limit: Option<u32>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("genimg error: {err:#}");
            std::process::exit(1);
        }
    }
}

// stdout carries tool output, so logs go to stderr.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    if let Command::Tools = cli.command {
        println!("{}", serde_json::to_string_pretty(TOOL_CATALOG)?);
        return Ok(0);
    }

    let server = build_server(cli.output_dir.as_deref())?;
    match cli.command {
        Command::Serve => {
            let stdin = io::stdin();
            let stdout = io::stdout();
            serve_lines(&server, stdin.lock(), stdout.lock())?;
            Ok(0)
        }
        Command::Generate(args) => Ok(print_reply(
            &server.call(GENERATE_IMAGE, arguments(json!({ "prompt": args.prompt }))),
        )),
        Command::Transform(args) => Ok(print_reply(&server.call(
            TRANSFORM_IMAGE,
            arguments(json!({ "image": args.image, "prompt": args.prompt })),
        ))),
        Command::List(args) => Ok(print_reply(
            &server.call(LIST_GENERATED_IMAGES, arguments(json!({ "limit": args.limit }))),
        )),
        Command::Tools => Ok(0),
    }
}

fn build_server(output_dir: Option<&str>) -> Result<ToolServer> {
    let storage = StorageConfig::from_env_with_override(output_dir)
        .context("invalid storage configuration")?;
    tracing::info!(
        remote = storage.has_remote(),
        local = ?storage.local,
        "storage configured"
    );
    if !storage.has_any_backend() {
        tracing::warn!("no storage backend configured; image tools will fail");
    }
    let backend = GeminiBackend::from_env()?;
    let orchestrator = Orchestrator::from_config(&storage, Box::new(backend))?;
    Ok(ToolServer::new(orchestrator))
}

fn arguments(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn print_reply(reply: &ToolReply) -> i32 {
    println!("{}", reply.content_text());
    if reply.is_error {
        1
    } else {
        0
    }
}

/// One JSON request per line in, one JSON reply per line out, until EOF.
fn serve_lines(server: &ToolServer, mut reader: impl BufRead, mut writer: impl Write) -> Result<()> {
    let mut line = String::new();
    loop {
        line.clear();
        let read = match reader.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<ToolRequest>(input) {
            Ok(request) => server.handle(request),
            Err(err) => {
                tracing::warn!(error = %err, "unparsable tool request");
                ToolReply::error("", format!("Error: invalid request: {err}"))
            }
        };
        serde_json::to_writer(&mut writer, &reply)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    Ok(())
}
