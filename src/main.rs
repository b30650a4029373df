//! ondevice-llm - run one prompt against a local GGUF model
//!
//! Loads the model once, streams the generated text to stdout and reports a
//! short summary on stderr.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ondevice_llm::config::{default_config_path, load_config};
use ondevice_llm::inference::bridge::load_model_flag;
use ondevice_llm::inference::prompt::format_chat_prompt;
use ondevice_llm::inference::streaming::{stream_to_channel, write_stream, StreamToken};
use ondevice_llm::inference::{Engine, LlamaCppBackend};

#[derive(Debug, Parser)]
#[command(name = "ondevice-llm", version, about = "Stream a completion from a local GGUF model")]
struct Args {
    /// Path to the GGUF model file
    #[arg(short, long)]
    model: PathBuf,

    /// Engine config JSON (defaults to the platform data directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wrap the prompt in chat markup with this system instruction
    #[arg(short, long)]
    system: Option<String>,

    /// Send the prompt verbatim, without chat markup
    #[arg(long)]
    raw: bool,

    /// Prompt text
    prompt: String,
}

fn main() -> ExitCode {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "ondevice_llm=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    let args = Args::parse();
    info!("Starting ondevice-llm v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => load_config(path),
        None => default_config_path()
            .map(|path| load_config(&path))
            .unwrap_or_default(),
    };

    let engine = Engine::new(LlamaCppBackend::new(), config);
    if !load_model_flag(&engine, &args.model) {
        eprintln!("Failed to load model from {}", args.model.display());
        return ExitCode::FAILURE;
    }

    let prompt = if args.raw {
        args.prompt.clone()
    } else {
        format_chat_prompt(args.system.as_deref(), &args.prompt)
    };

    if let Some(path) = engine.loaded_model_path() {
        info!("Model ready: {}", path.display());
    }

    let (tx, rx) = mpsc::channel();
    let terminal = thread::scope(|scope| {
        let engine = &engine;
        let prompt = prompt.as_str();
        scope.spawn(move || stream_to_channel(engine, prompt, tx));
        write_stream(rx, io::stdout())
    });

    match terminal {
        Some(StreamToken::Done(completion)) => {
            println!();
            eprintln!(
                "[{} prompt tokens, {} generated, {:?}]",
                completion.prompt_tokens, completion.generated_tokens, completion.stop_reason
            );
            ExitCode::SUCCESS
        }
        Some(StreamToken::Error(e)) => {
            tracing::error!("{}", e);
            eprintln!("{}", e.sentinel());
            ExitCode::FAILURE
        }
        _ => {
            tracing::error!("Generation thread ended without a result");
            ExitCode::FAILURE
        }
    }
}
