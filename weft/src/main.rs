#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::io::Write;

use args::Args;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use weft_config::Config;
use weft_core::RequestContext;
use weft_llm::{GenerateChunk, GenerateRequest, LlmState, Message};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    weft_telemetry::init(&config.telemetry, "warn")?;

    tracing::info!(config_path = %args.config.display(), model = %args.model, "starting weft");

    let state = LlmState::from_config(&config.llm)?;
    let request = build_request(&args)?;

    let cancellation = CancellationToken::new();
    let signal_token = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            signal_token.cancel();
        }
    });
    let context = RequestContext::with_cancellation(cancellation);

    let response = if args.stream {
        let mut stdout = std::io::stdout();
        let mut print = |chunk: GenerateChunk| -> anyhow::Result<()> {
            write!(stdout, "{}", chunk.text())?;
            stdout.flush()?;
            Ok(())
        };
        let response = state.generate(&request, &args.model, &context, Some(&mut print)).await?;
        println!();
        response
    } else {
        state.generate(&request, &args.model, &context, None).await?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if !args.stream {
        println!("{}", response.text());
    }

    tracing::info!(
        finish_reason = ?response.finish_reason,
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        "generate finished"
    );
    Ok(())
}

fn build_request(args: &Args) -> anyhow::Result<GenerateRequest> {
    if let Some(path) = &args.request {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read request file {}: {e}", path.display()))?;
        return serde_json::from_str(&raw).map_err(|e| anyhow::anyhow!("invalid request file {}: {e}", path.display()));
    }

    let mut messages = Vec::new();
    if let Some(system) = &args.system {
        messages.push(Message::system_text(system.clone()));
    }
    messages.push(Message::user_text(args.prompt.clone().unwrap_or_default()));
    Ok(GenerateRequest::new(messages))
}
