use std::path::PathBuf;

use clap::Parser;

/// Run one generate call against a configured LLM provider
#[derive(Debug, Parser)]
#[command(name = "weft", about = "Send a prompt to Anthropic or Google GenAI through one request model")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "weft.toml", env = "WEFT_CONFIG")]
    pub config: PathBuf,

    /// Model to call, as `provider/model` or a bare model name
    #[arg(short, long, env = "WEFT_MODEL")]
    pub model: String,

    /// System prompt prepended to the conversation
    #[arg(short, long)]
    pub system: Option<String>,

    /// Read a full JSON generate request from this file instead of a prompt
    #[arg(long, conflicts_with_all = ["prompt", "system"])]
    pub request: Option<PathBuf>,

    /// Print text as it streams
    #[arg(long)]
    pub stream: bool,

    /// Print the whole normalized response as JSON
    #[arg(long)]
    pub json: bool,

    /// Prompt text
    #[arg(required_unless_present = "request")]
    pub prompt: Option<String>,
}
