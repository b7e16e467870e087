//! deepsearch CLI: research a question from the command line.
//!
//! ```text
//! deepsearch "why is the S&P 500 down this week?"
//! deepsearch -v -c ./config.toml "what changed in the latest fed statement?"
//! ```

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod research;

#[derive(Parser)]
#[command(
    name = "deepsearch",
    about = "Answer a question by recursively searching and reading the web",
    version
)]
struct Cli {
    /// The question to research
    #[arg(required = true, num_args = 1..)]
    query: Vec<String>,

    /// Debug-level logs on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Config file (defaults to ~/.deepsearch/config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Cli {
    fn question(&self) -> String {
        self.query.join(" ")
    }
}

/// Logs go to stderr so stdout carries only the answer. `RUST_LOG` wins
/// over `--verbose`.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    research::run(&cli.question(), cli.config.as_deref()).await
}
